//! Read-side condition composition.
//!
//! [`Filters`] is the transient directive set a caller hands to
//! [`ReadBuilder`](crate::table::ReadBuilder): zero or more optional filter
//! clauses, combined with logical AND only. Placeholders are numbered
//! (`$1..$n`) at build time, never by string replacement.
//!
//! The after-cursor directive is deliberately forgiving: paging code often
//! carries a cursor column that no longer exists after a table change, and
//! that must not fail the whole read. If the named column is missing from
//! the reflected table the directive is dropped (logged at debug) and the
//! remaining directives still apply. Every other directive that names a
//! nonexistent column propagates the engine's error as usual.

use crate::error::TableResult;
use crate::ident::Ident;
use crate::param::{Params, SqlParam};
use crate::record::PgValue;
use serde_json::Value;
use tokio_postgres::types::ToSql;
use tracing::debug;

#[derive(Clone, Debug)]
enum Directive {
    Between {
        column: String,
        start: Option<SqlParam>,
        end: Option<SqlParam>,
    },
    After {
        column: String,
        value: SqlParam,
    },
    Null {
        column: String,
    },
    NotNull {
        column: String,
    },
    Eq {
        column: String,
        value: SqlParam,
    },
    In {
        column: String,
        values: Vec<SqlParam>,
    },
}

/// A set of optional filter directives, ANDed together.
#[derive(Clone, Debug, Default)]
pub struct Filters {
    directives: Vec<Directive>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Range on one column. Both bounds present: inclusive `BETWEEN`;
    /// start only: `>=`; end only: `<=`; neither: no directive.
    pub fn between<T: ToSql + Send + Sync + 'static>(
        &mut self,
        column: &str,
        start: Option<T>,
        end: Option<T>,
    ) {
        if start.is_none() && end.is_none() {
            return;
        }
        self.directives.push(Directive::Between {
            column: column.to_string(),
            start: start.map(SqlParam::new),
            end: end.map(SqlParam::new),
        });
    }

    /// Strict-greater-than cursor: `column > value`.
    pub fn after<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, value: T) {
        self.directives.push(Directive::After {
            column: column.to_string(),
            value: SqlParam::new(value),
        });
    }

    /// `column IS NULL` for each named column.
    pub fn null_columns(&mut self, columns: &[&str]) {
        for column in columns {
            self.directives.push(Directive::Null {
                column: column.to_string(),
            });
        }
    }

    /// `column IS NOT NULL` for each named column.
    pub fn non_null_columns(&mut self, columns: &[&str]) {
        for column in columns {
            self.directives.push(Directive::NotNull {
                column: column.to_string(),
            });
        }
    }

    /// `column = value`.
    pub fn eq<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, value: T) {
        self.directives.push(Directive::Eq {
            column: column.to_string(),
            value: SqlParam::new(value),
        });
    }

    /// One equality per pair; all pairs apply.
    pub fn eq_map(&mut self, pairs: impl IntoIterator<Item = (String, Value)>) {
        for (column, value) in pairs {
            self.directives.push(Directive::Eq {
                column,
                value: SqlParam::new(PgValue(value)),
            });
        }
    }

    /// `column IN (values...)`. An empty list matches no rows.
    pub fn any_of<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, values: Vec<T>) {
        self.directives.push(Directive::In {
            column: column.to_string(),
            values: values.into_iter().map(SqlParam::new).collect(),
        });
    }

    /// Build the WHERE clause content (without the `WHERE` keyword).
    ///
    /// `known_columns` is the reflected column set of the target table; it
    /// is consulted only by the after-cursor drop rule. Returns an empty
    /// string when no directive survives.
    pub fn compose(&self, known_columns: &[String]) -> TableResult<(String, Params)> {
        let mut params = Params::new();
        let mut predicates = Vec::new();

        for directive in &self.directives {
            match directive {
                Directive::Between { column, start, end } => {
                    let col = Ident::new(column)?;
                    match (start, end) {
                        (Some(start), Some(end)) => {
                            let lo = params.push_param(start.clone());
                            let hi = params.push_param(end.clone());
                            predicates.push(format!("{col} BETWEEN ${lo} AND ${hi}"));
                        }
                        (Some(start), None) => {
                            let lo = params.push_param(start.clone());
                            predicates.push(format!("{col} >= ${lo}"));
                        }
                        (None, Some(end)) => {
                            let hi = params.push_param(end.clone());
                            predicates.push(format!("{col} <= ${hi}"));
                        }
                        // Unreachable in practice: `between` skips bound-less directives.
                        (None, None) => continue,
                    }
                }
                Directive::After { column, value } => {
                    if !known_columns.iter().any(|c| c == column) {
                        debug!(column = %column, "dropping after-cursor filter on unknown column");
                        continue;
                    }
                    let col = Ident::new(column)?;
                    let idx = params.push_param(value.clone());
                    predicates.push(format!("{col} > ${idx}"));
                }
                Directive::Null { column } => {
                    predicates.push(format!("{} IS NULL", Ident::new(column)?));
                }
                Directive::NotNull { column } => {
                    predicates.push(format!("{} IS NOT NULL", Ident::new(column)?));
                }
                Directive::Eq { column, value } => {
                    let col = Ident::new(column)?;
                    let idx = params.push_param(value.clone());
                    predicates.push(format!("{col} = ${idx}"));
                }
                Directive::In { column, values } => {
                    let col = Ident::new(column)?;
                    if values.is_empty() {
                        predicates.push("1=0".to_string());
                        continue;
                    }
                    let placeholders: Vec<String> = values
                        .iter()
                        .map(|v| format!("${}", params.push_param(v.clone())))
                        .collect();
                    predicates.push(format!("{col} IN ({})", placeholders.join(", ")));
                }
            }
        }

        Ok((predicates.join(" AND "), params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn known() -> Vec<String> {
        vec!["id".to_string(), "price".to_string(), "settled_at".to_string()]
    }

    #[test]
    fn empty_set_composes_to_nothing() {
        let (sql, params) = Filters::new().compose(&known()).unwrap();
        assert_eq!(sql, "");
        assert!(params.is_empty());
    }

    #[test]
    fn between_with_both_bounds_is_inclusive() {
        let mut filters = Filters::new();
        filters.between("price", Some(10_i64), Some(20_i64));
        let (sql, params) = filters.compose(&known()).unwrap();
        assert_eq!(sql, "price BETWEEN $1 AND $2");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn between_with_single_bound() {
        let mut filters = Filters::new();
        filters.between("price", Some(10_i64), None);
        let (sql, _) = filters.compose(&known()).unwrap();
        assert_eq!(sql, "price >= $1");

        let mut filters = Filters::new();
        filters.between("price", None, Some(20_i64));
        let (sql, _) = filters.compose(&known()).unwrap();
        assert_eq!(sql, "price <= $1");
    }

    #[test]
    fn between_with_no_bounds_is_absent() {
        let mut filters = Filters::new();
        filters.between::<i64>("price", None, None);
        assert!(filters.is_empty());
    }

    #[test]
    fn after_cursor_on_known_column() {
        let mut filters = Filters::new();
        filters.after("id", 500_i64);
        let (sql, params) = filters.compose(&known()).unwrap();
        assert_eq!(sql, "id > $1");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn after_cursor_on_unknown_column_is_dropped() {
        let mut filters = Filters::new();
        filters.after("legacy_id", 500_i64);
        filters.eq("id", 1_i64);
        let (sql, params) = filters.compose(&known()).unwrap();
        assert_eq!(sql, "id = $1");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn null_directives_use_named_columns() {
        let mut filters = Filters::new();
        filters.null_columns(&["settled_at"]);
        filters.non_null_columns(&["price"]);
        let (sql, params) = filters.compose(&known()).unwrap();
        assert_eq!(sql, "settled_at IS NULL AND price IS NOT NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn eq_map_applies_every_pair() {
        let mut filters = Filters::new();
        filters.eq_map(vec![
            ("id".to_string(), json!(7)),
            ("price".to_string(), json!(99)),
        ]);
        let (sql, params) = filters.compose(&known()).unwrap();
        assert_eq!(sql, "id = $1 AND price = $2");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn membership_lists_each_value() {
        let mut filters = Filters::new();
        filters.any_of("id", vec![1_i64, 2, 3]);
        let (sql, params) = filters.compose(&known()).unwrap();
        assert_eq!(sql, "id IN ($1, $2, $3)");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn empty_membership_matches_nothing() {
        let mut filters = Filters::new();
        filters.any_of::<i64>("id", vec![]);
        let (sql, params) = filters.compose(&known()).unwrap();
        assert_eq!(sql, "1=0");
        assert!(params.is_empty());
    }

    #[test]
    fn directives_join_with_and_in_insertion_order() {
        let mut filters = Filters::new();
        filters.between("price", Some(1_i64), Some(5_i64));
        filters.after("id", 10_i64);
        filters.eq("price", 3_i64);
        let (sql, params) = filters.compose(&known()).unwrap();
        assert_eq!(sql, "price BETWEEN $1 AND $2 AND id > $3 AND price = $4");
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn irregular_column_names_are_quoted() {
        let mut filters = Filters::new();
        filters.eq("Settled At", true);
        let (sql, _) = filters.compose(&known()).unwrap();
        assert_eq!(sql, r#""Settled At" = $1"#);
    }
}
