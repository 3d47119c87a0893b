//! Table-level operations over a pooled connection.
//!
//! [`Database`] is the top-level handle: a connection pool plus the schema
//! every table name resolves against. Each operation checks a client out of
//! the pool for the duration of its own work and returns it on every exit
//! path; mutations run inside [`transaction!`](crate::transaction!).

use crate::batch;
use crate::client::GenericClient;
use crate::config::DbConfig;
use crate::error::{TableError, TableResult};
use crate::filter::Filters;
use crate::ident::Ident;
use crate::param::Params;
use crate::pool::create_pool;
use crate::record::{Frame, PgValue, Record, RowExt};
use crate::schema::{self, TableInfo};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio_postgres::types::ToSql;
use tracing::{debug, warn};

/// Default row cap for [`ReadBuilder::fetch`].
pub const DEFAULT_READ_LIMIT: i64 = 10_000;

/// A column to add via [`Database::add_columns`].
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    /// SQL type expression, e.g. `DOUBLE PRECISION` or `VARCHAR(32)`.
    pub sql_type: String,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
        }
    }
}

/// A pooled handle to one database/schema.
pub struct Database {
    pool: deadpool_postgres::Pool,
    schema: String,
}

impl Database {
    /// Build a pool from the configuration. Connections open lazily; an
    /// unreachable server surfaces on the first operation.
    pub fn connect(config: &DbConfig) -> TableResult<Self> {
        Ok(Self {
            pool: create_pool(config)?,
            schema: config.schema.clone(),
        })
    }

    /// The schema table names resolve against.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub(crate) async fn client(&self) -> TableResult<deadpool_postgres::Client> {
        Ok(self.pool.get().await?)
    }

    /// Reflect a table's current column metadata.
    pub async fn table(&self, table: &str) -> TableResult<TableInfo> {
        let client = self.client().await?;
        schema::load_table(&client, &self.schema, table).await
    }

    /// Start a read against `table`.
    pub fn read(&self, table: impl Into<String>) -> ReadBuilder<'_> {
        ReadBuilder {
            db: self,
            table: table.into(),
            columns: None,
            filters: Filters::new(),
            order_by: None,
            limit: Some(DEFAULT_READ_LIMIT),
        }
    }

    /// Insert records in one parameterized multi-row statement.
    ///
    /// Every record must carry exactly the column set of the first record.
    pub async fn insert_rows(&self, table: &str, rows: &[Record]) -> TableResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let target = Ident::qualified(&self.schema, table)?;
        let columns: Vec<String> = rows[0].keys().cloned().collect();
        let column_sql = ident_list(&columns)?;

        let mut params = Params::new();
        let mut groups = Vec::with_capacity(rows.len());
        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(TableError::validation(format!(
                    "record {row_idx} does not match the column set of the first record"
                )));
            }
            let mut placeholders = Vec::with_capacity(columns.len());
            for column in &columns {
                let value = row.get(column).cloned().ok_or_else(|| {
                    TableError::validation(format!(
                        "record {row_idx} is missing column {column:?}"
                    ))
                })?;
                placeholders.push(format!("${}", params.push(PgValue(value))));
            }
            groups.push(format!("({})", placeholders.join(", ")));
        }

        let sql = format!(
            "INSERT INTO {target} ({}) VALUES {}",
            column_sql.join(", "),
            groups.join(", ")
        );
        debug!(table, rows = rows.len(), "inserting records");
        let mut client = self.client().await?;
        crate::transaction!(client, tx, { tx.execute(&sql, &params.as_refs()).await })
    }

    /// Delete all rows from a table. Returns the number of rows removed.
    pub async fn clear(&self, table: &str) -> TableResult<u64> {
        let target = Ident::qualified(&self.schema, table)?;
        let client = self.client().await?;
        client.execute(&format!("DELETE FROM {target}"), &[]).await
    }

    /// Create `<table>_temp` in the same schema from the first `limit` rows
    /// of `table`. Returns the number of rows copied.
    pub async fn copy_to_temp(&self, table: &str, limit: i64) -> TableResult<u64> {
        let source = Ident::qualified(&self.schema, table)?;
        let target = Ident::qualified(&self.schema, &format!("{table}_temp"))?;
        let client = self.client().await?;
        client
            .execute(
                &format!("CREATE TABLE {target} AS SELECT * FROM {source} LIMIT {limit}"),
                &[],
            )
            .await
    }

    /// Check which of the given columns exist on a table.
    pub async fn columns_present(
        &self,
        table: &str,
        names: &[&str],
    ) -> TableResult<BTreeMap<String, bool>> {
        let info = self.table(table).await?;
        Ok(names
            .iter()
            .map(|name| (name.to_string(), info.has_column(name)))
            .collect())
    }

    /// Add the given columns, skipping any that already exist.
    /// Returns the number of columns added.
    pub async fn add_columns(&self, table: &str, columns: &[ColumnSpec]) -> TableResult<usize> {
        let info = self.table(table).await?;
        let target = Ident::qualified(&self.schema, table)?;

        let mut statements = Vec::new();
        for spec in columns {
            if info.has_column(&spec.name) {
                continue;
            }
            let column = Ident::new(&spec.name)?;
            let sql_type = validate_type(&spec.sql_type)?;
            statements.push(format!("ALTER TABLE {target} ADD COLUMN {column} {sql_type}"));
        }
        self.run_ddl(statements).await
    }

    /// Rename columns from `(old, new)` pairs. Old names not present on the
    /// table are skipped with a warning. Returns the number renamed.
    pub async fn rename_columns(
        &self,
        table: &str,
        renames: &[(&str, &str)],
    ) -> TableResult<usize> {
        let info = self.table(table).await?;
        let target = Ident::qualified(&self.schema, table)?;

        let mut statements = Vec::new();
        for (old, new) in renames {
            if !info.has_column(old) {
                warn!(table, column = old, "column not found, skipping rename");
                continue;
            }
            statements.push(format!(
                "ALTER TABLE {target} RENAME COLUMN {} TO {}",
                Ident::new(old)?,
                Ident::new(new)?
            ));
        }
        self.run_ddl(statements).await
    }

    async fn run_ddl(&self, statements: Vec<String>) -> TableResult<usize> {
        if statements.is_empty() {
            return Ok(0);
        }
        let applied = statements.len();
        let mut client = self.client().await?;
        crate::transaction!(client, tx, {
            for statement in &statements {
                debug!(statement = %statement, "applying DDL");
                tx.execute(statement, &[]).await?;
            }
            Ok(())
        })?;
        Ok(applied)
    }

    /// The row with the greatest value of `column`, if the table is non-empty.
    pub async fn last_row(&self, table: &str, column: &str) -> TableResult<Option<Record>> {
        let target = Ident::qualified(&self.schema, table)?;
        let column = Ident::new(column)?;
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!("SELECT * FROM {target} ORDER BY {column} DESC LIMIT 1"),
                &[],
            )
            .await?;
        row.as_ref().map(|r| r.record()).transpose()
    }

    /// The first row with `column > value`, in ascending `column` order.
    pub async fn first_row_after(
        &self,
        table: &str,
        column: &str,
        value: impl ToSql + Sync,
    ) -> TableResult<Option<Record>> {
        let target = Ident::qualified(&self.schema, table)?;
        let column = Ident::new(column)?;
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT * FROM {target} WHERE {column} > $1 ORDER BY {column} ASC LIMIT 1"
                ),
                &[&value],
            )
            .await?;
        row.as_ref().map(|r| r.record()).transpose()
    }

    /// Values of `table_a.column_a` with no matching value in
    /// `table_b.column_b`.
    pub async fn values_missing_in(
        &self,
        table_a: &str,
        column_a: &str,
        table_b: &str,
        column_b: &str,
    ) -> TableResult<Vec<Value>> {
        let a = Ident::qualified(&self.schema, table_a)?;
        let b = Ident::qualified(&self.schema, table_b)?;
        let col_a = Ident::new(column_a)?;
        let col_b = Ident::new(column_b)?;
        let sql = format!(
            "SELECT a.{col_a} FROM {a} a \
             WHERE NOT EXISTS (SELECT 1 FROM {b} b WHERE b.{col_b} = a.{col_a})"
        );
        let client = self.client().await?;
        let rows = client.query(&sql, &[]).await?;
        rows.iter().map(|row| row.cell(0)).collect()
    }

    /// Update rows in sequential batches, one transaction per batch.
    ///
    /// Each record updates the row whose `merge_column` matches; every other
    /// key in the record becomes a SET clause. Earlier batches stay
    /// committed if a later batch fails.
    pub async fn update_batches(
        &self,
        table: &str,
        rows: &[Record],
        merge_column: &str,
        batch_size: usize,
    ) -> TableResult<u64> {
        batch::update_batches(self, table, rows, merge_column, batch_size).await
    }
}

// ==================== ReadBuilder ====================

/// Builder for a filtered, ordered, capped table read.
///
/// All filter directives are optional and combine with AND. `fetch` reflects
/// the table (failing with `NotFound` if it is missing), composes the query,
/// and materializes a [`Frame`] whose columns are the requested projection —
/// or the table's own column order when no projection is given.
#[must_use]
pub struct ReadBuilder<'a> {
    db: &'a Database,
    table: String,
    columns: Option<Vec<String>>,
    filters: Filters,
    order_by: Option<(String, bool)>,
    limit: Option<i64>,
}

impl ReadBuilder<'_> {
    /// Project an explicit column list instead of all reflected columns.
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Range filter; see [`Filters::between`].
    pub fn between<T: ToSql + Send + Sync + 'static>(
        mut self,
        column: &str,
        start: Option<T>,
        end: Option<T>,
    ) -> Self {
        self.filters.between(column, start, end);
        self
    }

    /// Cursor filter `column > value`; silently dropped if `column` does not
    /// exist on the table.
    pub fn after<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
        self.filters.after(column, value);
        self
    }

    /// `IS NULL` filter for each named column.
    pub fn null_columns(mut self, columns: &[&str]) -> Self {
        self.filters.null_columns(columns);
        self
    }

    /// `IS NOT NULL` filter for each named column.
    pub fn non_null_columns(mut self, columns: &[&str]) -> Self {
        self.filters.non_null_columns(columns);
        self
    }

    /// Equality filter.
    pub fn eq<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
        self.filters.eq(column, value);
        self
    }

    /// Equality filter per map entry; all entries apply.
    pub fn eq_map(mut self, pairs: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.filters.eq_map(pairs);
        self
    }

    /// Membership filter `column IN (values...)`.
    pub fn any_of<T: ToSql + Send + Sync + 'static>(
        mut self,
        column: &str,
        values: Vec<T>,
    ) -> Self {
        self.filters.any_of(column, values);
        self
    }

    /// Replace the whole directive set at once.
    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    /// Single-column sort.
    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order_by = Some((column.to_string(), ascending));
        self
    }

    /// Cap the number of rows returned (default 10000).
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Remove the row cap.
    pub fn no_limit(mut self) -> Self {
        self.limit = None;
        self
    }

    /// Execute the read.
    pub async fn fetch(self) -> TableResult<Frame> {
        let client = self.db.client().await?;
        let info = schema::load_table(&client, self.db.schema(), &self.table).await?;

        let projection = match self.columns {
            Some(columns) => columns,
            None => info.column_names(),
        };
        let target = Ident::qualified(self.db.schema(), &self.table)?;
        let known = info.column_names();
        let order = self.order_by.as_ref().map(|(c, asc)| (c.as_str(), *asc));
        let (sql, params) = build_select(&target, &projection, &self.filters, &known, order, self.limit)?;

        debug!(sql = %sql, "reading table");
        let rows = client.query(&sql, &params.as_refs()).await?;
        Frame::from_rows(projection, &rows)
    }
}

/// Assemble the SELECT statement for a composed read.
fn build_select(
    target: &str,
    projection: &[String],
    filters: &Filters,
    known_columns: &[String],
    order_by: Option<(&str, bool)>,
    limit: Option<i64>,
) -> TableResult<(String, Params)> {
    let columns = ident_list(projection)?;
    let mut sql = format!("SELECT {} FROM {target}", columns.join(", "));

    let (where_sql, params) = filters.compose(known_columns)?;
    if !where_sql.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&where_sql);
    }
    if let Some((column, ascending)) = order_by {
        let column = Ident::new(column)?;
        let direction = if ascending { "ASC" } else { "DESC" };
        sql.push_str(&format!(" ORDER BY {column} {direction}"));
    }
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    Ok((sql, params))
}

fn ident_list(names: &[String]) -> TableResult<Vec<String>> {
    names
        .iter()
        .map(|name| Ident::new(name).map(|i| i.as_sql().to_string()))
        .collect()
}

/// Column type expressions land in DDL verbatim, so restrict them to the
/// characters SQL type syntax actually needs.
fn validate_type(sql_type: &str) -> TableResult<&str> {
    let trimmed = sql_type.trim();
    let ok = !trimmed.is_empty()
        && trimmed.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '(' | ')' | ',' | '[' | ']')
        });
    if ok {
        Ok(trimmed)
    } else {
        Err(TableError::validation(format!(
            "invalid column type expression: {sql_type:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known() -> Vec<String> {
        vec!["id".to_string(), "price".to_string()]
    }

    fn projection() -> Vec<String> {
        vec!["id".to_string(), "price".to_string()]
    }

    #[test]
    fn select_without_filters() {
        let (sql, params) = build_select(
            "public.events",
            &projection(),
            &Filters::new(),
            &known(),
            None,
            Some(DEFAULT_READ_LIMIT),
        )
        .unwrap();
        assert_eq!(sql, "SELECT id, price FROM public.events LIMIT 10000");
        assert!(params.is_empty());
    }

    #[test]
    fn select_with_filters_order_and_limit() {
        let mut filters = Filters::new();
        filters.between("price", Some(5_i64), Some(9_i64));
        filters.eq("id", 1_i64);
        let (sql, params) = build_select(
            "public.events",
            &projection(),
            &filters,
            &known(),
            Some(("id", false)),
            Some(50),
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT id, price FROM public.events \
             WHERE price BETWEEN $1 AND $2 AND id = $3 ORDER BY id DESC LIMIT 50"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn select_without_limit_has_no_cap() {
        let (sql, _) = build_select(
            "public.events",
            &projection(),
            &Filters::new(),
            &known(),
            Some(("id", true)),
            None,
        )
        .unwrap();
        assert_eq!(sql, "SELECT id, price FROM public.events ORDER BY id ASC");
    }

    #[test]
    fn dropped_cursor_still_applies_other_filters() {
        let mut filters = Filters::new();
        filters.after("gone", 7_i64);
        filters.eq("id", 1_i64);
        let (sql, params) =
            build_select("public.events", &projection(), &filters, &known(), None, None).unwrap();
        assert_eq!(sql, "SELECT id, price FROM public.events WHERE id = $1");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn type_expression_validation() {
        assert!(validate_type("DOUBLE PRECISION").is_ok());
        assert!(validate_type("VARCHAR(32)").is_ok());
        assert!(validate_type("numeric(10, 2)").is_ok());
        assert!(validate_type("TEXT; DROP TABLE users").is_err());
        assert!(validate_type("").is_err());
    }
}
