//! Runtime table reflection.
//!
//! Column metadata is discovered from `pg_catalog` on demand, per call;
//! nothing is cached. The database owns the schema — this crate only reads
//! it.

use crate::client::GenericClient;
use crate::error::{TableError, TableResult};
use crate::record::RowExt;
use serde::{Deserialize, Serialize};

/// One column of a reflected table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
    pub ordinal: i32,
}

/// A reflected table: name plus columns in table order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    /// Column names in table (ordinal) order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

/// Reflect one table from the live database.
///
/// Returns [`TableError::NotFound`] if no relation of that name exists in
/// the schema.
pub async fn load_table<C: GenericClient>(
    client: &C,
    schema: &str,
    table: &str,
) -> TableResult<TableInfo> {
    let rows = client
        .query(
            r#"
SELECT
  a.attname AS column_name,
  a.attnum::int AS ordinal,
  pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type,
  a.attnotnull AS not_null
FROM pg_catalog.pg_class c
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
JOIN pg_catalog.pg_attribute a ON a.attrelid = c.oid
WHERE c.relkind IN ('r', 'p', 'v', 'm', 'f')
  AND a.attnum > 0
  AND NOT a.attisdropped
  AND n.nspname = $1
  AND c.relname = $2
ORDER BY a.attnum
"#,
            &[&schema, &table],
        )
        .await?;

    if rows.is_empty() {
        return Err(TableError::not_found(format!(
            "table {schema}.{table} does not exist"
        )));
    }

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        columns.push(ColumnInfo {
            name: row.try_get_column("column_name")?,
            ordinal: row.try_get_column("ordinal")?,
            data_type: row.try_get_column("data_type")?,
            not_null: row.try_get_column("not_null")?,
        });
    }

    Ok(TableInfo {
        schema: schema.to_string(),
        name: table.to_string(),
        columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableInfo {
        TableInfo {
            schema: "public".into(),
            name: "events".into(),
            columns: vec![
                ColumnInfo {
                    name: "id".into(),
                    data_type: "bigint".into(),
                    not_null: true,
                    ordinal: 1,
                },
                ColumnInfo {
                    name: "payload".into(),
                    data_type: "jsonb".into(),
                    not_null: false,
                    ordinal: 2,
                },
            ],
        }
    }

    #[test]
    fn column_names_preserve_ordinal_order() {
        assert_eq!(table().column_names(), vec!["id", "payload"]);
    }

    #[test]
    fn has_column_is_exact_match() {
        let t = table();
        assert!(t.has_column("payload"));
        assert!(!t.has_column("Payload"));
        assert!(!t.has_column("missing"));
    }
}
