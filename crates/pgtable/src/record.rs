//! Row interchange: dynamic cells, records, and tabular frames.
//!
//! Reads come back as `serde_json`-valued rows. [`Cell`] decodes *any*
//! Postgres column; types without a JSON-native mapping (and values JSON
//! cannot carry, like non-finite floats) degrade to their string form
//! instead of failing the record. [`PgValue`] goes the other way, binding a
//! JSON value as a statement parameter encoded for the target column type.

use crate::error::{TableError, TableResult};
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::fmt;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, IsNull, Kind, ToSql, Type, to_sql_checked};

type BoxError = Box<dyn std::error::Error + Sync + Send>;

/// A row as a mapping from column name to value.
pub type Record = Map<String, Value>;

// ==================== Decoding ====================

/// A dynamically typed cell decoded from any Postgres column.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell(pub Value);

impl<'a> FromSql<'a> for Cell {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(Cell(decode_value(ty, raw)))
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, BoxError> {
        Ok(Cell(Value::Null))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn decode_value(ty: &Type, raw: &[u8]) -> Value {
    if matches!(ty.kind(), Kind::Array(_)) {
        return decode_with(ty, raw, |cells: Vec<Cell>| {
            Value::Array(cells.into_iter().map(|c| c.0).collect())
        });
    }
    match ty.name() {
        "bool" => decode_with(ty, raw, Value::Bool),
        "char" => decode_with(ty, raw, |v: i8| Value::from(v)),
        "int2" => decode_with(ty, raw, |v: i16| Value::from(v)),
        "int4" => decode_with(ty, raw, |v: i32| Value::from(v)),
        "int8" => decode_with(ty, raw, |v: i64| Value::from(v)),
        "oid" => decode_with(ty, raw, |v: u32| Value::from(v)),
        "float4" => decode_with(ty, raw, |v: f32| float_value(v as f64)),
        "float8" => decode_with(ty, raw, float_value),
        "numeric" => decode_with(ty, raw, numeric_value),
        "text" | "varchar" | "bpchar" | "name" | "unknown" | "citext" => {
            decode_with(ty, raw, Value::String)
        }
        "uuid" => decode_with(ty, raw, |v: uuid::Uuid| Value::String(v.to_string())),
        "date" => decode_with(ty, raw, |v: NaiveDate| Value::String(v.to_string())),
        "time" => decode_with(ty, raw, |v: NaiveTime| Value::String(v.to_string())),
        "timestamp" => decode_with(ty, raw, |v: NaiveDateTime| Value::String(v.to_string())),
        "timestamptz" => decode_with(ty, raw, |v: DateTime<Utc>| Value::String(v.to_rfc3339())),
        "json" | "jsonb" => decode_with(ty, raw, |v: Value| v),
        "bytea" => decode_with(ty, raw, |v: Vec<u8>| Value::String(hex_string(&v))),
        _ => text_fallback(raw),
    }
}

fn decode_with<'a, T: FromSql<'a>>(ty: &Type, raw: &'a [u8], into: impl FnOnce(T) -> Value) -> Value {
    match T::from_sql(ty, raw) {
        Ok(v) => into(v),
        Err(_) => text_fallback(raw),
    }
}

/// Non-finite floats are not representable in JSON; keep their string form.
fn float_value(v: f64) -> Value {
    Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(v.to_string()))
}

fn numeric_value(v: rust_decimal::Decimal) -> Value {
    use rust_decimal::prelude::ToPrimitive;
    v.to_f64()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(v.to_string()))
}

/// The Postgres text form of a byte string (`\xdeadbeef`).
fn hex_string(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn text_fallback(raw: &[u8]) -> Value {
    match std::str::from_utf8(raw) {
        Ok(s) => Value::String(s.to_string()),
        Err(_) => Value::String(hex_string(raw)),
    }
}

// ==================== Row access ====================

/// Row access helpers.
pub trait RowExt {
    /// Try to get a typed column value, returning `TableError::Decode` on failure.
    fn try_get_column<T>(&self, column: &str) -> TableResult<T>
    where
        T: for<'a> FromSql<'a>;

    /// Get one cell as a dynamic value.
    fn cell(&self, idx: usize) -> TableResult<Value>;

    /// Convert the whole row into a [`Record`].
    fn record(&self) -> TableResult<Record>;
}

impl RowExt for Row {
    fn try_get_column<T>(&self, column: &str) -> TableResult<T>
    where
        T: for<'a> FromSql<'a>,
    {
        self.try_get(column)
            .map_err(|e| TableError::decode(column, e.to_string()))
    }

    fn cell(&self, idx: usize) -> TableResult<Value> {
        let name = self
            .columns()
            .get(idx)
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| format!("#{idx}"));
        self.try_get::<_, Cell>(idx)
            .map(|c| c.0)
            .map_err(|e| TableError::decode(name, e.to_string()))
    }

    fn record(&self) -> TableResult<Record> {
        let mut record = Record::new();
        for (idx, column) in self.columns().iter().enumerate() {
            record.insert(column.name().to_string(), self.cell(idx)?);
        }
        Ok(record)
    }
}

// ==================== Frame ====================

/// A column-ordered tabular query result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Frame {
    pub(crate) fn from_rows(columns: Vec<String>, rows: &[Row]) -> TableResult<Self> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                values.push(row.cell(idx)?);
            }
            out.push(values);
        }
        Ok(Self { columns, rows: out })
    }

    /// Column names, in the order they were selected.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Row values, each in column order.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All values of one column, if it exists.
    pub fn column(&self, name: &str) -> Option<Vec<Value>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r[idx].clone()).collect())
    }

    /// Convert every row into a [`Record`].
    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut table = comfy_table::Table::new();
        table.load_preset(comfy_table::presets::UTF8_FULL_CONDENSED);
        table.set_header(self.columns.clone());
        for row in &self.rows {
            table.add_row(row.iter().map(display_value));
        }
        write!(f, "{table}")
    }
}

fn display_value(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ==================== Encoding ====================

/// Binds a JSON value as a statement parameter, encoding it for the target
/// column type. `Null` binds SQL NULL; a value that cannot be represented
/// in the target type is a bind error and surfaces as a query error.
#[derive(Debug, Clone)]
pub struct PgValue(pub Value);

impl From<Value> for PgValue {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl ToSql for PgValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        encode_value(&self.0, ty, out)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn encode_value(value: &Value, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if value.is_null() {
        return Ok(IsNull::Yes);
    }
    match ty.name() {
        "bool" => value
            .as_bool()
            .ok_or_else(|| bind_error(value, ty))?
            .to_sql(ty, out),
        "int2" => i16::try_from(int_arg(value, ty)?)
            .map_err(|_| bind_error(value, ty))?
            .to_sql(ty, out),
        "int4" => i32::try_from(int_arg(value, ty)?)
            .map_err(|_| bind_error(value, ty))?
            .to_sql(ty, out),
        "int8" => int_arg(value, ty)?.to_sql(ty, out),
        "oid" => u32::try_from(int_arg(value, ty)?)
            .map_err(|_| bind_error(value, ty))?
            .to_sql(ty, out),
        "float4" => (float_arg(value, ty)? as f32).to_sql(ty, out),
        "float8" => float_arg(value, ty)?.to_sql(ty, out),
        "numeric" => decimal_arg(value, ty)?.to_sql(ty, out),
        "text" | "varchar" | "bpchar" | "name" | "unknown" => text_arg(value).to_sql(ty, out),
        "uuid" => uuid::Uuid::parse_str(str_arg(value, ty)?)
            .map_err(|e| -> BoxError { format!("invalid uuid: {e}").into() })?
            .to_sql(ty, out),
        "date" => NaiveDate::parse_from_str(str_arg(value, ty)?, "%Y-%m-%d")
            .map_err(|e| -> BoxError { format!("invalid date: {e}").into() })?
            .to_sql(ty, out),
        "time" => NaiveTime::parse_from_str(str_arg(value, ty)?, "%H:%M:%S%.f")
            .map_err(|e| -> BoxError { format!("invalid time: {e}").into() })?
            .to_sql(ty, out),
        "timestamp" => parse_timestamp(str_arg(value, ty)?)?.to_sql(ty, out),
        "timestamptz" => DateTime::parse_from_rfc3339(str_arg(value, ty)?)
            .map_err(|e| -> BoxError { format!("invalid timestamptz: {e}").into() })?
            .with_timezone(&Utc)
            .to_sql(ty, out),
        "json" | "jsonb" => value.to_sql(ty, out),
        _ => Err(bind_error(value, ty)),
    }
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, BoxError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|e| format!("invalid timestamp {s:?}: {e}").into())
}

fn bind_error(value: &Value, ty: &Type) -> BoxError {
    format!("cannot bind JSON {} to column type {}", kind_name(value), ty).into()
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn int_arg(value: &Value, ty: &Type) -> Result<i64, BoxError> {
    value.as_i64().ok_or_else(|| bind_error(value, ty))
}

fn float_arg(value: &Value, ty: &Type) -> Result<f64, BoxError> {
    value.as_f64().ok_or_else(|| bind_error(value, ty))
}

fn str_arg<'v>(value: &'v Value, ty: &Type) -> Result<&'v str, BoxError> {
    value.as_str().ok_or_else(|| bind_error(value, ty))
}

fn decimal_arg(value: &Value, ty: &Type) -> Result<rust_decimal::Decimal, BoxError> {
    use std::str::FromStr;
    let repr = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return Err(bind_error(value, ty)),
    };
    rust_decimal::Decimal::from_str(&repr).map_err(|e| format!("invalid numeric: {e}").into())
}

/// Scalars stringify for text targets; compound values keep their JSON form.
fn text_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_primitives() {
        assert_eq!(decode_value(&Type::BOOL, &[1]), Value::Bool(true));
        assert_eq!(decode_value(&Type::INT8, &42_i64.to_be_bytes()), json!(42));
        assert_eq!(decode_value(&Type::TEXT, b"hello"), json!("hello"));
    }

    #[test]
    fn decodes_date_from_binary_epoch() {
        // Binary DATE is days since 2000-01-01.
        assert_eq!(
            decode_value(&Type::DATE, &0_i32.to_be_bytes()),
            json!("2000-01-01")
        );
    }

    #[test]
    fn non_finite_float_becomes_string() {
        assert_eq!(
            decode_value(&Type::FLOAT8, &f64::NAN.to_be_bytes()),
            json!("NaN")
        );
        assert_eq!(
            decode_value(&Type::FLOAT8, &f64::INFINITY.to_be_bytes()),
            json!("inf")
        );
        assert_eq!(decode_value(&Type::FLOAT8, &1.5_f64.to_be_bytes()), json!(1.5));
    }

    #[test]
    fn unknown_type_falls_back_to_string_form() {
        // Valid UTF-8 payloads come through verbatim (enum labels and such).
        assert_eq!(decode_value(&Type::POINT, b"active"), json!("active"));
        // Binary payloads take the hex form rather than failing the record.
        assert_eq!(decode_value(&Type::POINT, &[0xff, 0xfe]), json!("\\xfffe"));
    }

    #[test]
    fn bytea_uses_postgres_hex_form() {
        assert_eq!(
            decode_value(&Type::BYTEA, &[0xde, 0xad, 0xbe, 0xef]),
            json!("\\xdeadbeef")
        );
    }

    #[test]
    fn encode_null_binds_sql_null() {
        let mut buf = BytesMut::new();
        assert!(matches!(
            encode_value(&Value::Null, &Type::INT4, &mut buf),
            Ok(IsNull::Yes)
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn encode_dispatches_on_target_type() {
        let mut buf = BytesMut::new();
        assert!(encode_value(&json!(7), &Type::INT4, &mut buf).is_ok());
        assert_eq!(&buf[..], &7_i32.to_be_bytes());

        let mut buf = BytesMut::new();
        assert!(encode_value(&json!("a9f0c1de-3c2b-4f56-9d1e-0b8a31f2a111"), &Type::UUID, &mut buf).is_ok());
        assert_eq!(buf.len(), 16);
    }

    #[test]
    fn encode_rejects_mismatched_values() {
        let mut buf = BytesMut::new();
        assert!(encode_value(&json!("seven"), &Type::INT4, &mut buf).is_err());
        assert!(encode_value(&json!(70000), &Type::INT2, &mut buf).is_err());
        assert!(encode_value(&json!(true), &Type::TIMESTAMPTZ, &mut buf).is_err());
    }

    #[test]
    fn encode_scalars_stringify_for_text_targets() {
        let mut buf = BytesMut::new();
        assert!(encode_value(&json!(12), &Type::TEXT, &mut buf).is_ok());
        assert_eq!(&buf[..], b"12");
    }

    #[test]
    fn frame_records_preserve_column_order() {
        let frame = Frame {
            columns: vec!["id".into(), "name".into()],
            rows: vec![vec![json!(1), json!("a")], vec![json!(2), json!("b")]],
        };
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.column("name"), Some(vec![json!("a"), json!("b")]));
        assert_eq!(frame.column("missing"), None);
        let records = frame.records();
        assert_eq!(records[1].get("id"), Some(&json!(2)));
        assert_eq!(records[1].get("name"), Some(&json!("b")));
    }

    #[test]
    fn frame_display_renders_headers_and_rows() {
        let frame = Frame {
            columns: vec!["id".into(), "note".into()],
            rows: vec![vec![json!(1), Value::Null]],
        };
        let rendered = frame.to_string();
        assert!(rendered.contains("id"));
        assert!(rendered.contains("note"));
        assert!(rendered.contains('1'));
    }
}
