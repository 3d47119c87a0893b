//! SQL identifier rendering.
//!
//! Table and column names supplied by callers end up inside SQL text
//! (projection lists, WHERE clauses, DDL), so they are validated and quoted
//! here rather than trusted verbatim. Names matching
//! `[A-Za-z_][A-Za-z0-9_$]*` render as-is; anything else is double-quoted
//! with embedded quotes escaped as `""`. NUL bytes are rejected.

use crate::error::{TableError, TableResult};
use std::fmt;

/// A validated SQL identifier, ready to be rendered into a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Ident(String);

impl Ident {
    pub fn new(name: &str) -> TableResult<Self> {
        if name.is_empty() {
            return Err(TableError::validation("identifier cannot be empty"));
        }
        if name.contains('\0') {
            return Err(TableError::validation(
                "identifier cannot contain NUL character",
            ));
        }
        if is_plain(name) {
            return Ok(Self(name.to_string()));
        }
        let mut quoted = String::with_capacity(name.len() + 2);
        quoted.push('"');
        for ch in name.chars() {
            if ch == '"' {
                quoted.push('"');
            }
            quoted.push(ch);
        }
        quoted.push('"');
        Ok(Self(quoted))
    }

    /// Render a schema-qualified `schema.name` pair.
    pub fn qualified(schema: &str, name: &str) -> TableResult<String> {
        Ok(format!("{}.{}", Ident::new(schema)?, Ident::new(name)?))
    }

    pub fn as_sql(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_plain(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c == '$' || c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_name_renders_verbatim() {
        assert_eq!(Ident::new("users").unwrap().as_sql(), "users");
        assert_eq!(Ident::new("my_var$1").unwrap().as_sql(), "my_var$1");
    }

    #[test]
    fn irregular_name_is_quoted() {
        assert_eq!(Ident::new("CamelCase").unwrap().as_sql(), "CamelCase");
        assert_eq!(Ident::new("my table").unwrap().as_sql(), r#""my table""#);
        assert_eq!(Ident::new("1st").unwrap().as_sql(), r#""1st""#);
    }

    #[test]
    fn embedded_quote_is_escaped() {
        assert_eq!(
            Ident::new(r#"has"quote"#).unwrap().as_sql(),
            r#""has""quote""#
        );
    }

    #[test]
    fn qualified_joins_with_dot() {
        assert_eq!(
            Ident::qualified("public", "users").unwrap(),
            "public.users"
        );
    }

    #[test]
    fn rejects_empty_and_nul() {
        assert!(Ident::new("").is_err());
        assert!(Ident::new("bad\0name").is_err());
    }
}
