//! Clone-friendly SQL parameter storage.

use std::sync::Arc;
use tokio_postgres::types::ToSql;

/// A single query parameter behind an `Arc`, so directive sets and built
/// queries can be cloned without copying parameter values.
#[derive(Clone)]
pub struct SqlParam(Arc<dyn ToSql + Send + Sync>);

impl SqlParam {
    /// Wrap any `ToSql` value.
    pub fn new<T: ToSql + Send + Sync + 'static>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrow the inner value as the trait object tokio-postgres expects.
    pub fn as_dyn(&self) -> &(dyn ToSql + Sync) {
        &*self.0 as &(dyn ToSql + Sync)
    }
}

impl std::fmt::Debug for SqlParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SqlParam").field(&"<dyn ToSql>").finish()
    }
}

/// An ordered parameter list with 1-based `$n` indexing.
#[derive(Clone, Debug, Default)]
pub struct Params {
    params: Vec<SqlParam>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value and return its 1-based placeholder index.
    pub fn push<T: ToSql + Send + Sync + 'static>(&mut self, value: T) -> usize {
        self.push_param(SqlParam::new(value))
    }

    /// Add a pre-wrapped parameter and return its 1-based placeholder index.
    pub fn push_param(&mut self, param: SqlParam) -> usize {
        self.params.push(param);
        self.params.len()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Get all parameters as references for tokio-postgres.
    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(|p| p.as_dyn()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_returns_one_based_indices() {
        let mut params = Params::new();
        assert_eq!(params.push(1_i64), 1);
        assert_eq!(params.push("two"), 2);
        assert_eq!(params.len(), 2);
        assert_eq!(params.as_refs().len(), 2);
    }
}
