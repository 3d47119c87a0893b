//! Connection pool setup.

use crate::config::DbConfig;
use crate::error::{TableError, TableResult};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::NoTls;

/// Create a connection pool from a [`DbConfig`].
///
/// Connections use `NoTls`; the pool is sized from `config.pool_size`.
/// Checkout is lazy — the first connection is opened on first use, so an
/// unreachable server surfaces on the first operation, not here.
pub fn create_pool(config: &DbConfig) -> TableResult<Pool> {
    let pg_config: tokio_postgres::Config = config
        .url()
        .parse()
        .map_err(|e: tokio_postgres::Error| TableError::Connection(e.to_string()))?;

    let mgr = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    Pool::builder(mgr)
        .max_size(config.pool_size)
        .build()
        .map_err(|e| TableError::Pool(e.to_string()))
}
