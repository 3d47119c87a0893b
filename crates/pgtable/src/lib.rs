//! # pgtable
//!
//! A thin, dynamically typed table-access helper for PostgreSQL.
//!
//! ## Features
//!
//! - **Explicit configuration**: [`DbConfig`] is built once at startup (or
//!   from the environment, failing fast on missing credentials) and passed
//!   to [`Database::connect`]
//! - **On-demand reflection**: column metadata comes from `pg_catalog` per
//!   call; the database owns the schema
//! - **Composed reads**: optional filter directives (range, cursor, null
//!   checks, equality, membership) ANDed into one parameterized query
//! - **Dynamic rows**: results materialize as `serde_json`-valued
//!   [`Frame`]s and [`Record`]s; unmappable values degrade to their string
//!   form instead of failing the row
//! - **Scoped connections**: every operation checks a pooled client out for
//!   its own work; mutations run inside the [`transaction!`] macro
//!
//! ## Reading a table
//!
//! ```ignore
//! use pgtable::{Database, DbConfig};
//!
//! let config = DbConfig::from_env()?;
//! let db = Database::connect(&config)?;
//!
//! let frame = db
//!     .read("fixtures")
//!     .columns(&["id", "kickoff", "price"])
//!     .between("kickoff", Some(season_start), Some(season_end))
//!     .after("id", last_seen_id)
//!     .non_null_columns(&["price"])
//!     .order_by("id", true)
//!     .limit(500)
//!     .fetch()
//!     .await?;
//!
//! for record in frame.records() {
//!     println!("{record:?}");
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod filter;
pub mod pool;
pub mod record;
pub mod schema;
pub mod table;
pub mod text;

mod batch;
mod ident;
mod param;
mod transaction;

pub use client::GenericClient;
pub use config::DbConfig;
pub use error::{TableError, TableResult};
pub use filter::Filters;
pub use param::{Params, SqlParam};
pub use pool::create_pool;
pub use record::{Cell, Frame, PgValue, Record, RowExt};
pub use schema::{ColumnInfo, TableInfo, load_table};
pub use table::{ColumnSpec, DEFAULT_READ_LIMIT, Database, ReadBuilder};
pub use text::{round_sig, tab, tab_colored};
