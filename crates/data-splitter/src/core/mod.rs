//! Core abstractions for database-agnostic archiving.
//!
//! - [`schema`]: column metadata
//! - [`value`]: owned SQL values and result rows
//! - [`traits`]: connection, provider and dialect traits
//!
//! Driver modules (`drivers/mysql`, `drivers/postgres`, ...) implement these
//! traits; the archive engine depends only on them.

pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{primary_key_columns, ColumnInfo, PRIMARY_KEY};
pub use traits::{
    CatalogQuery, Connection, ConnectionProvider, Dialect, SelectQueryOptions, UpsertQuery,
};
pub use value::{Row, SqlNullType, SqlValue};
