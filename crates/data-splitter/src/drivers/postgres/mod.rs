//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL
//! - [`PostgresSession`]: one SQLx connection
//! - [`PostgresProvider`]: opens source and archive sessions

mod conn;
mod dialect;

pub use conn::{PostgresProvider, PostgresSession};
pub use dialect::PostgresDialect;
