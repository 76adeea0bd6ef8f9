//! Helpers shared across database drivers.
//!
//! - [`tls`]: `ssl_mode` parsing and per-driver mapping

pub mod tls;

pub use tls::SslMode;

use tracing::info;

use crate::core::traits::{Connection, Dialect};
use crate::error::Result;

/// Create `database` with the dialect's CREATE DATABASE statement on `conn`.
pub(crate) async fn create_database_with(
    dialect: &dyn Dialect,
    conn: &dyn Connection,
    database: &str,
) -> Result<()> {
    if let Some(sql) = dialect.create_database_statement(database) {
        conn.execute(&sql, &[]).await?;
        info!("Created archive database {}", database);
    }
    Ok(())
}
