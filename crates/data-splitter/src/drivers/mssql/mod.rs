//! Microsoft SQL Server driver.
//!
//! - [`MssqlDialect`]: SQL syntax strategy for MSSQL
//! - [`MssqlSession`]: one Tiberius client
//! - [`MssqlProvider`]: opens source and archive sessions

mod conn;
mod dialect;

pub use conn::{MssqlProvider, MssqlSession};
pub use dialect::MssqlDialect;
