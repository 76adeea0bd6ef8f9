//! MySQL/MariaDB database driver.
//!
//! - [`MysqlDialect`]: SQL syntax strategy
//! - [`MysqlSession`]: one SQLx connection
//! - [`MysqlProvider`]: opens source and archive sessions
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod conn;
mod dialect;

pub use conn::{MysqlProvider, MysqlSession};
pub use dialect::MysqlDialect;
