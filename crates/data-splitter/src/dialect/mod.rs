//! Engine detection and constraint suspension for archive connections.
//!
//! SQL generation follows the configured database type (see
//! [`DialectImpl`](crate::drivers::DialectImpl)). The archive connection's
//! actual engine is probed separately, because the statements that relax
//! constraint checking during a load are engine and version specific.
//!
//! - [`detect`]: probes the server version and classifies the engine
//! - [`bypass`]: suspends and restores constraint checking around a batch

pub mod bypass;
pub mod detect;

pub use bypass::{suspend, BypassStrategy, RestoreGuard};
pub use detect::detect_dialect;

use std::fmt;

use serde::Serialize;

/// Engine family of a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    Postgresql,
    Mariadb,
    Mysql,
    Sqlserver,
    Sqlite,
    Unknown,
}

impl DialectKind {
    /// Lowercase identifier used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            DialectKind::Postgresql => "postgresql",
            DialectKind::Mariadb => "mariadb",
            DialectKind::Mysql => "mysql",
            DialectKind::Sqlserver => "sqlserver",
            DialectKind::Sqlite => "sqlite",
            DialectKind::Unknown => "unknown",
        }
    }

    /// Classify a server version string.
    ///
    /// Matching is case-insensitive and ordered: postgres, mariadb, mysql,
    /// sql server, sqlite. MariaDB reports a MySQL-compatible version that
    /// also contains "mariadb", so it must be checked before mysql.
    pub fn from_version(version: &str) -> Self {
        let v = version.to_lowercase();
        if v.contains("postgres") {
            DialectKind::Postgresql
        } else if v.contains("mariadb") {
            DialectKind::Mariadb
        } else if v.contains("mysql") {
            DialectKind::Mysql
        } else if v.contains("microsoft") || v.contains("sql server") {
            DialectKind::Sqlserver
        } else if v.contains("sqlite") {
            DialectKind::Sqlite
        } else {
            DialectKind::Unknown
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
