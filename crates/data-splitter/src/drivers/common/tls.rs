//! TLS mode shared by the server-based drivers.
//!
//! The config's `ssl_mode` string is parsed once and mapped onto each
//! driver's own setting.

use sqlx::mysql::MySqlSslMode;
use sqlx::postgres::PgSslMode;
use tiberius::EncryptionLevel;

use crate::error::{ArchiveError, Result};

/// Transport encryption mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// Plain TCP.
    Disable,
    /// Use TLS when the server offers it.
    #[default]
    Prefer,
    /// Fail unless the connection is encrypted.
    Require,
}

impl SslMode {
    /// Parse an SSL mode; `None` means [`SslMode::Prefer`].
    pub fn parse(s: Option<&str>) -> Result<Self> {
        match s.map(str::to_lowercase).as_deref() {
            None | Some("") | Some("prefer") => Ok(SslMode::Prefer),
            Some("disable") => Ok(SslMode::Disable),
            Some("require") => Ok(SslMode::Require),
            Some(other) => Err(ArchiveError::Config(format!(
                "Invalid ssl_mode '{}'. Valid values: disable, prefer, require",
                other
            ))),
        }
    }

    pub fn requires_tls(&self) -> bool {
        matches!(self, SslMode::Require)
    }

    pub fn mysql(&self) -> MySqlSslMode {
        match self {
            SslMode::Disable => MySqlSslMode::Disabled,
            SslMode::Prefer => MySqlSslMode::Preferred,
            SslMode::Require => MySqlSslMode::Required,
        }
    }

    pub fn postgres(&self) -> PgSslMode {
        match self {
            SslMode::Disable => PgSslMode::Disable,
            SslMode::Prefer => PgSslMode::Prefer,
            SslMode::Require => PgSslMode::Require,
        }
    }

    /// SQL Server encryption level. `Prefer` encrypts the login only.
    pub fn mssql(&self) -> EncryptionLevel {
        match self {
            SslMode::Disable => EncryptionLevel::NotSupported,
            SslMode::Prefer => EncryptionLevel::Off,
            SslMode::Require => EncryptionLevel::Required,
        }
    }
}
