//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Heartbeat interval used when neither config section sets one.
pub const DEFAULT_HEARTBEAT_BATCH_INTERVAL: u64 = 10;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Config format version (informational).
    #[serde(default)]
    pub version: Option<String>,

    /// Database server holding the source and archive databases.
    pub database: DatabaseConfig,

    /// Tables to archive.
    #[serde(default)]
    pub tables: Vec<TableSpec>,

    /// Years and archive behavior.
    pub archive: ArchiveConfig,

    /// Logging and error-handling behavior.
    #[serde(default)]
    pub processing: ProcessingConfig,
}

impl Config {
    /// Archive options with the heartbeat interval resolved across sections.
    pub fn effective_options(&self) -> ArchiveOptions {
        let mut options = self.archive.options.clone();
        options.heartbeat_batch_interval = Some(
            options
                .heartbeat_batch_interval
                .filter(|&n| n > 0)
                .or(self.processing.heartbeat_batch_interval.filter(|&n| n > 0))
                .unwrap_or(DEFAULT_HEARTBEAT_BATCH_INTERVAL),
        );
        options
    }

    /// Enabled tables, in configuration order.
    pub fn enabled_tables(&self) -> impl Iterator<Item = &TableSpec> {
        self.tables.iter().filter(|t| t.enabled)
    }
}

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Mysql,
    Mariadb,
    #[serde(alias = "postgresql")]
    Postgres,
    Sqlite,
    #[serde(alias = "sqlserver")]
    Mssql,
}

impl DatabaseType {
    /// Default server port; `None` for file-based engines.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            DatabaseType::Mysql | DatabaseType::Mariadb => Some(3306),
            DatabaseType::Postgres => Some(5432),
            DatabaseType::Mssql => Some(1433),
            DatabaseType::Sqlite => None,
        }
    }

    /// Whether databases are local files rather than server-side objects.
    pub fn is_file_based(&self) -> bool {
        matches!(self, DatabaseType::Sqlite)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::Mysql => "mysql",
            DatabaseType::Mariadb => "mariadb",
            DatabaseType::Postgres => "postgres",
            DatabaseType::Sqlite => "sqlite",
            DatabaseType::Mssql => "mssql",
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database engine.
    pub r#type: DatabaseType,

    /// Database host (unused for sqlite).
    #[serde(default)]
    pub host: String,

    /// Database port (default depends on the engine).
    #[serde(default)]
    pub port: Option<u16>,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Source database name (a file path for sqlite).
    pub source_db: String,

    /// TLS mode: disable, prefer or require (default: prefer).
    #[serde(default)]
    pub ssl_mode: Option<String>,

    /// Directory for sqlite archive files (default: the source file's directory).
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,
}

impl DatabaseConfig {
    /// Configured port or the engine default.
    pub fn effective_port(&self) -> u16 {
        self.port
            .or_else(|| self.r#type.default_port())
            .unwrap_or_default()
    }
}

// Custom Debug to keep the password out of logs
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("source_db", &self.source_db)
            .field("ssl_mode", &self.ssl_mode)
            .field("archive_dir", &self.archive_dir)
            .finish()
    }
}

/// A table to archive, split by the year of one of its date columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Table name.
    pub name: String,

    /// Disabled tables are skipped.
    #[serde(default)]
    pub enabled: bool,

    /// Date/datetime column whose year selects rows.
    #[serde(default)]
    pub split_column: String,

    /// Archive database name template; `{year}` is replaced by the year.
    #[serde(default)]
    pub archive_pattern: String,
}

impl TableSpec {
    /// Archive database name for a year.
    pub fn archive_database(&self, year: i32) -> String {
        self.archive_pattern.replace("{year}", &year.to_string())
    }
}

/// Years to archive plus archive behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Calendar years to process, in order.
    #[serde(default)]
    pub years: Vec<i32>,

    /// Archive behavior.
    #[serde(default)]
    pub options: ArchiveOptions,
}

/// Archive behavior shared by every table-year of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveOptions {
    /// Rows per batch (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Number of source rows to skip, applied to every table-year of the run.
    #[serde(default)]
    pub resume_offset: u64,

    /// Delete archived rows from the source after a successful validation.
    #[serde(default)]
    pub delete_after_archive: bool,

    /// Create missing archive databases.
    #[serde(default)]
    pub create_archive_db: bool,

    /// Log what would be done without opening any connection.
    #[serde(default)]
    pub dry_run: bool,

    /// Batches between progress heartbeats.
    #[serde(default)]
    pub heartbeat_batch_interval: Option<u64>,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            resume_offset: 0,
            delete_after_archive: false,
            create_archive_db: false,
            dry_run: false,
            heartbeat_batch_interval: None,
        }
    }
}

impl ArchiveOptions {
    /// Heartbeat interval, never zero.
    pub fn heartbeat_interval(&self) -> u64 {
        self.heartbeat_batch_interval
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_HEARTBEAT_BATCH_INTERVAL)
    }
}

/// Logging and error-handling behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Log level (trace, debug, info, warn, error). `LOG_LEVEL` overrides it.
    #[serde(default)]
    pub log_level: Option<String>,

    /// Log file path (default: logs/data-splitter.log).
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Log non-fatal table-year failures and keep going.
    #[serde(default)]
    pub continue_on_error: bool,

    /// Batches between progress heartbeats, if `archive.options` does not set it.
    #[serde(default)]
    pub heartbeat_batch_interval: Option<u64>,

    /// JSON checkpoint file recording per-batch progress.
    #[serde(default)]
    pub checkpoint_file: Option<PathBuf>,
}

fn default_batch_size() -> u64 {
    1000
}
