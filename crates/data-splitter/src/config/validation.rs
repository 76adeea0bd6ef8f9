//! Configuration validation.

use super::{Config, DatabaseType};
use crate::drivers::SslMode;
use crate::error::{ArchiveError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let db = &config.database;

    if db.host.is_empty() && db.r#type != DatabaseType::Sqlite {
        return Err(ArchiveError::Config("database.host is required".into()));
    }
    if db.source_db.is_empty() {
        return Err(ArchiveError::Config("database.source_db is required".into()));
    }
    SslMode::parse(db.ssl_mode.as_deref())?;

    if config.tables.is_empty() {
        return Err(ArchiveError::Config(
            "at least one table must be configured".into(),
        ));
    }
    if config.archive.years.is_empty() {
        return Err(ArchiveError::Config(
            "at least one year must be specified in archive.years".into(),
        ));
    }

    for (i, table) in config.tables.iter().enumerate() {
        if table.name.is_empty() {
            return Err(ArchiveError::Config(format!("table[{}].name is required", i)));
        }
        if !table.enabled {
            continue;
        }
        if table.split_column.is_empty() {
            return Err(ArchiveError::Config(format!(
                "table[{}].split_column is required when enabled",
                i
            )));
        }
        if !table.archive_pattern.contains("{year}") {
            return Err(ArchiveError::Config(format!(
                "table[{}].archive_pattern must contain {{year}}, got '{}'",
                i, table.archive_pattern
            )));
        }
    }

    if config.archive.options.batch_size == 0 {
        return Err(ArchiveError::Config(
            "archive.options.batch_size must be at least 1".into(),
        ));
    }

    Ok(())
}
