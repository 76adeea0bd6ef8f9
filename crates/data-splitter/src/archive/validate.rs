//! Post-copy row count validation.

use tracing::{info, warn};

use crate::core::traits::{Connection, Dialect};
use crate::error::{ArchiveError, Result};
use crate::schema::catalog;

/// Row counts compared for a table-year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountCheck {
    pub source_count: u64,
    pub archive_count: u64,
}

/// Compare the year's row count in the source with the archive.
///
/// The archive may hold more rows than the source (rows archived by an
/// earlier run and since deleted from the source), never fewer.
pub async fn validate_counts(
    source: &dyn Connection,
    archive: &dyn Connection,
    dialect: &dyn Dialect,
    table: &str,
    split_column: &str,
    year: i32,
) -> Result<CountCheck> {
    let source_count = catalog::count_rows(source, dialect, table, split_column, year).await?;
    let archive_count = catalog::count_rows(archive, dialect, table, split_column, year).await?;

    if archive_count < source_count {
        warn!(
            "{} year {}: archive has {} rows, source has {}",
            table, year, archive_count, source_count
        );
        return Err(ArchiveError::Validation {
            table: table.to_string(),
            year,
            source_count,
            archive_count,
        });
    }

    info!(
        "Validated {} year {}: source={} archive={}",
        table, year, source_count, archive_count
    );
    Ok(CountCheck {
        source_count,
        archive_count,
    })
}
