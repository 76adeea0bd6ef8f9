//! Archive table creation.

use tracing::info;

use crate::core::traits::{Connection, Dialect};
use crate::error::{ArchiveError, Result};

use super::catalog;

/// What [`ensure_archive_table`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableCreation {
    /// The table was already present; nothing was executed.
    Existing,
    /// The creation statement was executed.
    Created,
}

/// Create `table` in the archive database from `ddl` unless it already exists.
///
/// An existing table is left untouched even if its definition differs from
/// the source.
pub async fn ensure_archive_table(
    archive: &dyn Connection,
    dialect: &dyn Dialect,
    table: &str,
    ddl: &str,
) -> Result<TableCreation> {
    let exists = catalog::table_exists(archive, dialect, table)
        .await
        .map_err(|e| ArchiveError::schema_apply(table, format!("failed to check table existence: {e}")))?;

    if exists {
        info!("Archive table {} already exists, skipping creation", table);
        return Ok(TableCreation::Existing);
    }

    archive
        .execute(ddl, &[])
        .await
        .map_err(|e| ArchiveError::schema_apply(table, e))?;

    info!("Created archive table {}", table);
    Ok(TableCreation::Created)
}
