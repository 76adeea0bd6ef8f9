//! Removal of archived rows from the source.

use tracing::info;

use crate::config::ArchiveOptions;
use crate::core::traits::{Connection, Dialect};
use crate::error::Result;

/// What the prune stage did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneOutcome {
    /// `delete_after_archive` is off.
    Skipped,
    /// Rows deleted from the source.
    Deleted(u64),
}

/// Delete the year's rows from the source table.
///
/// Only called once the archive has been validated.
pub async fn prune_source(
    source: &dyn Connection,
    dialect: &dyn Dialect,
    options: &ArchiveOptions,
    table: &str,
    split_column: &str,
    year: i32,
) -> Result<PruneOutcome> {
    if !options.delete_after_archive {
        return Ok(PruneOutcome::Skipped);
    }

    let sql = dialect.build_delete_query(table, split_column, year);
    let deleted = source.execute(&sql, &[]).await?;
    info!("Deleted {} rows of {} for year {} from source", deleted, table, year);
    Ok(PruneOutcome::Deleted(deleted))
}
