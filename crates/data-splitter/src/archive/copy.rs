//! Batched, resumable copy of one table-year into its archive database.
//!
//! Rows are read from the source with LIMIT/OFFSET pagination in primary key
//! order and upserted one by one into the archive, so a replayed batch
//! overwrites rather than duplicates. Individual row failures are counted and
//! logged; a batch in which every row fails aborts the whole run.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::core::schema::ColumnInfo;
use crate::core::traits::{Connection, Dialect, SelectQueryOptions, UpsertQuery};
use crate::core::value::{Row, SqlValue};
use crate::config::{ArchiveOptions, TableSpec};
use crate::dialect::{detect_dialect, suspend, BypassStrategy};
use crate::error::{ArchiveError, Result};
use crate::schema::catalog;
use crate::state::{CheckpointProgress, CheckpointStore};

use super::progress::{ProgressEvent, ProgressObserver};

/// Position of a table-year copy.
///
/// `offset` only moves forward, by the planned batch size. `migrated_rows`
/// counts rows actually loaded and starts at the resume offset, since rows
/// before it are assumed archived by an earlier run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationProgress {
    pub offset: u64,
    pub migrated_rows: u64,
    pub batch_count: u64,
}

impl MigrationProgress {
    /// Progress of a copy resuming at `offset`.
    pub fn starting_at(offset: u64, batch_size: u64) -> Self {
        Self {
            offset,
            migrated_rows: offset,
            batch_count: if batch_size == 0 { 0 } else { offset / batch_size },
        }
    }
}

/// Row outcomes of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Rows returned by the batch select.
    pub fetched: usize,
    /// Rows the archive reported as newly inserted.
    pub inserted: usize,
    /// Rows the archive reported as updated.
    pub updated: usize,
    /// Rows accepted without a change (identical replays).
    pub unchanged: usize,
    /// Rows whose upsert failed.
    pub failed: usize,
    /// Message of the last row failure.
    pub last_error: Option<String>,
}

impl BatchStats {
    /// Rows loaded successfully.
    pub fn succeeded(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }
}

/// Result of a table-year copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyOutcome {
    /// Rows in the source year when the copy started.
    pub total_rows: u64,
    /// Rows counted as archived, including the resume offset.
    pub migrated_rows: u64,
    /// Batches counted, including those before the resume offset.
    pub batches: u64,
    /// Row upserts that failed.
    pub failed_rows: u64,
    /// Wall time of the copy.
    pub duration: Duration,
}

/// Copies one table-year from the source into an archive connection.
pub struct CopyEngine<'a> {
    source: &'a dyn Connection,
    archive: &'a dyn Connection,
    dialect: &'a dyn Dialect,
    options: &'a ArchiveOptions,
    observer: &'a dyn ProgressObserver,
    checkpoint: Option<&'a CheckpointStore>,
}

impl<'a> CopyEngine<'a> {
    pub fn new(
        source: &'a dyn Connection,
        archive: &'a dyn Connection,
        dialect: &'a dyn Dialect,
        options: &'a ArchiveOptions,
        observer: &'a dyn ProgressObserver,
    ) -> Self {
        Self {
            source,
            archive,
            dialect,
            options,
            observer,
            checkpoint: None,
        }
    }

    /// Record progress in a checkpoint file after every batch.
    pub fn with_checkpoint(mut self, checkpoint: Option<&'a CheckpointStore>) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    /// Copy the rows of `table` whose split column falls in `year`, starting
    /// at `resume_offset`. `columns` is the source table's column list in
    /// ordinal order.
    pub async fn run(
        &self,
        table: &TableSpec,
        columns: &[ColumnInfo],
        year: i32,
        resume_offset: u64,
    ) -> Result<CopyOutcome> {
        if self.options.dry_run {
            info!("[DRY RUN] Would copy {} rows of year {}", table.name, year);
            return Ok(CopyOutcome::default());
        }

        let started = Instant::now();
        let name = table.name.as_str();
        self.observer.on_started(name, year);
        info!("Starting copy of {} for year {}", name, year);

        let total = catalog::count_rows(self.source, self.dialect, name, &table.split_column, year)
            .await?;
        if total == 0 {
            info!("No rows to copy for {} in year {}", name, year);
            return Ok(CopyOutcome::default());
        }

        let upsert = self.dialect.build_upsert_query(name, columns);
        let strategy = BypassStrategy::for_dialect(detect_dialect(self.archive).await);
        let batch_size = self.options.batch_size.max(1);
        let heartbeat = self.options.heartbeat_interval();

        let mut progress = MigrationProgress::starting_at(resume_offset, batch_size);
        let mut failed_rows = 0u64;
        if progress.offset > 0 {
            info!(
                "Resuming {} year {} at offset {} of {}",
                name, year, progress.offset, total
            );
        }

        while progress.offset < total {
            let size = batch_size.min(total - progress.offset);
            let stats = self
                .copy_batch(table, year, columns, &upsert, strategy, progress.offset, size)
                .await?;

            progress.offset += size;
            progress.migrated_rows += stats.succeeded() as u64;
            progress.batch_count += 1;
            failed_rows += stats.failed as u64;

            debug!(
                "{} year {}: batch {} done, offset {}/{}",
                name, year, progress.batch_count, progress.offset, total
            );
            self.record_checkpoint(name, year, &progress, total);

            if progress.batch_count % heartbeat == 0 {
                info!(
                    "HEARTBEAT table={} year={} processed={} total={} batch={}",
                    name, year, progress.migrated_rows, total, progress.batch_count
                );
                self.observer.on_heartbeat(&ProgressEvent {
                    table: name,
                    year,
                    processed: progress.migrated_rows,
                    total,
                    batch: progress.batch_count,
                });
            }
        }

        let duration = started.elapsed();
        self.observer.on_completed(
            &ProgressEvent {
                table: name,
                year,
                processed: progress.migrated_rows,
                total,
                batch: progress.batch_count,
            },
            duration,
        );
        info!(
            "Copied {} of {} rows of {} for year {} in {} batches ({} failed rows)",
            progress.migrated_rows, total, name, year, progress.batch_count, failed_rows
        );

        Ok(CopyOutcome {
            total_rows: total,
            migrated_rows: progress.migrated_rows,
            batches: progress.batch_count,
            failed_rows,
            duration,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn copy_batch(
        &self,
        table: &TableSpec,
        year: i32,
        columns: &[ColumnInfo],
        upsert: &UpsertQuery,
        strategy: BypassStrategy,
        offset: u64,
        limit: u64,
    ) -> Result<BatchStats> {
        let sql = self.dialect.build_select_query(&SelectQueryOptions {
            table: &table.name,
            columns,
            split_column: &table.split_column,
            year,
            limit,
            offset,
        });

        let rows = self.source.query(&sql, &[]).await.map_err(|e| ArchiveError::Batch {
            table: table.name.clone(),
            year,
            offset,
            source: Box::new(e),
        })?;

        if rows.is_empty() {
            debug!("Batch at offset {} returned no rows", offset);
            return Ok(BatchStats::default());
        }

        let guard = suspend(self.archive, strategy).await;
        let stats = self.load_rows(&rows, upsert).await;
        guard.restore(self.archive).await;

        if stats.succeeded() == 0 {
            let message = stats
                .last_error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string());
            error!(
                "All {} rows failed at offset {} for {} year {}: {}",
                stats.fetched, offset, table.name, year, message
            );
            return Err(ArchiveError::fatal(ArchiveError::BatchExecution {
                table: table.name.clone(),
                year,
                offset,
                rows: stats.fetched,
                message,
            }));
        }

        if stats.failed > 0 {
            warn!(
                "Batch at offset {} for {} year {}: {} of {} rows failed",
                offset, table.name, year, stats.failed, stats.fetched
            );
        }
        info!(
            "Batch at offset {}: {} rows ({} inserted, {} updated, {} unchanged, {} failed)",
            offset, stats.fetched, stats.inserted, stats.updated, stats.unchanged, stats.failed
        );

        Ok(stats)
    }

    async fn load_rows(&self, rows: &[Row], upsert: &UpsertQuery) -> BatchStats {
        let mut stats = BatchStats {
            fetched: rows.len(),
            ..BatchStats::default()
        };

        for (i, row) in rows.iter().enumerate() {
            let params = upsert.bind_row(row.values());
            match self.archive.execute(&upsert.sql, &params).await {
                // MySQL reports 1 for an insert and 2 for an update
                Ok(1) => stats.inserted += 1,
                Ok(2) => stats.updated += 1,
                Ok(_) => stats.unchanged += 1,
                Err(e) => {
                    stats.failed += 1;
                    error!(
                        "Failed to upsert row {} (first column {}): {}",
                        i + 1,
                        row_label(row),
                        e
                    );
                    stats.last_error = Some(e.to_string());
                }
            }

            if (i + 1) % 100 == 0 {
                debug!("Loaded {}/{} rows of batch", i + 1, rows.len());
            }
        }

        stats
    }

    fn record_checkpoint(&self, table: &str, year: i32, progress: &MigrationProgress, total: u64) {
        let Some(store) = self.checkpoint else {
            return;
        };
        let result = store.record_batch(
            table,
            year,
            CheckpointProgress {
                offset: progress.offset,
                migrated_rows: progress.migrated_rows,
                batch_count: progress.batch_count,
                total_rows: total,
            },
        );
        if let Err(e) = result {
            warn!("Failed to write checkpoint {}: {}", store.path().display(), e);
        }
    }
}

fn row_label(row: &Row) -> String {
    row.get(0).map(SqlValue::to_string).unwrap_or_default()
}
