//! Archive orchestrator - main workflow coordinator.
//!
//! For every enabled table and every configured year, in order:
//! connect (creating the archive database if allowed) → ensure the archive
//! table → copy → validate → prune. The source connection lives for the whole
//! run; each table-year gets its own archive connection, closed on every path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::archive::{
    prune_source, validate_counts, CopyEngine, ProgressObserver, PruneOutcome,
    StdoutProgressReporter,
};
use crate::config::{ArchiveOptions, Config, TableSpec};
use crate::core::traits::{Connection, ConnectionProvider};
use crate::drivers::{provider_for, DialectImpl};
use crate::error::{ArchiveError, Result};
use crate::schema::{catalog, ensure_archive_table, TableCreation};
use crate::state::CheckpointStore;

/// Archive orchestrator.
pub struct Orchestrator {
    config: Config,
    options: ArchiveOptions,
    dialect: DialectImpl,
    provider: Arc<dyn ConnectionProvider>,
    observer: Arc<dyn ProgressObserver>,
    checkpoint: Option<CheckpointStore>,
    run_id: String,
}

/// Result of an archive run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: completed, dry_run or completed_with_errors.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    /// Table-years considered.
    pub table_years_total: usize,

    /// Table-years archived and validated.
    pub succeeded: usize,

    /// Table-years skipped because of dry run.
    pub skipped_dry_run: usize,

    /// Table-years that failed and were skipped (continue_on_error).
    pub failed: Vec<FailedTableYear>,

    /// Rows counted as archived across all table-years.
    pub rows_archived: u64,

    /// Rows deleted from the source.
    pub rows_pruned: u64,

    /// Per table-year details.
    pub table_years: Vec<TableYearOutcome>,
}

/// A table-year that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTableYear {
    pub table: String,
    pub year: i32,
    pub error: String,
}

/// What happened to one successful table-year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableYearOutcome {
    pub table: String,
    pub year: i32,
    pub archive_database: String,
    /// Whether the archive table was created by this run.
    pub table_created: bool,
    pub total_rows: u64,
    pub migrated_rows: u64,
    pub failed_rows: u64,
    pub batches: u64,
    pub source_count: u64,
    pub archive_count: u64,
    /// Rows deleted from the source, if pruning ran.
    pub rows_pruned: Option<u64>,
}

/// Row-count check of one table-year (the `validate` command).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub table: String,
    pub year: i32,
    pub archive_database: String,
    pub source_count: Option<u64>,
    pub archive_count: Option<u64>,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    fn new(run_id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            status: "running".to_string(),
            duration_seconds: 0.0,
            started_at,
            completed_at: started_at,
            table_years_total: 0,
            succeeded: 0,
            skipped_dry_run: 0,
            failed: Vec::new(),
            rows_archived: 0,
            rows_pruned: 0,
            table_years: Vec::new(),
        }
    }

    fn finish(mut self, started: Instant) -> Self {
        self.completed_at = Utc::now();
        self.duration_seconds = started.elapsed().as_secs_f64();
        self.status = if self.skipped_dry_run > 0 && self.succeeded == 0 {
            "dry_run"
        } else if self.failed.is_empty() {
            "completed"
        } else {
            "completed_with_errors"
        }
        .to_string();
        self
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Orchestrator {
    /// Create an orchestrator for the configured database.
    ///
    /// Opens the checkpoint file when `processing.checkpoint_file` is set.
    pub fn new(config: Config) -> Result<Self> {
        let provider = provider_for(&config.database);
        let checkpoint_file = config.processing.checkpoint_file.clone();
        let run_id = uuid::Uuid::new_v4().to_string();

        let mut orchestrator = Self {
            options: config.effective_options(),
            dialect: DialectImpl::from_db_type(config.database.r#type),
            provider,
            observer: Arc::new(StdoutProgressReporter::stdout()),
            checkpoint: None,
            run_id,
            config,
        };
        if let Some(path) = checkpoint_file {
            orchestrator = orchestrator.with_checkpoint_file(path)?;
        }
        Ok(orchestrator)
    }

    /// Use a different connection provider.
    pub fn with_provider(mut self, provider: Arc<dyn ConnectionProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Report progress to `observer` instead of stdout.
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Record per-batch progress in a checkpoint file.
    pub fn with_checkpoint_file(mut self, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        info!("Using checkpoint file: {}", path.display());
        self.checkpoint = Some(CheckpointStore::open(path, &self.run_id)?);
        Ok(self)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Enabled (table, year) pairs in processing order.
    fn table_years(&self) -> Vec<(&TableSpec, i32)> {
        self.config
            .enabled_tables()
            .flat_map(|t| self.config.archive.years.iter().map(move |&y| (t, y)))
            .collect()
    }

    /// Run the archive.
    ///
    /// A fatal error stops the run at once. Any other table-year failure
    /// stops it too, unless `processing.continue_on_error` is set.
    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary::new(self.run_id.clone(), Utc::now());
        let work = self.table_years();

        info!(
            "Starting archive run {}: {} table-years, batch size {}",
            self.run_id,
            work.len(),
            self.options.batch_size
        );

        if self.options.dry_run {
            for (table, year) in work {
                info!(
                    "[DRY RUN] Would archive {} year {} into {}",
                    table.name,
                    year,
                    table.archive_database(year)
                );
                summary.table_years_total += 1;
                summary.skipped_dry_run += 1;
            }
            return Ok(summary.finish(started));
        }

        let source = self.provider.connect_source().await?;
        let result = self.run_table_years(source.as_ref(), &work, &mut summary).await;
        source.close().await;
        result?;

        let summary = summary.finish(started);
        info!(
            "Archive run {} {}: {}/{} table-years, {} rows archived, {} rows pruned in {:.1}s",
            summary.run_id,
            summary.status,
            summary.succeeded,
            summary.table_years_total,
            summary.rows_archived,
            summary.rows_pruned,
            summary.duration_seconds
        );
        Ok(summary)
    }

    async fn run_table_years(
        &self,
        source: &dyn Connection,
        work: &[(&TableSpec, i32)],
        summary: &mut RunSummary,
    ) -> Result<()> {
        for &(table, year) in work {
            summary.table_years_total += 1;

            match self.process_table_year(source, table, year).await {
                Ok(outcome) => {
                    self.mark_completed(&table.name, year);
                    summary.succeeded += 1;
                    summary.rows_archived += outcome.migrated_rows;
                    summary.rows_pruned += outcome.rows_pruned.unwrap_or(0);
                    summary.table_years.push(outcome);
                }
                Err(e) => {
                    self.mark_failed(&table.name, year, &e);
                    if e.is_fatal() {
                        error!("Fatal error, aborting run:\n{}", e.format_detailed());
                        return Err(e);
                    }
                    error!("{}", e.format_detailed());
                    if !self.config.processing.continue_on_error {
                        return Err(e);
                    }
                    warn!("Continuing after failure of {} year {}", table.name, year);
                    summary.failed.push(FailedTableYear {
                        table: table.name.clone(),
                        year,
                        error: e.chain_message(),
                    });
                }
            }
        }
        Ok(())
    }

    async fn process_table_year(
        &self,
        source: &dyn Connection,
        table: &TableSpec,
        year: i32,
    ) -> Result<TableYearOutcome> {
        let database = table.archive_database(year);
        info!("Processing {} year {} -> {}", table.name, year, database);

        let archive = self.open_archive(source, table, year, &database).await?;
        let result = self
            .archive_table_year(source, archive.as_ref(), table, year, &database)
            .await;
        archive.close().await;
        debug!("Closed archive connection to {}", database);
        result
    }

    async fn open_archive(
        &self,
        source: &dyn Connection,
        table: &TableSpec,
        year: i32,
        database: &str,
    ) -> Result<Box<dyn Connection>> {
        match self.provider.connect_archive(database).await {
            Ok(conn) => Ok(conn),
            Err(e) if self.options.create_archive_db => {
                info!("Archive database {} unavailable ({}), creating it", database, e);
                self.provider
                    .create_database(source, database)
                    .await
                    .map_err(at_stage("create_database", &table.name, year))?;
                self.provider
                    .connect_archive(database)
                    .await
                    .map_err(at_stage("connect_archive", &table.name, year))
            }
            Err(e) => Err(ArchiveError::stage("connect_archive", &table.name, year, e)),
        }
    }

    async fn archive_table_year(
        &self,
        source: &dyn Connection,
        archive: &dyn Connection,
        table: &TableSpec,
        year: i32,
        database: &str,
    ) -> Result<TableYearOutcome> {
        let name = table.name.as_str();
        let stage = |stage: &'static str| at_stage(stage, name, year);

        let columns = catalog::describe_columns(source, &self.dialect, name)
            .await
            .map_err(stage("describe_columns"))?;
        let ddl = catalog::creation_statement(source, &self.dialect, name, &columns)
            .await
            .map_err(stage("creation_statement"))?;
        let creation = ensure_archive_table(archive, &self.dialect, name, &ddl)
            .await
            .map_err(stage("ensure_archive_table"))?;

        let resume_offset = self.resume_offset(name, year);
        let copy = CopyEngine::new(
            source,
            archive,
            &self.dialect,
            &self.options,
            self.observer.as_ref(),
        )
        .with_checkpoint(self.checkpoint.as_ref())
        .run(table, &columns, year, resume_offset)
        .await
        .map_err(stage("copy"))?;

        let check = validate_counts(
            source,
            archive,
            &self.dialect,
            name,
            &table.split_column,
            year,
        )
        .await
        .map_err(stage("validate"))?;

        let pruned = prune_source(
            source,
            &self.dialect,
            &self.options,
            name,
            &table.split_column,
            year,
        )
        .await
        .map_err(stage("prune"))?;

        Ok(TableYearOutcome {
            table: name.to_string(),
            year,
            archive_database: database.to_string(),
            table_created: creation == TableCreation::Created,
            total_rows: copy.total_rows,
            migrated_rows: copy.migrated_rows,
            failed_rows: copy.failed_rows,
            batches: copy.batches,
            source_count: check.source_count,
            archive_count: check.archive_count,
            rows_pruned: match pruned {
                PruneOutcome::Deleted(n) => Some(n),
                PruneOutcome::Skipped => None,
            },
        })
    }

    /// Explicit resume offset, else the checkpoint's, else 0.
    fn resume_offset(&self, table: &str, year: i32) -> u64 {
        if self.options.resume_offset > 0 {
            return self.options.resume_offset;
        }
        match self.checkpoint.as_ref().and_then(|c| c.resume_offset(table, year)) {
            Some(offset) => {
                info!("Checkpoint resumes {} year {} at offset {}", table, year, offset);
                offset
            }
            None => 0,
        }
    }

    fn mark_completed(&self, table: &str, year: i32) {
        if let Some(store) = &self.checkpoint {
            if let Err(e) = store.mark_completed(table, year) {
                warn!("Failed to update checkpoint for {} year {}: {}", table, year, e);
            }
        }
    }

    fn mark_failed(&self, table: &str, year: i32, err: &ArchiveError) {
        if let Some(store) = &self.checkpoint {
            // Only a copy failure leaves a usable offset behind
            let keep_offset = err.failed_stage() == Some("copy");
            if let Err(e) = store.mark_failed(table, year, &err.chain_message(), keep_offset) {
                warn!("Failed to update checkpoint for {} year {}: {}", table, year, e);
            }
        }
    }

    /// Compare source and archive row counts for every enabled table-year
    /// without copying anything.
    pub async fn validate(&self) -> Result<Vec<ValidationReport>> {
        let source = self.provider.connect_source().await?;
        let mut reports = Vec::new();

        for (table, year) in self.table_years() {
            let database = table.archive_database(year);
            let mut report = ValidationReport {
                table: table.name.clone(),
                year,
                archive_database: database.clone(),
                source_count: None,
                archive_count: None,
                passed: false,
                error: None,
            };

            match self.provider.connect_archive(&database).await {
                Ok(archive) => {
                    let result = validate_counts(
                        source.as_ref(),
                        archive.as_ref(),
                        &self.dialect,
                        &table.name,
                        &table.split_column,
                        year,
                    )
                    .await;
                    archive.close().await;

                    match result {
                        Ok(check) => {
                            report.source_count = Some(check.source_count);
                            report.archive_count = Some(check.archive_count);
                            report.passed = true;
                        }
                        Err(ArchiveError::Validation {
                            source_count,
                            archive_count,
                            ..
                        }) => {
                            report.source_count = Some(source_count);
                            report.archive_count = Some(archive_count);
                        }
                        Err(e) => report.error = Some(e.to_string()),
                    }
                }
                Err(e) => report.error = Some(e.to_string()),
            }

            if report.passed {
                info!("{} year {}: OK", report.table, report.year);
            } else {
                warn!("{} year {}: FAILED", report.table, report.year);
            }
            reports.push(report);
        }

        source.close().await;
        Ok(reports)
    }
}

fn at_stage<'a>(
    stage: &'static str,
    table: &'a str,
    year: i32,
) -> impl FnOnce(ArchiveError) -> ArchiveError + 'a {
    move |e| ArchiveError::stage(stage, table, year, e)
}
