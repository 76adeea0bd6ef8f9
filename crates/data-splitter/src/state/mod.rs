//! File-based checkpoints for resuming interrupted archive runs.
//!
//! When a checkpoint file is configured, the offset reached by every
//! table-year is saved after each committed batch. A later run that does not
//! set an explicit resume offset picks up from the saved offset of any
//! table-year whose copy was interrupted. A table-year that failed after its
//! copy finished starts again from offset 0.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ArchiveError, Result};

/// Checkpoint file contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Run that last wrote the file.
    pub run_id: String,

    /// When the file was last written.
    pub updated_at: DateTime<Utc>,

    /// Per table-year progress, keyed by `table:year`.
    pub entries: BTreeMap<String, TableYearCheckpoint>,
}

/// Progress of one table-year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableYearCheckpoint {
    pub table: String,
    pub year: i32,

    /// Task status.
    pub status: TaskStatus,

    /// Next source offset to read.
    pub offset: u64,

    /// Rows loaded into the archive so far.
    pub migrated_rows: u64,

    /// Batches completed so far.
    pub batch_count: u64,

    /// Rows in the source for this year when the copy started.
    pub total_rows: u64,

    /// Error message if failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub updated_at: DateTime<Utc>,
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    InProgress,
    Completed,
    Failed,
}

/// Offsets reached by a table-year's copy, as recorded after a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointProgress {
    pub offset: u64,
    pub migrated_rows: u64,
    pub batch_count: u64,
    pub total_rows: u64,
}

impl CheckpointState {
    /// Create an empty state for a run.
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            updated_at: Utc::now(),
            entries: BTreeMap::new(),
        }
    }

    /// Load state from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save state to a file (atomic write).
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.updated_at = Utc::now();

        let content = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;

        Ok(())
    }

    fn key(table: &str, year: i32) -> String {
        format!("{table}:{year}")
    }

    /// Entry for a table-year, if any.
    pub fn entry(&self, table: &str, year: i32) -> Option<&TableYearCheckpoint> {
        self.entries.get(&Self::key(table, year))
    }

    fn upsert(&mut self, table: &str, year: i32, status: TaskStatus) -> &mut TableYearCheckpoint {
        let entry = self
            .entries
            .entry(Self::key(table, year))
            .or_insert_with(|| TableYearCheckpoint {
                table: table.to_string(),
                year,
                status,
                offset: 0,
                migrated_rows: 0,
                batch_count: 0,
                total_rows: 0,
                error: None,
                updated_at: Utc::now(),
            });
        entry.status = status;
        entry.updated_at = Utc::now();
        entry
    }
}

/// Shared, thread-safe handle on a checkpoint file.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    state: Mutex<CheckpointState>,
}

impl CheckpointStore {
    /// Open a checkpoint file, starting empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>, run_id: &str) -> Result<Self> {
        let path = path.into();
        let mut state = if path.exists() {
            let state = CheckpointState::load(&path).map_err(|e| {
                ArchiveError::Config(format!(
                    "failed to read checkpoint file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            info!(
                "Loaded checkpoint file {} ({} entries)",
                path.display(),
                state.entries.len()
            );
            state
        } else {
            CheckpointState::new(run_id)
        };
        state.run_id = run_id.to_string();

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, CheckpointState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Offset to resume a table-year from, if it started but never completed.
    pub fn resume_offset(&self, table: &str, year: i32) -> Option<u64> {
        self.lock()
            .entry(table, year)
            .filter(|e| e.status != TaskStatus::Completed && e.offset > 0)
            .map(|e| e.offset)
    }

    /// Record progress after a committed batch.
    pub fn record_batch(&self, table: &str, year: i32, progress: CheckpointProgress) -> Result<()> {
        let mut state = self.lock();
        let entry = state.upsert(table, year, TaskStatus::InProgress);
        entry.offset = progress.offset;
        entry.migrated_rows = progress.migrated_rows;
        entry.batch_count = progress.batch_count;
        entry.total_rows = progress.total_rows;
        entry.error = None;
        debug!("Checkpoint {}:{} at offset {}", table, year, progress.offset);
        state.save(&self.path)
    }

    /// Mark a table-year as fully archived.
    pub fn mark_completed(&self, table: &str, year: i32) -> Result<()> {
        let mut state = self.lock();
        let entry = state.upsert(table, year, TaskStatus::Completed);
        entry.error = None;
        state.save(&self.path)
    }

    /// Mark a table-year as failed.
    ///
    /// With `keep_offset` the last batch offset is kept for resume. Otherwise
    /// progress is reset so the next run copies the year again from the start.
    pub fn mark_failed(&self, table: &str, year: i32, error: &str, keep_offset: bool) -> Result<()> {
        let mut state = self.lock();
        let entry = state.upsert(table, year, TaskStatus::Failed);
        if !keep_offset {
            entry.offset = 0;
            entry.migrated_rows = 0;
            entry.batch_count = 0;
        }
        entry.error = Some(error.to_string());
        state.save(&self.path)
    }

    /// Snapshot of the current state.
    pub fn snapshot(&self) -> CheckpointState {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn progress(offset: u64) -> CheckpointProgress {
        CheckpointProgress {
            offset,
            migrated_rows: offset,
            batch_count: offset / 100,
            total_rows: 250,
        }
    }

    #[test]
    fn test_record_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("checkpoint.json");

        let store = CheckpointStore::open(&path, "run-1").unwrap();
        store.record_batch("orders", 2022, progress(200)).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());

        let reopened = CheckpointStore::open(&path, "run-2").unwrap();
        assert_eq!(reopened.resume_offset("orders", 2022), Some(200));
        assert_eq!(reopened.resume_offset("orders", 2021), None);
        assert_eq!(reopened.snapshot().run_id, "run-2");
    }

    #[test]
    fn test_completed_entries_do_not_resume() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(dir.path().join("cp.json"), "run").unwrap();
        store.record_batch("orders", 2022, progress(100)).unwrap();
        store.mark_completed("orders", 2022).unwrap();
        assert_eq!(store.resume_offset("orders", 2022), None);
        let entry = store.snapshot().entry("orders", 2022).cloned().unwrap();
        assert_eq!(entry.status, TaskStatus::Completed);
        assert_eq!(entry.offset, 100);
    }

    #[test]
    fn test_failed_entries_resume_from_last_offset() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(dir.path().join("cp.json"), "run").unwrap();
        store.record_batch("orders", 2022, progress(100)).unwrap();
        store.mark_failed("orders", 2022, "boom", true).unwrap();
        assert_eq!(store.resume_offset("orders", 2022), Some(100));
        let entry = store.snapshot().entry("orders", 2022).cloned().unwrap();
        assert_eq!(entry.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_failure_after_copy_resets_offset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cp.json");
        let store = CheckpointStore::open(&path, "run").unwrap();
        store.record_batch("orders", 2022, progress(250)).unwrap();
        store.mark_failed("orders", 2022, "validation failed", false).unwrap();

        let reopened = CheckpointStore::open(&path, "run-2").unwrap();
        assert_eq!(reopened.resume_offset("orders", 2022), None);
        let entry = reopened.snapshot().entry("orders", 2022).cloned().unwrap();
        assert_eq!(entry.status, TaskStatus::Failed);
        assert_eq!(entry.offset, 0);
        assert_eq!(entry.migrated_rows, 0);
        assert_eq!(entry.total_rows, 250);
    }

    #[test]
    fn test_corrupt_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cp.json");
        std::fs::write(&path, "not json").unwrap();
        let err = CheckpointStore::open(&path, "run").unwrap_err();
        assert!(matches!(err, ArchiveError::Config(_)));
    }
}
