//! # data-splitter
//!
//! Year-partitioned table archiving library.
//!
//! For each configured table and year, rows whose split column falls in that
//! year are copied from the source database into a per-year archive database
//! (named from the table's `archive_pattern`), then optionally deleted from
//! the source once row counts have been validated.
//!
//! - **Batched, resumable copy** with idempotent upserts
//! - **Constraint suspension** on the archive connection during loads
//! - **Validation** of archive row counts before any deletion
//! - **MySQL/MariaDB, PostgreSQL, SQLite and SQL Server** drivers
//! - **Checkpoint files** for resuming interrupted runs
//!
//! ## Example
//!
//! ```rust,no_run
//! use data_splitter::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> data_splitter::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let summary = Orchestrator::new(config)?.run().await?;
//!     println!("Archived {} rows", summary.rows_archived);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod config;
pub mod core;
pub mod dialect;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod schema;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use archive::{ProgressObserver, StdoutProgressReporter};
pub use config::{ArchiveOptions, Config, DatabaseConfig, DatabaseType, TableSpec};
pub use crate::core::{Connection, ConnectionProvider, Dialect, Row, SqlValue};
pub use drivers::{provider_for, DialectImpl};
pub use error::{ArchiveError, Result};
pub use orchestrator::{FailedTableYear, Orchestrator, RunSummary, TableYearOutcome, ValidationReport};
pub use state::CheckpointStore;
