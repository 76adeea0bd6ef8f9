//! Table-year archive stages.
//!
//! - [`copy`]: batched, resumable copy into the archive database
//! - [`validate`]: source vs archive row counts
//! - [`prune`]: deletion of archived rows from the source
//! - [`progress`]: `PROGRESS`/`FINAL` line reporting

pub mod copy;
pub mod progress;
pub mod prune;
pub mod validate;

pub use copy::{BatchStats, CopyEngine, CopyOutcome, MigrationProgress};
pub use progress::{
    LineProgressReporter, NoopObserver, ProgressEvent, ProgressObserver, StdoutProgressReporter,
};
pub use prune::{prune_source, PruneOutcome};
pub use validate::{validate_counts, CountCheck};
