//! SQLite driver.
//!
//! Databases are files: the source is `source_db`, each archive database is
//! `<name>.db` next to it (or in `archive_dir`).

mod conn;
mod dialect;

pub use conn::{SqliteProvider, SqliteSession};
pub use dialect::SqliteDialect;
