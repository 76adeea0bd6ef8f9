//! Schema introspection on the source and replication into archive databases.

pub mod catalog;
pub mod replicate;

pub use catalog::{count_rows, creation_statement, describe_columns, table_exists};
pub use replicate::{ensure_archive_table, TableCreation};
