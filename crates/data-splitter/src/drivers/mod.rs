//! Database driver implementations.
//!
//! This module provides database-specific implementations of the core traits:
//!
//! - [`mysql`]: MySQL/MariaDB driver (SQLx)
//! - [`postgres`]: PostgreSQL driver (SQLx)
//! - [`sqlite`]: SQLite driver (SQLx)
//! - [`mssql`]: Microsoft SQL Server driver (Tiberius)
//! - [`common`]: Shared utilities (TLS mode, database creation)
//!
//! # Architecture
//!
//! Each driver module implements:
//! - `Dialect`: SQL syntax strategy for the database engine
//! - `Connection`: a single dedicated session
//! - `ConnectionProvider`: opens the source and per-year archive sessions
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement `Dialect`, `Connection` and `ConnectionProvider`
//! 3. Add a variant to `DialectImpl` and a branch to [`provider_for`]

pub mod common;
pub mod mssql;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

pub use common::SslMode;
pub use mssql::{MssqlDialect, MssqlProvider};
pub use mysql::{MysqlDialect, MysqlProvider};
pub use postgres::{PostgresDialect, PostgresProvider};
pub use sqlite::{SqliteDialect, SqliteProvider};

use crate::config::{DatabaseConfig, DatabaseType};
use crate::core::schema::ColumnInfo;
use crate::core::traits::{CatalogQuery, ConnectionProvider, Dialect, SelectQueryOptions, UpsertQuery};

/// Enum-based static dispatch for dialects.
///
/// Note: We use manual impl instead of enum_dispatch macro due to
/// cross-module trait complexities. The performance is identical.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Mysql(MysqlDialect),
    Postgres(PostgresDialect),
    Sqlite(SqliteDialect),
    Mssql(MssqlDialect),
}

macro_rules! dispatch {
    ($self:ident, $d:ident => $call:expr) => {
        match $self {
            DialectImpl::Mysql($d) => $call,
            DialectImpl::Postgres($d) => $call,
            DialectImpl::Sqlite($d) => $call,
            DialectImpl::Mssql($d) => $call,
        }
    };
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        dispatch!(self, d => d.name())
    }

    fn quote_ident(&self, name: &str) -> String {
        dispatch!(self, d => d.quote_ident(name))
    }

    fn param_placeholder(&self, index: usize) -> String {
        dispatch!(self, d => d.param_placeholder(index))
    }

    fn year_predicate(&self, column: &str, year: i32) -> String {
        dispatch!(self, d => d.year_predicate(column, year))
    }

    fn null_if_empty(&self, quoted_column: &str) -> String {
        dispatch!(self, d => d.null_if_empty(quoted_column))
    }

    fn build_select_query(&self, opts: &SelectQueryOptions<'_>) -> String {
        dispatch!(self, d => d.build_select_query(opts))
    }

    fn build_upsert_query(&self, table: &str, columns: &[ColumnInfo]) -> UpsertQuery {
        dispatch!(self, d => d.build_upsert_query(table, columns))
    }

    fn describe_columns_query(&self, table: &str) -> CatalogQuery {
        dispatch!(self, d => d.describe_columns_query(table))
    }

    fn table_exists_query(&self, table: &str) -> CatalogQuery {
        dispatch!(self, d => d.table_exists_query(table))
    }

    fn show_create_table_query(&self, table: &str) -> Option<CatalogQuery> {
        dispatch!(self, d => d.show_create_table_query(table))
    }

    fn create_database_statement(&self, database: &str) -> Option<String> {
        dispatch!(self, d => d.create_database_statement(database))
    }
}

impl DialectImpl {
    /// Dialect generating SQL for a configured database type.
    pub fn from_db_type(db_type: DatabaseType) -> Self {
        match db_type {
            DatabaseType::Mysql | DatabaseType::Mariadb => DialectImpl::Mysql(MysqlDialect::new()),
            DatabaseType::Postgres => DialectImpl::Postgres(PostgresDialect::new()),
            DatabaseType::Sqlite => DialectImpl::Sqlite(SqliteDialect::new()),
            DatabaseType::Mssql => DialectImpl::Mssql(MssqlDialect::new()),
        }
    }
}

/// Connection provider for the configured database type.
pub fn provider_for(config: &DatabaseConfig) -> Arc<dyn ConnectionProvider> {
    match config.r#type {
        DatabaseType::Mysql | DatabaseType::Mariadb => Arc::new(MysqlProvider::new(config.clone())),
        DatabaseType::Postgres => Arc::new(PostgresProvider::new(config.clone())),
        DatabaseType::Sqlite => Arc::new(SqliteProvider::new(config)),
        DatabaseType::Mssql => Arc::new(MssqlProvider::new(config.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_impl_from_db_type() {
        assert_eq!(DialectImpl::from_db_type(DatabaseType::Mysql).name(), "mysql");
        assert_eq!(DialectImpl::from_db_type(DatabaseType::Mariadb).name(), "mysql");
        assert_eq!(DialectImpl::from_db_type(DatabaseType::Postgres).name(), "postgres");
        assert_eq!(DialectImpl::from_db_type(DatabaseType::Sqlite).name(), "sqlite");
        assert_eq!(DialectImpl::from_db_type(DatabaseType::Mssql).name(), "mssql");
    }

    #[test]
    fn test_dialect_impl_dispatch() {
        let dialect = DialectImpl::from_db_type(DatabaseType::Postgres);
        assert_eq!(dialect.quote_ident("table"), "\"table\"");
        assert_eq!(dialect.param_placeholder(1), "$1");
        assert_eq!(
            dialect.build_count_query("orders", "created_at", 2022),
            "SELECT COUNT(*) FROM \"orders\" WHERE EXTRACT(YEAR FROM \"created_at\") = 2022"
        );

        let dialect = DialectImpl::from_db_type(DatabaseType::Mssql);
        assert_eq!(dialect.quote_ident("table"), "[table]");
        assert_eq!(dialect.param_placeholder(1), "@P1");
        assert_eq!(
            dialect.null_if_empty("[note]"),
            MssqlDialect::new().null_if_empty("[note]")
        );
    }

    #[test]
    fn test_only_sqlite_lacks_create_database() {
        assert!(DialectImpl::from_db_type(DatabaseType::Sqlite)
            .create_database_statement("a_2022")
            .is_none());
        assert!(DialectImpl::from_db_type(DatabaseType::Mysql)
            .create_database_statement("a_2022")
            .is_some());
    }
}
