//! Core traits for database-agnostic archiving.
//!
//! - [`Connection`]: executes statements and queries on one database session
//! - [`ConnectionProvider`]: opens source and archive connections
//! - [`Dialect`]: SQL syntax strategy for different database engines
//!
//! The archive engine only talks to these traits, so its batch and resume
//! logic can be exercised against an in-memory connection in tests.

use async_trait::async_trait;

use crate::error::Result;

use super::schema::{primary_key_columns, ColumnInfo};
use super::value::{Row, SqlValue};

/// One database session.
///
/// Session-scoped statements (`SET session_replication_role`,
/// `PRAGMA foreign_keys`) must affect every later call on the same
/// connection, so implementations hold a single dedicated session rather
/// than a pool.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a statement and return the driver-reported affected row count.
    ///
    /// Statements without parameters are sent as plain text (no prepare).
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Run a query and return all rows.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;

    /// Close the session. Further calls fail.
    async fn close(&self);
}

/// Opens connections to the source database and to per-year archive databases.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Connect to the configured source database.
    async fn connect_source(&self) -> Result<Box<dyn Connection>>;

    /// Connect to an archive database by name. Fails if it does not exist.
    async fn connect_archive(&self, database: &str) -> Result<Box<dyn Connection>>;

    /// Create an archive database using the source connection.
    async fn create_database(&self, source: &dyn Connection, database: &str) -> Result<()>;
}

/// A catalog query with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl CatalogQuery {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Options for building the per-batch SELECT.
#[derive(Debug, Clone)]
pub struct SelectQueryOptions<'a> {
    /// Table name.
    pub table: &'a str,
    /// Columns to select, in table order.
    pub columns: &'a [ColumnInfo],
    /// Date/datetime column whose year partitions the table.
    pub split_column: &'a str,
    /// Calendar year to select.
    pub year: i32,
    /// Row limit for the batch.
    pub limit: u64,
    /// Row offset for the batch.
    pub offset: u64,
}

/// A parameterized upsert statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertQuery {
    /// SQL text with dialect placeholders.
    pub sql: String,
    /// Column indexes (into the selected row) bound to each placeholder.
    pub param_order: Vec<usize>,
}

impl UpsertQuery {
    /// Collect the parameters for one row in placeholder order.
    pub fn bind_row(&self, values: &[SqlValue]) -> Vec<SqlValue> {
        self.param_order
            .iter()
            .filter_map(|&idx| values.get(idx).cloned())
            .collect()
    }
}

/// SQL syntax strategy for different database engines.
///
/// Provides database-specific SQL generation while keeping the archive
/// engine database-agnostic. Default methods cover the statements that only
/// differ by quoting and the year predicate.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier (e.g., "mysql", "postgres").
    fn name(&self) -> &str;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_ident(&self, name: &str) -> String;

    /// Get a parameter placeholder for the given 1-based index.
    fn param_placeholder(&self, index: usize) -> String;

    /// Predicate selecting rows whose `column` falls in `year`.
    fn year_predicate(&self, column: &str, year: i32) -> String;

    /// Projection expression turning an empty value into NULL.
    fn null_if_empty(&self, quoted_column: &str) -> String {
        format!("NULLIF({quoted_column}, '')")
    }

    /// Build the projection list: text/blob columns go through
    /// [`Dialect::null_if_empty`], others are selected as-is.
    fn build_projection(&self, columns: &[ColumnInfo]) -> String {
        columns
            .iter()
            .map(|c| {
                let quoted = self.quote_ident(&c.field);
                if c.is_text_like() {
                    format!("{} AS {}", self.null_if_empty(&quoted), quoted)
                } else {
                    quoted
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Build the SELECT for one batch.
    fn build_select_query(&self, opts: &SelectQueryOptions<'_>) -> String;

    /// Build the upsert statement used to load one row into the archive.
    fn build_upsert_query(&self, table: &str, columns: &[ColumnInfo]) -> UpsertQuery;

    /// `ORDER BY` clause giving batches a stable order, if the table has a key.
    fn build_order_by(&self, columns: &[ColumnInfo]) -> Option<String> {
        let pk = primary_key_columns(columns);
        if pk.is_empty() {
            return None;
        }
        Some(format!(
            "ORDER BY {}",
            pk.iter()
                .map(|c| self.quote_ident(&c.field))
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    /// Count rows of a table in a given year.
    fn build_count_query(&self, table: &str, split_column: &str, year: i32) -> String {
        format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            self.quote_ident(table),
            self.year_predicate(split_column, year)
        )
    }

    /// Delete rows of a table in a given year.
    fn build_delete_query(&self, table: &str, split_column: &str, year: i32) -> String {
        format!(
            "DELETE FROM {} WHERE {}",
            self.quote_ident(table),
            self.year_predicate(split_column, year)
        )
    }

    /// Query returning one row per column, shaped as
    /// `(field, type, nullable YES/NO, key, default, extra)`.
    fn describe_columns_query(&self, table: &str) -> CatalogQuery;

    /// Query returning a single count: 1 if the table exists in the current database.
    fn table_exists_query(&self, table: &str) -> CatalogQuery;

    /// Query whose last column holds the native creation statement,
    /// or `None` when the engine has no such facility.
    fn show_create_table_query(&self, _table: &str) -> Option<CatalogQuery> {
        None
    }

    /// Build a CREATE TABLE statement from column metadata.
    fn synthesize_create_table(&self, table: &str, columns: &[ColumnInfo]) -> String {
        let mut defs: Vec<String> = columns
            .iter()
            .map(|c| {
                let mut def = format!("{} {}", self.quote_ident(&c.field), c.sql_type);
                if !c.nullable {
                    def.push_str(" NOT NULL");
                }
                // Sequence defaults reference objects that do not exist in the archive.
                if let Some(default) = c.default.as_deref().filter(|d| !d.contains("nextval(")) {
                    def.push_str(" DEFAULT ");
                    def.push_str(default);
                }
                def
            })
            .collect();

        let pk: Vec<String> = primary_key_columns(columns)
            .iter()
            .map(|c| self.quote_ident(&c.field))
            .collect();
        if !pk.is_empty() {
            defs.push(format!("PRIMARY KEY ({})", pk.join(", ")));
        }

        format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.quote_ident(table),
            defs.join(",\n    ")
        )
    }

    /// Statement creating a database, or `None` when databases are files.
    fn create_database_statement(&self, database: &str) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_row_follows_param_order() {
        let upsert = UpsertQuery {
            sql: String::new(),
            param_order: vec![1, 0],
        };
        let values = vec![SqlValue::I64(1), SqlValue::from("a")];
        assert_eq!(
            upsert.bind_row(&values),
            vec![SqlValue::from("a"), SqlValue::I64(1)]
        );
    }
}
