//! MySQL/MariaDB SQL dialect (Strategy pattern).
//!
//! Provides MySQL-specific SQL syntax for identifier quoting, batch selects,
//! upserts and catalog lookups.

use crate::core::schema::ColumnInfo;
use crate::core::traits::{CatalogQuery, Dialect, SelectQueryOptions, UpsertQuery};
use crate::core::value::SqlValue;

/// MySQL/MariaDB dialect implementation.
///
/// Compatible with MySQL 5.7+, 8.0+, and MariaDB 10.2+.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        // Handle names that contain backticks by doubling them
        format!("`{}`", name.replace('`', "``"))
    }

    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn year_predicate(&self, column: &str, year: i32) -> String {
        format!("YEAR({}) = {}", self.quote_ident(column), year)
    }

    fn build_select_query(&self, opts: &SelectQueryOptions<'_>) -> String {
        let mut sql = format!(
            "SELECT {} FROM {} WHERE {}",
            self.build_projection(opts.columns),
            self.quote_ident(opts.table),
            self.year_predicate(opts.split_column, opts.year)
        );
        if let Some(order_by) = self.build_order_by(opts.columns) {
            sql.push(' ');
            sql.push_str(&order_by);
        }
        sql.push_str(&format!(" LIMIT {} OFFSET {}", opts.limit, opts.offset));
        sql
    }

    fn build_upsert_query(&self, table: &str, columns: &[ColumnInfo]) -> UpsertQuery {
        let insert_cols = columns
            .iter()
            .map(|c| self.quote_ident(&c.field))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; columns.len()].join(", ");

        let update_set = columns
            .iter()
            .filter(|c| !c.is_primary_key())
            .map(|c| {
                let quoted = self.quote_ident(&c.field);
                format!("{quoted} = VALUES({quoted})")
            })
            .collect::<Vec<_>>();

        let sql = if update_set.is_empty() {
            // Only key columns: nothing to update, skip duplicates
            format!(
                "INSERT IGNORE INTO {} ({}) VALUES ({})",
                self.quote_ident(table),
                insert_cols,
                placeholders
            )
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({}) ON DUPLICATE KEY UPDATE {}",
                self.quote_ident(table),
                insert_cols,
                placeholders,
                update_set.join(", ")
            )
        };

        UpsertQuery {
            sql,
            param_order: (0..columns.len()).collect(),
        }
    }

    fn describe_columns_query(&self, table: &str) -> CatalogQuery {
        // CAST AS CHAR keeps MySQL 8 from returning catalog strings as blobs
        CatalogQuery::new(
            r#"SELECT
    CAST(COLUMN_NAME AS CHAR(255)) AS Field,
    CAST(COLUMN_TYPE AS CHAR(255)) AS Type,
    CAST(IS_NULLABLE AS CHAR(3)) AS `Null`,
    CAST(COLUMN_KEY AS CHAR(3)) AS `Key`,
    CAST(COLUMN_DEFAULT AS CHAR(4096)) AS `Default`,
    CAST(EXTRA AS CHAR(255)) AS Extra
FROM INFORMATION_SCHEMA.COLUMNS
WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
ORDER BY ORDINAL_POSITION"#,
            vec![SqlValue::from(table)],
        )
    }

    fn table_exists_query(&self, table: &str) -> CatalogQuery {
        CatalogQuery::new(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_name = ?",
            vec![SqlValue::from(table)],
        )
    }

    fn show_create_table_query(&self, table: &str) -> Option<CatalogQuery> {
        Some(CatalogQuery::new(
            format!("SHOW CREATE TABLE {}", self.quote_ident(table)),
            Vec::new(),
        ))
    }

    fn create_database_statement(&self, database: &str) -> Option<String> {
        Some(format!(
            "CREATE DATABASE IF NOT EXISTS {}",
            self.quote_ident(database)
        ))
    }
}
