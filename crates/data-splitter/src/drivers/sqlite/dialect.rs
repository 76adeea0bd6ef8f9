//! SQLite SQL dialect (Strategy pattern).

use crate::core::schema::{primary_key_columns, ColumnInfo};
use crate::core::traits::{CatalogQuery, Dialect, SelectQueryOptions, UpsertQuery};
use crate::core::value::SqlValue;

/// SQLite dialect implementation. Requires SQLite 3.24+ for `ON CONFLICT ... DO UPDATE`.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Create a new SQLite dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn year_predicate(&self, column: &str, year: i32) -> String {
        format!(
            "CAST(strftime('%Y', {}) AS INTEGER) = {}",
            self.quote_ident(column),
            year
        )
    }

    fn null_if_empty(&self, quoted_column: &str) -> String {
        // length() is 0 for both '' and x'', NULLIF(blob, '') never matches
        format!("CASE WHEN length({quoted_column}) = 0 THEN NULL ELSE {quoted_column} END")
    }

    fn build_select_query(&self, opts: &SelectQueryOptions<'_>) -> String {
        let mut sql = format!(
            "SELECT {} FROM {} WHERE {}",
            self.build_projection(opts.columns),
            self.quote_ident(opts.table),
            self.year_predicate(opts.split_column, opts.year)
        );
        match self.build_order_by(opts.columns) {
            Some(order_by) => {
                sql.push(' ');
                sql.push_str(&order_by);
            }
            // Without a declared key, rowid still gives a stable order
            None => sql.push_str(" ORDER BY rowid"),
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

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote_ident(table),
            insert_cols,
            placeholders
        );

        let pk = primary_key_columns(columns);
        if !pk.is_empty() {
            let conflict = pk
                .iter()
                .map(|c| self.quote_ident(&c.field))
                .collect::<Vec<_>>()
                .join(", ");
            let update_set = columns
                .iter()
                .filter(|c| !c.is_primary_key())
                .map(|c| {
                    let quoted = self.quote_ident(&c.field);
                    format!("{quoted} = excluded.{quoted}")
                })
                .collect::<Vec<_>>();

            if update_set.is_empty() {
                sql.push_str(&format!(" ON CONFLICT ({conflict}) DO NOTHING"));
            } else {
                sql.push_str(&format!(
                    " ON CONFLICT ({conflict}) DO UPDATE SET {}",
                    update_set.join(", ")
                ));
            }
        }

        UpsertQuery {
            sql,
            param_order: (0..columns.len()).collect(),
        }
    }

    fn describe_columns_query(&self, table: &str) -> CatalogQuery {
        CatalogQuery::new(
            r#"SELECT
    name AS field,
    type,
    CASE WHEN "notnull" = 0 THEN 'YES' ELSE 'NO' END AS nullable,
    CASE WHEN pk > 0 THEN 'PRI' ELSE '' END AS "key",
    dflt_value AS "default",
    '' AS extra
FROM pragma_table_info(?)
ORDER BY cid"#,
            vec![SqlValue::from(table)],
        )
    }

    fn table_exists_query(&self, table: &str) -> CatalogQuery {
        CatalogQuery::new(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            vec![SqlValue::from(table)],
        )
    }

    fn show_create_table_query(&self, table: &str) -> Option<CatalogQuery> {
        Some(CatalogQuery::new(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?",
            vec![SqlValue::from(table)],
        ))
    }

    fn create_database_statement(&self, _database: &str) -> Option<String> {
        // Each archive database is a file, created by the connection provider
        None
    }
}
