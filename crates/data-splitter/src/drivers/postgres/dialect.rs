//! PostgreSQL SQL dialect (Strategy pattern).

use crate::core::schema::{primary_key_columns, ColumnInfo};
use crate::core::traits::{CatalogQuery, Dialect, SelectQueryOptions, UpsertQuery};
use crate::core::value::SqlValue;

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn year_predicate(&self, column: &str, year: i32) -> String {
        format!("EXTRACT(YEAR FROM {}) = {}", self.quote_ident(column), year)
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
        let placeholders = (1..=columns.len())
            .map(|i| self.param_placeholder(i))
            .collect::<Vec<_>>()
            .join(", ");

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
                    format!("{quoted} = EXCLUDED.{quoted}")
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
    c.column_name::text AS field,
    format_type(a.atttypid, a.atttypmod) AS type,
    c.is_nullable::text AS nullable,
    CASE WHEN EXISTS (
        SELECT 1
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage k
          ON tc.constraint_name = k.constraint_name
         AND tc.table_schema = k.table_schema
         AND tc.table_name = k.table_name
        WHERE tc.constraint_type = 'PRIMARY KEY'
          AND tc.table_schema = c.table_schema
          AND tc.table_name = c.table_name
          AND k.column_name = c.column_name
    ) THEN 'PRI' ELSE '' END AS key,
    c.column_default::text AS "default",
    CASE WHEN c.is_identity = 'YES' THEN 'identity' ELSE '' END AS extra
FROM information_schema.columns c
JOIN pg_attribute a
  ON a.attrelid = (quote_ident(c.table_schema) || '.' || quote_ident(c.table_name))::regclass
 AND a.attname = c.column_name
WHERE c.table_schema = current_schema() AND c.table_name = $1
ORDER BY c.ordinal_position"#,
            vec![SqlValue::from(table)],
        )
    }

    fn table_exists_query(&self, table: &str) -> CatalogQuery {
        CatalogQuery::new(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1",
            vec![SqlValue::from(table)],
        )
    }

    fn create_database_statement(&self, database: &str) -> Option<String> {
        // PostgreSQL has no IF NOT EXISTS for databases
        Some(format!("CREATE DATABASE {}", self.quote_ident(database)))
    }
}
