//! MSSQL SQL dialect (Strategy pattern).
//!
//! Provides MSSQL-specific SQL syntax for identifier quoting, batch selects,
//! MERGE upserts and catalog lookups.

use crate::core::schema::{primary_key_columns, ColumnInfo};
use crate::core::traits::{CatalogQuery, Dialect, SelectQueryOptions, UpsertQuery};
use crate::core::value::SqlValue;

/// Microsoft SQL Server dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new MSSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &str {
        "mssql"
    }

    fn quote_ident(&self, name: &str) -> String {
        // Handle names that contain closing brackets by doubling them
        format!("[{}]", name.replace(']', "]]"))
    }

    fn param_placeholder(&self, index: usize) -> String {
        // MSSQL uses @P1, @P2, etc. (1-based)
        format!("@P{}", index)
    }

    fn year_predicate(&self, column: &str, year: i32) -> String {
        format!("YEAR({}) = {}", self.quote_ident(column), year)
    }

    fn null_if_empty(&self, quoted_column: &str) -> String {
        // text/ntext/image cannot be compared with '', DATALENGTH works for all of them
        format!("CASE WHEN DATALENGTH({quoted_column}) = 0 THEN NULL ELSE {quoted_column} END")
    }

    fn build_select_query(&self, opts: &SelectQueryOptions<'_>) -> String {
        // OFFSET/FETCH requires an ORDER BY
        let order_by = self
            .build_order_by(opts.columns)
            .unwrap_or_else(|| "ORDER BY (SELECT NULL)".to_string());
        format!(
            "SELECT {} FROM {} WHERE {} {} OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
            self.build_projection(opts.columns),
            self.quote_ident(opts.table),
            self.year_predicate(opts.split_column, opts.year),
            order_by,
            opts.offset,
            opts.limit
        )
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
        let param_order = (0..columns.len()).collect();

        let pk = primary_key_columns(columns);
        if pk.is_empty() {
            return UpsertQuery {
                sql: format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    self.quote_ident(table),
                    insert_cols,
                    placeholders
                ),
                param_order,
            };
        }

        let join_condition = pk
            .iter()
            .map(|c| {
                let quoted = self.quote_ident(&c.field);
                format!("t.{quoted} = s.{quoted}")
            })
            .collect::<Vec<_>>()
            .join(" AND ");

        let update_set = columns
            .iter()
            .filter(|c| !c.is_primary_key())
            .map(|c| {
                let quoted = self.quote_ident(&c.field);
                format!("t.{quoted} = s.{quoted}")
            })
            .collect::<Vec<_>>();

        let insert_vals = columns
            .iter()
            .map(|c| format!("s.{}", self.quote_ident(&c.field)))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "MERGE {} AS t USING (VALUES ({})) AS s ({}) ON {}",
            self.quote_ident(table),
            placeholders,
            insert_cols,
            join_condition
        );
        if !update_set.is_empty() {
            sql.push_str(&format!(
                " WHEN MATCHED THEN UPDATE SET {}",
                update_set.join(", ")
            ));
        }
        sql.push_str(&format!(
            " WHEN NOT MATCHED THEN INSERT ({}) VALUES ({})",
            insert_cols, insert_vals
        ));
        // MSSQL MERGE requires semicolon terminator
        sql.push(';');

        UpsertQuery { sql, param_order }
    }

    fn describe_columns_query(&self, table: &str) -> CatalogQuery {
        CatalogQuery::new(
            r#"SELECT
    c.COLUMN_NAME AS Field,
    CASE
        WHEN c.DATA_TYPE IN ('text', 'ntext', 'image', 'xml') THEN c.DATA_TYPE
        WHEN c.CHARACTER_MAXIMUM_LENGTH = -1 THEN c.DATA_TYPE + '(max)'
        WHEN c.CHARACTER_MAXIMUM_LENGTH IS NOT NULL
            THEN c.DATA_TYPE + '(' + CAST(c.CHARACTER_MAXIMUM_LENGTH AS varchar(10)) + ')'
        WHEN c.DATA_TYPE IN ('decimal', 'numeric')
            THEN c.DATA_TYPE + '(' + CAST(c.NUMERIC_PRECISION AS varchar(10)) + ','
                 + CAST(c.NUMERIC_SCALE AS varchar(10)) + ')'
        ELSE c.DATA_TYPE
    END AS Type,
    c.IS_NULLABLE AS [Null],
    CASE WHEN pk.COLUMN_NAME IS NOT NULL THEN 'PRI' ELSE '' END AS [Key],
    c.COLUMN_DEFAULT AS [Default],
    CASE WHEN COLUMNPROPERTY(OBJECT_ID(QUOTENAME(c.TABLE_SCHEMA) + '.' + QUOTENAME(c.TABLE_NAME)),
                             c.COLUMN_NAME, 'IsIdentity') = 1
         THEN 'identity' ELSE '' END AS Extra
FROM INFORMATION_SCHEMA.COLUMNS c
LEFT JOIN (
    SELECT ku.TABLE_SCHEMA, ku.TABLE_NAME, ku.COLUMN_NAME
    FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
    JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE ku
      ON tc.CONSTRAINT_NAME = ku.CONSTRAINT_NAME
     AND tc.TABLE_SCHEMA = ku.TABLE_SCHEMA
    WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
) pk
  ON pk.TABLE_SCHEMA = c.TABLE_SCHEMA
 AND pk.TABLE_NAME = c.TABLE_NAME
 AND pk.COLUMN_NAME = c.COLUMN_NAME
WHERE c.TABLE_SCHEMA = SCHEMA_NAME() AND c.TABLE_NAME = @P1
ORDER BY c.ORDINAL_POSITION"#,
            vec![SqlValue::from(table)],
        )
    }

    fn table_exists_query(&self, table: &str) -> CatalogQuery {
        CatalogQuery::new(
            "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_SCHEMA = SCHEMA_NAME() AND TABLE_NAME = @P1",
            vec![SqlValue::from(table)],
        )
    }

    fn create_database_statement(&self, database: &str) -> Option<String> {
        Some(format!(
            "IF DB_ID(N'{}') IS NULL CREATE DATABASE {}",
            database.replace('\'', "''"),
            self.quote_ident(database)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("id", "int").primary_key(),
            ColumnInfo::new("created_at", "datetime2"),
            ColumnInfo::new("body", "ntext"),
        ]
    }

    #[test]
    fn test_quote_ident() {
        let dialect = MssqlDialect::new();
        assert_eq!(dialect.quote_ident("users"), "[users]");
        assert_eq!(dialect.quote_ident("table]name"), "[table]]name]");
    }

    #[test]
    fn test_build_select_query() {
        let dialect = MssqlDialect::new();
        let cols = columns();
        let sql = dialect.build_select_query(&SelectQueryOptions {
            table: "orders",
            columns: &cols,
            split_column: "created_at",
            year: 2022,
            limit: 100,
            offset: 300,
        });
        assert_eq!(
            sql,
            "SELECT [id], [created_at], CASE WHEN DATALENGTH([body]) = 0 THEN NULL ELSE [body] END AS [body] \
             FROM [orders] WHERE YEAR([created_at]) = 2022 ORDER BY [id] \
             OFFSET 300 ROWS FETCH NEXT 100 ROWS ONLY"
        );
    }

    #[test]
    fn test_select_without_key_uses_constant_order() {
        let dialect = MssqlDialect::new();
        let cols = vec![ColumnInfo::new("d", "date")];
        let sql = dialect.build_select_query(&SelectQueryOptions {
            table: "t",
            columns: &cols,
            split_column: "d",
            year: 2020,
            limit: 1,
            offset: 0,
        });
        assert!(sql.contains("ORDER BY (SELECT NULL) OFFSET 0 ROWS FETCH NEXT 1 ROWS ONLY"));
    }

    #[test]
    fn test_build_upsert_query() {
        let dialect = MssqlDialect::new();
        let upsert = dialect.build_upsert_query("orders", &columns());
        assert_eq!(
            upsert.sql,
            "MERGE [orders] AS t USING (VALUES (@P1, @P2, @P3)) AS s ([id], [created_at], [body]) \
             ON t.[id] = s.[id] \
             WHEN MATCHED THEN UPDATE SET t.[created_at] = s.[created_at], t.[body] = s.[body] \
             WHEN NOT MATCHED THEN INSERT ([id], [created_at], [body]) VALUES (s.[id], s.[created_at], s.[body]);"
        );
        assert_eq!(upsert.param_order, vec![0, 1, 2]);
    }

    #[test]
    fn test_create_database_statement() {
        let dialect = MssqlDialect::new();
        assert_eq!(
            dialect.create_database_statement("archive_2022").as_deref(),
            Some("IF DB_ID(N'archive_2022') IS NULL CREATE DATABASE [archive_2022]")
        );
    }
}
