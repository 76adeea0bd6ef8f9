//! Catalog lookups: column metadata, table existence, row counts and
//! creation statements.

use tracing::debug;

use crate::core::schema::ColumnInfo;
use crate::core::traits::{Connection, Dialect};
use crate::core::value::Row;
use crate::error::{ArchiveError, Result};

/// Column metadata of `table`, in declaration order.
///
/// An empty result means the table does not exist (or is not visible) and
/// is reported as an introspection error.
pub async fn describe_columns(
    conn: &dyn Connection,
    dialect: &dyn Dialect,
    table: &str,
) -> Result<Vec<ColumnInfo>> {
    let query = dialect.describe_columns_query(table);
    let rows = conn
        .query(&query.sql, &query.params)
        .await
        .map_err(|e| ArchiveError::introspection(table, format!("failed to get columns: {e}")))?;

    let columns = rows
        .iter()
        .map(|row| column_from_row(table, row))
        .collect::<Result<Vec<_>>>()?;

    if columns.is_empty() {
        return Err(ArchiveError::introspection(table, "table has no visible columns"));
    }

    debug!("Table {} has {} columns", table, columns.len());
    Ok(columns)
}

fn column_from_row(table: &str, row: &Row) -> Result<ColumnInfo> {
    let field = row
        .get_text(0)
        .ok_or_else(|| ArchiveError::introspection(table, "column name is NULL"))?;
    let sql_type = row
        .get_text(1)
        .ok_or_else(|| ArchiveError::introspection(table, format!("type of column {field} is NULL")))?;

    Ok(ColumnInfo {
        field,
        sql_type,
        nullable: row
            .get_text(2)
            .is_some_and(|v| v.eq_ignore_ascii_case("YES")),
        key: row.get_text(3).unwrap_or_default(),
        default: row.get_text(4),
        extra: row.get_text(5).unwrap_or_default(),
    })
}

/// Whether `table` exists in the connection's current database.
pub async fn table_exists(conn: &dyn Connection, dialect: &dyn Dialect, table: &str) -> Result<bool> {
    let query = dialect.table_exists_query(table);
    let rows = conn.query(&query.sql, &query.params).await?;
    Ok(rows.first().and_then(|r| r.get_i64(0)).unwrap_or(0) > 0)
}

/// Number of rows of `table` whose split column falls in `year`.
pub async fn count_rows(
    conn: &dyn Connection,
    dialect: &dyn Dialect,
    table: &str,
    split_column: &str,
    year: i32,
) -> Result<u64> {
    let sql = dialect.build_count_query(table, split_column, year);
    let rows = conn.query(&sql, &[]).await?;
    let count = rows
        .first()
        .and_then(|r| r.get_i64(0))
        .ok_or_else(|| ArchiveError::connection("COUNT(*) returned no value", sql.clone()))?;
    Ok(u64::try_from(count).unwrap_or(0))
}

/// Statement that recreates `table` elsewhere.
///
/// Uses the engine's native creation statement when it has one
/// (`SHOW CREATE TABLE`, `sqlite_master.sql`), and otherwise synthesizes a
/// CREATE TABLE from the column metadata.
pub async fn creation_statement(
    conn: &dyn Connection,
    dialect: &dyn Dialect,
    table: &str,
    columns: &[ColumnInfo],
) -> Result<String> {
    let Some(query) = dialect.show_create_table_query(table) else {
        return Ok(dialect.synthesize_create_table(table, columns));
    };

    let rows = conn
        .query(&query.sql, &query.params)
        .await
        .map_err(|e| ArchiveError::introspection(table, format!("failed to get table schema: {e}")))?;

    rows.first()
        .and_then(|row| row.len().checked_sub(1).and_then(|last| row.get_text(last)))
        .filter(|ddl| !ddl.trim().is_empty())
        .ok_or_else(|| ArchiveError::introspection(table, "no creation statement returned"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::MysqlDialect;
    use crate::testing::MockConnection;

    fn orders_columns() -> Vec<ColumnInfo> {
        let mut id = ColumnInfo::new("id", "bigint").primary_key();
        id.extra = "auto_increment".into();
        vec![id, ColumnInfo::new("created_at", "datetime"), ColumnInfo::new("note", "text")]
    }

    #[tokio::test]
    async fn test_describe_columns_decodes_catalog_rows() {
        let conn = MockConnection::new().with_table(orders_columns(), 1);
        let columns = describe_columns(&conn, &MysqlDialect::new(), "orders")
            .await
            .unwrap();
        assert_eq!(columns, orders_columns());
    }

    #[tokio::test]
    async fn test_describe_columns_of_missing_table_fails() {
        let conn = MockConnection::new();
        let err = describe_columns(&conn, &MysqlDialect::new(), "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Introspection { ref table, .. } if table == "missing"));
    }

    #[tokio::test]
    async fn test_creation_statement_uses_last_column() {
        let conn = MockConnection::new()
            .with_table(orders_columns(), 1)
            .with_create_statement("CREATE TABLE `orders` (`id` bigint)");
        let ddl = creation_statement(&conn, &MysqlDialect::new(), "orders", &orders_columns())
            .await
            .unwrap();
        assert_eq!(ddl, "CREATE TABLE `orders` (`id` bigint)");
    }

    #[tokio::test]
    async fn test_creation_statement_failure_is_introspection_error() {
        let conn = MockConnection::new().with_table(orders_columns(), 1);
        let err = creation_statement(&conn, &MysqlDialect::new(), "orders", &orders_columns())
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Introspection { .. }));
    }

    #[tokio::test]
    async fn test_table_exists_and_count() {
        use chrono::NaiveDate;
        use crate::core::value::SqlValue;

        let date = |y| SqlValue::Date(NaiveDate::from_ymd_opt(y, 6, 1).unwrap());
        let conn = MockConnection::new()
            .with_table(orders_columns(), 1)
            .with_rows(vec![
                vec![SqlValue::I64(1), date(2021), SqlValue::from("a")],
                vec![SqlValue::I64(2), date(2022), SqlValue::from("b")],
                vec![SqlValue::I64(3), date(2022), SqlValue::from("c")],
            ]);
        let dialect = MysqlDialect::new();
        assert!(table_exists(&conn, &dialect, "orders").await.unwrap());
        assert_eq!(count_rows(&conn, &dialect, "orders", "created_at", 2022).await.unwrap(), 2);
        assert_eq!(count_rows(&conn, &dialect, "orders", "created_at", 2020).await.unwrap(), 0);
    }
}
