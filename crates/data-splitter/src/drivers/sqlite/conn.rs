//! SQLite sessions over SQLx.
//!
//! The source is the database file named by `source_db`. Each archive
//! database is a sibling file `<name>.db`, placed in `archive_dir` when set.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column as _, Connection as _, Executor as _, Row as _, Sqlite, TypeInfo as _, ValueRef as _};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::core::traits::{Connection, ConnectionProvider};
use crate::core::value::{Row, SqlNullType, SqlValue};
use crate::error::{ArchiveError, Result};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// A single SQLite session on one database file.
pub struct SqliteSession {
    conn: Mutex<Option<SqliteConnection>>,
    path: PathBuf,
}

impl SqliteSession {
    /// Open `path`, creating the file only when `create` is set.
    pub async fn open(path: &Path, create: bool) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(create);

        let conn = SqliteConnection::connect_with(&options).await.map_err(|e| {
            ArchiveError::connection(e, format!("opening SQLite database {}", path.display()))
        })?;

        info!("Opened SQLite database: {}", path.display());
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path: path.to_path_buf(),
        })
    }

    fn closed(&self) -> ArchiveError {
        ArchiveError::connection(
            "connection is closed",
            format!("SQLite {}", self.path.display()),
        )
    }
}

#[async_trait]
impl Connection for SqliteSession {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(|| self.closed())?;

        let result = if params.is_empty() {
            conn.execute(sql).await?
        } else {
            bind_all(sqlx::query(sql), params).execute(&mut *conn).await?
        };
        Ok(result.rows_affected())
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(|| self.closed())?;

        let rows: Vec<SqliteRow> = if params.is_empty() {
            conn.fetch_all(sql).await?
        } else {
            bind_all(sqlx::query(sql), params).fetch_all(&mut *conn).await?
        };
        rows.iter().map(convert_row).collect()
    }

    async fn close(&self) {
        if let Some(conn) = self.conn.lock().await.take() {
            if let Err(e) = conn.close().await {
                debug!("Error closing SQLite database {}: {}", self.path.display(), e);
            }
        }
    }
}

fn bind_all<'q>(mut query: SqliteQuery<'q>, params: &[SqlValue]) -> SqliteQuery<'q> {
    for value in params {
        query = bind_value(query, value);
    }
    query
}

// SQLite stores by value, not by column type: decimals, UUIDs and JSON go in
// as text.
fn bind_value<'q>(query: SqliteQuery<'q>, value: &SqlValue) -> SqliteQuery<'q> {
    match value {
        SqlValue::Null(t) => match t {
            SqlNullType::Bool | SqlNullType::I16 | SqlNullType::I32 | SqlNullType::I64 => {
                query.bind(None::<i64>)
            }
            SqlNullType::F32 | SqlNullType::F64 => query.bind(None::<f64>),
            SqlNullType::Bytes => query.bind(None::<Vec<u8>>),
            _ => query.bind(None::<String>),
        },
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::I16(v) => query.bind(i64::from(*v)),
        SqlValue::I32(v) => query.bind(i64::from(*v)),
        SqlValue::I64(v) => query.bind(*v),
        SqlValue::U64(v) => match i64::try_from(*v) {
            Ok(v) => query.bind(v),
            Err(_) => query.bind(v.to_string()),
        },
        SqlValue::F32(v) => query.bind(f64::from(*v)),
        SqlValue::F64(v) => query.bind(*v),
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Bytes(b) => query.bind(b.clone()),
        SqlValue::Uuid(u) => query.bind(u.to_string()),
        SqlValue::Decimal(d) => query.bind(d.to_string()),
        SqlValue::Json(j) => query.bind(j.to_string()),
        SqlValue::DateTime(dt) => query.bind(*dt),
        SqlValue::DateTimeOffset(dt) => query.bind(dt.with_timezone(&Utc)),
        SqlValue::Date(d) => query.bind(*d),
        SqlValue::Time(t) => query.bind(*t),
    }
}

fn convert_row(row: &SqliteRow) -> Result<Row> {
    let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = (0..columns.len())
        .map(|i| decode_value(row, i))
        .collect::<Result<Vec<_>>>()?;
    Ok(Row::new(columns, values))
}

/// Decode by the value's storage class rather than the declared type.
fn decode_value(row: &SqliteRow, i: usize) -> Result<SqlValue> {
    let storage = {
        let raw = row.try_get_raw(i)?;
        if raw.is_null() {
            return Ok(SqlValue::Null(SqlNullType::String));
        }
        raw.type_info().name().to_uppercase()
    };

    let value = match storage.as_str() {
        "INTEGER" => SqlValue::I64(row.try_get_unchecked::<i64, _>(i)?),
        "REAL" => SqlValue::F64(row.try_get_unchecked::<f64, _>(i)?),
        "BLOB" => SqlValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(i)?),
        _ => SqlValue::Text(row.try_get_unchecked::<String, _>(i)?),
    };
    Ok(value)
}

/// Opens SQLite database files.
pub struct SqliteProvider {
    source: PathBuf,
    archive_dir: PathBuf,
}

impl SqliteProvider {
    pub fn new(config: &DatabaseConfig) -> Self {
        let source = PathBuf::from(&config.source_db);
        let archive_dir = config.archive_dir.clone().unwrap_or_else(|| {
            source
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        });
        Self {
            source,
            archive_dir,
        }
    }

    /// File holding the archive database `database`.
    pub fn archive_path(&self, database: &str) -> PathBuf {
        self.archive_dir.join(format!("{database}.db"))
    }
}

#[async_trait]
impl ConnectionProvider for SqliteProvider {
    async fn connect_source(&self) -> Result<Box<dyn Connection>> {
        Ok(Box::new(SqliteSession::open(&self.source, false).await?))
    }

    async fn connect_archive(&self, database: &str) -> Result<Box<dyn Connection>> {
        let path = self.archive_path(database);
        Ok(Box::new(SqliteSession::open(&path, false).await?))
    }

    async fn create_database(&self, _source: &dyn Connection, database: &str) -> Result<()> {
        std::fs::create_dir_all(&self.archive_dir)?;
        let path = self.archive_path(database);
        let session = SqliteSession::open(&path, true).await?;
        session.close().await;
        info!("Created archive database {}", path.display());
        Ok(())
    }
}
