//! MySQL/MariaDB sessions over SQLx.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column as _, Connection as _, Executor as _, MySql, Row as _, TypeInfo as _, ValueRef as _};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::core::traits::{Connection, ConnectionProvider};
use crate::core::value::{Row, SqlNullType, SqlValue};
use crate::drivers::common::{create_database_with, SslMode};
use crate::error::{ArchiveError, Result};

use super::MysqlDialect;

type MySqlQuery<'q> = Query<'q, MySql, MySqlArguments>;

/// A single MySQL session.
pub struct MysqlSession {
    conn: Mutex<Option<MySqlConnection>>,
    database: String,
}

impl MysqlSession {
    /// Open a session on `database`.
    pub async fn connect(config: &DatabaseConfig, database: &str) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.effective_port())
            .username(&config.user)
            .password(&config.password)
            .database(database)
            .charset("utf8mb4")
            .ssl_mode(SslMode::parse(config.ssl_mode.as_deref())?.mysql());

        let conn = MySqlConnection::connect_with(&options).await.map_err(|e| {
            ArchiveError::connection(
                e,
                format!(
                    "connecting to MySQL {}:{}/{}",
                    config.host,
                    config.effective_port(),
                    database
                ),
            )
        })?;

        info!(
            "Connected to MySQL: {}:{}/{}",
            config.host,
            config.effective_port(),
            database
        );

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            database: database.to_string(),
        })
    }

    fn closed(&self) -> ArchiveError {
        ArchiveError::connection("connection is closed", format!("MySQL {}", self.database))
    }
}

#[async_trait]
impl Connection for MysqlSession {
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

        let rows: Vec<MySqlRow> = if params.is_empty() {
            conn.fetch_all(sql).await?
        } else {
            bind_all(sqlx::query(sql), params).fetch_all(&mut *conn).await?
        };
        rows.iter().map(convert_row).collect()
    }

    async fn close(&self) {
        if let Some(conn) = self.conn.lock().await.take() {
            if let Err(e) = conn.close().await {
                debug!("Error closing MySQL connection to {}: {}", self.database, e);
            }
        }
    }
}

fn bind_all<'q>(mut query: MySqlQuery<'q>, params: &[SqlValue]) -> MySqlQuery<'q> {
    for value in params {
        query = bind_value(query, value);
    }
    query
}

fn bind_value<'q>(query: MySqlQuery<'q>, value: &SqlValue) -> MySqlQuery<'q> {
    match value {
        SqlValue::Null(t) => match t {
            SqlNullType::Bool => query.bind(None::<bool>),
            SqlNullType::I16 | SqlNullType::I32 | SqlNullType::I64 => query.bind(None::<i64>),
            SqlNullType::F32 | SqlNullType::F64 => query.bind(None::<f64>),
            SqlNullType::Bytes => query.bind(None::<Vec<u8>>),
            SqlNullType::Decimal => query.bind(None::<Decimal>),
            SqlNullType::DateTime | SqlNullType::DateTimeOffset => query.bind(None::<NaiveDateTime>),
            SqlNullType::Date => query.bind(None::<NaiveDate>),
            SqlNullType::Time => query.bind(None::<NaiveTime>),
            SqlNullType::String | SqlNullType::Uuid | SqlNullType::Json => {
                query.bind(None::<String>)
            }
        },
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::I16(v) => query.bind(*v),
        SqlValue::I32(v) => query.bind(*v),
        SqlValue::I64(v) => query.bind(*v),
        SqlValue::U64(v) => query.bind(*v),
        SqlValue::F32(v) => query.bind(*v),
        SqlValue::F64(v) => query.bind(*v),
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Bytes(b) => query.bind(b.clone()),
        SqlValue::Uuid(u) => query.bind(u.to_string()),
        SqlValue::Decimal(d) => query.bind(*d),
        SqlValue::Json(j) => query.bind(j.to_string()),
        SqlValue::DateTime(dt) => query.bind(*dt),
        SqlValue::DateTimeOffset(dt) => query.bind(dt.with_timezone(&Utc)),
        SqlValue::Date(d) => query.bind(*d),
        SqlValue::Time(t) => query.bind(*t),
    }
}

fn convert_row(row: &MySqlRow) -> Result<Row> {
    let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = (0..columns.len())
        .map(|i| decode_value(row, i))
        .collect::<Result<Vec<_>>>()?;
    Ok(Row::new(columns, values))
}

fn decode_value(row: &MySqlRow, i: usize) -> Result<SqlValue> {
    let (type_name, is_null) = {
        let raw = row.try_get_raw(i)?;
        (raw.type_info().name().to_uppercase(), raw.is_null())
    };
    if is_null {
        return Ok(SqlValue::Null(null_type_for(&type_name)));
    }

    let decoded = match type_name.as_str() {
        "BOOLEAN" => row.try_get::<bool, _>(i).map(SqlValue::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get::<i64, _>(i).map(SqlValue::I64)
        }
        t if t.ends_with("UNSIGNED") => row
            .try_get::<u64, _>(i)
            .map(|v| i64::try_from(v).map(SqlValue::I64).unwrap_or(SqlValue::U64(v))),
        "YEAR" => row.try_get_unchecked::<i16, _>(i).map(SqlValue::I16),
        "FLOAT" => row.try_get::<f32, _>(i).map(SqlValue::F32),
        "DOUBLE" => row.try_get::<f64, _>(i).map(SqlValue::F64),
        "DECIMAL" => row.try_get::<Decimal, _>(i).map(SqlValue::Decimal),
        "DATE" => row.try_get::<NaiveDate, _>(i).map(SqlValue::Date),
        "TIME" => row.try_get::<NaiveTime, _>(i).map(SqlValue::Time),
        "DATETIME" | "TIMESTAMP" => row.try_get::<NaiveDateTime, _>(i).map(SqlValue::DateTime),
        "JSON" => row.try_get::<serde_json::Value, _>(i).map(SqlValue::Json),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => row.try_get::<Vec<u8>, _>(i).map(SqlValue::Bytes),
        _ => row.try_get::<String, _>(i).map(SqlValue::Text),
    };

    // Zero dates, out-of-range TIME values and binary-collated text fall back
    // to their raw representation.
    decoded
        .or_else(|_| row.try_get::<String, _>(i).map(SqlValue::Text))
        .or_else(|_| row.try_get::<Vec<u8>, _>(i).map(SqlValue::Bytes))
        .map_err(ArchiveError::from)
}

fn null_type_for(type_name: &str) -> SqlNullType {
    match type_name {
        "BOOLEAN" => SqlNullType::Bool,
        "FLOAT" => SqlNullType::F32,
        "DOUBLE" => SqlNullType::F64,
        "DECIMAL" => SqlNullType::Decimal,
        "DATE" => SqlNullType::Date,
        "TIME" => SqlNullType::Time,
        "DATETIME" | "TIMESTAMP" => SqlNullType::DateTime,
        "JSON" => SqlNullType::Json,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => {
            SqlNullType::Bytes
        }
        t if t.contains("INT") => SqlNullType::I64,
        _ => SqlNullType::String,
    }
}

/// Opens MySQL/MariaDB sessions for the configured server.
pub struct MysqlProvider {
    config: DatabaseConfig,
}

impl MysqlProvider {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionProvider for MysqlProvider {
    async fn connect_source(&self) -> Result<Box<dyn Connection>> {
        let session = MysqlSession::connect(&self.config, &self.config.source_db).await?;
        Ok(Box::new(session))
    }

    async fn connect_archive(&self, database: &str) -> Result<Box<dyn Connection>> {
        Ok(Box::new(MysqlSession::connect(&self.config, database).await?))
    }

    async fn create_database(&self, source: &dyn Connection, database: &str) -> Result<()> {
        create_database_with(&MysqlDialect::new(), source, database).await
    }
}
