//! PostgreSQL sessions over SQLx.
//!
//! Statements without parameters use the simple query protocol, so values
//! come back in text format. Decoding therefore goes through
//! `try_get_unchecked` for anything that is not a well-known type.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgRow};
use sqlx::query::Query;
use sqlx::{Column as _, Connection as _, Executor as _, Postgres, Row as _, TypeInfo as _, ValueRef as _};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::core::traits::{Connection, ConnectionProvider};
use crate::core::value::{Row, SqlNullType, SqlValue};
use crate::drivers::common::{create_database_with, SslMode};
use crate::error::{ArchiveError, Result};

use super::PostgresDialect;

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// A single PostgreSQL session.
pub struct PostgresSession {
    conn: Mutex<Option<PgConnection>>,
    database: String,
}

impl PostgresSession {
    /// Open a session on `database`.
    pub async fn connect(config: &DatabaseConfig, database: &str) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.effective_port())
            .username(&config.user)
            .password(&config.password)
            .database(database)
            .ssl_mode(SslMode::parse(config.ssl_mode.as_deref())?.postgres())
            .application_name("data-splitter");

        let conn = PgConnection::connect_with(&options).await.map_err(|e| {
            ArchiveError::connection(
                e,
                format!(
                    "connecting to PostgreSQL {}:{}/{}",
                    config.host,
                    config.effective_port(),
                    database
                ),
            )
        })?;

        info!(
            "Connected to PostgreSQL: {}:{}/{}",
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
        ArchiveError::connection(
            "connection is closed",
            format!("PostgreSQL {}", self.database),
        )
    }
}

#[async_trait]
impl Connection for PostgresSession {
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

        let rows: Vec<PgRow> = if params.is_empty() {
            conn.fetch_all(sql).await?
        } else {
            bind_all(sqlx::query(sql), params).fetch_all(&mut *conn).await?
        };
        rows.iter().map(convert_row).collect()
    }

    async fn close(&self) {
        if let Some(conn) = self.conn.lock().await.take() {
            if let Err(e) = conn.close().await {
                debug!("Error closing PostgreSQL connection to {}: {}", self.database, e);
            }
        }
    }
}

fn bind_all<'q>(mut query: PgQuery<'q>, params: &[SqlValue]) -> PgQuery<'q> {
    for value in params {
        query = bind_value(query, value);
    }
    query
}

fn bind_value<'q>(query: PgQuery<'q>, value: &SqlValue) -> PgQuery<'q> {
    match value {
        SqlValue::Null(t) => match t {
            SqlNullType::Bool => query.bind(None::<bool>),
            SqlNullType::I16 => query.bind(None::<i16>),
            SqlNullType::I32 => query.bind(None::<i32>),
            SqlNullType::I64 => query.bind(None::<i64>),
            SqlNullType::F32 => query.bind(None::<f32>),
            SqlNullType::F64 => query.bind(None::<f64>),
            SqlNullType::String => query.bind(None::<String>),
            SqlNullType::Bytes => query.bind(None::<Vec<u8>>),
            SqlNullType::Uuid => query.bind(None::<Uuid>),
            SqlNullType::Decimal => query.bind(None::<Decimal>),
            SqlNullType::Json => query.bind(None::<serde_json::Value>),
            SqlNullType::DateTime => query.bind(None::<NaiveDateTime>),
            SqlNullType::DateTimeOffset => query.bind(None::<DateTime<FixedOffset>>),
            SqlNullType::Date => query.bind(None::<NaiveDate>),
            SqlNullType::Time => query.bind(None::<NaiveTime>),
        },
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::I16(v) => query.bind(*v),
        SqlValue::I32(v) => query.bind(*v),
        SqlValue::I64(v) => query.bind(*v),
        // PostgreSQL has no unsigned types; numeric holds the full range
        SqlValue::U64(v) => query.bind(Decimal::from(*v)),
        SqlValue::F32(v) => query.bind(*v),
        SqlValue::F64(v) => query.bind(*v),
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Bytes(b) => query.bind(b.clone()),
        SqlValue::Uuid(u) => query.bind(*u),
        SqlValue::Decimal(d) => query.bind(*d),
        SqlValue::Json(j) => query.bind(j.clone()),
        SqlValue::DateTime(dt) => query.bind(*dt),
        SqlValue::DateTimeOffset(dt) => query.bind(*dt),
        SqlValue::Date(d) => query.bind(*d),
        SqlValue::Time(t) => query.bind(*t),
    }
}

fn convert_row(row: &PgRow) -> Result<Row> {
    let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = (0..columns.len())
        .map(|i| decode_value(row, i))
        .collect::<Result<Vec<_>>>()?;
    Ok(Row::new(columns, values))
}

fn decode_value(row: &PgRow, i: usize) -> Result<SqlValue> {
    let (type_name, is_null) = {
        let raw = row.try_get_raw(i)?;
        (raw.type_info().name().to_uppercase(), raw.is_null())
    };
    if is_null {
        return Ok(SqlValue::Null(null_type_for(&type_name)));
    }

    let value = match type_name.as_str() {
        "BOOL" => SqlValue::Bool(row.try_get::<bool, _>(i)?),
        "INT2" => SqlValue::I16(row.try_get::<i16, _>(i)?),
        "INT4" => SqlValue::I32(row.try_get::<i32, _>(i)?),
        "INT8" => SqlValue::I64(row.try_get::<i64, _>(i)?),
        "FLOAT4" => SqlValue::F32(row.try_get::<f32, _>(i)?),
        "FLOAT8" => SqlValue::F64(row.try_get::<f64, _>(i)?),
        "NUMERIC" => SqlValue::Decimal(row.try_get::<Decimal, _>(i)?),
        "UUID" => SqlValue::Uuid(row.try_get::<Uuid, _>(i)?),
        "JSON" | "JSONB" => SqlValue::Json(row.try_get::<serde_json::Value, _>(i)?),
        "BYTEA" => SqlValue::Bytes(row.try_get::<Vec<u8>, _>(i)?),
        "DATE" => SqlValue::Date(row.try_get::<NaiveDate, _>(i)?),
        "TIME" => SqlValue::Time(row.try_get::<NaiveTime, _>(i)?),
        "TIMESTAMP" => SqlValue::DateTime(row.try_get::<NaiveDateTime, _>(i)?),
        "TIMESTAMPTZ" => SqlValue::DateTimeOffset(row.try_get::<DateTime<FixedOffset>, _>(i)?),
        // Enums, domains, arrays and the like arrive as text
        _ => SqlValue::Text(row.try_get_unchecked::<String, _>(i)?),
    };
    Ok(value)
}

fn null_type_for(type_name: &str) -> SqlNullType {
    match type_name {
        "BOOL" => SqlNullType::Bool,
        "INT2" => SqlNullType::I16,
        "INT4" => SqlNullType::I32,
        "INT8" => SqlNullType::I64,
        "FLOAT4" => SqlNullType::F32,
        "FLOAT8" => SqlNullType::F64,
        "NUMERIC" => SqlNullType::Decimal,
        "UUID" => SqlNullType::Uuid,
        "JSON" | "JSONB" => SqlNullType::Json,
        "BYTEA" => SqlNullType::Bytes,
        "DATE" => SqlNullType::Date,
        "TIME" => SqlNullType::Time,
        "TIMESTAMP" => SqlNullType::DateTime,
        "TIMESTAMPTZ" => SqlNullType::DateTimeOffset,
        _ => SqlNullType::String,
    }
}

/// Opens PostgreSQL sessions for the configured server.
pub struct PostgresProvider {
    config: DatabaseConfig,
}

impl PostgresProvider {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionProvider for PostgresProvider {
    async fn connect_source(&self) -> Result<Box<dyn Connection>> {
        let session = PostgresSession::connect(&self.config, &self.config.source_db).await?;
        Ok(Box::new(session))
    }

    async fn connect_archive(&self, database: &str) -> Result<Box<dyn Connection>> {
        Ok(Box::new(PostgresSession::connect(&self.config, database).await?))
    }

    async fn create_database(&self, source: &dyn Connection, database: &str) -> Result<()> {
        // CREATE DATABASE has no IF NOT EXISTS form
        let existing = source
            .query(
                "SELECT 1 FROM pg_database WHERE datname = $1",
                &[SqlValue::from(database)],
            )
            .await?;
        if !existing.is_empty() {
            debug!("Archive database {} already exists", database);
            return Ok(());
        }
        create_database_with(&PostgresDialect::new(), source, database).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_types_keep_column_type() {
        assert_eq!(null_type_for("INT4"), SqlNullType::I32);
        assert_eq!(null_type_for("TIMESTAMPTZ"), SqlNullType::DateTimeOffset);
        assert_eq!(null_type_for("JSONB"), SqlNullType::Json);
        assert_eq!(null_type_for("CITEXT"), SqlNullType::String);
    }
}
