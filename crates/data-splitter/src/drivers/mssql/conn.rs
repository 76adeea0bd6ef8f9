//! SQL Server sessions over Tiberius.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tiberius::{AuthMethod, Client, ColumnData, Config, FromSql, Query};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::core::traits::{Connection, ConnectionProvider};
use crate::core::value::{Row, SqlNullType, SqlValue};
use crate::drivers::common::{create_database_with, SslMode};
use crate::error::{ArchiveError, Result};

use super::MssqlDialect;

/// Maximum TDS packet size (32767 bytes).
const TDS_MAX_PACKET_SIZE: u32 = 32767;

type MssqlClient = Client<Compat<TcpStream>>;

/// A single SQL Server session.
pub struct MssqlSession {
    client: Mutex<Option<MssqlClient>>,
    database: String,
}

impl MssqlSession {
    /// Open a session on `database`.
    pub async fn connect(config: &DatabaseConfig, database: &str) -> Result<Self> {
        let ssl_mode = SslMode::parse(config.ssl_mode.as_deref())?;

        let mut tds = Config::new();
        tds.host(&config.host);
        tds.port(config.effective_port());
        tds.database(database);
        tds.authentication(AuthMethod::sql_server(&config.user, &config.password));
        tds.encryption(ssl_mode.mssql());
        if !ssl_mode.requires_tls() {
            tds.trust_cert();
        }
        tds.packet_size(TDS_MAX_PACKET_SIZE);

        let context = format!(
            "connecting to SQL Server {}:{}/{}",
            config.host,
            config.effective_port(),
            database
        );
        let tcp = TcpStream::connect(tds.get_addr())
            .await
            .map_err(|e| ArchiveError::connection(e, context.clone()))?;
        tcp.set_nodelay(true).ok();

        let client = Client::connect(tds, tcp.compat_write())
            .await
            .map_err(|e| ArchiveError::connection(e, context))?;

        info!(
            "Connected to SQL Server: {}:{}/{}",
            config.host,
            config.effective_port(),
            database
        );

        Ok(Self {
            client: Mutex::new(Some(client)),
            database: database.to_string(),
        })
    }

    fn closed(&self) -> ArchiveError {
        ArchiveError::connection(
            "connection is closed",
            format!("SQL Server {}", self.database),
        )
    }
}

#[async_trait]
impl Connection for MssqlSession {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or_else(|| self.closed())?;

        let result = if params.is_empty() {
            client.execute(sql, &[]).await?
        } else {
            build_query(sql, params).execute(client).await?
        };
        Ok(result.rows_affected().iter().sum())
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or_else(|| self.closed())?;

        let rows = if params.is_empty() {
            client.simple_query(sql).await?.into_first_result().await?
        } else {
            build_query(sql, params)
                .query(client)
                .await?
                .into_first_result()
                .await?
        };
        rows.into_iter().map(convert_row).collect()
    }

    async fn close(&self) {
        if let Some(client) = self.client.lock().await.take() {
            if let Err(e) = client.close().await {
                debug!("Error closing SQL Server connection to {}: {}", self.database, e);
            }
        }
    }
}

fn build_query<'a>(sql: &'a str, params: &[SqlValue]) -> Query<'a> {
    let mut query = Query::new(sql);
    for value in params {
        bind_value(&mut query, value);
    }
    query
}

fn bind_value(query: &mut Query<'_>, value: &SqlValue) {
    match value {
        SqlValue::Null(t) => match t {
            SqlNullType::Bool => query.bind(None::<bool>),
            SqlNullType::I16 => query.bind(None::<i16>),
            SqlNullType::I32 => query.bind(None::<i32>),
            SqlNullType::I64 => query.bind(None::<i64>),
            SqlNullType::F32 => query.bind(None::<f32>),
            SqlNullType::F64 => query.bind(None::<f64>),
            SqlNullType::Bytes => query.bind(None::<Vec<u8>>),
            SqlNullType::Uuid => query.bind(None::<uuid::Uuid>),
            SqlNullType::Decimal => query.bind(None::<Decimal>),
            SqlNullType::DateTime => query.bind(None::<NaiveDateTime>),
            SqlNullType::DateTimeOffset => query.bind(None::<DateTime<FixedOffset>>),
            SqlNullType::Date => query.bind(None::<NaiveDate>),
            SqlNullType::Time => query.bind(None::<NaiveTime>),
            SqlNullType::String | SqlNullType::Json => query.bind(None::<String>),
        },
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::I16(v) => query.bind(*v),
        SqlValue::I32(v) => query.bind(*v),
        SqlValue::I64(v) => query.bind(*v),
        SqlValue::U64(v) => query.bind(Decimal::from(*v)),
        SqlValue::F32(v) => query.bind(*v),
        SqlValue::F64(v) => query.bind(*v),
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Bytes(b) => query.bind(b.clone()),
        SqlValue::Uuid(u) => query.bind(*u),
        SqlValue::Decimal(d) => query.bind(*d),
        SqlValue::Json(j) => query.bind(j.to_string()),
        SqlValue::DateTime(dt) => query.bind(*dt),
        SqlValue::DateTimeOffset(dt) => query.bind(*dt),
        SqlValue::Date(d) => query.bind(*d),
        SqlValue::Time(t) => query.bind(*t),
    }
}

fn convert_row(row: tiberius::Row) -> Result<Row> {
    let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = row
        .into_iter()
        .map(|data| convert_data(&data))
        .collect::<Result<Vec<_>>>()?;
    Ok(Row::new(columns, values))
}

fn convert_data(data: &ColumnData<'static>) -> Result<SqlValue> {
    let value = match data {
        ColumnData::U8(v) => v.map(|v| SqlValue::I16(i16::from(v))),
        ColumnData::I16(v) => v.map(SqlValue::I16),
        ColumnData::I32(v) => v.map(SqlValue::I32),
        ColumnData::I64(v) => v.map(SqlValue::I64),
        ColumnData::F32(v) => v.map(SqlValue::F32),
        ColumnData::F64(v) => v.map(SqlValue::F64),
        ColumnData::Bit(v) => v.map(SqlValue::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| SqlValue::Text(s.to_string())),
        ColumnData::Guid(v) => v.map(SqlValue::Uuid),
        ColumnData::Binary(v) => v.as_ref().map(|b| SqlValue::Bytes(b.to_vec())),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|x| SqlValue::Text(x.clone().into_owned().into_string())),
        ColumnData::Numeric(_) => Decimal::from_sql(data)?.map(SqlValue::Decimal),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)?.map(SqlValue::DateTime)
        }
        ColumnData::Date(_) => NaiveDate::from_sql(data)?.map(SqlValue::Date),
        ColumnData::Time(_) => NaiveTime::from_sql(data)?.map(SqlValue::Time),
        ColumnData::DateTimeOffset(_) => {
            DateTime::<FixedOffset>::from_sql(data)?.map(SqlValue::DateTimeOffset)
        }
    };
    Ok(value.unwrap_or_else(|| SqlValue::Null(null_type_for(data))))
}

fn null_type_for(data: &ColumnData<'_>) -> SqlNullType {
    match data {
        ColumnData::U8(_) | ColumnData::I16(_) => SqlNullType::I16,
        ColumnData::I32(_) => SqlNullType::I32,
        ColumnData::I64(_) => SqlNullType::I64,
        ColumnData::F32(_) => SqlNullType::F32,
        ColumnData::F64(_) => SqlNullType::F64,
        ColumnData::Bit(_) => SqlNullType::Bool,
        ColumnData::Guid(_) => SqlNullType::Uuid,
        ColumnData::Binary(_) => SqlNullType::Bytes,
        ColumnData::Numeric(_) => SqlNullType::Decimal,
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            SqlNullType::DateTime
        }
        ColumnData::Date(_) => SqlNullType::Date,
        ColumnData::Time(_) => SqlNullType::Time,
        ColumnData::DateTimeOffset(_) => SqlNullType::DateTimeOffset,
        ColumnData::String(_) | ColumnData::Xml(_) => SqlNullType::String,
    }
}

/// Opens SQL Server sessions for the configured server.
pub struct MssqlProvider {
    config: DatabaseConfig,
}

impl MssqlProvider {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionProvider for MssqlProvider {
    async fn connect_source(&self) -> Result<Box<dyn Connection>> {
        let session = MssqlSession::connect(&self.config, &self.config.source_db).await?;
        Ok(Box::new(session))
    }

    async fn connect_archive(&self, database: &str) -> Result<Box<dyn Connection>> {
        Ok(Box::new(MssqlSession::connect(&self.config, database).await?))
    }

    async fn create_database(&self, source: &dyn Connection, database: &str) -> Result<()> {
        create_database_with(&MssqlDialect::new(), source, database).await
    }
}
