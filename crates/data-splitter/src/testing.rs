//! In-memory connections for unit tests.
//!
//! [`MockConnection`] understands the statements the MySQL dialect emits for
//! a single year-partitioned table: catalog lookups, counts, paginated
//! selects (including `NULLIF` projections), upserts and deletes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Datelike;

use crate::core::schema::ColumnInfo;
use crate::core::traits::{Connection, ConnectionProvider};
use crate::core::value::{Row, SqlNullType, SqlValue};
use crate::error::{ArchiveError, Result};

type RowPredicate = Box<dyn Fn(&[SqlValue]) -> bool + Send + Sync>;

#[derive(Default)]
struct MockState {
    version: Option<String>,
    probe_answers: HashMap<String, String>,
    failing: HashSet<String>,
    columns: Vec<ColumnInfo>,
    split_index: usize,
    create_statement: Option<String>,
    table_exists: bool,
    rows: Vec<Vec<SqlValue>>,
    fail_row: Option<RowPredicate>,
    executed: Vec<String>,
    queries: Vec<String>,
    closed: bool,
}

/// Scriptable single-table database.
#[derive(Default)]
pub struct MockConnection {
    state: Mutex<MockState>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty archive-side copy of a source: same columns, no rows, no table.
    pub fn archive_like(source: &MockConnection) -> Self {
        let src = source.lock();
        let conn = Self::new();
        {
            let mut state = conn.lock();
            state.version = src.version.clone();
            state.columns = src.columns.clone();
            state.split_index = src.split_index;
        }
        conn
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_version(self, version: &str) -> Self {
        self.lock().version = Some(version.to_string());
        self
    }

    pub fn with_probe_answer(self, sql: &str, answer: &str) -> Self {
        self.lock()
            .probe_answers
            .insert(sql.to_string(), answer.to_string());
        self
    }

    /// Make an exact statement fail, for both `query` and `execute`.
    pub fn failing_on(self, sql: &str) -> Self {
        self.lock().failing.insert(sql.to_string());
        self
    }

    /// Declare the table's columns; `split_index` is the date column.
    pub fn with_table(self, columns: Vec<ColumnInfo>, split_index: usize) -> Self {
        {
            let mut state = self.lock();
            state.columns = columns;
            state.split_index = split_index;
            state.table_exists = true;
        }
        self
    }

    pub fn with_rows(self, rows: Vec<Vec<SqlValue>>) -> Self {
        self.lock().rows = rows;
        self
    }

    pub fn with_create_statement(self, ddl: &str) -> Self {
        self.lock().create_statement = Some(ddl.to_string());
        self
    }

    pub fn with_existing_table(self) -> Self {
        self.lock().table_exists = true;
        self
    }

    /// Fail upserts whose bound parameters match `predicate`.
    pub fn failing_rows(self, predicate: impl Fn(&[SqlValue]) -> bool + Send + Sync + 'static) -> Self {
        self.lock().fail_row = Some(Box::new(predicate));
        self
    }

    /// Every statement passed to `execute`, in order.
    pub fn executed_statements(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    /// Every statement passed to `query`, in order.
    pub fn queries(&self) -> Vec<String> {
        self.lock().queries.clone()
    }

    pub fn rows(&self) -> Vec<Vec<SqlValue>> {
        self.lock().rows.clone()
    }

    pub fn row_count(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn table_exists(&self) -> bool {
        self.lock().table_exists
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn fail(sql: &str) -> ArchiveError {
        ArchiveError::connection(format!("mock failure for: {sql}"), "MockConnection")
    }
}

fn row_year(split_index: usize, row: &[SqlValue]) -> Option<i32> {
    match row.get(split_index)? {
        SqlValue::Date(d) => Some(d.year()),
        SqlValue::DateTime(dt) => Some(dt.year()),
        SqlValue::Text(s) => s.get(..4)?.parse().ok(),
        _ => None,
    }
}

/// Year from a `YEAR(`col`) = 2022` predicate.
fn parse_year(sql: &str) -> Option<i32> {
    let start = sql.find("YEAR(")?;
    let rest = &sql[start..];
    let eq = rest.find(") = ")?;
    let digits: String = rest[eq + 4..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn parse_number_after(sql: &str, keyword: &str) -> Option<usize> {
    let pos = sql.find(keyword)?;
    sql[pos + keyword.len()..]
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}

fn describe_row(col: &ColumnInfo) -> Row {
    Row::new(
        ["Field", "Type", "Null", "Key", "Default", "Extra"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        vec![
            SqlValue::from(col.field.as_str()),
            // MySQL 8 returns some catalog columns as binary
            SqlValue::Bytes(col.sql_type.clone().into_bytes()),
            SqlValue::from(if col.nullable { "YES" } else { "NO" }),
            SqlValue::from(col.key.as_str()),
            col.default
                .clone()
                .map(SqlValue::Text)
                .unwrap_or(SqlValue::Null(SqlNullType::String)),
            SqlValue::from(col.extra.as_str()),
        ],
    )
}

fn count_row(n: usize) -> Vec<Row> {
    vec![Row::new(vec!["COUNT(*)".into()], vec![SqlValue::I64(n as i64)])]
}

#[async_trait]
impl Connection for MockConnection {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let mut state = self.lock();
        state.executed.push(sql.to_string());
        if state.closed || state.failing.contains(sql) {
            return Err(Self::fail(sql));
        }

        if sql.starts_with("CREATE TABLE") {
            state.table_exists = true;
            return Ok(0);
        }
        if sql.starts_with("CREATE DATABASE") {
            return Ok(1);
        }
        if sql.starts_with("INSERT") {
            if state.fail_row.as_ref().is_some_and(|f| f(params)) {
                return Err(ArchiveError::connection("duplicate entry", "MockConnection"));
            }
            let key = params.first().cloned();
            let existing = state.rows.iter().position(|r| r.first().cloned() == key);
            return Ok(match existing {
                Some(idx) if state.rows[idx] == params => 0,
                Some(idx) => {
                    state.rows[idx] = params.to_vec();
                    2
                }
                None => {
                    state.rows.push(params.to_vec());
                    1
                }
            });
        }
        if sql.starts_with("DELETE") {
            let year = parse_year(sql);
            let split = state.split_index;
            let before = state.rows.len();
            state.rows.retain(|r| row_year(split, r) != year);
            return Ok((before - state.rows.len()) as u64);
        }
        Ok(0)
    }

    async fn query(&self, sql: &str, _params: &[SqlValue]) -> Result<Vec<Row>> {
        let mut state = self.lock();
        state.queries.push(sql.to_string());
        if state.closed || state.failing.contains(sql) {
            return Err(Self::fail(sql));
        }

        if sql == "SELECT version()" {
            return match &state.version {
                Some(v) => Ok(vec![Row::new(vec!["version()".into()], vec![SqlValue::from(v.as_str())])]),
                None => Err(Self::fail(sql)),
            };
        }
        if let Some(answer) = state.probe_answers.get(sql) {
            return Ok(vec![Row::new(vec!["version".into()], vec![SqlValue::from(answer.as_str())])]);
        }
        if sql.contains("INFORMATION_SCHEMA.COLUMNS") {
            return Ok(state.columns.iter().map(describe_row).collect());
        }
        if sql.starts_with("SHOW CREATE TABLE") {
            return match &state.create_statement {
                Some(ddl) => Ok(vec![Row::new(
                    vec!["Table".into(), "Create Table".into()],
                    vec![SqlValue::from("t"), SqlValue::from(ddl.as_str())],
                )]),
                None => Err(Self::fail(sql)),
            };
        }
        if sql.starts_with("SELECT COUNT(*) FROM information_schema.tables") {
            return Ok(count_row(usize::from(state.table_exists)));
        }
        if sql.starts_with("SELECT COUNT(*)") {
            let year = parse_year(sql);
            let split = state.split_index;
            let n = state
                .rows
                .iter()
                .filter(|r| row_year(split, r) == year)
                .count();
            return Ok(count_row(n));
        }
        if sql.starts_with("SELECT ") && sql.contains(" LIMIT ") {
            let year = parse_year(sql);
            let split = state.split_index;
            let limit = parse_number_after(sql, " LIMIT ").unwrap_or(usize::MAX);
            let offset = parse_number_after(sql, " OFFSET ").unwrap_or(0);
            let names: Vec<String> = state.columns.iter().map(|c| c.field.clone()).collect();
            let nullify: Vec<bool> = state
                .columns
                .iter()
                .map(|c| sql.contains(&format!("NULLIF(`{}`", c.field)))
                .collect();

            let rows = state
                .rows
                .iter()
                .filter(|r| row_year(split, r) == year)
                .skip(offset)
                .take(limit)
                .map(|r| {
                    let values = r
                        .iter()
                        .zip(&nullify)
                        .map(|(v, &nullify)| match v {
                            SqlValue::Text(s) if nullify && s.is_empty() => {
                                SqlValue::Null(SqlNullType::String)
                            }
                            SqlValue::Bytes(b) if nullify && b.is_empty() => {
                                SqlValue::Null(SqlNullType::Bytes)
                            }
                            other => other.clone(),
                        })
                        .collect();
                    Row::new(names.clone(), values)
                })
                .collect();
            return Ok(rows);
        }

        Err(Self::fail(sql))
    }

    async fn close(&self) {
        self.lock().closed = true;
    }
}

#[async_trait]
impl Connection for Arc<MockConnection> {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        (**self).execute(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        (**self).query(sql, params).await
    }

    async fn close(&self) {
        (**self).close().await
    }
}

/// Provider handing out shared mock connections.
///
/// Archive databases exist only after [`MockProvider::with_archive`] or a
/// successful [`ConnectionProvider::create_database`].
pub struct MockProvider {
    source: Arc<MockConnection>,
    archives: Mutex<HashMap<String, Arc<MockConnection>>>,
    created: Mutex<Vec<String>>,
    connects: AtomicUsize,
}

impl MockProvider {
    pub fn new(source: MockConnection) -> Self {
        Self {
            source: Arc::new(source),
            archives: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
        }
    }

    /// Register an existing (empty) archive database.
    pub fn with_archive(self, database: &str) -> Self {
        let archive = Arc::new(MockConnection::archive_like(&self.source));
        self.archives
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(database.to_string(), archive);
        self
    }

    /// Register a scripted archive database.
    pub fn with_archive_connection(self, database: &str, conn: MockConnection) -> Self {
        self.archives
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(database.to_string(), Arc::new(conn));
        self
    }

    pub fn source(&self) -> Arc<MockConnection> {
        Arc::clone(&self.source)
    }

    pub fn archive(&self, database: &str) -> Option<Arc<MockConnection>> {
        self.archives
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(database)
            .cloned()
    }

    /// Databases created through [`ConnectionProvider::create_database`].
    pub fn created_databases(&self) -> Vec<String> {
        self.created.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of connections opened (source and archive).
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionProvider for MockProvider {
    async fn connect_source(&self) -> Result<Box<dyn Connection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Arc::clone(&self.source)))
    }

    async fn connect_archive(&self, database: &str) -> Result<Box<dyn Connection>> {
        let archive = self.archive(database).ok_or_else(|| {
            ArchiveError::connection(
                format!("Unknown database '{database}'"),
                "MockProvider::connect_archive",
            )
        })?;
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(archive))
    }

    async fn create_database(&self, source: &dyn Connection, database: &str) -> Result<()> {
        source
            .execute(&format!("CREATE DATABASE IF NOT EXISTS `{database}`"), &[])
            .await?;
        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(database.to_string());
        let archive = Arc::new(MockConnection::archive_like(&self.source));
        self.archives
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(database.to_string())
            .or_insert(archive);
        Ok(())
    }
}
