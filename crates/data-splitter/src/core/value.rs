//! SQL value types for database-agnostic row transfer.
//!
//! Rows read from the source are decoded into owned [`SqlValue`]s so they can
//! be bound as parameters on the archive connection regardless of driver.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Type hint for NULL values.
///
/// PostgreSQL rejects untyped NULL parameters for some column types, so a NULL
/// keeps the type of the column it was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlNullType {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Uuid,
    Decimal,
    Json,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
}

/// Owned SQL value for parameter binding and result decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL with type hint.
    Null(SqlNullType),

    /// Boolean value.
    Bool(bool),

    /// 16-bit signed integer (smallint).
    I16(i16),

    /// 32-bit signed integer (int).
    I32(i32),

    /// 64-bit signed integer (bigint).
    I64(i64),

    /// 64-bit unsigned integer (MySQL `BIGINT UNSIGNED`).
    U64(u64),

    /// 32-bit floating point (real/float4).
    F32(f32),

    /// 64-bit floating point (double precision/float8).
    F64(f64),

    /// Text/string data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// UUID/GUID value.
    Uuid(Uuid),

    /// Decimal value with arbitrary precision.
    Decimal(Decimal),

    /// JSON document.
    Json(serde_json::Value),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Get the SqlNullType for this value.
    #[must_use]
    pub fn null_type(&self) -> SqlNullType {
        match self {
            SqlValue::Null(t) => *t,
            SqlValue::Bool(_) => SqlNullType::Bool,
            SqlValue::I16(_) => SqlNullType::I16,
            SqlValue::I32(_) => SqlNullType::I32,
            SqlValue::I64(_) | SqlValue::U64(_) => SqlNullType::I64,
            SqlValue::F32(_) => SqlNullType::F32,
            SqlValue::F64(_) => SqlNullType::F64,
            SqlValue::Text(_) => SqlNullType::String,
            SqlValue::Bytes(_) => SqlNullType::Bytes,
            SqlValue::Uuid(_) => SqlNullType::Uuid,
            SqlValue::Decimal(_) => SqlNullType::Decimal,
            SqlValue::Json(_) => SqlNullType::Json,
            SqlValue::DateTime(_) => SqlNullType::DateTime,
            SqlValue::DateTimeOffset(_) => SqlNullType::DateTimeOffset,
            SqlValue::Date(_) => SqlNullType::Date,
            SqlValue::Time(_) => SqlNullType::Time,
        }
    }

    /// Interpret the value as a signed integer (row counts, flags).
    ///
    /// Text and binary values are parsed, since some catalogs return numbers
    /// as strings.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Bool(v) => Some(i64::from(*v)),
            SqlValue::I16(v) => Some(i64::from(*v)),
            SqlValue::I32(v) => Some(i64::from(*v)),
            SqlValue::I64(v) => Some(*v),
            SqlValue::U64(v) => i64::try_from(*v).ok(),
            SqlValue::Decimal(v) => v.trunc().to_string().parse().ok(),
            SqlValue::Text(s) => s.trim().parse().ok(),
            SqlValue::Bytes(b) => std::str::from_utf8(b).ok()?.trim().parse().ok(),
            _ => None,
        }
    }

    /// Interpret the value as text.
    ///
    /// Binary values are accepted when they hold valid UTF-8: MySQL returns
    /// several catalog columns (`SHOW CREATE TABLE`, `COLUMN_TYPE`) as blobs.
    pub fn as_text(&self) -> Option<String> {
        match self {
            SqlValue::Null(_) => None,
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Bytes(b) => String::from_utf8(b.clone()).ok(),
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null(_) => write!(f, "NULL"),
            SqlValue::Bool(v) => write!(f, "{v}"),
            SqlValue::I16(v) => write!(f, "{v}"),
            SqlValue::I32(v) => write!(f, "{v}"),
            SqlValue::I64(v) => write!(f, "{v}"),
            SqlValue::U64(v) => write!(f, "{v}"),
            SqlValue::F32(v) => write!(f, "{v}"),
            SqlValue::F64(v) => write!(f, "{v}"),
            SqlValue::Text(v) => write!(f, "{v}"),
            SqlValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            SqlValue::Uuid(v) => write!(f, "{v}"),
            SqlValue::Decimal(v) => write!(f, "{v}"),
            SqlValue::Json(v) => write!(f, "{v}"),
            SqlValue::DateTime(v) => write!(f, "{v}"),
            SqlValue::DateTimeOffset(v) => write!(f, "{v}"),
            SqlValue::Date(v) => write!(f, "{v}"),
            SqlValue::Time(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null(SqlNullType::String))
    }
}

/// A single result row: column names plus values in projection order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Create a row from parallel column-name and value vectors.
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Column names in projection order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in projection order.
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Consume the row, returning its values.
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at a column index.
    pub fn get(&self, idx: usize) -> Option<&SqlValue> {
        self.values.get(idx)
    }

    /// Value by column name (case-insensitive).
    pub fn get_named(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|idx| self.values.get(idx))
    }

    /// Text at a column index; `None` for NULL or out of range.
    pub fn get_text(&self, idx: usize) -> Option<String> {
        self.get(idx).and_then(SqlValue::as_text)
    }

    /// Integer at a column index; `None` for NULL, out of range or non-numeric.
    pub fn get_i64(&self, idx: usize) -> Option<i64> {
        self.get(idx).and_then(SqlValue::as_i64)
    }
}
