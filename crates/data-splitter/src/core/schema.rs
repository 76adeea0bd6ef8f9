//! Column metadata used to build archive queries.

use serde::{Deserialize, Serialize};

/// Key marker for primary key columns, as reported by MySQL `DESCRIBE`.
pub const PRIMARY_KEY: &str = "PRI";

/// Describes one source column: the `DESCRIBE` view of a table.
///
/// Every dialect's catalog query is normalized to this shape, so a PostgreSQL
/// or SQL Server primary key column also carries `key == "PRI"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub field: String,
    /// Declared SQL type, e.g. `varchar(255)` or `bigint unsigned`.
    pub sql_type: String,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Key marker (`PRI`, `UNI`, `MUL` or empty).
    pub key: String,
    /// Default expression, if any.
    pub default: Option<String>,
    /// Extra attributes (`auto_increment`, `identity`, ...).
    pub extra: String,
}

impl ColumnInfo {
    /// Convenience constructor for a nullable, non-key column.
    pub fn new(field: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            sql_type: sql_type.into(),
            nullable: true,
            key: String::new(),
            default: None,
            extra: String::new(),
        }
    }

    /// Mark this column as part of the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.key = PRIMARY_KEY.to_string();
        self.nullable = false;
        self
    }

    /// Whether this column belongs to the primary key.
    pub fn is_primary_key(&self) -> bool {
        self.key == PRIMARY_KEY
    }

    /// Text-like or blob-like columns whose empty values are archived as NULL.
    pub fn is_text_like(&self) -> bool {
        let t = self.sql_type.to_ascii_lowercase();
        t.contains("text") || t.contains("blob")
    }
}

/// Primary key columns of a column list, in declaration order.
pub fn primary_key_columns(columns: &[ColumnInfo]) -> Vec<&ColumnInfo> {
    columns.iter().filter(|c| c.is_primary_key()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_like_detection() {
        assert!(ColumnInfo::new("note", "text").is_text_like());
        assert!(ColumnInfo::new("note", "MEDIUMTEXT").is_text_like());
        assert!(ColumnInfo::new("payload", "longblob").is_text_like());
        assert!(ColumnInfo::new("body", "ntext").is_text_like());
        assert!(!ColumnInfo::new("name", "varchar(255)").is_text_like());
        assert!(!ColumnInfo::new("id", "bigint").is_text_like());
    }

    #[test]
    fn test_primary_key_columns() {
        let cols = vec![
            ColumnInfo::new("id", "bigint").primary_key(),
            ColumnInfo::new("name", "varchar(50)"),
            ColumnInfo::new("tenant", "int").primary_key(),
        ];
        let pk: Vec<&str> = primary_key_columns(&cols)
            .iter()
            .map(|c| c.field.as_str())
            .collect();
        assert_eq!(pk, vec!["id", "tenant"]);
        assert!(!cols[0].nullable);
    }
}
