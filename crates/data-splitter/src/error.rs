//! Error types for the archive library.

use thiserror::Error;

/// Main error type for archive operations.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Column or schema lookup failed for a table.
    #[error("Introspection failed for table {table}: {message}")]
    Introspection { table: String, message: String },

    /// The archive table could not be created.
    #[error("Failed to create archive table {table}: {message}")]
    SchemaApply { table: String, message: String },

    /// Every row of a batch failed to load.
    #[error("All {rows} rows failed to load for table {table}, year {year} at offset {offset}: {message}")]
    BatchExecution {
        table: String,
        year: i32,
        offset: u64,
        rows: usize,
        message: String,
    },

    /// Failure inside a batch that is not a row-level load error (select, scan).
    #[error("Batch at offset {offset} failed for table {table}, year {year}")]
    Batch {
        table: String,
        year: i32,
        offset: u64,
        #[source]
        source: Box<ArchiveError>,
    },

    /// Process-fatal error: the whole run must stop and exit non-zero.
    #[error("{0}")]
    Fatal(#[source] Box<ArchiveError>),

    /// Archive row count is lower than the source row count.
    #[error(
        "Validation failed for table {table}, year {year}: source has {source_count} rows, \
         archive has {archive_count} rows (expected at least {source_count})"
    )]
    Validation {
        table: String,
        year: i32,
        source_count: u64,
        archive_count: u64,
    },

    /// Connection error with context
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// A stage of a table-year failed.
    #[error("Stage '{stage}' failed for table {table}, year {year}")]
    Stage {
        stage: &'static str,
        table: String,
        year: i32,
        #[source]
        source: Box<ArchiveError>,
    },

    /// SQL error from a sqlx-backed connection (MySQL, PostgreSQL, SQLite).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// SQL error from a SQL Server connection.
    #[error("SQL Server error: {0}")]
    Mssql(#[from] tiberius::error::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ArchiveError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        ArchiveError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create an Introspection error
    pub fn introspection(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        ArchiveError::Introspection {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a SchemaApply error
    pub fn schema_apply(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        ArchiveError::SchemaApply {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Mark an error as process-fatal.
    pub fn fatal(inner: ArchiveError) -> Self {
        match inner {
            already @ ArchiveError::Fatal(_) => already,
            other => ArchiveError::Fatal(Box::new(other)),
        }
    }

    /// Attach stage context (table, year) to an error.
    pub fn stage(stage: &'static str, table: impl Into<String>, year: i32, source: ArchiveError) -> Self {
        ArchiveError::Stage {
            stage,
            table: table.into(),
            year,
            source: Box::new(source),
        }
    }

    /// Whether a [`ArchiveError::Fatal`] is present anywhere in this error's chain.
    pub fn is_fatal(&self) -> bool {
        match self {
            ArchiveError::Fatal(_) => true,
            ArchiveError::Stage { source, .. } | ArchiveError::Batch { source, .. } => {
                source.is_fatal()
            }
            _ => false,
        }
    }

    /// Innermost fatal error, if any, for the `FATAL:` report.
    pub fn fatal_cause(&self) -> Option<&ArchiveError> {
        match self {
            ArchiveError::Fatal(inner) => Some(inner),
            ArchiveError::Stage { source, .. } | ArchiveError::Batch { source, .. } => {
                source.fatal_cause()
            }
            _ => None,
        }
    }

    /// Stage of the outermost [`ArchiveError::Stage`] context, if any.
    pub fn failed_stage(&self) -> Option<&'static str> {
        match self {
            ArchiveError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// One-line message with every cause in the chain, joined by `: `.
    pub fn chain_message(&self) -> String {
        let mut output = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            output.push_str(": ");
            output.push_str(&err.to_string());
            source = err.source();
        }
        output
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            ArchiveError::Config(_) | ArchiveError::Yaml(_) => 2,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;
