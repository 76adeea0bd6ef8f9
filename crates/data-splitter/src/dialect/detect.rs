//! Engine detection by version probing.

use tracing::{debug, warn};

use crate::core::traits::Connection;

use super::DialectKind;

/// Version probes, tried in order until one returns a row.
const VERSION_PROBES: [(&str, Probe); 3] = [
    ("SELECT version()", Probe::Generic),
    ("SELECT sqlite_version()", Probe::Sqlite),
    ("SELECT @@VERSION", Probe::Generic),
];

#[derive(Debug, Clone, Copy)]
enum Probe {
    Generic,
    /// Any answer to this probe means SQLite, whatever the string says.
    Sqlite,
}

/// Detect the engine family behind a connection.
///
/// Never fails: if no probe answers, the connection is assumed to be MySQL,
/// which keeps the MySQL-family constraint handling.
pub async fn detect_dialect(conn: &dyn Connection) -> DialectKind {
    for (sql, probe) in VERSION_PROBES {
        match conn.query(sql, &[]).await {
            Ok(rows) => {
                let Some(version) = rows.first().and_then(|r| r.get_text(0)) else {
                    continue;
                };
                let kind = match probe {
                    Probe::Sqlite => DialectKind::Sqlite,
                    Probe::Generic => DialectKind::from_version(&version),
                };
                debug!("Detected database dialect {} (version: {})", kind, version);
                return kind;
            }
            Err(e) => debug!("Version probe '{}' failed: {}", sql, e),
        }
    }

    warn!("Failed to detect database type, defaulting to mysql");
    DialectKind::Mysql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConnection;

    #[tokio::test]
    async fn test_detects_postgres_from_version() {
        let conn = MockConnection::new().with_version("PostgreSQL 16.1 on aarch64");
        assert_eq!(detect_dialect(&conn).await, DialectKind::Postgresql);
    }

    #[tokio::test]
    async fn test_sqlite_probe_wins_when_version_fails() {
        let conn = MockConnection::new()
            .failing_on("SELECT version()")
            .with_probe_answer("SELECT sqlite_version()", "3.45.1");
        assert_eq!(detect_dialect(&conn).await, DialectKind::Sqlite);
    }

    #[tokio::test]
    async fn test_sql_server_answers_last_probe() {
        let conn = MockConnection::new()
            .failing_on("SELECT version()")
            .failing_on("SELECT sqlite_version()")
            .with_probe_answer("SELECT @@VERSION", "Microsoft SQL Server 2019");
        assert_eq!(detect_dialect(&conn).await, DialectKind::Sqlserver);
    }

    #[tokio::test]
    async fn test_defaults_to_mysql_when_every_probe_fails() {
        let conn = MockConnection::new()
            .failing_on("SELECT version()")
            .failing_on("SELECT sqlite_version()")
            .failing_on("SELECT @@VERSION");
        assert_eq!(detect_dialect(&conn).await, DialectKind::Mysql);
    }
}
