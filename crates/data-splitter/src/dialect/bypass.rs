//! Constraint suspension around bulk loads.
//!
//! Archive tables are loaded row by row in primary key order, which can
//! violate foreign keys or check constraints that only hold once the whole
//! year is present. Each engine family has its own session-level switch.
//! Suspension and restoration are best-effort: failures are logged and the
//! load proceeds.

use tracing::{debug, info, warn};

use crate::core::traits::Connection;

use super::DialectKind;

/// How constraint checking is relaxed for a given engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassStrategy {
    /// PostgreSQL: run as a replica so triggers and FK checks are skipped.
    ReplicaRole,
    /// SQLite: toggle `PRAGMA foreign_keys`.
    ForeignKeyPragma,
    /// SQL Server: no session switch; per-row failures are tolerated instead.
    RowTolerant,
    /// MySQL family and anything unrecognized.
    CheckConstraintChecks,
}

impl BypassStrategy {
    /// Strategy for a detected engine.
    pub fn for_dialect(kind: DialectKind) -> Self {
        match kind {
            DialectKind::Postgresql => BypassStrategy::ReplicaRole,
            DialectKind::Sqlite => BypassStrategy::ForeignKeyPragma,
            DialectKind::Sqlserver => BypassStrategy::RowTolerant,
            DialectKind::Mysql | DialectKind::Mariadb | DialectKind::Unknown => {
                BypassStrategy::CheckConstraintChecks
            }
        }
    }

    /// Statement that suspends constraint checking.
    pub fn suspend_sql(&self) -> Option<&'static str> {
        match self {
            BypassStrategy::ReplicaRole => Some("SET session_replication_role = replica"),
            BypassStrategy::ForeignKeyPragma => Some("PRAGMA foreign_keys = OFF"),
            BypassStrategy::RowTolerant => None,
            BypassStrategy::CheckConstraintChecks => Some("SET CHECK_CONSTRAINT_CHECKS = 0"),
        }
    }

    /// Statement that restores constraint checking.
    pub fn restore_sql(&self) -> Option<&'static str> {
        match self {
            BypassStrategy::ReplicaRole => Some("SET session_replication_role = origin"),
            BypassStrategy::ForeignKeyPragma => Some("PRAGMA foreign_keys = ON"),
            BypassStrategy::RowTolerant => None,
            BypassStrategy::CheckConstraintChecks => Some("SET CHECK_CONSTRAINT_CHECKS = 1"),
        }
    }
}

/// Pending restoration returned by [`suspend`].
///
/// Must be consumed with [`RestoreGuard::restore`] on every path out of the
/// batch, success or failure.
#[must_use = "constraint checking stays suspended until restore() is awaited"]
#[derive(Debug)]
pub struct RestoreGuard {
    statement: Option<&'static str>,
}

impl RestoreGuard {
    /// Re-enable constraint checking. Failures are logged, never returned.
    pub async fn restore(self, conn: &dyn Connection) {
        let Some(sql) = self.statement else {
            return;
        };
        match conn.execute(sql, &[]).await {
            Ok(_) => debug!("Constraint checks restored ({})", sql),
            Err(e) => warn!("Failed to restore constraint checks with '{}': {}", sql, e),
        }
    }
}

/// Suspend constraint checking on `conn` for the duration of a load.
pub async fn suspend(conn: &dyn Connection, strategy: BypassStrategy) -> RestoreGuard {
    let Some(sql) = strategy.suspend_sql() else {
        info!("No session-level constraint switch for this engine; tolerating row failures instead");
        return RestoreGuard {
            statement: strategy.restore_sql(),
        };
    };

    match conn.execute(sql, &[]).await {
        Ok(_) => debug!("Constraint checks suspended ({})", sql),
        Err(e) => warn!("Failed to suspend constraint checks with '{}': {}", sql, e),
    }
    RestoreGuard {
        statement: strategy.restore_sql(),
    }
}
