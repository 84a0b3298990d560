//! Append-only audit trail.
//!
//! Every mutating operation in the system records one entry here after its
//! own transaction commits. The trail is append-only twice over: this type
//! exposes nothing but [`AuditTrail::record`] and [`AuditTrail::query`],
//! and the store itself rejects UPDATE/DELETE on the table once the
//! enforcing migration has run.
//!
//! Audit writes are observability, not correctness: a failed write is
//! logged and swallowed, and never rolls back the business operation it
//! describes.

use rusqlite::{params_from_iter, types::Value, Connection};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Action category of an audit entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Migrate,
    Backup,
    Restore,
    Verify,
    Settings,
    Import,
    Profile,
}

impl AuditAction {
    /// Convert from database string representation
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "CREATE" => Some(AuditAction::Create),
            "UPDATE" => Some(AuditAction::Update),
            "DELETE" => Some(AuditAction::Delete),
            "MIGRATE" => Some(AuditAction::Migrate),
            "BACKUP" => Some(AuditAction::Backup),
            "RESTORE" => Some(AuditAction::Restore),
            "VERIFY" => Some(AuditAction::Verify),
            "SETTINGS" => Some(AuditAction::Settings),
            "IMPORT" => Some(AuditAction::Import),
            "PROFILE" => Some(AuditAction::Profile),
            _ => None,
        }
    }

    /// Convert to database string representation
    pub fn to_db_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Migrate => "MIGRATE",
            AuditAction::Backup => "BACKUP",
            AuditAction::Restore => "RESTORE",
            AuditAction::Verify => "VERIFY",
            AuditAction::Settings => "SETTINGS",
            AuditAction::Import => "IMPORT",
            AuditAction::Profile => "PROFILE",
        }
    }
}

/// One immutable audit entry.
#[derive(Clone, Debug, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    /// Server-assigned timestamp (`datetime('now')` at insert).
    pub ts: String,
    pub actor: Option<String>,
    /// Raw action string; use [`AuditAction::from_db_str`] to classify.
    pub action: String,
    pub entity: Option<String>,
    pub ref_id: Option<String>,
    pub details: Option<String>,
}

/// Filters for querying the trail (an "app info" style view).
#[derive(Clone, Debug, Default)]
pub struct AuditFilter {
    pub action: Option<AuditAction>,
    pub entity: Option<String>,
    /// Inclusive lower bound on the timestamp, `YYYY-MM-DD HH:MM:SS`.
    pub since: Option<String>,
    pub limit: Option<usize>,
}

/// Append/query capability over the audit log. Cloning shares the
/// underlying connection.
#[derive(Clone, Debug)]
pub struct AuditTrail {
    conn: Arc<Mutex<Connection>>,
}

impl AuditTrail {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Append one entry with a server-assigned timestamp. Best-effort:
    /// failures are logged, never surfaced.
    ///
    /// Must be called after the business transaction it describes has
    /// committed, never while the caller still holds the connection lock.
    pub fn record(
        &self,
        action: AuditAction,
        entity: &str,
        ref_id: Option<&str>,
        details: Option<&str>,
        actor: Option<&str>,
    ) {
        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO audit_log (user, action, entity, ref_id, details)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![actor, action.to_db_str(), entity, ref_id, details],
        );
        if let Err(e) = result {
            warn!("failed to write audit entry ({} {entity}): {e}", action.to_db_str());
        }
    }

    /// Read entries newest-first, optionally filtered.
    pub fn query(&self, filter: &AuditFilter) -> rusqlite::Result<Vec<AuditEntry>> {
        let mut sql = String::from(
            "SELECT id, ts, user, action, entity, ref_id, details FROM audit_log WHERE 1=1",
        );
        let mut values: Vec<Value> = Vec::new();

        if let Some(action) = filter.action {
            values.push(Value::from(action.to_db_str().to_string()));
            sql.push_str(&format!(" AND action = ?{}", values.len()));
        }
        if let Some(entity) = &filter.entity {
            values.push(Value::from(entity.clone()));
            sql.push_str(&format!(" AND entity = ?{}", values.len()));
        }
        if let Some(since) = &filter.since {
            values.push(Value::from(since.clone()));
            sql.push_str(&format!(" AND ts >= ?{}", values.len()));
        }
        sql.push_str(" ORDER BY id DESC");
        if let Some(limit) = filter.limit {
            values.push(Value::from(limit as i64));
            sql.push_str(&format!(" LIMIT ?{}", values.len()));
        }

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    ts: row.get(1)?,
                    actor: row.get(2)?,
                    action: row.get(3)?,
                    entity: row.get(4)?,
                    ref_id: row.get(5)?,
                    details: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}
