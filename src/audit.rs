//! Audit Log
//!
//! Append-only, time-ordered record of every privileged action attempt.
//! Entries carry a monotonic per-process sequence (the SQLite rowid) and are
//! never updated or deleted. Details are truncated before writing so a noisy
//! handler cannot bloat the trail.

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Longest detail string stored per entry.
const MAX_DETAILS_LEN: usize = 512;

/// Audit store errors
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),
}

/// Terminal outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Timeout,
    Rejected,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Timeout => "timeout",
            Outcome::Rejected => "rejected",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "success" => Outcome::Success,
            "timeout" => Outcome::Timeout,
            "rejected" => Outcome::Rejected,
            _ => Outcome::Failure,
        }
    }
}

/// One immutable audit entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub seq: i64,
    pub timestamp: i64,
    pub actor_id: i64,
    pub actor_name: String,
    pub action: String,
    pub details: String,
    pub outcome: Outcome,
}

/// Append-only audit trail backed by SQLite.
pub struct AuditLog {
    conn: Mutex<Connection>,
}

impl AuditLog {
    pub fn open(db_path: &Path) -> Result<Self, AuditError> {
        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(db_path)?;
        // The admin registry shares this database file from its own connection
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audit (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                actor_id INTEGER NOT NULL,
                actor_name TEXT NOT NULL,
                action TEXT NOT NULL,
                details TEXT NOT NULL,
                outcome TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_actor ON audit(actor_id, seq);
            "#,
        )?;

        info!("Audit log opened: {}", db_path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Durable ordered append. The write is committed before this returns;
    /// a failure here must be surfaced by the caller, never swallowed.
    pub fn append(
        &self,
        actor_id: i64,
        actor_name: &str,
        action: &str,
        details: &str,
        outcome: Outcome,
    ) -> Result<(), AuditError> {
        let details = truncate(details, MAX_DETAILS_LEN);
        let now = chrono::Utc::now().timestamp();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO audit (timestamp, actor_id, actor_name, action, details, outcome)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![now, actor_id, actor_name, action, details, outcome.as_str()],
        )?;
        Ok(())
    }

    /// Most recent `n` entries, newest first.
    pub fn recent(&self, n: usize) -> Result<Vec<AuditEntry>, AuditError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT seq, timestamp, actor_id, actor_name, action, details, outcome
             FROM audit ORDER BY seq DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![n as i64], |row| {
            Ok(AuditEntry {
                seq: row.get(0)?,
                timestamp: row.get(1)?,
                actor_id: row.get(2)?,
                actor_name: row.get(3)?,
                action: row.get(4)?,
                details: row.get(5)?,
                outcome: Outcome::from_str(&row.get::<_, String>(6)?),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}
