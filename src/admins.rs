//! Administrator Registry
//!
//! Durable store of bot administrators and their permission sets, backed by
//! SQLite. Every mutation writes through before returning, and records are
//! deactivated rather than deleted so audit entries keep a valid actor to
//! point at. An inactive admin is treated exactly like an unknown actor.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Admin store errors
#[derive(Error, Debug)]
pub enum AdminStoreError {
    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),
    #[error("corrupt permission set: {0}")]
    CorruptPermissions(#[from] serde_json::Error),
}

/// Capability tags gating individual command groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    UserManagement,
    ConfigGeneration,
    Monitoring,
    BackupManagement,
    LogAccess,
    AdminManagement,
    Maintenance,
}

/// An admin's granted capabilities: either everything or an explicit set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionSet {
    All,
    Granted(BTreeSet<Permission>),
}

impl PermissionSet {
    pub fn contains(&self, permission: Permission) -> bool {
        match self {
            PermissionSet::All => true,
            PermissionSet::Granted(set) => set.contains(&permission),
        }
    }

    fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            PermissionSet::All => serde_json::to_string("all"),
            PermissionSet::Granted(set) => serde_json::to_string(set),
        }
    }

    fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        if let Ok(sentinel) = serde_json::from_str::<String>(raw) {
            if sentinel == "all" {
                return Ok(PermissionSet::All);
            }
        }
        Ok(PermissionSet::Granted(serde_json::from_str(raw)?))
    }
}

/// One administrator row.
#[derive(Debug, Clone)]
pub struct AdminRecord {
    pub actor_id: i64,
    pub display_name: String,
    pub permissions: PermissionSet,
    pub added_by: i64,
    pub added_at: i64,
    pub active: bool,
}

/// SQLite-backed registry of administrators.
pub struct AuthorizationStore {
    conn: Mutex<Connection>,
}

impl AuthorizationStore {
    /// Open or create the admin table at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self, AdminStoreError> {
        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(db_path)?;
        // The audit log shares this database file from its own connection
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS admins (
                actor_id INTEGER PRIMARY KEY,
                display_name TEXT NOT NULL,
                permissions TEXT NOT NULL,
                added_by INTEGER NOT NULL,
                added_at INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 1
            );
            "#,
        )?;

        info!("Admin store opened: {}", db_path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// True iff an active record exists for the actor.
    pub fn is_authorized(&self, actor_id: i64) -> bool {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT 1 FROM admins WHERE actor_id = ?1 AND active = 1",
            params![actor_id],
            |_| Ok(()),
        )
        .optional()
        .ok()
        .flatten()
        .is_some()
    }

    /// False for unknown or inactive actors; true when the actor's set
    /// contains the permission or the "all" sentinel.
    pub fn has_permission(&self, actor_id: i64, permission: Permission) -> bool {
        match self.get(actor_id) {
            Ok(Some(record)) if record.active => record.permissions.contains(permission),
            _ => false,
        }
    }

    /// Idempotent upsert; reactivates a previously revoked admin.
    pub fn add_admin(
        &self,
        actor_id: i64,
        display_name: &str,
        permissions: PermissionSet,
        added_by: i64,
    ) -> Result<(), AdminStoreError> {
        let permissions_json = permissions.to_json()?;
        let now = chrono::Utc::now().timestamp();

        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO admins (actor_id, display_name, permissions, added_by, added_at, active)
            VALUES (?1, ?2, ?3, ?4, ?5, 1)
            ON CONFLICT(actor_id) DO UPDATE SET
                display_name = excluded.display_name,
                permissions = excluded.permissions,
                added_by = excluded.added_by,
                active = 1
            "#,
            params![actor_id, display_name, permissions_json, added_by, now],
        )?;
        Ok(())
    }

    /// Deactivate an admin. The row is kept so prior audit entries still
    /// resolve to a name.
    pub fn revoke_admin(&self, actor_id: i64) -> Result<(), AdminStoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE admins SET active = 0 WHERE actor_id = ?1",
            params![actor_id],
        )?;
        Ok(())
    }

    /// Fetch a record regardless of active flag.
    pub fn get(&self, actor_id: i64) -> Result<Option<AdminRecord>, AdminStoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT actor_id, display_name, permissions, added_by, added_at, active
                 FROM admins WHERE actor_id = ?1",
                params![actor_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, bool>(5)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((actor_id, display_name, permissions_json, added_by, added_at, active)) => {
                Ok(Some(AdminRecord {
                    actor_id,
                    display_name,
                    permissions: PermissionSet::from_json(&permissions_json)?,
                    added_by,
                    added_at,
                    active,
                }))
            }
            None => Ok(None),
        }
    }

    /// All records, active first, for the /auth listing.
    pub fn list(&self) -> Result<Vec<AdminRecord>, AdminStoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT actor_id, display_name, permissions, added_by, added_at, active
             FROM admins ORDER BY active DESC, added_at ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, bool>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (actor_id, display_name, permissions_json, added_by, added_at, active) = row?;
            records.push(AdminRecord {
                actor_id,
                display_name,
                permissions: PermissionSet::from_json(&permissions_json)?,
                added_by,
                added_at,
                active,
            });
        }
        Ok(records)
    }

    /// Display name for audit entries; "unknown" for actors with no record.
    pub fn display_name(&self, actor_id: i64) -> String {
        self.get(actor_id)
            .ok()
            .flatten()
            .map(|r| r.display_name)
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Whether any active admin exists (drives first-run bootstrap).
    pub fn has_active_admins(&self) -> Result<bool, AdminStoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM admins WHERE active = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
