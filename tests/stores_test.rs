//! Store persistence tests
//!
//! The admin registry and audit trail must survive a process restart:
//! reopen the same database file and verify nothing was lost or reordered.

use realitybot::{AuditLog, AuthorizationStore, Outcome, Permission, PermissionSet};
use tempfile::TempDir;

#[test]
fn admin_records_survive_reopen() {
    let dir = TempDir::new().expect("temp dir");
    let db_path = dir.path().join("bot.db");

    {
        let store = AuthorizationStore::open(&db_path).expect("open store");
        store
            .add_admin(100, "alice", PermissionSet::All, 1)
            .expect("add alice");
        store
            .add_admin(
                200,
                "bob",
                PermissionSet::Granted([Permission::LogAccess].into_iter().collect()),
                100,
            )
            .expect("add bob");
        store.revoke_admin(200).expect("revoke bob");
    }

    let store = AuthorizationStore::open(&db_path).expect("reopen store");
    assert!(store.is_authorized(100));
    assert!(!store.is_authorized(200));

    // Revoked row is still present for audit linkage
    let bob = store.get(200).expect("get").expect("bob exists");
    assert_eq!(bob.display_name, "bob");
    assert!(!bob.active);
    assert_eq!(store.list().expect("list").len(), 2);
}

#[test]
fn audit_trail_survives_reopen_in_order() {
    let dir = TempDir::new().expect("temp dir");
    let db_path = dir.path().join("bot.db");

    {
        let log = AuditLog::open(&db_path).expect("open log");
        for i in 0..5 {
            log.append(1, "alice", &format!("action-{}", i), "", Outcome::Success)
                .expect("append");
        }
    }

    let log = AuditLog::open(&db_path).expect("reopen log");
    log.append(1, "alice", "action-5", "", Outcome::Failure)
        .expect("append after reopen");

    let entries = log.recent(10).expect("recent");
    assert_eq!(entries.len(), 6);
    let actions: Vec<_> = entries.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(
        actions,
        vec!["action-5", "action-4", "action-3", "action-2", "action-1", "action-0"]
    );
}

#[test]
fn admin_and_audit_share_one_database_file() {
    let dir = TempDir::new().expect("temp dir");
    let db_path = dir.path().join("bot.db");

    let admins = AuthorizationStore::open(&db_path).expect("open admins");
    let audit = AuditLog::open(&db_path).expect("open audit");

    admins
        .add_admin(1, "root", PermissionSet::All, 1)
        .expect("add");
    audit
        .append(1, "root", "bootstrap", "", Outcome::Success)
        .expect("append");

    assert!(admins.is_authorized(1));
    assert_eq!(audit.recent(1).expect("recent").len(), 1);
}
