//! realitybot
//!
//! Telegram administration bot for VLESS+Reality VPN servers.
//!
//! # Architecture
//!
//! ```text
//! Telegram ──► Invocation ──► CommandRouter ──► handlers ──► shell scripts
//!                                  │
//!                                  ├── AuthorizationStore (SQLite)
//!                                  ├── LockoutGuard (failed attempts)
//!                                  ├── ConfirmationRegistry (destructive ops)
//!                                  └── AuditLog (append-only SQLite)
//! ```
//!
//! The router owns the security invariants: lockout before authorization
//! before permission, destructive commands gated behind single-use
//! confirmation tokens, one terminal audit entry per privileged attempt,
//! and external scripts invoked as argv vectors only.

pub mod admins;
pub mod alerts;
pub mod audit;
pub mod config;
pub mod confirm;
pub mod handlers;
pub mod lockout;
pub mod qr;
pub mod router;
pub mod shell;
pub mod telegram;
pub mod userdb;


pub use admins::{AdminRecord, AuthorizationStore, Permission, PermissionSet};
pub use audit::{AuditEntry, AuditLog, Outcome};
pub use config::Config;
pub use confirm::{ConfirmError, ConfirmationRegistry, Decision, PendingAction};
pub use lockout::LockoutGuard;
pub use router::{
    CommandDescriptor, CommandHandler, CommandRouter, DispatchError, HandlerError, Invocation,
    Reply, RouterDeps,
};
pub use shell::{ShellBridge, ShellError, ShellOutput};
