//! VPN User Database
//!
//! Read-only view of the JSON user document maintained by the management
//! scripts. The bot never writes this file; mutations go through
//! `user_management.sh` and are picked up on the next read.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum UserDbError {
    #[error("failed to read user database: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed user database: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One VPN user entry as written by the shell tooling.
#[derive(Debug, Clone, Deserialize)]
pub struct VpnUser {
    pub uuid: Uuid,
    #[serde(alias = "email", alias = "username")]
    pub name: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default = "default_active", alias = "status")]
    pub active: serde_json::Value,
}

fn default_active() -> serde_json::Value {
    serde_json::Value::Bool(true)
}

impl VpnUser {
    /// The tooling has written both `"active": true` and `"status": "active"`
    /// over time; accept either.
    pub fn is_active(&self) -> bool {
        match &self.active {
            serde_json::Value::Bool(b) => *b,
            serde_json::Value::String(s) => s == "active",
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct UserDocument {
    #[serde(default)]
    users: Vec<VpnUser>,
}

/// Load all users from the JSON document at `path`.
pub fn load_users(path: &Path) -> Result<Vec<VpnUser>, UserDbError> {
    let raw = std::fs::read_to_string(path)?;
    let document: UserDocument = serde_json::from_str(&raw)?;
    Ok(document.users)
}
