//! Configuration management

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Bot configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token (required)
    pub bot_token: String,

    /// Chat id seeded as the initial administrator (optional)
    pub admin_chat_id: Option<i64>,

    /// SQLite database path for admins + audit trail
    pub db_path: PathBuf,

    /// Directory holding the management shell scripts
    pub scripts_dir: PathBuf,

    /// VPN user database (JSON, read-only from the bot's perspective)
    pub users_file: PathBuf,

    /// Consecutive failed authorization attempts before lockout
    pub max_failed_attempts: u32,

    /// How long a locked-out actor stays locked out
    pub lockout_duration: Duration,

    /// How long a destructive-action confirmation token stays valid
    pub confirmation_ttl: Duration,

    /// Wall-clock timeout for external script invocations
    pub shell_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A missing bot token is fatal: the process must not start dispatching
    /// without credentials.
    pub fn from_env() -> Result<Self> {
        let bot_token =
            std::env::var("TELOXIDE_TOKEN").context("TELOXIDE_TOKEN must be set")?;

        let admin_chat_id = std::env::var("ADMIN_CHAT_ID")
            .ok()
            .and_then(|v| v.parse().ok());

        let db_path = std::env::var("REALITYBOT_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/opt/vless/config/realitybot.db"));

        let scripts_dir = std::env::var("VLESS_MODULES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/opt/vless/modules"));

        let users_file = std::env::var("VLESS_USERS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/opt/vless/config/users.json"));

        let max_failed_attempts = std::env::var("REALITYBOT_MAX_FAILED_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);

        let lockout_duration = std::env::var("REALITYBOT_LOCKOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(300));

        let confirmation_ttl = std::env::var("REALITYBOT_CONFIRM_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(120));

        let shell_timeout = std::env::var("REALITYBOT_SHELL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        Ok(Self {
            bot_token,
            admin_chat_id,
            db_path,
            scripts_dir,
            users_file,
            max_failed_attempts,
            lockout_duration,
            confirmation_ttl,
            shell_timeout,
        })
    }
}
