//! Operational Alerts
//!
//! Out-of-band notifications for conditions an operator must see even when
//! the triggering actor gets a normal reply: audit-write failures and
//! security events. A privileged action that could not be audited is a
//! security gap, so those alerts must not depend on the audit trail itself.

use async_trait::async_trait;
use teloxide::prelude::*;
use tracing::{error, warn};

/// Sink for operational alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn alert(&self, message: &str);
}

/// Posts alerts to the admin chat; falls back to the process log when the
/// send fails (never errors toward the caller).
pub struct TelegramAlertSink {
    bot: Bot,
    admin_chat_id: i64,
}

impl TelegramAlertSink {
    pub fn new(bot: Bot, admin_chat_id: i64) -> Self {
        Self { bot, admin_chat_id }
    }
}

#[async_trait]
impl AlertSink for TelegramAlertSink {
    async fn alert(&self, message: &str) {
        let text = format!("🚨 ALERT: {}", message);
        if let Err(e) = self
            .bot
            .send_message(ChatId(self.admin_chat_id), &text)
            .await
        {
            error!("Alert delivery failed ({}); alert was: {}", e, message);
        }
    }
}

/// Log-only sink for deployments without an admin chat, and for tests.
#[derive(Debug, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn alert(&self, message: &str) {
        warn!("ALERT: {}", message);
    }
}
