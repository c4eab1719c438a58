//! Telegram transport
//!
//! Maps Telegram updates onto transport-agnostic [`Invocation`]s and renders
//! [`Reply`]s back. Command messages and confirmation-button callbacks both
//! go through the same invocation type, so the router never sees a Telegram
//! object. Uses the explicit Dispatcher pattern; endpoints run as
//! independent tasks, so a handler blocked on a slow script cannot stall
//! other chats.

use anyhow::Result;
use std::sync::Arc;
use teloxide::{
    dispatching::UpdateFilterExt,
    dptree,
    error_handlers::LoggingErrorHandler,
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, Update},
};
use tracing::{info, warn};

use crate::admins::{AuthorizationStore, PermissionSet};
use crate::alerts::{AlertSink, LogAlertSink, TelegramAlertSink};
use crate::audit::AuditLog;
use crate::config::Config;
use crate::confirm::{ConfirmationRegistry, Decision};
use crate::handlers::{register_all, HandlerCtx};
use crate::lockout::LockoutGuard;
use crate::qr::QrEncodeProducer;
use crate::router::{CommandRouter, Invocation, Reply, RouterDeps};
use crate::shell::ShellBridge;

/// Telegram caps messages at 4096 chars; leave headroom for formatting.
const MAX_CHUNK: usize = 4000;

const CONFIRM_PREFIX: &str = "cfm:";
const CANCEL_PREFIX: &str = "ccl:";

struct BotData {
    router: CommandRouter,
}

/// Assemble the stores and router, seed the first admin if needed, and run
/// the long-polling dispatcher until shutdown.
pub async fn run_bot(config: Config) -> Result<()> {
    let bot = Bot::new(config.bot_token.clone());

    let admins = Arc::new(AuthorizationStore::open(&config.db_path)?);
    let audit = Arc::new(AuditLog::open(&config.db_path)?);
    let lockout = Arc::new(LockoutGuard::new(
        config.max_failed_attempts,
        config.lockout_duration,
    ));
    let confirmations = Arc::new(ConfirmationRegistry::new(config.confirmation_ttl));
    let shell = ShellBridge::new(config.shell_timeout);

    // First run: seed the configured admin chat with full permissions
    if !admins.has_active_admins()? {
        if let Some(admin_chat_id) = config.admin_chat_id {
            info!("Seeding initial admin {}", admin_chat_id);
            admins.add_admin(admin_chat_id, "admin", PermissionSet::All, admin_chat_id)?;
        } else {
            warn!("No admins configured and ADMIN_CHAT_ID unset; every command will be rejected");
        }
    }

    let alerts: Arc<dyn AlertSink> = match config.admin_chat_id {
        Some(chat_id) => Arc::new(TelegramAlertSink::new(bot.clone(), chat_id)),
        None => Arc::new(LogAlertSink),
    };

    let ctx = Arc::new(HandlerCtx {
        shell: shell.clone(),
        scripts_dir: config.scripts_dir.clone(),
        users_file: config.users_file.clone(),
        admins: admins.clone(),
        audit: audit.clone(),
        qr: Arc::new(QrEncodeProducer::new(shell)),
    });

    let mut router = CommandRouter::new(RouterDeps {
        admins,
        lockout,
        confirmations,
        audit,
        alerts,
    });
    register_all(&mut router, ctx);

    let data = Arc::new(BotData { router });

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(message_handler))
        .branch(Update::filter_callback_query().endpoint(callback_handler));

    info!("Starting dispatcher with long polling...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![data])
        .default_handler(|upd| async move {
            tracing::debug!("Unhandled update: {:?}", upd);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "Error in update handler",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    warn!("Dispatcher stopped");
    Ok(())
}

async fn message_handler(bot: Bot, msg: Message, data: Arc<BotData>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some((command, args)) = parse_command(text) else {
        return Ok(());
    };

    let actor_id = msg.from.as_ref().map(|u| u.id.0 as i64).unwrap_or(0);
    let actor_name = msg
        .from
        .as_ref()
        .and_then(|u| u.username.clone())
        .unwrap_or_else(|| "unknown".to_string());

    info!(">>> /{} from {} ({})", command, actor_name, actor_id);

    let invocation = Invocation::command(actor_id, &actor_name, &command, args);
    let reply = match data.router.dispatch(invocation).await {
        Ok(reply) => reply,
        Err(e) => Reply::Text(format!("❌ {}", e.user_message())),
    };

    send_reply(&bot, msg.chat.id, reply).await
}

async fn callback_handler(bot: Bot, query: CallbackQuery, data: Arc<BotData>) -> ResponseResult<()> {
    let actor_id = query.from.id.0 as i64;
    let actor_name = query
        .from
        .username
        .clone()
        .unwrap_or_else(|| "unknown".to_string());

    let Some(callback_data) = query.data.as_deref() else {
        bot.answer_callback_query(&query.id).await?;
        return Ok(());
    };

    let invocation = if let Some(token) = callback_data.strip_prefix(CONFIRM_PREFIX) {
        Invocation::confirmation(actor_id, &actor_name, token, Decision::Confirm)
    } else if let Some(token) = callback_data.strip_prefix(CANCEL_PREFIX) {
        Invocation::confirmation(actor_id, &actor_name, token, Decision::Cancel)
    } else {
        bot.answer_callback_query(&query.id).await?;
        return Ok(());
    };

    bot.answer_callback_query(&query.id).await?;

    let reply = match data.router.dispatch(invocation).await {
        Ok(reply) => reply,
        Err(e) => Reply::Text(format!("❌ {}", e.user_message())),
    };

    if let Some(message) = query.message {
        send_reply(&bot, message.chat().id, reply).await?;
    }
    Ok(())
}

async fn send_reply(bot: &Bot, chat_id: ChatId, reply: Reply) -> ResponseResult<()> {
    match reply {
        Reply::Text(text) => {
            for chunk in chunk_message(&text) {
                bot.send_message(chat_id, chunk).await?;
            }
        }
        Reply::Photo { bytes, caption } => {
            // Telegram caps captions at 1024 chars
            let caption: String = caption.chars().take(1024).collect();
            bot.send_photo(chat_id, InputFile::memory(bytes))
                .caption(caption)
                .await?;
        }
        Reply::ConfirmationPrompt { token, prompt } => {
            let keyboard = InlineKeyboardMarkup::new([[
                InlineKeyboardButton::callback(
                    "✅ Confirm",
                    format!("{}{}", CONFIRM_PREFIX, token),
                ),
                InlineKeyboardButton::callback("❌ Cancel", format!("{}{}", CANCEL_PREFIX, token)),
            ]]);
            bot.send_message(chat_id, prompt)
                .reply_markup(keyboard)
                .await?;
        }
    }
    Ok(())
}

/// `"/config alice@host"` -> `("config", ["alice@host"])`. Strips the
/// `@botname` suffix Telegram appends in group chats. Non-command text maps
/// to nothing.
fn parse_command(text: &str) -> Option<(String, Vec<String>)> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let raw_command = parts.next()?;
    let command = raw_command
        .split('@')
        .next()
        .unwrap_or(raw_command)
        .to_lowercase();
    if command.is_empty() {
        return None;
    }
    let args = parts.map(str::to_string).collect();
    Some((command, args))
}

/// Split on char boundaries so multibyte text never breaks a chunk.
fn chunk_message(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    if text.is_empty() {
        return chunks;
    }
    let mut remaining = text;
    while !remaining.is_empty() {
        let split_at = remaining
            .char_indices()
            .take_while(|(i, _)| *i < MAX_CHUNK)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(remaining.len());
        let (chunk, rest) = remaining.split_at(split_at);
        chunks.push(chunk.to_string());
        remaining = rest;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_with_args() {
        let (command, args) = parse_command("/config alice").unwrap();
        assert_eq!(command, "config");
        assert_eq!(args, vec!["alice"]);
    }

    #[test]
    fn strips_botname_suffix() {
        let (command, args) = parse_command("/status@realitybot").unwrap();
        assert_eq!(command, "status");
        assert!(args.is_empty());
    }

    #[test]
    fn non_command_text_ignored() {
        assert!(parse_command("hello there").is_none());
        assert!(parse_command("/").is_none());
        assert!(parse_command("").is_none());
    }

    #[test]
    fn command_is_lowercased() {
        let (command, _) = parse_command("/Status").unwrap();
        assert_eq!(command, "status");
    }

    #[test]
    fn hostile_args_stay_verbatim() {
        let (_, args) = parse_command("/removeuser ; rm -rf /").unwrap();
        assert_eq!(args, vec![";", "rm", "-rf", "/"]);
    }

    #[test]
    fn short_message_single_chunk() {
        let chunks = chunk_message("Hello");
        assert_eq!(chunks, vec!["Hello"]);
    }

    #[test]
    fn long_message_splits() {
        let msg = "a".repeat(MAX_CHUNK + 100);
        let chunks = chunk_message(&msg);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), MAX_CHUNK);
        assert_eq!(chunks[1].len(), 100);
    }

    #[test]
    fn multibyte_not_broken() {
        let base = "a".repeat(MAX_CHUNK - 2);
        let msg = format!("{}日本語", base);
        for chunk in chunk_message(&msg) {
            assert!(chunk.is_char_boundary(chunk.len()));
        }
    }
}
