//! Command Router
//!
//! The orchestrator for every inbound invocation. Authorization order is
//! explicit and testable: lockout, then authorization, then command lookup,
//! then permission, then destructive-action confirmation, then the handler.
//! Every attempt that passes the lockout gate leaves exactly one audit entry
//! with a terminal outcome.
//!
//! The stores are injected at construction; the command table is built at
//! startup and immutable afterwards.

use crate::admins::{AuthorizationStore, Permission};
use crate::alerts::AlertSink;
use crate::audit::{AuditLog, Outcome};
use crate::confirm::{ConfirmError, ConfirmationRegistry, Decision, PendingAction};
use crate::lockout::LockoutGuard;
use crate::shell::ShellError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// One inbound command invocation, transport-agnostic. Both the initial
/// command path and the confirmation-callback path produce this same shape,
/// so handlers never see transport objects.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub actor_id: i64,
    pub actor_name: String,
    pub command: String,
    pub args: Vec<String>,
    /// Present when this invocation resolves a pending confirmation.
    pub confirmation: Option<(String, Decision)>,
}

impl Invocation {
    pub fn command(actor_id: i64, actor_name: &str, command: &str, args: Vec<String>) -> Self {
        Self {
            actor_id,
            actor_name: actor_name.to_string(),
            command: command.to_string(),
            args,
            confirmation: None,
        }
    }

    pub fn confirmation(actor_id: i64, actor_name: &str, token: &str, decision: Decision) -> Self {
        Self {
            actor_id,
            actor_name: actor_name.to_string(),
            command: String::new(),
            args: Vec::new(),
            confirmation: Some((token.to_string(), decision)),
        }
    }
}

/// What a handler hands back to the transport layer.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Photo { bytes: Vec<u8>, caption: String },
    /// Destructive command intercepted; the actor must send the token back.
    ConfirmationPrompt { token: String, prompt: String },
}

/// Handler faults, wrapped so they are audited instead of propagating raw.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("external command timed out")]
    Timeout,
    #[error("{0}")]
    Failed(String),
}

impl From<ShellError> for HandlerError {
    fn from(e: ShellError) -> Self {
        match e {
            ShellError::Timeout(_) => HandlerError::Timeout,
            ShellError::Launch { .. } => HandlerError::Failed(e.to_string()),
        }
    }
}

/// Rejections at the router boundary. Rendered to the actor through
/// [`DispatchError::user_message`] only; internal detail stays in the logs.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("actor is locked out")]
    LockedOut,
    #[error("actor is not authorized")]
    NotAuthorized,
    #[error("actor lacks required permission")]
    Forbidden,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error(transparent)]
    Confirmation(#[from] ConfirmError),
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl DispatchError {
    /// Safe, generic text for the chat transport.
    pub fn user_message(&self) -> String {
        match self {
            DispatchError::LockedOut => {
                "Access temporarily locked due to failed attempts.".to_string()
            }
            DispatchError::NotAuthorized => {
                "Access denied. You are not authorized to use this bot.".to_string()
            }
            DispatchError::Forbidden => "Insufficient permissions.".to_string(),
            DispatchError::UnknownCommand(name) => format!("Unknown command: {}", name),
            DispatchError::Confirmation(e) => match e {
                ConfirmError::TokenNotFound => "No such pending confirmation.".to_string(),
                ConfirmError::TokenExpired => {
                    "Confirmation expired. Re-issue the command.".to_string()
                }
                ConfirmError::TokenAlreadyResolved => {
                    "This confirmation was already used.".to_string()
                }
                ConfirmError::ActorMismatch => {
                    "This confirmation belongs to someone else.".to_string()
                }
            },
            DispatchError::Handler(HandlerError::Timeout) => {
                "The operation timed out.".to_string()
            }
            DispatchError::Handler(HandlerError::Failed(_)) => {
                "The operation failed. Check the server logs.".to_string()
            }
        }
    }
}

/// A command implementation. Handlers may call the shell bridge; any fault
/// they return is audited as a handler failure, never propagated uncaught.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, invocation: &Invocation) -> Result<Reply, HandlerError>;
}

/// Static registration record for one command.
pub struct CommandDescriptor {
    pub name: &'static str,
    pub required_permission: Option<Permission>,
    pub destructive: bool,
    pub handler: Arc<dyn CommandHandler>,
}

/// Shared stores the router consults on every dispatch.
pub struct RouterDeps {
    pub admins: Arc<AuthorizationStore>,
    pub lockout: Arc<LockoutGuard>,
    pub confirmations: Arc<ConfirmationRegistry>,
    pub audit: Arc<AuditLog>,
    pub alerts: Arc<dyn AlertSink>,
}

/// Authenticated command dispatcher.
pub struct CommandRouter {
    commands: HashMap<&'static str, CommandDescriptor>,
    deps: RouterDeps,
}

impl CommandRouter {
    pub fn new(deps: RouterDeps) -> Self {
        Self {
            commands: HashMap::new(),
            deps,
        }
    }

    /// Register a command. Called only during startup, before the router is
    /// shared.
    pub fn register(&mut self, descriptor: CommandDescriptor) {
        debug!(
            "Registered command /{} (permission: {:?}, destructive: {})",
            descriptor.name, descriptor.required_permission, descriptor.destructive
        );
        self.commands.insert(descriptor.name, descriptor);
    }

    pub fn command_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.commands.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Run the full dispatch algorithm for one invocation.
    pub async fn dispatch(&self, invocation: Invocation) -> Result<Reply, DispatchError> {
        let actor_id = invocation.actor_id;

        // Lockout gate. Only a generic entry is written, so hammering a
        // locked account cannot inflate the unauthorized-attempt count.
        if self.deps.lockout.is_locked_out(actor_id) {
            self.audit(actor_id, &invocation.actor_name, "locked_out", "", Outcome::Rejected)
                .await;
            return Err(DispatchError::LockedOut);
        }

        // Authorization. Failures feed the lockout counter.
        if !self.deps.admins.is_authorized(actor_id) {
            self.deps.lockout.record_failure(actor_id);
            self.audit(
                actor_id,
                &invocation.actor_name,
                "unauthorized_attempt",
                &format!("command: {}", invocation.command),
                Outcome::Rejected,
            )
            .await;
            return Err(DispatchError::NotAuthorized);
        }

        // A supplied token re-derives the original action; everything after
        // this point treats it like a fresh, pre-confirmed command.
        let (command, args, confirmed) = match &invocation.confirmation {
            Some((token, decision)) => {
                match self
                    .deps
                    .confirmations
                    .resolve(token, *decision, actor_id)
                {
                    Ok(Some(PendingAction { command, args })) => (command, args, true),
                    Ok(None) => {
                        self.audit(
                            actor_id,
                            &invocation.actor_name,
                            "confirmation_cancelled",
                            "",
                            Outcome::Rejected,
                        )
                        .await;
                        return Ok(Reply::Text("Cancelled. No changes made.".to_string()));
                    }
                    Err(e) => {
                        self.audit(
                            actor_id,
                            &invocation.actor_name,
                            "confirmation_rejected",
                            &e.to_string(),
                            Outcome::Rejected,
                        )
                        .await;
                        return Err(e.into());
                    }
                }
            }
            None => (invocation.command.clone(), invocation.args.clone(), false),
        };

        // Command lookup. Not an auth failure: no lockout increment.
        let descriptor = self
            .commands
            .get(command.as_str())
            .ok_or_else(|| DispatchError::UnknownCommand(command.clone()))?;

        if let Some(permission) = descriptor.required_permission {
            if !self.deps.admins.has_permission(actor_id, permission) {
                self.audit(
                    actor_id,
                    &invocation.actor_name,
                    "forbidden_attempt",
                    &format!("command: {}", command),
                    Outcome::Rejected,
                )
                .await;
                return Err(DispatchError::Forbidden);
            }
        }

        // Destructive commands stop here on first contact; the handler only
        // runs once a token comes back.
        if descriptor.destructive && !confirmed {
            let token = self.deps.confirmations.create(
                actor_id,
                PendingAction {
                    command: command.clone(),
                    args: args.clone(),
                },
            );
            self.audit(
                actor_id,
                &invocation.actor_name,
                "confirmation_requested",
                &format!("command: {} {}", command, args.join(" ")),
                Outcome::Success,
            )
            .await;
            return Ok(Reply::ConfirmationPrompt {
                prompt: format!(
                    "⚠️ /{} {} is destructive. Confirm or cancel below; this request expires shortly.",
                    command,
                    args.join(" ")
                ),
                token,
            });
        }

        // Handler invocation, faults contained.
        let handler_invocation = Invocation {
            actor_id,
            actor_name: invocation.actor_name.clone(),
            command: command.clone(),
            args,
            confirmation: None,
        };
        let result = descriptor.handler.handle(&handler_invocation).await;

        // Exactly one terminal audit entry per handler invocation.
        let (outcome, details) = match &result {
            Ok(_) => (Outcome::Success, String::new()),
            Err(HandlerError::Timeout) => (Outcome::Timeout, "timed out".to_string()),
            Err(HandlerError::Failed(msg)) => (Outcome::Failure, msg.clone()),
        };
        self.audit(
            actor_id,
            &invocation.actor_name,
            &command,
            &details,
            outcome,
        )
        .await;

        // Lockout reset only after a fully successful authorized action.
        if result.is_ok() {
            self.deps.lockout.reset(actor_id);
        }

        result.map_err(Into::into)
    }

    /// Append to the audit trail; a failed append still lets the invocation
    /// answer the actor but raises an operational alert, because an
    /// unaudited privileged action is a security gap.
    async fn audit(
        &self,
        actor_id: i64,
        actor_name: &str,
        action: &str,
        details: &str,
        outcome: Outcome,
    ) {
        if let Err(e) = self
            .deps
            .audit
            .append(actor_id, actor_name, action, details, outcome)
        {
            warn!("Audit append failed for action '{}': {}", action, e);
            self.deps
                .alerts
                .alert(&format!(
                    "audit write failed for actor {} action '{}': {}",
                    actor_id, action, e
                ))
                .await;
        }
    }
}
