//! Confirmation Registry
//!
//! Single-use, time-bounded tokens gating destructive commands. A
//! destructive action never executes from a single message: the first
//! invocation creates a pending confirmation, and only a second message
//! bearing the token can release it. Tokens resolve exactly once.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Confirmation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfirmError {
    #[error("unknown confirmation token")]
    TokenNotFound,
    #[error("confirmation token expired")]
    TokenExpired,
    #[error("confirmation token already resolved")]
    TokenAlreadyResolved,
    #[error("confirmation token belongs to a different actor")]
    ActorMismatch,
}

/// The action a pending confirmation will release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub command: String,
    pub args: Vec<String>,
}

/// Resolution decision sent by the actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Confirm,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenState {
    Pending,
    Confirmed,
    Cancelled,
    Expired,
}

#[derive(Debug)]
struct PendingConfirmation {
    actor_id: i64,
    action: PendingAction,
    expires_at: Instant,
    state: TokenState,
}

/// Issues and resolves single-use confirmation tokens.
#[derive(Debug)]
pub struct ConfirmationRegistry {
    pending: Mutex<HashMap<String, PendingConfirmation>>,
    ttl: Duration,
}

impl ConfirmationRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Create a pending confirmation for `actor_id` and return its token.
    pub fn create(&self, actor_id: i64, action: PendingAction) -> String {
        let token = generate_token();
        let mut pending = self.pending.lock();

        // Opportunistic eviction keeps abandoned tokens bounded
        pending.retain(|_, c| {
            c.state == TokenState::Pending && c.expires_at > Instant::now()
        });

        pending.insert(
            token.clone(),
            PendingConfirmation {
                actor_id,
                action,
                expires_at: Instant::now() + self.ttl,
                state: TokenState::Pending,
            },
        );
        token
    }

    /// Resolve a token exactly once. On `Confirm` the original action is
    /// returned for execution; on `Cancel` nothing is. The single-use check
    /// and the state transition happen under one lock, so two concurrent
    /// resolutions can never both succeed.
    pub fn resolve(
        &self,
        token: &str,
        decision: Decision,
        actor_id: i64,
    ) -> Result<Option<PendingAction>, ConfirmError> {
        let mut pending = self.pending.lock();
        let confirmation = pending.get_mut(token).ok_or(ConfirmError::TokenNotFound)?;

        if confirmation.state != TokenState::Pending {
            return Err(ConfirmError::TokenAlreadyResolved);
        }
        if Instant::now() > confirmation.expires_at {
            confirmation.state = TokenState::Expired;
            return Err(ConfirmError::TokenExpired);
        }
        if confirmation.actor_id != actor_id {
            return Err(ConfirmError::ActorMismatch);
        }

        match decision {
            Decision::Confirm => {
                confirmation.state = TokenState::Confirmed;
                Ok(Some(confirmation.action.clone()))
            }
            Decision::Cancel => {
                confirmation.state = TokenState::Cancelled;
                Ok(None)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn expire_now(&self, token: &str) {
        let mut pending = self.pending.lock();
        if let Some(confirmation) = pending.get_mut(token) {
            confirmation.expires_at = Instant::now()
                .checked_sub(Duration::from_secs(1))
                .unwrap_or_else(Instant::now);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.lock().len()
    }
}

/// 32 random bytes from the OS, URL-safe base64. Unguessable and safe to
/// embed in Telegram callback data.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action() -> PendingAction {
        PendingAction {
            command: "remove-user".to_string(),
            args: vec!["alice".to_string()],
        }
    }

    fn registry() -> ConfirmationRegistry {
        ConfirmationRegistry::new(Duration::from_secs(120))
    }

    #[test]
    fn tokens_are_unique_and_opaque() {
        let registry = registry();
        let a = registry.create(1, action());
        let b = registry.create(1, action());
        assert_ne!(a, b);
        assert!(a.len() >= 43);
    }

    #[test]
    fn confirm_returns_original_action_once() {
        let registry = registry();
        let token = registry.create(1, action());

        let resolved = registry.resolve(&token, Decision::Confirm, 1).unwrap();
        assert_eq!(resolved, Some(action()));

        let err = registry.resolve(&token, Decision::Confirm, 1).unwrap_err();
        assert_eq!(err, ConfirmError::TokenAlreadyResolved);
    }

    #[test]
    fn cancel_is_terminal() {
        let registry = registry();
        let token = registry.create(1, action());

        let resolved = registry.resolve(&token, Decision::Cancel, 1).unwrap();
        assert_eq!(resolved, None);

        let err = registry.resolve(&token, Decision::Confirm, 1).unwrap_err();
        assert_eq!(err, ConfirmError::TokenAlreadyResolved);
    }

    #[test]
    fn unknown_token_rejected() {
        let err = registry()
            .resolve("nope", Decision::Confirm, 1)
            .unwrap_err();
        assert_eq!(err, ConfirmError::TokenNotFound);
    }

    #[test]
    fn expired_token_rejected_even_if_never_resolved() {
        let registry = registry();
        let token = registry.create(1, action());
        registry.expire_now(&token);

        let err = registry.resolve(&token, Decision::Confirm, 1).unwrap_err();
        assert_eq!(err, ConfirmError::TokenExpired);

        // Expiry is terminal, not retriable
        let err = registry.resolve(&token, Decision::Confirm, 1).unwrap_err();
        assert_eq!(err, ConfirmError::TokenAlreadyResolved);
    }

    #[test]
    fn other_actor_cannot_resolve() {
        let registry = registry();
        let token = registry.create(1, action());

        let err = registry.resolve(&token, Decision::Confirm, 2).unwrap_err();
        assert_eq!(err, ConfirmError::ActorMismatch);

        // Still pending for the rightful actor
        let resolved = registry.resolve(&token, Decision::Confirm, 1).unwrap();
        assert_eq!(resolved, Some(action()));
    }

    #[test]
    fn create_evicts_stale_tokens() {
        let registry = registry();
        let stale = registry.create(1, action());
        registry.expire_now(&stale);

        registry.create(2, action());
        assert_eq!(registry.len(), 1);
    }
}
