//! Lockout Guard
//!
//! Per-actor failed-authorization bookkeeping. After `max_attempts`
//! consecutive failures an actor is locked out for `duration`; expiry is
//! detected lazily on the next check, no background sweeper.
//!
//! Pure bookkeeping: no operation here can fail or block.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct FailureRecord {
    count: u32,
    last_failure: Instant,
}

/// Tracks failed authorization attempts and enforces temporary lockout.
#[derive(Debug)]
pub struct LockoutGuard {
    records: Mutex<HashMap<i64, FailureRecord>>,
    max_attempts: u32,
    duration: Duration,
}

impl LockoutGuard {
    pub fn new(max_attempts: u32, duration: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            max_attempts,
            duration,
        }
    }

    /// Record one failed authorization attempt for `actor_id`.
    pub fn record_failure(&self, actor_id: i64) {
        let mut records = self.records.lock();
        let record = records.entry(actor_id).or_insert(FailureRecord {
            count: 0,
            last_failure: Instant::now(),
        });
        record.count += 1;
        record.last_failure = Instant::now();
    }

    /// True iff the actor has reached the failure threshold and the lockout
    /// window has not yet elapsed. An elapsed window clears the record.
    pub fn is_locked_out(&self, actor_id: i64) -> bool {
        let mut records = self.records.lock();
        let Some(record) = records.get(&actor_id) else {
            return false;
        };

        if record.count >= self.max_attempts {
            if record.last_failure.elapsed() < self.duration {
                return true;
            }
            // Window elapsed: reset-on-check
            records.remove(&actor_id);
        }
        false
    }

    /// Clear the failure count after a fully successful authorized action,
    /// so stale failures do not accumulate across unrelated sessions.
    pub fn reset(&self, actor_id: i64) {
        self.records.lock().remove(&actor_id);
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, actor_id: i64, by: Duration) {
        let mut records = self.records.lock();
        if let Some(record) = records.get_mut(&actor_id) {
            if let Some(past) = Instant::now().checked_sub(by) {
                record.last_failure = past;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> LockoutGuard {
        LockoutGuard::new(3, Duration::from_secs(300))
    }

    #[test]
    fn unknown_actor_is_not_locked_out() {
        assert!(!guard().is_locked_out(1));
    }

    #[test]
    fn locks_out_after_exactly_max_attempts() {
        let guard = guard();
        guard.record_failure(1);
        assert!(!guard.is_locked_out(1));
        guard.record_failure(1);
        assert!(!guard.is_locked_out(1));
        guard.record_failure(1);
        assert!(guard.is_locked_out(1));
    }

    #[test]
    fn lockout_clears_after_window_elapses() {
        let guard = guard();
        for _ in 0..3 {
            guard.record_failure(1);
        }
        assert!(guard.is_locked_out(1));

        guard.backdate(1, Duration::from_secs(301));
        assert!(!guard.is_locked_out(1));
        // Record was cleared, one fresh failure does not re-lock
        guard.record_failure(1);
        assert!(!guard.is_locked_out(1));
    }

    #[test]
    fn reset_clears_failures() {
        let guard = guard();
        guard.record_failure(1);
        guard.record_failure(1);
        guard.reset(1);
        guard.record_failure(1);
        assert!(!guard.is_locked_out(1));
    }

    #[test]
    fn actors_are_independent() {
        let guard = guard();
        for _ in 0..3 {
            guard.record_failure(1);
        }
        assert!(guard.is_locked_out(1));
        assert!(!guard.is_locked_out(2));
    }
}
