//! Duplicate-delivery suppression for webhook envelopes.

use std::{collections::HashMap, sync::Mutex};

use lgtm_core::{current_unix_timestamp, is_expired_unix};

/// Rejects webhook envelopes whose event identifier was already processed
/// within the retention window. The seen-id map is the only shared mutable
/// state in the system; check-and-insert happens atomically under the lock
/// so overlapping deliveries of the same envelope admit exactly one.
pub struct DuplicateEventGuard {
    ttl_seconds: u64,
    seen: Mutex<HashMap<String, u64>>,
}

impl DuplicateEventGuard {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            ttl_seconds: ttl_seconds.max(1),
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// True the first time `event_id` is seen within the retention window,
    /// false thereafter. A false result is a handled no-op for the caller,
    /// not an error.
    pub fn accept(&self, event_id: &str) -> bool {
        self.accept_at(event_id, current_unix_timestamp())
    }

    fn accept_at(&self, event_id: &str, now_unix: u64) -> bool {
        let mut seen = self
            .seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        seen.retain(|_, expires_unix| !is_expired_unix(Some(*expires_unix), now_unix));
        if seen.contains_key(event_id) {
            return false;
        }
        seen.insert(
            event_id.to_string(),
            now_unix.saturating_add(self.ttl_seconds),
        );
        true
    }
}
