//! Tracking of sent messages awaiting acknowledgement.
//!
//! Outbound envelopes that expect an `action_response` are parked here under
//! their message id. Responses settle them; a periodic sweep drops entries
//! that have waited too long so the map cannot grow without bound.

use crate::protocol::Envelope;
use gridtown_core::Millis;
use lru::LruCache;
use std::num::NonZeroUsize;

/// Default cap on tracked messages. Oldest entries are evicted first.
pub const DEFAULT_PENDING_CAP: usize = 1024;

/// Default age after which an unanswered message is considered lost.
pub const DEFAULT_MAX_AGE_MS: u64 = 300_000;

struct PendingEntry {
    envelope: Envelope,
    sent_at: Millis,
}

/// Sent-message ledger keyed by message id.
pub struct PendingMessages {
    entries: LruCache<String, PendingEntry>,
    max_age_ms: u64,
}

impl PendingMessages {
    /// Create a ledger with the default cap and age limit.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_PENDING_CAP, DEFAULT_MAX_AGE_MS)
    }

    /// Create a ledger with explicit limits. A zero cap is clamped to one.
    pub fn with_limits(cap: usize, max_age_ms: u64) -> Self {
        let cap = NonZeroUsize::new(cap).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(cap),
            max_age_ms,
        }
    }

    /// Track an outbound envelope until a response settles it.
    pub fn track(&mut self, envelope: Envelope) {
        let sent_at = Millis::now();
        self.entries
            .put(envelope.id.clone(), PendingEntry { envelope, sent_at });
    }

    /// Settle a tracked message by id, returning the original envelope.
    pub fn settle(&mut self, id: &str) -> Option<Envelope> {
        self.entries.pop(id).map(|entry| entry.envelope)
    }

    /// Whether a message with this id is still awaiting a response.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains(id)
    }

    /// Drop entries older than the age limit, returning the timed-out
    /// envelopes so the caller can resend or report them.
    pub fn sweep(&mut self, now: Millis) -> Vec<Envelope> {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.since(entry.sent_at) > self.max_age_ms)
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.entries.pop(&id))
            .map(|entry| entry.envelope)
            .collect()
    }

    /// Number of messages still awaiting a response.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is awaiting a response.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PendingMessages {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageFactory;

    fn factory() -> MessageFactory {
        MessageFactory::new("pending-test")
    }

    #[test]
    fn settle_returns_the_tracked_envelope() {
        let mut pending = PendingMessages::new();
        let env = factory().ping(Millis(1));
        let id = env.id.clone();

        pending.track(env.clone());
        assert!(pending.contains(&id));
        assert_eq!(pending.settle(&id), Some(env));
        assert!(!pending.contains(&id));
    }

    #[test]
    fn settle_unknown_id_is_none() {
        let mut pending = PendingMessages::new();
        assert_eq!(pending.settle("msg_0_0_00000000"), None);
    }

    #[test]
    fn cap_evicts_oldest_entries_first() {
        let mut pending = PendingMessages::with_limits(2, DEFAULT_MAX_AGE_MS);
        let f = factory();
        let first = f.ping(Millis(1));
        let first_id = first.id.clone();

        pending.track(first);
        pending.track(f.ping(Millis(2)));
        pending.track(f.ping(Millis(3)));

        assert_eq!(pending.len(), 2);
        assert!(!pending.contains(&first_id));
    }

    #[test]
    fn sweep_drops_only_expired_entries() {
        let mut pending = PendingMessages::with_limits(16, 1000);
        let f = factory();
        let stale = f.ping(Millis(1));
        let stale_id = stale.id.clone();
        let fresh = f.ping(Millis(2));
        let fresh_id = fresh.id.clone();

        pending.track(stale);
        pending.track(fresh);

        // Force the first entry past the age limit
        if let Some(entry) = pending.entries.get_mut(&stale_id) {
            entry.sent_at = Millis(0);
        }

        let expired = pending.sweep(Millis::now());
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, stale_id);
        assert!(pending.contains(&fresh_id));
    }
}
