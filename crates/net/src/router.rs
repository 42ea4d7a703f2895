//! Inbound message routing: validation, dedupe, and dispatch.
//!
//! Every raw JSON value coming off the wire passes through [`MessageRouter`]
//! before any game code sees it: structural validation, duplicate-id
//! suppression, version compatibility, size verification, and batch
//! flattening all happen here, in that order.

use crate::protocol::{Envelope, Payload, PROTOCOL_VERSION};
use lru::LruCache;
use serde_json::Value;
use std::num::NonZeroUsize;
use tracing::{debug, warn};

/// How many recently seen message ids the duplicate filter remembers.
const SEEN_ID_CAP: usize = 4096;

/// Receives messages that survived the router's checks.
pub trait MessageHandler {
    /// Handle one validated, deduplicated envelope.
    fn handle(&mut self, envelope: &Envelope) -> anyhow::Result<()>;
}

/// What the router did with a raw inbound value.
#[derive(Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Delivered to the handler; count includes batch sub-messages.
    Handled(usize),
    /// Message id was seen before; dropped.
    Duplicate,
    /// Failed a check before reaching the handler; dropped with reason.
    Rejected(String),
}

/// Stateful inbound gate in front of a [`MessageHandler`].
pub struct MessageRouter {
    seen: LruCache<String, ()>,
}

impl MessageRouter {
    /// Create a router with an empty duplicate filter.
    pub fn new() -> Self {
        Self {
            seen: LruCache::new(NonZeroUsize::new(SEEN_ID_CAP).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    /// Run a raw JSON value through every inbound check, then hand the
    /// surviving message(s) to `handler`. Batches are flattened; each
    /// sub-message is delivered separately, in order.
    pub fn process<H: MessageHandler>(&mut self, value: &Value, handler: &mut H) -> ProcessOutcome {
        if let Err(err) = Envelope::validate_value(value) {
            warn!(%err, "dropping malformed message");
            return ProcessOutcome::Rejected(err.to_string());
        }

        let envelope: Envelope = match serde_json::from_value(value.clone()) {
            Ok(env) => env,
            Err(err) => {
                warn!(%err, "dropping undeserializable message");
                return ProcessOutcome::Rejected(err.to_string());
            }
        };

        if self.seen.contains(&envelope.id) {
            debug!(id = %envelope.id, "dropping duplicate message");
            return ProcessOutcome::Duplicate;
        }

        if !version_compatible(&envelope.version) {
            warn!(version = %envelope.version, "dropping incompatible message");
            return ProcessOutcome::Rejected(format!(
                "incompatible protocol version {} (speaking {})",
                envelope.version, PROTOCOL_VERSION
            ));
        }

        if let Err(reason) = envelope.verify() {
            warn!(id = %envelope.id, reason, "dropping oversized message");
            return ProcessOutcome::Rejected(reason.to_string());
        }

        self.seen.put(envelope.id.clone(), ());

        let mut delivered = 0;
        match &envelope.payload {
            Payload::Batch(batch) => {
                for sub in &batch.messages {
                    if self.seen.contains(&sub.id) {
                        debug!(id = %sub.id, "skipping duplicate batch member");
                        continue;
                    }
                    self.seen.put(sub.id.clone(), ());
                    if let Err(err) = handler.handle(sub) {
                        warn!(id = %sub.id, %err, "handler failed for batch member");
                    }
                    delivered += 1;
                }
            }
            _ => {
                if let Err(err) = handler.handle(&envelope) {
                    warn!(id = %envelope.id, %err, "handler failed");
                }
                delivered = 1;
            }
        }

        ProcessOutcome::Handled(delivered)
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Versions are compatible when their major components match.
fn version_compatible(version: &str) -> bool {
    let major = |v: &str| v.split('.').next().map(str::to_string);
    major(version) == major(PROTOCOL_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MessageFactory, MessageType};
    use gridtown_core::{Millis, PlayerId};

    struct Recorder {
        types: Vec<MessageType>,
    }

    impl MessageHandler for Recorder {
        fn handle(&mut self, envelope: &Envelope) -> anyhow::Result<()> {
            self.types.push(envelope.message_type());
            Ok(())
        }
    }

    fn setup() -> (MessageRouter, Recorder, MessageFactory) {
        (
            MessageRouter::new(),
            Recorder { types: Vec::new() },
            MessageFactory::new("router-test"),
        )
    }

    #[test]
    fn valid_message_reaches_the_handler() {
        let (mut router, mut rec, f) = setup();
        let value = serde_json::to_value(f.chat(PlayerId::new("alice"), "hi")).unwrap();

        assert_eq!(router.process(&value, &mut rec), ProcessOutcome::Handled(1));
        assert_eq!(rec.types, vec![MessageType::ChatMessage]);
    }

    #[test]
    fn duplicate_ids_are_dropped() {
        let (mut router, mut rec, f) = setup();
        let value = serde_json::to_value(f.ping(Millis(1))).unwrap();

        assert_eq!(router.process(&value, &mut rec), ProcessOutcome::Handled(1));
        assert_eq!(router.process(&value, &mut rec), ProcessOutcome::Duplicate);
        assert_eq!(rec.types.len(), 1);
    }

    #[test]
    fn malformed_values_are_rejected_not_panicked() {
        let (mut router, mut rec, _) = setup();
        let value = serde_json::json!({"type": "ping"});

        assert!(matches!(
            router.process(&value, &mut rec),
            ProcessOutcome::Rejected(_)
        ));
        assert!(rec.types.is_empty());
    }

    #[test]
    fn incompatible_major_version_is_rejected() {
        let (mut router, mut rec, f) = setup();
        let mut env = f.ping(Millis(1));
        env.version = "2.0.0".to_string();
        let value = serde_json::to_value(env).unwrap();

        assert!(matches!(
            router.process(&value, &mut rec),
            ProcessOutcome::Rejected(_)
        ));
    }

    #[test]
    fn minor_version_drift_is_accepted() {
        let (mut router, mut rec, f) = setup();
        let mut env = f.ping(Millis(1));
        env.version = "1.4.2".to_string();
        let value = serde_json::to_value(env).unwrap();

        assert_eq!(router.process(&value, &mut rec), ProcessOutcome::Handled(1));
    }

    #[test]
    fn batches_are_flattened_in_order() {
        let (mut router, mut rec, f) = setup();
        let batch = f.batch(vec![
            f.ping(Millis(1)),
            f.chat(PlayerId::new("bob"), "hello"),
        ]);
        let value = serde_json::to_value(batch).unwrap();

        assert_eq!(router.process(&value, &mut rec), ProcessOutcome::Handled(2));
        assert_eq!(
            rec.types,
            vec![MessageType::Ping, MessageType::ChatMessage]
        );
    }

    #[test]
    fn batch_members_already_seen_are_skipped() {
        let (mut router, mut rec, f) = setup();
        let ping = f.ping(Millis(1));
        let alone = serde_json::to_value(&ping).unwrap();
        router.process(&alone, &mut rec);

        let batch = f.batch(vec![ping, f.ping(Millis(2))]);
        let value = serde_json::to_value(batch).unwrap();
        assert_eq!(router.process(&value, &mut rec), ProcessOutcome::Handled(1));
    }
}
