//! Typed event fan-out to UI collaborators.
//!
//! Subscribers get an mpsc receiver of `GameEvent` values; senders whose
//! receiver has been dropped are pruned on the next emit.

use crate::action::{Action, Conflict};
use crate::state::GameStatus;
use crate::{ActionId, PlayerId};
use std::sync::mpsc::{channel, Receiver, Sender};

/// Everything the core reports to the outside world.
#[derive(Debug, Clone)]
pub enum GameEvent {
    /// The session status changed.
    StateChanged {
        /// New status.
        status: GameStatus,
        /// Status before the change.
        previous: GameStatus,
    },
    /// An action was applied to shared state.
    PlayerAction(Action),
    /// Conflicts were detected against an incoming action.
    ConflictDetected {
        /// The contested action.
        action_id: ActionId,
        /// What it collided with.
        conflicts: Vec<Conflict>,
    },
    /// An off-turn action was parked until the turn advances.
    ActionQueued(Action),
    /// An action was refused.
    ActionRejected {
        /// The refused action.
        action: Action,
        /// Human-readable reason for the UI toast.
        reason: String,
    },
    /// Transport connectivity changed.
    ConnectionChanged {
        /// Whether a live connection exists now.
        connected: bool,
    },
    /// A chat line arrived.
    Chat {
        /// Sender.
        from: PlayerId,
        /// Message text.
        text: String,
    },
}

/// Multi-subscriber event dispatcher.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Sender<GameEvent>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber; events emitted after this call are delivered.
    pub fn subscribe(&mut self) -> Receiver<GameEvent> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber, dropping dead ones.
    pub fn emit(&mut self, event: GameEvent) {
        self.subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of live subscribers as of the last emit.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
