//! Action queue and conflict resolution.
//!
//! Local intents pass through here before they touch state. In turn-based
//! mode an off-turn action is parked until the turn comes around; in
//! real-time mode simultaneous claims on a cell are settled by the
//! deterministic priority key (timestamp, then player id, then action id),
//! so every client resolves the same contest the same way without talking.

use crate::apply::{self, ApplyError};
use gridtown_core::{
    Action, ActionId, ActionStatus, Conflict, ConflictKind, ConflictMode, GameState, Grid,
};
use tracing::debug;

/// What the queue decided to do with a submitted action.
#[derive(Debug)]
pub enum QueueDecision {
    /// Apply optimistically now. `displaced` lists in-flight actions this
    /// one preempted in real-time mode; they must be rolled back.
    Apply {
        /// The action to apply.
        action: Action,
        /// Preempted in-flight actions, already marked rejected.
        displaced: Vec<Action>,
    },
    /// Parked until the actor's turn comes around.
    Parked(Action),
    /// Refused outright.
    Rejected {
        /// The refused action.
        action: Action,
        /// Why.
        reason: String,
    },
}

/// Ordered queue of local actions with conflict bookkeeping.
#[derive(Debug, Default)]
pub struct ActionQueue {
    in_flight: Vec<Action>,
    parked: Vec<Action>,
}

impl ActionQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a local action: validate it, gate it on the turn, and check
    /// it against everything already in flight.
    pub fn submit(&mut self, mut action: Action, game: &GameState, grid: &Grid) -> QueueDecision {
        if let Err(err) = apply::validate(game, grid, &action) {
            if let ApplyError::CannotAfford {
                resource,
                required,
                available,
                ..
            } = err
            {
                action.conflicts.push(Conflict {
                    kind: ConflictKind::Resource {
                        resource,
                        required,
                        available,
                    },
                });
            }
            action.transition(ActionStatus::Rejected);
            return QueueDecision::Rejected {
                action,
                reason: err.to_string(),
            };
        }

        if game.conflict.enabled {
            if let Some(decision) = self.resolve_contention(&mut action, game) {
                return decision;
            }
        }

        if game.conflict.mode == ConflictMode::TurnBased && !game.is_players_turn(&action.player) {
            action.transition(ActionStatus::Queued);
            debug!(id = %action.id, "parking off-turn action");
            self.parked.push(action.clone());
            return QueueDecision::Parked(action);
        }

        self.in_flight.push(action.clone());
        QueueDecision::Apply {
            action,
            displaced: Vec::new(),
        }
    }

    /// Cell contention against in-flight and parked actions. Returns a
    /// decision when contention settles the submission by itself.
    fn resolve_contention(&mut self, action: &mut Action, game: &GameState) -> Option<QueueDecision> {
        let target = action.kind.target()?;
        let rivals: Vec<ActionId> = self
            .in_flight
            .iter()
            .chain(self.parked.iter())
            .filter(|a| a.kind.target() == Some(target))
            .map(|a| a.id)
            .collect();
        if rivals.is_empty() {
            return None;
        }

        for rival in &rivals {
            action.conflicts.push(Conflict {
                kind: ConflictKind::Cell {
                    row: target.0,
                    col: target.1,
                    with: *rival,
                },
            });
        }

        match game.conflict.mode {
            // Within one client, two actions on the same cell can't both
            // stand; the earlier submission keeps the cell.
            ConflictMode::TurnBased => {
                let reason = action.conflicts[0].reason();
                action.transition(ActionStatus::Rejected);
                Some(QueueDecision::Rejected {
                    action: action.clone(),
                    reason,
                })
            }
            ConflictMode::RealTime => {
                let loses = self
                    .in_flight
                    .iter()
                    .chain(self.parked.iter())
                    .filter(|a| rivals.contains(&a.id))
                    .any(|rival| rival.priority_key() < action.priority_key());
                if loses {
                    let reason = action.conflicts[0].reason();
                    action.transition(ActionStatus::Rejected);
                    Some(QueueDecision::Rejected {
                        action: action.clone(),
                        reason,
                    })
                } else {
                    let displaced = self.displace(&rivals);
                    self.in_flight.push(action.clone());
                    Some(QueueDecision::Apply {
                        action: action.clone(),
                        displaced,
                    })
                }
            }
        }
    }

    /// Remove the listed actions from the queue, marking them rejected.
    fn displace(&mut self, ids: &[ActionId]) -> Vec<Action> {
        let mut displaced = Vec::new();
        for list in [&mut self.in_flight, &mut self.parked] {
            let mut i = 0;
            while i < list.len() {
                if ids.contains(&list[i].id) {
                    let mut loser = list.remove(i);
                    loser.transition(ActionStatus::Rejected);
                    displaced.push(loser);
                } else {
                    i += 1;
                }
            }
        }
        displaced
    }

    /// In-flight local action contesting `target`, if any.
    pub fn contesting(&self, target: (u16, u16)) -> Option<&Action> {
        self.in_flight
            .iter()
            .find(|a| a.kind.target() == Some(target))
    }

    /// Settle an in-flight action by id, removing it from the queue.
    pub fn settle(&mut self, id: ActionId) -> Option<Action> {
        let pos = self.in_flight.iter().position(|a| a.id == id)?;
        Some(self.in_flight.remove(pos))
    }

    /// Release parked actions whose player now holds the turn. Each
    /// released action has its retry count bumped; actions past the retry
    /// budget are dropped as rejected instead.
    pub fn on_turn_change(&mut self, game: &GameState) -> ReleasedActions {
        let mut released = Vec::new();
        let mut abandoned = Vec::new();
        let mut i = 0;
        while i < self.parked.len() {
            if game.is_players_turn(&self.parked[i].player) {
                let mut action = self.parked.remove(i);
                action.retry_count += 1;
                if action.retry_count > game.conflict.max_retries {
                    action.transition(ActionStatus::Rejected);
                    abandoned.push(action);
                } else {
                    action.status = ActionStatus::Pending;
                    self.in_flight.push(action.clone());
                    released.push(action);
                }
            } else {
                i += 1;
            }
        }
        ReleasedActions {
            released,
            abandoned,
        }
    }

    /// Actions applied optimistically and awaiting confirmation.
    pub fn in_flight(&self) -> &[Action] {
        &self.in_flight
    }

    /// Actions parked for a future turn.
    pub fn parked(&self) -> &[Action] {
        &self.parked
    }
}

/// Outcome of a turn-change sweep over the parked queue.
#[derive(Debug, Default)]
pub struct ReleasedActions {
    /// Now eligible; apply and broadcast these.
    pub released: Vec<Action>,
    /// Out of retries; report these as rejected.
    pub abandoned: Vec<Action>,
}
