//! Player-originated intents and their resolution state machine.
//!
//! An action moves `pending -> {rejected | queued -> applied | failed}`.
//! Terminal states never transition again; an applied action is only ever
//! undone by a whole-state rollback, not by mutating the record.

use crate::building::{BuildingKind, ResourceKind};
use crate::{ActionId, Millis, PlayerId};
use serde::{Deserialize, Serialize};

/// What the player wants to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    /// Place a building on a cell.
    PlaceBuilding {
        /// Target row.
        row: u16,
        /// Target column.
        col: u16,
        /// Building to place.
        building: BuildingKind,
    },
    /// Remove an owned building, restoring prior terrain.
    RemoveBuilding {
        /// Target row.
        row: u16,
        /// Target column.
        col: u16,
    },
    /// Adjust resource balances by signed deltas.
    UpdateResources {
        /// Signed per-resource adjustments.
        deltas: Vec<(ResourceKind, i64)>,
    },
    /// Yield the active turn.
    EndTurn,
}

impl ActionKind {
    /// Grid cell this action contends for, if any.
    pub fn target(&self) -> Option<(u16, u16)> {
        match *self {
            ActionKind::PlaceBuilding { row, col, .. }
            | ActionKind::RemoveBuilding { row, col } => Some((row, col)),
            _ => None,
        }
    }
}

/// Resolution state of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Created, not yet resolved.
    Pending,
    /// Held until the turn advances to the actor.
    Queued,
    /// Mutated state successfully. Terminal.
    Applied,
    /// Passed validation but failed during application. Terminal.
    Failed,
    /// Refused by validation or conflict resolution. Terminal.
    Rejected,
}

impl ActionStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActionStatus::Applied | ActionStatus::Failed | ActionStatus::Rejected
        )
    }
}

/// Where an action originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSource {
    /// Initiated on this client.
    Local,
    /// Replayed from a peer broadcast.
    Remote,
}

/// A detected contention between in-flight actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictKind {
    /// Two in-flight actions target the same cell.
    Cell {
        /// Contested row.
        row: u16,
        /// Contested column.
        col: u16,
        /// The other in-flight action.
        with: ActionId,
    },
    /// The actor can no longer afford the placement.
    Resource {
        /// Resource in shortfall.
        resource: ResourceKind,
        /// Amount the action needs.
        required: u32,
        /// Amount currently held.
        available: u32,
    },
}

/// Conflict record attached to a contested action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// What kind of contention was found.
    pub kind: ConflictKind,
}

impl Conflict {
    /// Human-readable rejection reason.
    pub fn reason(&self) -> String {
        match &self.kind {
            ConflictKind::Cell { row, col, with } => {
                format!("Cell conflict - ({row}, {col}) already targeted by action {with}")
            }
            ConflictKind::Resource {
                resource,
                required,
                available,
            } => format!(
                "Resource conflict - need {required} {resource:?}, have {available}"
            ),
        }
    }
}

/// A queued intent with resolution bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Unique within the session.
    pub id: ActionId,
    /// Originating player.
    pub player: PlayerId,
    /// What to do.
    pub kind: ActionKind,
    /// Creation time; conflict tie-break input in real-time mode.
    pub timestamp: Millis,
    /// Resolution state.
    pub status: ActionStatus,
    /// Local intent or remote replay.
    pub source: ActionSource,
    /// Times this action was re-evaluated after contention.
    pub retry_count: u32,
    /// Conflicts recorded against this action.
    pub conflicts: Vec<Conflict>,
}

impl Action {
    /// Create a fresh pending action.
    pub fn new(
        id: ActionId,
        player: PlayerId,
        kind: ActionKind,
        timestamp: Millis,
        source: ActionSource,
    ) -> Self {
        Self {
            id,
            player,
            kind,
            timestamp,
            status: ActionStatus::Pending,
            source,
            retry_count: 0,
            conflicts: Vec::new(),
        }
    }

    /// Move to `next` unless already terminal. Returns whether the
    /// transition happened.
    pub fn transition(&mut self, next: ActionStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = next;
        true
    }

    /// Total-order key for deterministic conflict resolution: earliest
    /// timestamp wins, then player id, then action id.
    pub fn priority_key(&self) -> (Millis, &PlayerId, ActionId) {
        (self.timestamp, &self.player, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(id: u64, player: &str, ts: u64) -> Action {
        Action::new(
            ActionId(id),
            PlayerId::new(player),
            ActionKind::PlaceBuilding {
                row: 1,
                col: 1,
                building: BuildingKind::Road,
            },
            Millis(ts),
            ActionSource::Local,
        )
    }

    #[test]
    fn terminal_states_do_not_transition() {
        let mut action = place(1, "alice", 10);
        assert!(action.transition(ActionStatus::Applied));
        assert!(!action.transition(ActionStatus::Rejected));
        assert_eq!(action.status, ActionStatus::Applied);
    }

    #[test]
    fn queued_can_still_apply_or_fail() {
        let mut action = place(1, "alice", 10);
        assert!(action.transition(ActionStatus::Queued));
        assert!(action.transition(ActionStatus::Applied));
    }

    #[test]
    fn priority_orders_by_timestamp_then_player_then_id() {
        let early = place(5, "zed", 10);
        let late = place(1, "alice", 20);
        assert!(early.priority_key() < late.priority_key());

        let a = place(2, "alice", 10);
        let z = place(1, "zed", 10);
        assert!(a.priority_key() < z.priority_key());

        let first = place(1, "alice", 10);
        let second = place(2, "alice", 10);
        assert!(first.priority_key() < second.priority_key());
    }

    #[test]
    fn only_building_actions_have_a_target() {
        assert!(place(1, "a", 1).kind.target().is_some());
        assert!(ActionKind::EndTurn.target().is_none());
    }

    #[test]
    fn conflict_reasons_are_human_readable() {
        let conflict = Conflict {
            kind: ConflictKind::Cell {
                row: 5,
                col: 5,
                with: ActionId(3),
            },
        };
        assert!(conflict.reason().starts_with("Cell conflict"));
    }
}
