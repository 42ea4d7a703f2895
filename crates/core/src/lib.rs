#![warn(missing_docs)]
//! Core data model shared across the workspace: grid, buildings, players,
//! actions, and the typed event bus. No I/O lives here.

pub mod action;
pub mod building;
pub mod events;
pub mod grid;
pub mod state;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

// Re-export commonly used types
pub use action::{Action, ActionKind, ActionSource, ActionStatus, Conflict, ConflictKind};
pub use building::{BuildingKind, ResourceKind, ResourceLedger};
pub use events::{EventBus, GameEvent};
pub use grid::{Cell, Grid, TileClass, TileKind, MAP_SIZE};
pub use state::{ConflictConfig, ConflictMode, GameState, GameStatus, Player};

/// Milliseconds since the UNIX epoch.
///
/// Used for action timestamps and cell mutation stamps. Comparison is the
/// primary conflict tie-break, so the type is totally ordered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Millis(pub u64);

impl Millis {
    /// The epoch itself; never a valid message timestamp.
    pub const ZERO: Self = Self(0);

    /// Current wall-clock time.
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(elapsed.as_millis() as u64)
    }

    /// Elapsed milliseconds since `earlier`, zero if `earlier` is in the future.
    pub fn since(self, earlier: Millis) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Unique action identifier within one game session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ActionId(pub u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque player identifier assigned at join time.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Wrap a raw identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_since_saturates() {
        assert_eq!(Millis(5).since(Millis(10)), 0);
        assert_eq!(Millis(10).since(Millis(5)), 5);
    }

    #[test]
    fn player_id_round_trips_through_serde() {
        let id = PlayerId::new("player_1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"player_1\"");
        let back: PlayerId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
