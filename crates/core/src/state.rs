//! Canonical shared game state: players, turn order, status, configuration.
//!
//! Status transitions are driven by inbound lifecycle messages and observed
//! locally; the core never decides on its own that a game has started.

use crate::building::ResourceLedger;
use crate::{ActionId, PlayerId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle of a game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Lobby open, players joining.
    Waiting,
    /// Countdown to start.
    Starting,
    /// In play.
    Active,
    /// Paused by host.
    Paused,
    /// Over.
    Finished,
}

/// Conflict-resolution mode for simultaneous actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictMode {
    /// Actions apply only on the acting player's turn.
    TurnBased,
    /// Earliest timestamp wins contested cells.
    RealTime,
}

/// Conflict-resolution configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictConfig {
    /// Whether conflict detection runs at all.
    pub enabled: bool,
    /// Active resolution mode.
    pub mode: ConflictMode,
    /// Logical reservation window for contested cells, milliseconds. Not a
    /// mutex; bounds how long a cell is treated as contested before the
    /// timestamp rule is trusted to have converged.
    pub lock_duration_ms: u64,
    /// Retry budget for contested actions.
    pub max_retries: u32,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: ConflictMode::TurnBased,
            lock_duration_ms: 5_000,
            max_retries: 3,
        }
    }
}

/// One participant in the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Unique identifier.
    pub id: PlayerId,
    /// Display name.
    pub username: String,
    /// Display color tag.
    pub color: String,
    /// Whether this player opened the room.
    pub is_host: bool,
    /// Ready flag during the lobby phase.
    pub is_ready: bool,
    /// Accumulated score.
    pub score: i64,
    /// Resource balances.
    pub resources: ResourceLedger,
}

impl Player {
    /// Create a player with empty balances.
    pub fn new(id: PlayerId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            color: String::new(),
            is_host: false,
            is_ready: false,
            score: 0,
            resources: ResourceLedger::default(),
        }
    }
}

/// The canonical session state every client converges on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    /// Opaque session identifier.
    pub id: String,
    /// Join code for the room.
    pub room_code: String,
    /// Lifecycle status.
    pub status: GameStatus,
    /// All participants, keyed by id.
    pub players: HashMap<PlayerId, Player>,
    /// Turn rotation; defines whose turn is active in turn-based mode.
    pub turn_order: Vec<PlayerId>,
    /// Index into `turn_order`.
    pub current_turn: usize,
    /// Source of unique action identifiers; monotonically increasing.
    pub last_action_id: u64,
    /// Conflict-resolution configuration.
    pub conflict: ConflictConfig,
}

impl GameState {
    /// Create a fresh waiting-room state.
    pub fn new(id: impl Into<String>, room_code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            room_code: room_code.into(),
            status: GameStatus::Waiting,
            players: HashMap::new(),
            turn_order: Vec::new(),
            current_turn: 0,
            last_action_id: 0,
            conflict: ConflictConfig::default(),
        }
    }

    /// Register a player and append them to the turn rotation.
    pub fn add_player(&mut self, player: Player) {
        if !self.turn_order.contains(&player.id) {
            self.turn_order.push(player.id.clone());
        }
        self.players.insert(player.id.clone(), player);
    }

    /// Remove a player from the roster and rotation.
    pub fn remove_player(&mut self, id: &PlayerId) -> Option<Player> {
        if let Some(pos) = self.turn_order.iter().position(|p| p == id) {
            self.turn_order.remove(pos);
            if self.current_turn >= self.turn_order.len() && !self.turn_order.is_empty() {
                self.current_turn %= self.turn_order.len();
            }
        }
        self.players.remove(id)
    }

    /// Player whose turn is active, if a rotation exists.
    pub fn current_player(&self) -> Option<&PlayerId> {
        self.turn_order.get(self.current_turn)
    }

    /// Whether `player` holds the active turn. An empty rotation gates
    /// nobody (pre-lobby and single-player setups).
    pub fn is_players_turn(&self, player: &PlayerId) -> bool {
        match self.current_player() {
            Some(current) => current == player,
            None => true,
        }
    }

    /// Advance to the next turn; returns the player now active.
    pub fn advance_turn(&mut self) -> Option<&PlayerId> {
        if self.turn_order.is_empty() {
            return None;
        }
        self.current_turn = (self.current_turn + 1) % self.turn_order.len();
        self.current_player()
    }

    /// Mint the next unique action identifier.
    pub fn next_action_id(&mut self) -> ActionId {
        self.last_action_id += 1;
        ActionId(self.last_action_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_player_state() -> GameState {
        let mut game = GameState::new("g1", "ROOM");
        game.add_player(Player::new(PlayerId::new("alice"), "Alice"));
        game.add_player(Player::new(PlayerId::new("bob"), "Bob"));
        game
    }

    #[test]
    fn turn_rotation_wraps() {
        let mut game = two_player_state();
        assert_eq!(game.current_player().unwrap().as_str(), "alice");
        game.advance_turn();
        assert_eq!(game.current_player().unwrap().as_str(), "bob");
        game.advance_turn();
        assert_eq!(game.current_player().unwrap().as_str(), "alice");
    }

    #[test]
    fn empty_rotation_gates_nobody() {
        let game = GameState::new("g1", "ROOM");
        assert!(game.is_players_turn(&PlayerId::new("anyone")));
    }

    #[test]
    fn action_ids_are_monotonic() {
        let mut game = two_player_state();
        let a = game.next_action_id();
        let b = game.next_action_id();
        assert!(b > a);
        assert_eq!(game.last_action_id, 2);
    }

    #[test]
    fn removing_current_player_keeps_turn_index_valid() {
        let mut game = two_player_state();
        game.advance_turn(); // bob's turn, index 1
        game.remove_player(&PlayerId::new("bob"));
        assert!(game.current_turn < game.turn_order.len());
        assert_eq!(game.current_player().unwrap().as_str(), "alice");
    }

    #[test]
    fn duplicate_join_does_not_duplicate_rotation() {
        let mut game = two_player_state();
        game.add_player(Player::new(PlayerId::new("alice"), "Alice again"));
        assert_eq!(game.turn_order.len(), 2);
    }
}
