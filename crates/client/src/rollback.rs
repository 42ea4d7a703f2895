//! Snapshot stack for optimistic rollback.
//!
//! Before a local action is applied optimistically, the session pushes a
//! snapshot of the state it is about to mutate. If the action is later
//! rejected, the snapshot taken for it is restored; if it is confirmed,
//! snapshots up to and including it are discarded. The stack is bounded:
//! beyond [`ROLLBACK_DEPTH`] unconfirmed actions, the oldest snapshot is
//! evicted and that action can no longer be undone.

use gridtown_core::{ActionId, GameState, Grid, Millis};
use std::collections::VecDeque;
use tracing::warn;

/// Maximum unconfirmed snapshots retained.
pub const ROLLBACK_DEPTH: usize = 10;

/// State captured immediately before one optimistic apply.
#[derive(Debug, Clone)]
pub struct RollbackPoint {
    /// The action this snapshot guards against.
    pub action: ActionId,
    /// When the snapshot was taken.
    pub stamp: Millis,
    /// Session state before the apply.
    pub game: GameState,
    /// Grid state before the apply.
    pub grid: Grid,
}

/// Bounded FIFO stack of rollback points, oldest evicted first.
#[derive(Debug, Default)]
pub struct RollbackStack {
    points: VecDeque<RollbackPoint>,
}

impl RollbackStack {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture a snapshot guarding `action`.
    pub fn push(&mut self, action: ActionId, game: &GameState, grid: &Grid) {
        if self.points.len() == ROLLBACK_DEPTH {
            if let Some(evicted) = self.points.pop_front() {
                warn!(action = %evicted.action, "rollback depth exceeded, dropping oldest snapshot");
            }
        }
        self.points.push_back(RollbackPoint {
            action,
            stamp: Millis::now(),
            game: game.clone(),
            grid: grid.clone(),
        });
    }

    /// Actions with snapshots taken after `action`, oldest first.
    /// Restoring `action`'s snapshot erases their effects too; the caller
    /// replays them on top of the restored state.
    pub fn later_than(&self, action: ActionId) -> Vec<ActionId> {
        match self.points.iter().position(|p| p.action == action) {
            Some(pos) => self.points.iter().skip(pos + 1).map(|p| p.action).collect(),
            None => Vec::new(),
        }
    }

    /// Remove and return the snapshot for a rejected `action`, discarding
    /// every snapshot taken after it. Those later snapshots embed the
    /// rejected action's effects, so restoring them would resurrect it.
    pub fn take(&mut self, action: ActionId) -> Option<RollbackPoint> {
        let pos = self.points.iter().position(|p| p.action == action)?;
        self.points.truncate(pos + 1);
        self.points.pop_back()
    }

    /// Discard snapshots for `action` and everything before it once the
    /// action is confirmed.
    pub fn confirm(&mut self, action: ActionId) {
        if let Some(pos) = self.points.iter().position(|p| p.action == action) {
            self.points.drain(..=pos);
        }
    }

    /// Most recent snapshot, without removing it.
    pub fn last_stable(&self) -> Option<&RollbackPoint> {
        self.points.back()
    }

    /// Number of unconfirmed snapshots held.
    pub fn depth(&self) -> usize {
        self.points.len()
    }

    /// Whether no snapshots are held.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridtown_core::TileKind;

    fn state() -> (GameState, Grid) {
        (GameState::new("g1", "ROOM"), Grid::with_size(4))
    }

    #[test]
    fn take_restores_the_guarded_snapshot() {
        let (mut game, grid) = state();
        let mut stack = RollbackStack::new();

        stack.push(ActionId(1), &game, &grid);
        game.last_action_id = 99;

        let point = stack.take(ActionId(1)).unwrap();
        assert_eq!(point.game.last_action_id, 0);
        assert!(stack.is_empty());
    }

    #[test]
    fn take_discards_snapshots_built_on_the_rejected_action() {
        let (game, mut grid) = state();
        let mut stack = RollbackStack::new();

        stack.push(ActionId(1), &game, &grid);
        grid.get_mut(0, 0).unwrap().tile = TileKind::Road;
        stack.push(ActionId(2), &game, &grid);
        stack.push(ActionId(3), &game, &grid);

        let point = stack.take(ActionId(1)).unwrap();
        assert_eq!(point.grid.get(0, 0).unwrap().tile, TileKind::Grass);
        assert!(stack.is_empty());
    }

    #[test]
    fn confirm_drops_up_to_and_including_that_action() {
        let (game, grid) = state();
        let mut stack = RollbackStack::new();

        stack.push(ActionId(1), &game, &grid);
        stack.push(ActionId(2), &game, &grid);
        stack.push(ActionId(3), &game, &grid);

        stack.confirm(ActionId(2));
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.last_stable().unwrap().action, ActionId(3));
    }

    #[test]
    fn depth_is_capped_with_oldest_evicted() {
        let (game, grid) = state();
        let mut stack = RollbackStack::new();

        for i in 0..15 {
            stack.push(ActionId(i), &game, &grid);
        }

        assert_eq!(stack.depth(), ROLLBACK_DEPTH);
        // the first five were evicted and can no longer be undone
        assert!(stack.take(ActionId(0)).is_none());
        assert!(stack.take(ActionId(14)).is_some());
    }

    #[test]
    fn later_than_lists_subsequent_actions_in_order() {
        let (game, grid) = state();
        let mut stack = RollbackStack::new();

        stack.push(ActionId(1), &game, &grid);
        stack.push(ActionId(2), &game, &grid);
        stack.push(ActionId(3), &game, &grid);

        assert_eq!(stack.later_than(ActionId(1)), vec![ActionId(2), ActionId(3)]);
        assert_eq!(stack.later_than(ActionId(3)), Vec::<ActionId>::new());
        assert_eq!(stack.later_than(ActionId(9)), Vec::<ActionId>::new());
    }

    #[test]
    fn take_unknown_action_is_none() {
        let mut stack = RollbackStack::new();
        assert!(stack.take(ActionId(42)).is_none());
    }
}
