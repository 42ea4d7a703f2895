//! Action application against shared state.
//!
//! Validation and mutation are split so the queue can check an action
//! without touching state: [`validate`] proves an action would succeed
//! against the state as it stands, [`apply`] performs it. Both local
//! optimistic applies and remote replays go through the same code, which
//! is what keeps peers convergent.

use gridtown_core::{
    Action, ActionKind, BuildingKind, GameState, Grid, PlayerId, ResourceKind, TileClass, TileKind,
};
use thiserror::Error;

/// Why an action cannot be applied to the current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// The target coordinate is off the map.
    #[error("cell ({row}, {col}) is outside the map")]
    OutOfBounds {
        /// Target row.
        row: u16,
        /// Target column.
        col: u16,
    },
    /// The target cell already holds a structure.
    #[error("cell ({row}, {col}) is already occupied")]
    Occupied {
        /// Target row.
        row: u16,
        /// Target column.
        col: u16,
    },
    /// Water accepts bridges and nothing else.
    #[error("only a bridge can be placed on water")]
    WaterNeedsBridge,
    /// Bridges only make sense over water.
    #[error("a bridge can only be placed on water")]
    BridgeNeedsWater,
    /// The cell belongs to someone else.
    #[error("cell ({row}, {col}) belongs to another player")]
    NotOwner {
        /// Target row.
        row: u16,
        /// Target column.
        col: u16,
    },
    /// There is no structure to remove at the target.
    #[error("nothing to remove at ({row}, {col})")]
    NothingToRemove {
        /// Target row.
        row: u16,
        /// Target column.
        col: u16,
    },
    /// The actor cannot cover the cost.
    #[error("cannot afford {building:?}: need {required} {resource:?}, have {available}")]
    CannotAfford {
        /// Building being priced.
        building: BuildingKind,
        /// Resource in shortfall.
        resource: ResourceKind,
        /// Amount required.
        required: u32,
        /// Amount held.
        available: u32,
    },
    /// The acting player is not in the roster.
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),
}

/// Check that `action` would apply cleanly against the current state,
/// without mutating anything.
pub fn validate(game: &GameState, grid: &Grid, action: &Action) -> Result<(), ApplyError> {
    let player = game
        .players
        .get(&action.player)
        .ok_or_else(|| ApplyError::UnknownPlayer(action.player.clone()))?;

    match &action.kind {
        ActionKind::PlaceBuilding { row, col, building } => {
            let cell = grid
                .get(*row, *col)
                .ok_or(ApplyError::OutOfBounds { row: *row, col: *col })?;
            if cell.class() != TileClass::Terrain {
                return Err(ApplyError::Occupied { row: *row, col: *col });
            }
            match (cell.tile, building) {
                (TileKind::Water, BuildingKind::Bridge) => {}
                (TileKind::Water, _) => return Err(ApplyError::WaterNeedsBridge),
                (_, BuildingKind::Bridge) => return Err(ApplyError::BridgeNeedsWater),
                _ => {}
            }
            if let Some((resource, required, available)) =
                player.resources.first_shortfall(building.cost())
            {
                return Err(ApplyError::CannotAfford {
                    building: *building,
                    resource,
                    required,
                    available,
                });
            }
            Ok(())
        }
        ActionKind::RemoveBuilding { row, col } => {
            let cell = grid
                .get(*row, *col)
                .ok_or(ApplyError::OutOfBounds { row: *row, col: *col })?;
            if cell.class() == TileClass::Terrain {
                return Err(ApplyError::NothingToRemove { row: *row, col: *col });
            }
            if cell.owner.as_ref() != Some(&action.player) {
                return Err(ApplyError::NotOwner { row: *row, col: *col });
            }
            Ok(())
        }
        ActionKind::UpdateResources { .. } | ActionKind::EndTurn => Ok(()),
    }
}

/// Apply `action` to the state. Validates first; on error nothing changes.
pub fn apply(game: &mut GameState, grid: &mut Grid, action: &Action) -> Result<(), ApplyError> {
    validate(game, grid, action)?;

    match &action.kind {
        ActionKind::PlaceBuilding { row, col, building } => {
            // validate() proved the player and cell exist and the cost is covered
            if let Some(player) = game.players.get_mut(&action.player) {
                player.resources.pay(building.cost());
            }
            if let Some(cell) = grid.get_mut(*row, *col) {
                cell.prior = Some(cell.tile);
                cell.tile = building.tile();
                cell.owner = Some(action.player.clone());
                cell.stamp = action.timestamp;
            }
        }
        ActionKind::RemoveBuilding { row, col } => {
            let removed = grid.get(*row, *col).map(|c| (c.tile, c.prior));
            if let Some((tile, prior)) = removed {
                if let Some(building) = building_for_tile(tile) {
                    if let Some(player) = game.players.get_mut(&action.player) {
                        for (kind, amount) in building.refund() {
                            player.resources.credit(kind, amount);
                        }
                    }
                }
                if let Some(cell) = grid.get_mut(*row, *col) {
                    cell.tile = prior.unwrap_or(TileKind::Grass);
                    cell.owner = None;
                    cell.prior = None;
                    cell.stamp = action.timestamp;
                }
            }
        }
        ActionKind::UpdateResources { deltas } => {
            if let Some(player) = game.players.get_mut(&action.player) {
                for &(kind, delta) in deltas {
                    player.resources.apply_delta(kind, delta);
                }
            }
        }
        ActionKind::EndTurn => {
            game.advance_turn();
        }
    }
    Ok(())
}

/// Building that produced this tile, if it is a placed structure.
fn building_for_tile(tile: TileKind) -> Option<BuildingKind> {
    BuildingKind::ALL.into_iter().find(|b| b.tile() == tile)
}
