//! The shared cell grid and the fixed tile catalog.
//!
//! The grid is a flat 60x60 array of cell records. Rendering, terrain
//! classification, and resource ticking live outside the core; everything
//! here is bookkeeping over `tile`, `owner`, and the mutation stamp.

use crate::{Millis, PlayerId};
use serde::{Deserialize, Serialize};

/// Default map edge length in cells.
pub const MAP_SIZE: usize = 60;

/// Semantic tile tag, the full catalog of terrain, infrastructure, and
/// zoning types a cell can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileKind {
    /// Open buildable ground.
    Grass,
    /// Harvestable forest terrain.
    Forest,
    /// Water; only bridges may be placed here.
    Water,
    /// Mountain terrain.
    Mountain,
    /// Sand terrain.
    Sand,
    /// Basic road segment.
    Road,
    /// Road segment spanning water.
    Bridge,
    /// Power generation plant.
    PowerPlant,
    /// Power distribution lines.
    PowerLines,
    /// Wood production site.
    LumberYard,
    /// Ore production site.
    MiningOutpost,
    /// Residential zone.
    Residential,
    /// Commercial zone.
    Commercial,
    /// Industrial zone.
    Industrial,
    /// Mixed-use zone.
    Mixed,
}

/// Coarse category a tile belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileClass {
    /// Natural, unowned ground.
    Terrain,
    /// Player-placed transport and utility structures.
    Infrastructure,
    /// Player-placed zoned development.
    Zoning,
}

impl TileKind {
    /// Category this tile belongs to.
    pub fn class(self) -> TileClass {
        match self {
            TileKind::Grass
            | TileKind::Forest
            | TileKind::Water
            | TileKind::Mountain
            | TileKind::Sand => TileClass::Terrain,
            TileKind::Road
            | TileKind::Bridge
            | TileKind::PowerPlant
            | TileKind::PowerLines
            | TileKind::LumberYard
            | TileKind::MiningOutpost => TileClass::Infrastructure,
            TileKind::Residential
            | TileKind::Commercial
            | TileKind::Industrial
            | TileKind::Mixed => TileClass::Zoning,
        }
    }
}

/// One grid cell record.
///
/// `owner` is `None` for natural terrain and unclaimed infrastructure.
/// Only the owner may mutate an owned cell; `stamp` records the last
/// mutation time and is the tie-break input for simultaneous claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Row index, 0-based.
    pub row: u16,
    /// Column index, 0-based.
    pub col: u16,
    /// Current semantic tile tag.
    pub tile: TileKind,
    /// Owning player, if placed.
    pub owner: Option<PlayerId>,
    /// Last mutation time.
    pub stamp: Millis,
    /// Terrain that was here before placement, restored on removal.
    pub prior: Option<TileKind>,
}

impl Cell {
    /// Category of the current tile.
    pub fn class(&self) -> TileClass {
        self.tile.class()
    }
}

/// Flat row-major store of cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    size: usize,
    cells: Vec<Cell>,
}

impl Grid {
    /// Create a default-size grid of grass.
    pub fn new() -> Self {
        Self::with_size(MAP_SIZE)
    }

    /// Create a square grid with a custom edge length (tests use small maps).
    pub fn with_size(size: usize) -> Self {
        let mut cells = Vec::with_capacity(size * size);
        for row in 0..size {
            for col in 0..size {
                cells.push(Cell {
                    row: row as u16,
                    col: col as u16,
                    tile: TileKind::Grass,
                    owner: None,
                    stamp: Millis::ZERO,
                    prior: None,
                });
            }
        }
        Self { size, cells }
    }

    /// Edge length in cells.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the coordinate falls inside the map.
    pub fn in_bounds(&self, row: u16, col: u16) -> bool {
        (row as usize) < self.size && (col as usize) < self.size
    }

    /// Cell at the coordinate, if in bounds.
    pub fn get(&self, row: u16, col: u16) -> Option<&Cell> {
        if !self.in_bounds(row, col) {
            return None;
        }
        self.cells.get(row as usize * self.size + col as usize)
    }

    /// Mutable cell at the coordinate, if in bounds.
    pub fn get_mut(&mut self, row: u16, col: u16) -> Option<&mut Cell> {
        if !self.in_bounds(row, col) {
            return None;
        }
        self.cells.get_mut(row as usize * self.size + col as usize)
    }

    /// Iterate all cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    /// Overwrite a cell from a sync payload. Out-of-bounds records are
    /// rejected rather than panicking on hostile input.
    pub fn ingest(&mut self, cell: Cell) -> bool {
        if !self.in_bounds(cell.row, cell.col) {
            return false;
        }
        let slot = cell.row as usize * self.size + cell.col as usize;
        self.cells[slot] = cell;
        true
    }

    /// Number of cells currently owned by `player`.
    pub fn owned_by(&self, player: &PlayerId) -> usize {
        self.cells
            .iter()
            .filter(|c| c.owner.as_ref() == Some(player))
            .count()
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new()
    }
}
