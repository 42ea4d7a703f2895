//! Building catalog, resource ledger, and the fixed cost table.

use crate::grid::TileKind;
use serde::{Deserialize, Serialize};

/// Resource types a player accumulates and spends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    /// Construction lumber.
    Wood,
    /// Mined ore.
    Ore,
    /// Goods produced by commercial zones.
    CommercialGoods,
    /// Electrical power.
    Power,
}

/// Per-player resource balances. Never negative: debits saturate at zero
/// only through the checked paths; `pay` refuses to overdraw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLedger {
    /// Wood on hand.
    pub wood: u32,
    /// Ore on hand.
    pub ore: u32,
    /// Commercial goods on hand.
    pub commercial_goods: u32,
    /// Power on hand.
    pub power: u32,
}

/// A building's price, a static list of (resource, amount) pairs.
pub type Cost = &'static [(ResourceKind, u32)];

impl ResourceLedger {
    /// Current balance of one resource.
    pub fn get(&self, kind: ResourceKind) -> u32 {
        match kind {
            ResourceKind::Wood => self.wood,
            ResourceKind::Ore => self.ore,
            ResourceKind::CommercialGoods => self.commercial_goods,
            ResourceKind::Power => self.power,
        }
    }

    /// Add to one balance.
    pub fn credit(&mut self, kind: ResourceKind, amount: u32) {
        let slot = self.slot_mut(kind);
        *slot = slot.saturating_add(amount);
    }

    /// Whether every line of `cost` is covered.
    pub fn can_afford(&self, cost: Cost) -> bool {
        cost.iter().all(|&(kind, amount)| self.get(kind) >= amount)
    }

    /// First cost line not covered by the current balances, if any.
    pub fn first_shortfall(&self, cost: Cost) -> Option<(ResourceKind, u32, u32)> {
        cost.iter()
            .find(|&&(kind, amount)| self.get(kind) < amount)
            .map(|&(kind, amount)| (kind, amount, self.get(kind)))
    }

    /// Deduct `cost` in full, or deduct nothing and return false.
    pub fn pay(&mut self, cost: Cost) -> bool {
        if !self.can_afford(cost) {
            return false;
        }
        for &(kind, amount) in cost {
            let slot = self.slot_mut(kind);
            *slot -= amount;
        }
        true
    }

    /// Apply a signed adjustment, clamping at zero.
    pub fn apply_delta(&mut self, kind: ResourceKind, delta: i64) {
        let slot = self.slot_mut(kind);
        let next = (*slot as i64).saturating_add(delta).max(0);
        *slot = next.min(u32::MAX as i64) as u32;
    }

    fn slot_mut(&mut self, kind: ResourceKind) -> &mut u32 {
        match kind {
            ResourceKind::Wood => &mut self.wood,
            ResourceKind::Ore => &mut self.ore,
            ResourceKind::CommercialGoods => &mut self.commercial_goods,
            ResourceKind::Power => &mut self.power,
        }
    }
}

/// Fixed catalog of placeable buildings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BuildingKind {
    /// Road segment.
    Road,
    /// Road over water.
    Bridge,
    /// Residential zone.
    Residential,
    /// Commercial zone.
    Commercial,
    /// Industrial zone.
    Industrial,
    /// Mixed-use zone.
    Mixed,
    /// Power plant.
    PowerPlant,
    /// Power lines.
    PowerLines,
    /// Lumber yard.
    LumberYard,
    /// Mining outpost.
    MiningOutpost,
}

impl BuildingKind {
    /// Every building kind, in catalog order.
    pub const ALL: [BuildingKind; 10] = [
        BuildingKind::Road,
        BuildingKind::Bridge,
        BuildingKind::Residential,
        BuildingKind::Commercial,
        BuildingKind::Industrial,
        BuildingKind::Mixed,
        BuildingKind::PowerPlant,
        BuildingKind::PowerLines,
        BuildingKind::LumberYard,
        BuildingKind::MiningOutpost,
    ];

    /// Placement cost.
    pub fn cost(self) -> Cost {
        use ResourceKind::{Ore, Wood};
        match self {
            BuildingKind::Road => &[(Wood, 4)],
            BuildingKind::Bridge => &[(Wood, 16), (Ore, 6)],
            BuildingKind::Residential => &[(Wood, 60), (Ore, 8)],
            BuildingKind::Commercial => &[(Wood, 30), (Ore, 20)],
            BuildingKind::Industrial => &[(Wood, 40), (Ore, 20)],
            BuildingKind::Mixed => &[(Wood, 36), (Ore, 16)],
            BuildingKind::PowerPlant => &[(Wood, 25), (Ore, 15)],
            BuildingKind::PowerLines => &[(Wood, 3), (Ore, 1)],
            BuildingKind::LumberYard => &[(Wood, 10)],
            BuildingKind::MiningOutpost => &[(Wood, 20), (Ore, 10)],
        }
    }

    /// Refund granted on removal: floor of half the cost, per resource.
    pub fn refund(self) -> Vec<(ResourceKind, u32)> {
        self.cost()
            .iter()
            .map(|&(kind, amount)| (kind, amount / 2))
            .collect()
    }

    /// Tile placed on the grid when this building lands.
    pub fn tile(self) -> TileKind {
        match self {
            BuildingKind::Road => TileKind::Road,
            BuildingKind::Bridge => TileKind::Bridge,
            BuildingKind::Residential => TileKind::Residential,
            BuildingKind::Commercial => TileKind::Commercial,
            BuildingKind::Industrial => TileKind::Industrial,
            BuildingKind::Mixed => TileKind::Mixed,
            BuildingKind::PowerPlant => TileKind::PowerPlant,
            BuildingKind::PowerLines => TileKind::PowerLines,
            BuildingKind::LumberYard => TileKind::LumberYard,
            BuildingKind::MiningOutpost => TileKind::MiningOutpost,
        }
    }
}
