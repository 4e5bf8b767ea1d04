//! Live instances of the definition types.

use serde::{Deserialize, Serialize};

use super::ids::Identified;
use crate::Id;

/// Soft-deletion state. Deleted entities keep their ID and their slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Part of the simulation.
    #[default]
    Active,
    /// Kept for history, ignored by every tick.
    Deleted,
}

impl Lifecycle {
    /// Serde helper.
    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub(crate) fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// A unit in training or ready to fight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Unique ID.
    pub id: Id,
    /// [`super::UnitType`] ID.
    #[serde(rename = "type")]
    pub type_id: Id,
    /// Training ticks left.
    #[serde(default)]
    pub ticks: u32,
    /// Zero means dead.
    #[serde(default)]
    pub health: u32,
}

impl Unit {
    /// Trained and alive, so it may join an army.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.health > 0 && self.ticks == 0
    }

    /// Cut the training short.
    pub fn finish(&mut self) -> &mut Self {
        self.ticks = 0;
        self
    }
}

/// A building under construction or standing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    /// Unique ID.
    pub id: Id,
    /// [`super::BuildingType`] ID.
    #[serde(rename = "type")]
    pub type_id: Id,
    /// Construction ticks left.
    #[serde(default)]
    pub ticks: u32,
    /// Ruined buildings are deleted.
    #[serde(default, skip_serializing_if = "Lifecycle::is_active")]
    pub lifecycle: Lifecycle,
}

impl Building {
    /// Built and not ruined.
    #[must_use]
    pub fn is_standing(&self) -> bool {
        self.ticks == 0 && self.lifecycle == Lifecycle::Active
    }
}

/// A knowledge being studied or known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Knowledge {
    /// Unique ID.
    pub id: Id,
    /// [`super::KnowledgeType`] ID.
    #[serde(rename = "type")]
    pub type_id: Id,
    /// Study ticks left.
    #[serde(default)]
    pub ticks: u32,
}

impl Knowledge {
    /// Study finished.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        self.ticks == 0
    }
}

/// Take health from units in order until `damage` is spent.
/// Returns the damage left once every unit is dead.
pub(crate) fn spread_damage<'a>(units: impl Iterator<Item = &'a mut Unit>, mut damage: u64) -> u64 {
    for u in units {
        if damage == 0 {
            break;
        }
        let hit = u.health.min(u32::try_from(damage).unwrap_or(u32::MAX));
        u.health -= hit;
        damage -= u64::from(hit);
    }
    damage
}

impl Identified for Unit {
    fn id(&self) -> Id {
        self.id
    }
}

impl Identified for Building {
    fn id(&self) -> Id {
        self.id
    }
}

impl Identified for Knowledge {
    fn id(&self) -> Id {
        self.id
    }
}
