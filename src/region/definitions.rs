//! Immutable type tables loaded once at startup.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::assets::{Building, Knowledge};
use super::ids::{self, Identified};
use super::resources::{ResourceModifiers, Resources};
use crate::Id;
use crate::error::{Error, Result};

/// A kind of unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitType {
    /// Unique ID.
    pub id: Id,
    /// Display name.
    pub name: String,
    /// Health of a fresh unit.
    pub health: u32,
    /// Training duration.
    #[serde(default)]
    pub ticks: u32,
    /// Paid on every training tick.
    #[serde(default)]
    pub cost: Resources,
    /// Transient popularity while the unit lives.
    #[serde(default)]
    pub pop_bonus: i64,
    /// Permanent popularity when training completes.
    #[serde(default)]
    pub pop_bonus_train: i64,
    /// Popularity a city needs to start training.
    #[serde(default)]
    pub pop_required: i64,
    /// Building type a city must have standing to train this unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_building: Option<Id>,
}

/// A kind of building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingType {
    /// Unique ID.
    pub id: Id,
    /// Display name.
    pub name: String,
    /// Construction duration.
    #[serde(default)]
    pub ticks: u32,
    /// Paid upfront when construction starts.
    #[serde(default)]
    pub cost0: Resources,
    /// Paid on every construction tick.
    #[serde(default)]
    pub cost: Resources,
    /// At most one per city.
    #[serde(default)]
    pub unique: bool,
    /// Popularity a city needs to start construction.
    #[serde(default)]
    pub pop_required: i64,
    /// Transient popularity while standing.
    #[serde(default)]
    pub pop_bonus: i64,
    /// Permanent popularity when construction completes.
    #[serde(default)]
    pub pop_bonus_build: i64,
    /// Effect on the stock capacity.
    #[serde(default)]
    pub stock: ResourceModifiers,
    /// Effect on the production.
    #[serde(default)]
    pub prod: ResourceModifiers,
    /// Knowledge types that must be known.
    #[serde(default)]
    pub requires: Vec<Id>,
    /// Knowledge types that must be absent.
    #[serde(default)]
    pub conflicts: Vec<Id>,
}

/// A kind of knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeType {
    /// Unique ID.
    pub id: Id,
    /// Display name.
    pub name: String,
    /// Study duration.
    #[serde(default)]
    pub ticks: u32,
    /// Paid on every study tick.
    #[serde(default)]
    pub cost: Resources,
    /// Transient popularity while known.
    #[serde(default)]
    pub pop_bonus: i64,
    /// Permanent popularity when the study completes.
    #[serde(default)]
    pub pop_bonus_learn: i64,
    /// Effect on the stock capacity.
    #[serde(default)]
    pub stock: ResourceModifiers,
    /// Effect on the production.
    #[serde(default)]
    pub prod: ResourceModifiers,
    /// Knowledge types that must be known.
    #[serde(default)]
    pub requires: Vec<Id>,
    /// Knowledge types that must be absent.
    #[serde(default)]
    pub conflicts: Vec<Id>,
}

impl Identified for UnitType {
    fn id(&self) -> Id {
        self.id
    }
}

impl Identified for BuildingType {
    fn id(&self) -> Id {
        self.id
    }
}

impl Identified for KnowledgeType {
    fn id(&self) -> Id {
        self.id
    }
}

/// All the type tables, each sorted by ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Definitions {
    /// Unit types.
    #[serde(default)]
    pub units: Vec<UnitType>,
    /// Building types.
    #[serde(default)]
    pub buildings: Vec<BuildingType>,
    /// Knowledge types.
    #[serde(default)]
    pub knowledges: Vec<KnowledgeType>,
}

/// Requirements must be known, conflicts must not even be started.
pub(crate) fn knowledge_allows(owned: &[Knowledge], requires: &[Id], conflicts: &[Id]) -> bool {
    let known: HashSet<Id> = owned
        .iter()
        .filter(|k| k.is_known())
        .map(|k| k.type_id)
        .collect();
    requires.iter().all(|r| known.contains(r))
        && !owned.iter().any(|k| conflicts.contains(&k.type_id))
}

impl Definitions {
    /// Look a unit type up.
    #[must_use]
    pub fn unit_type(&self, id: Id) -> Option<&UnitType> {
        ids::get(&self.units, id)
    }

    /// Look a building type up.
    #[must_use]
    pub fn building_type(&self, id: Id) -> Option<&BuildingType> {
        ids::get(&self.buildings, id)
    }

    /// Look a knowledge type up.
    #[must_use]
    pub fn knowledge_type(&self, id: Id) -> Option<&KnowledgeType> {
        ids::get(&self.knowledges, id)
    }

    /// Like [`Definitions::unit_type`], as an error.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown ID.
    pub fn require_unit_type(&self, id: Id) -> Result<&UnitType> {
        self.unit_type(id)
            .ok_or_else(|| Error::not_found("unit type", id))
    }

    /// Like [`Definitions::building_type`], as an error.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown ID.
    pub fn require_building_type(&self, id: Id) -> Result<&BuildingType> {
        self.building_type(id)
            .ok_or_else(|| Error::not_found("building type", id))
    }

    /// Like [`Definitions::knowledge_type`], as an error.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown ID.
    pub fn require_knowledge_type(&self, id: Id) -> Result<&KnowledgeType> {
        self.knowledge_type(id)
            .ok_or_else(|| Error::not_found("knowledge type", id))
    }

    /// Sort every table.
    pub fn post_load(&mut self) {
        ids::sort(&mut self.units);
        ids::sort(&mut self.buildings);
        ids::sort(&mut self.knowledges);
        for b in &mut self.buildings {
            b.requires.sort_unstable();
            b.conflicts.sort_unstable();
        }
        for k in &mut self.knowledges {
            k.requires.sort_unstable();
            k.conflicts.sort_unstable();
        }
    }

    /// Sortedness and cross references.
    ///
    /// # Errors
    ///
    /// [`Error::Consistency`] on the first violation.
    pub fn check(&self) -> Result<()> {
        ids::check_sorted(&self.units, "unit types")?;
        ids::check_sorted(&self.buildings, "building types")?;
        ids::check_sorted(&self.knowledges, "knowledge types")?;

        let dangling = self.units.iter().find_map(|u| {
            u.required_building
                .filter(|&b| self.building_type(b).is_none())
                .map(|b| (u.id, b))
        });
        if let Some((unit, building)) = dangling {
            return Err(Error::consistency(format!(
                "unit type {unit} requires unknown building type {building}"
            )));
        }
        let knowledge_refs = self
            .buildings
            .iter()
            .map(|b| (b.id, &b.requires, &b.conflicts))
            .chain(
                self.knowledges
                    .iter()
                    .map(|k| (k.id, &k.requires, &k.conflicts)),
            );
        for (owner, requires, conflicts) in knowledge_refs {
            if let Some(missing) = requires
                .iter()
                .chain(conflicts.iter())
                .find(|&&k| self.knowledge_type(k).is_none())
            {
                return Err(Error::consistency(format!(
                    "type {owner} references unknown knowledge type {missing}"
                )));
            }
        }
        Ok(())
    }

    /// Highest ID used by any type.
    #[must_use]
    pub fn max_id(&self) -> Id {
        let units = self.units.iter().map(|t| t.id);
        let buildings = self.buildings.iter().map(|t| t.id);
        let knowledges = self.knowledges.iter().map(|t| t.id);
        units.chain(buildings).chain(knowledges).max().unwrap_or(0)
    }

    /// Every type ID, for the uniqueness check.
    pub(crate) fn all_ids(&self) -> impl Iterator<Item = Id> + '_ {
        let units = self.units.iter().map(|t| t.id);
        let buildings = self.buildings.iter().map(|t| t.id);
        let knowledges = self.knowledges.iter().map(|t| t.id);
        units.chain(buildings).chain(knowledges)
    }

    /// Knowledge types a city may start studying.
    #[must_use]
    pub fn knowledge_frontier(&self, owned: &[Knowledge]) -> Vec<&KnowledgeType> {
        self.knowledges
            .iter()
            .filter(|t| !owned.iter().any(|k| k.type_id == t.id))
            .filter(|t| knowledge_allows(owned, &t.requires, &t.conflicts))
            .collect()
    }

    /// Building types a city may start building.
    #[must_use]
    pub fn building_frontier(
        &self,
        popularity: i64,
        buildings: &[Building],
        knowledges: &[Knowledge],
    ) -> Vec<&BuildingType> {
        self.buildings
            .iter()
            .filter(|t| popularity >= t.pop_required)
            .filter(|t| {
                !t.unique
                    || !buildings
                        .iter()
                        .any(|b| b.type_id == t.id && b.lifecycle.is_active())
            })
            .filter(|t| knowledge_allows(knowledges, &t.requires, &t.conflicts))
            .collect()
    }

    /// Unit types a city may train, ignoring popularity.
    #[must_use]
    pub fn unit_frontier(&self, buildings: &[Building]) -> Vec<&UnitType> {
        let standing: HashSet<Id> = buildings
            .iter()
            .filter(|b| b.is_standing())
            .map(|b| b.type_id)
            .collect();
        self.units
            .iter()
            .filter(|t| t.required_building.is_none_or(|b| standing.contains(&b)))
            .collect()
    }
}
