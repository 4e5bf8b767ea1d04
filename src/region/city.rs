//! Cities: economy, construction queues and army creation.

use serde::{Deserialize, Serialize};

use super::army::Army;
use super::assets::{Building, Knowledge, Lifecycle, Unit, spread_damage};
use super::definitions::{BuildingType, Definitions, KnowledgeType, UnitType, knowledge_allows};
use super::events::{Event, emit};
use super::ids::{self, Identified};
use super::resources::{ResourceModifiers, Resources, ResourcesMultiplier};
use super::world::Rules;
use crate::Id;
use crate::config::FundingQueue;
use crate::error::{Error, Result};

/// Production of a city with the breakdown of its modifiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CityProduction {
    /// Base production.
    pub base: Resources,
    /// Composed modifiers of standing buildings.
    pub buildings: ResourceModifiers,
    /// Composed modifiers of known knowledge.
    pub knowledge: ResourceModifiers,
    /// Base with both modifiers applied.
    pub actual: Resources,
}

/// Stock capacity of a city with the breakdown of its modifiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CityStock {
    /// Base capacity.
    pub base: Resources,
    /// Composed modifiers of standing buildings.
    pub buildings: ResourceModifiers,
    /// Composed modifiers of known knowledge.
    pub knowledge: ResourceModifiers,
    /// Effective capacity.
    pub actual: Resources,
    /// Current stock.
    pub usage: Resources,
}

fn no_tax() -> ResourcesMultiplier {
    ResourcesMultiplier::zero()
}

/// A city standing on a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    /// Unique ID.
    pub id: Id,
    /// Cell of the region's map.
    pub cell: Id,
    /// Display name.
    pub name: String,
    /// Character in charge.
    pub owner: Id,
    /// Second character allowed to manage the city.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deputy: Option<Id>,
    /// City this one pays tax to. Authoritative over the liege lists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlord: Option<Id>,
    /// Share of the production sent to the overlord.
    #[serde(default = "no_tax")]
    pub tax_rate: ResourcesMultiplier,
    /// Popularity that does not depend on the present assets.
    #[serde(default)]
    pub permanent_popularity: i64,
    /// Current stock.
    #[serde(default)]
    pub stock: Resources,
    /// Base stock capacity.
    #[serde(default)]
    pub stock_capacity: Resources,
    /// Base production per tick.
    #[serde(default)]
    pub production: Resources,
    /// Pending massacres; one is recovered per tick.
    #[serde(default)]
    pub ticks_massacres: u32,
    /// Deleted cities keep their ID.
    #[serde(default, skip_serializing_if = "Lifecycle::is_active")]
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub(crate) units: Vec<Unit>,
    #[serde(default)]
    pub(crate) buildings: Vec<Building>,
    #[serde(default)]
    pub(crate) knowledges: Vec<Knowledge>,
    #[serde(default)]
    pub(crate) armies: Vec<Army>,
    /// Cities paying tax to this one, rebuilt from `overlord` fields.
    #[serde(skip)]
    pub(crate) lieges: Vec<Id>,
}

impl Identified for City {
    fn id(&self) -> Id {
        self.id
    }
}

impl City {
    /// A free, empty city.
    #[must_use]
    pub fn new(id: Id, cell: Id, owner: Id, name: impl Into<String>) -> Self {
        Self {
            id,
            cell,
            name: name.into(),
            owner,
            deputy: None,
            overlord: None,
            tax_rate: no_tax(),
            permanent_popularity: 0,
            stock: Resources::ZERO,
            stock_capacity: Resources::ZERO,
            production: Resources::ZERO,
            ticks_massacres: 0,
            lifecycle: Lifecycle::Active,
            units: Vec::new(),
            buildings: Vec::new(),
            knowledges: Vec::new(),
            armies: Vec::new(),
            lieges: Vec::new(),
        }
    }

    /// Not deleted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::Conflict(format!("city {} is deleted", self.id)))
        }
    }

    /// Whether `character` may give orders to the city.
    #[must_use]
    pub fn is_managed_by(&self, character: Id) -> bool {
        self.owner == character || self.deputy == Some(character)
    }

    /// Garrison and units in training, sorted by ID.
    #[must_use]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Buildings, sorted by ID.
    #[must_use]
    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    /// Knowledge, sorted by ID.
    #[must_use]
    pub fn knowledges(&self) -> &[Knowledge] {
        &self.knowledges
    }

    /// Armies, deleted ones included, sorted by ID.
    #[must_use]
    pub fn armies(&self) -> &[Army] {
        &self.armies
    }

    /// Cities paying tax to this one, sorted.
    #[must_use]
    pub fn lieges(&self) -> &[Id] {
        &self.lieges
    }

    /// Look a unit of the garrison up.
    #[must_use]
    pub fn unit(&self, id: Id) -> Option<&Unit> {
        ids::get(&self.units, id)
    }

    /// Look a building up.
    #[must_use]
    pub fn building(&self, id: Id) -> Option<&Building> {
        ids::get(&self.buildings, id)
    }

    /// Look a knowledge up.
    #[must_use]
    pub fn knowledge(&self, id: Id) -> Option<&Knowledge> {
        ids::get(&self.knowledges, id)
    }

    /// Look an army up.
    #[must_use]
    pub fn army(&self, id: Id) -> Option<&Army> {
        ids::get(&self.armies, id)
    }

    /// Look an army up for giving it orders.
    pub fn army_mut(&mut self, id: Id) -> Option<&mut Army> {
        ids::get_mut(&mut self.armies, id)
    }

    /// Finish the training of a garrison unit at once.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown unit.
    pub fn unit_finish(&mut self, id: Id) -> Result<()> {
        ids::get_mut(&mut self.units, id)
            .map(|u| {
                u.finish();
            })
            .ok_or_else(|| Error::not_found("unit", id))
    }

    /// Permanent popularity plus the transient bonuses of live assets.
    #[must_use]
    pub fn popularity(&self, rules: &Rules<'_>) -> i64 {
        let defs = rules.definitions;
        let unit_bonus = |u: &Unit| {
            if u.health == 0 {
                0
            } else {
                defs.unit_type(u.type_id).map_or(0, |t| t.pop_bonus)
            }
        };

        let mut pop = self.permanent_popularity;
        for a in self.armies.iter().filter(|a| a.is_active()) {
            pop += a.units.iter().map(unit_bonus).sum::<i64>();
            pop += rules.config.pop_bonus_army_alive;
        }
        pop += self.units.iter().map(unit_bonus).sum::<i64>();
        pop += self
            .buildings
            .iter()
            .filter(|b| b.is_standing())
            .filter_map(|b| defs.building_type(b.type_id))
            .map(|t| t.pop_bonus)
            .sum::<i64>();
        pop += self
            .knowledges
            .iter()
            .filter(|k| k.is_known())
            .filter_map(|k| defs.knowledge_type(k.type_id))
            .map(|t| t.pop_bonus)
            .sum::<i64>();
        pop
    }

    fn modifiers(
        &self,
        defs: &Definitions,
        of_building: fn(&BuildingType) -> &ResourceModifiers,
        of_knowledge: fn(&KnowledgeType) -> &ResourceModifiers,
    ) -> (ResourceModifiers, ResourceModifiers) {
        let mut buildings = ResourceModifiers::noop();
        for t in self
            .buildings
            .iter()
            .filter(|b| b.is_standing())
            .filter_map(|b| defs.building_type(b.type_id))
        {
            buildings.compose_with(of_building(t));
        }
        let mut knowledge = ResourceModifiers::noop();
        for t in self
            .knowledges
            .iter()
            .filter(|k| k.is_known())
            .filter_map(|k| defs.knowledge_type(k.type_id))
        {
            knowledge.compose_with(of_knowledge(t));
        }
        (buildings, knowledge)
    }

    /// Effective production before massacres.
    #[must_use]
    pub fn production_view(&self, defs: &Definitions) -> CityProduction {
        let (buildings, knowledge) = self.modifiers(defs, |t| &t.prod, |t| &t.prod);
        let mut actual = self.production;
        actual.apply(&buildings);
        actual.apply(&knowledge);
        CityProduction {
            base: self.production,
            buildings,
            knowledge,
            actual,
        }
    }

    /// Effective capacity and current usage.
    #[must_use]
    pub fn stock_view(&self, defs: &Definitions) -> CityStock {
        let (buildings, knowledge) = self.modifiers(defs, |t| &t.stock, |t| &t.stock);
        let mut actual = self.stock_capacity;
        actual.apply(&buildings);
        actual.apply(&knowledge);
        CityStock {
            base: self.stock_capacity,
            buildings,
            knowledge,
            actual,
            usage: self.stock,
        }
    }

    /// Apply the pending massacres to `production` and recover one of them.
    pub(crate) fn produce_locally(&mut self, mut production: Resources, impact: f64) -> Resources {
        if self.ticks_massacres > 0 {
            let ratio = ResourcesMultiplier::uniform(impact);
            for _ in 0..self.ticks_massacres {
                production.multiply(&ratio);
            }
            self.ticks_massacres -= 1;
        }
        production
    }

    /// One production tick.
    ///
    /// `overlord` is the live overlord, if any. Returns the tax taken from
    /// the stock, which the caller hands over.
    pub(crate) fn produce(&mut self, rules: &Rules<'_>, overlord: Option<Id>) -> Option<Resources> {
        let production = self.production_view(rules.definitions).actual;
        let capacity = self.stock_view(rules.definitions).actual;

        let produced = self.produce_locally(production, rules.config.massacre_impact);
        self.stock.add(&produced);

        let tax = overlord.map(|_| {
            let mut tax = produced;
            tax.multiply(&self.tax_rate);
            tax.trim_to(&self.stock);
            self.stock.remove(&tax);
            tax
        });

        for queue in rules.config.funding_order {
            match queue {
                FundingQueue::Units => self.fund_units(rules),
                FundingQueue::Buildings => self.fund_buildings(rules),
                FundingQueue::Knowledge => self.fund_knowledge(rules),
            }
        }

        self.stock.trim_to(&capacity);
        tax
    }

    fn fund_units(&mut self, rules: &Rules<'_>) {
        for u in self.units.iter_mut().filter(|u| u.ticks > 0) {
            let Some(t) = rules.definitions.unit_type(u.type_id) else {
                continue;
            };
            if !self.stock.greater_or_equal_to(&t.cost) {
                continue;
            }
            self.stock.remove(&t.cost);
            u.ticks -= 1;
            if u.ticks == 0 {
                self.permanent_popularity += t.pop_bonus_train;
            }
            emit(
                rules.notifier,
                Event::UnitProgress {
                    city: self.id,
                    unit: u.id,
                    ticks_left: u.ticks,
                },
            );
        }
    }

    fn fund_buildings(&mut self, rules: &Rules<'_>) {
        let pending = self
            .buildings
            .iter_mut()
            .filter(|b| b.ticks > 0 && b.lifecycle == Lifecycle::Active);
        for b in pending {
            let Some(t) = rules.definitions.building_type(b.type_id) else {
                continue;
            };
            if !self.stock.greater_or_equal_to(&t.cost) {
                continue;
            }
            self.stock.remove(&t.cost);
            b.ticks -= 1;
            if b.ticks == 0 {
                self.permanent_popularity += t.pop_bonus_build;
            }
            emit(
                rules.notifier,
                Event::BuildingProgress {
                    city: self.id,
                    building: b.id,
                    ticks_left: b.ticks,
                },
            );
        }
    }

    fn fund_knowledge(&mut self, rules: &Rules<'_>) {
        for k in self.knowledges.iter_mut().filter(|k| k.ticks > 0) {
            let Some(t) = rules.definitions.knowledge_type(k.type_id) else {
                continue;
            };
            if !self.stock.greater_or_equal_to(&t.cost) {
                continue;
            }
            self.stock.remove(&t.cost);
            k.ticks -= 1;
            if k.ticks == 0 {
                self.permanent_popularity += t.pop_bonus_learn;
            }
            emit(
                rules.notifier,
                Event::KnowledgeProgress {
                    city: self.id,
                    knowledge: k.id,
                    ticks_left: k.ticks,
                },
            );
        }
    }

    /// Add resources, trimmed to the effective capacity.
    pub(crate) fn credit(&mut self, defs: &Definitions, amount: &Resources) {
        let capacity = self.stock_view(defs).actual;
        self.stock.add(amount);
        self.stock.trim_to(&capacity);
    }

    /// Take units and cargo in, e.g. from a disbanded army.
    pub(crate) fn receive(&mut self, defs: &Definitions, units: Vec<Unit>, cargo: &Resources) {
        self.units.extend(units);
        ids::sort(&mut self.units);
        self.credit(defs, cargo);
    }

    /// Same ratio on every resource.
    pub fn set_uniform_tax_rate(&mut self, ratio: f64) {
        self.tax_rate = ResourcesMultiplier::uniform(ratio);
    }

    /// Per-resource ratios.
    pub fn set_tax_rate(&mut self, rate: ResourcesMultiplier) {
        self.tax_rate = rate;
    }

    /// Whether a standing building allows training `t`.
    #[must_use]
    pub fn unit_allowed(&self, t: &UnitType) -> bool {
        t.required_building.is_none_or(|required| {
            self.buildings
                .iter()
                .any(|b| b.type_id == required && b.is_standing())
        })
    }

    /// Unit types the city may train now.
    #[must_use]
    pub fn unit_frontier<'d>(&self, rules: &Rules<'d>) -> Vec<&'d UnitType> {
        let pop = self.popularity(rules);
        rules
            .definitions
            .unit_frontier(&self.buildings)
            .into_iter()
            .filter(|t| pop >= t.pop_required)
            .collect()
    }

    /// Building types the city may start now.
    #[must_use]
    pub fn building_frontier<'d>(&self, rules: &Rules<'d>) -> Vec<&'d BuildingType> {
        rules.definitions.building_frontier(
            self.popularity(rules),
            &self.buildings,
            &self.knowledges,
        )
    }

    /// Knowledge types the city may start studying now.
    #[must_use]
    pub fn knowledge_frontier<'d>(&self, rules: &Rules<'d>) -> Vec<&'d KnowledgeType> {
        rules.definitions.knowledge_frontier(&self.knowledges)
    }

    /// Start training a unit.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] for an unknown type.
    /// - [`Error::Conflict`] without the required building or popularity,
    ///   or on a deleted city.
    pub fn train(&mut self, rules: &Rules<'_>, type_id: Id) -> Result<Id> {
        self.ensure_active()?;
        let t = rules.definitions.require_unit_type(type_id)?;
        if !self.unit_allowed(t) {
            return Err(Error::Conflict(format!(
                "city {} lacks the building required by unit type {type_id}",
                self.id
            )));
        }
        let pop = self.popularity(rules);
        if pop < t.pop_required {
            return Err(Error::Conflict(format!(
                "popularity {pop} below {} for unit type {type_id}",
                t.pop_required
            )));
        }
        let id = rules.ids.next();
        ids::insert(
            &mut self.units,
            Unit {
                id,
                type_id,
                ticks: t.ticks,
                health: t.health,
            },
        )?;
        if t.ticks == 0 {
            self.permanent_popularity += t.pop_bonus_train;
        }
        Ok(id)
    }

    /// Start studying a knowledge.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] for an unknown type.
    /// - [`Error::AlreadyExists`] when already started or known.
    /// - [`Error::Conflict`] on missing requirements or present conflicts.
    pub fn study(&mut self, rules: &Rules<'_>, type_id: Id) -> Result<Id> {
        self.ensure_active()?;
        let t = rules.definitions.require_knowledge_type(type_id)?;
        if self.knowledges.iter().any(|k| k.type_id == type_id) {
            return Err(Error::AlreadyExists(format!(
                "knowledge type {type_id} in city {}",
                self.id
            )));
        }
        if !knowledge_allows(&self.knowledges, &t.requires, &t.conflicts) {
            return Err(Error::Conflict(format!(
                "knowledge type {type_id} prerequisites"
            )));
        }
        let id = rules.ids.next();
        ids::insert(
            &mut self.knowledges,
            Knowledge {
                id,
                type_id,
                ticks: t.ticks,
            },
        )?;
        if t.ticks == 0 {
            self.permanent_popularity += t.pop_bonus_learn;
        }
        Ok(id)
    }

    /// Start a construction and pay its upfront cost.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] for an unknown type.
    /// - [`Error::AlreadyExists`] for a second unique building.
    /// - [`Error::Conflict`] on knowledge or popularity requirements.
    /// - [`Error::InsufficientResources`] when the stock lacks the upfront cost.
    pub fn build(&mut self, rules: &Rules<'_>, type_id: Id) -> Result<Id> {
        self.ensure_active()?;
        let t = rules.definitions.require_building_type(type_id)?;
        if t.unique
            && self
                .buildings
                .iter()
                .any(|b| b.type_id == type_id && b.lifecycle == Lifecycle::Active)
        {
            return Err(Error::AlreadyExists(format!(
                "unique building type {type_id} in city {}",
                self.id
            )));
        }
        if !knowledge_allows(&self.knowledges, &t.requires, &t.conflicts) {
            return Err(Error::Conflict(format!(
                "building type {type_id} prerequisites"
            )));
        }
        let pop = self.popularity(rules);
        if pop < t.pop_required {
            return Err(Error::Conflict(format!(
                "popularity {pop} below {} for building type {type_id}",
                t.pop_required
            )));
        }
        if !self.stock.greater_or_equal_to(&t.cost0) {
            return Err(Error::InsufficientResources);
        }
        self.stock.remove(&t.cost0);
        let id = rules.ids.next();
        ids::insert(
            &mut self.buildings,
            Building {
                id,
                type_id,
                ticks: t.ticks,
                lifecycle: Lifecycle::Active,
            },
        )?;
        if t.ticks == 0 {
            self.permanent_popularity += t.pop_bonus_build;
        }
        Ok(id)
    }

    /// Ruin the first standing building. Returns its ID.
    ///
    /// The stock is trimmed to the capacity left without it.
    pub(crate) fn ruin_building(&mut self, defs: &Definitions) -> Option<Id> {
        let b = self.buildings.iter_mut().find(|b| b.is_standing())?;
        b.lifecycle = Lifecycle::Deleted;
        let id = b.id;
        let capacity = self.stock_view(defs).actual;
        self.stock.trim_to(&capacity);
        Some(id)
    }

    fn create_empty_army(&mut self, rules: &Rules<'_>) -> Result<&mut Army> {
        let id = rules.ids.next();
        ids::insert(&mut self.armies, Army::new(id, self.id, self.cell))?;
        self.permanent_popularity += rules.config.pop_bonus_army_create;
        ids::get_mut(&mut self.armies, id).ok_or_else(|| Error::not_found("army", id))
    }

    /// Validate a transfer request as a whole: every unit must exist and be idle.
    fn select_idle(&self, unit_ids: &[Id]) -> Result<Vec<Id>> {
        if unit_ids.is_empty() {
            return Err(Error::InvalidArgument("no unit given".to_string()));
        }
        let mut wanted = unit_ids.to_vec();
        wanted.sort_unstable();
        wanted.dedup();
        for &id in &wanted {
            let u = self.unit(id).ok_or_else(|| Error::not_found("unit", id))?;
            if !u.is_idle() {
                return Err(Error::Conflict(format!("unit {id} is not idle")));
            }
        }
        Ok(wanted)
    }

    fn take_units(&mut self, wanted: &[Id]) -> Vec<Unit> {
        wanted
            .iter()
            .filter_map(|&id| ids::remove(&mut self.units, id))
            .collect()
    }

    /// Raise an army from idle garrison units.
    ///
    /// The request is all or nothing: one unknown or busy unit fails the
    /// whole request and no unit leaves the city.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] on an empty list, [`Error::NotFound`] for
    /// a unit not in the garrison, [`Error::Conflict`] for a busy or dead unit.
    pub fn create_army(&mut self, rules: &Rules<'_>, unit_ids: &[Id]) -> Result<Id> {
        self.ensure_active()?;
        let wanted = self.select_idle(unit_ids)?;
        let units = self.take_units(&wanted);
        match self.create_empty_army(rules) {
            Ok(army) => {
                army.units = units;
                Ok(army.id)
            }
            Err(e) => {
                // Back to the garrison.
                self.units.extend(units);
                ids::sort(&mut self.units);
                Err(e)
            }
        }
    }

    /// Raise an army from every idle unit of the garrison.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no unit is idle.
    pub fn create_army_defence(&mut self, rules: &Rules<'_>) -> Result<Id> {
        let idle: Vec<Id> = self
            .units
            .iter()
            .filter(|u| u.is_idle())
            .map(|u| u.id)
            .collect();
        if idle.is_empty() {
            return Err(Error::not_found("idle unit", format!("city {}", self.id)));
        }
        self.create_army(rules, &idle)
    }

    /// Raise an empty army carrying resources from the stock.
    ///
    /// # Errors
    ///
    /// [`Error::InsufficientResources`] when the stock does not cover `cargo`.
    pub fn create_transport(&mut self, rules: &Rules<'_>, cargo: Resources) -> Result<Id> {
        self.ensure_active()?;
        if !self.stock.greater_or_equal_to(&cargo) {
            return Err(Error::InsufficientResources);
        }
        self.stock.remove(&cargo);
        match self.create_empty_army(rules) {
            Ok(army) => {
                army.stock = cargo;
                Ok(army.id)
            }
            Err(e) => {
                self.stock.add(&cargo);
                Err(e)
            }
        }
    }

    /// A transport carrying resources that already left the stock, queued
    /// to deposit them on `target` and to disband back home.
    ///
    /// Nothing is added to the city on error. Convoys do not count as raised
    /// armies for popularity.
    pub(crate) fn spawn_convoy(&mut self, rules: &Rules<'_>, cargo: Resources, target: Id) -> Result<Id> {
        let id = rules.ids.next();
        let mut army = Army::new(id, self.id, self.cell);
        army.stock = cargo;
        army.defer_deposit(target)?;
        army.defer_disband(self.cell)?;
        ids::insert(&mut self.armies, army)?;
        Ok(id)
    }

    fn own_army_mut(&mut self, army: Id) -> Result<&mut Army> {
        let city = self.id;
        ids::get_mut(&mut self.armies, army)
            .filter(|a| a.is_active())
            .ok_or_else(|| {
                Error::Forbidden(format!("army {army} is not controlled by city {city}"))
            })
    }

    /// Load resources from the stock into one of the city's armies.
    ///
    /// # Errors
    ///
    /// [`Error::Forbidden`] for an army of another city,
    /// [`Error::InsufficientResources`] when the stock is short.
    pub fn transfer_own_resources(&mut self, army: Id, amount: Resources) -> Result<()> {
        if !self.stock.greater_or_equal_to(&amount) {
            // Ownership is checked first to report the more specific error.
            self.own_army_mut(army)?;
            return Err(Error::InsufficientResources);
        }
        self.own_army_mut(army)?.stock.add(&amount);
        self.stock.remove(&amount);
        Ok(())
    }

    /// Move idle garrison units into one of the city's armies.
    ///
    /// # Errors
    ///
    /// [`Error::Forbidden`] for an army of another city, plus the errors of
    /// [`City::create_army`].
    pub fn transfer_own_units(&mut self, army: Id, unit_ids: &[Id]) -> Result<()> {
        self.own_army_mut(army)?;
        let wanted = self.select_idle(unit_ids)?;
        let units = self.take_units(&wanted);
        let target = self.own_army_mut(army)?;
        target.units.extend(units);
        ids::sort(&mut target.units);
        Ok(())
    }

    /// Soft-delete an army and hand back its content.
    pub(crate) fn dissolve_army(&mut self, army: Id) -> Option<(Vec<Unit>, Resources)> {
        ids::get_mut(&mut self.armies, army)
            .filter(|a| a.is_active())
            .map(Army::dissolve)
    }

    /// Trained, living units defending the city.
    pub(crate) fn garrison_power(&self) -> u64 {
        self.units
            .iter()
            .filter(|u| u.is_idle())
            .map(|u| u64::from(u.health))
            .sum()
    }

    /// Spread damage over the garrison. Returns what was not absorbed.
    pub(crate) fn garrison_absorb(&mut self, damage: u64) -> u64 {
        let left = spread_damage(self.units.iter_mut().filter(|u| u.is_idle()), damage);
        self.units.retain(|u| u.health > 0);
        left
    }

    /// Kill the garrison; units in training survive.
    pub(crate) fn garrison_slain(&mut self) -> usize {
        let before = self.units.len();
        self.units.retain(|u| !u.is_idle());
        before - self.units.len()
    }

    pub(crate) fn post_load(&mut self) {
        ids::sort(&mut self.units);
        ids::sort(&mut self.buildings);
        ids::sort(&mut self.knowledges);
        ids::sort(&mut self.armies);
        for a in &mut self.armies {
            ids::sort(&mut a.units);
        }
        self.lieges.clear();
    }

    pub(crate) fn check(&self, defs: &Definitions) -> Result<()> {
        let what = |kind: &str| format!("city {} {kind}", self.id);
        ids::check_sorted(&self.units, &what("units"))?;
        ids::check_sorted(&self.buildings, &what("buildings"))?;
        ids::check_sorted(&self.knowledges, &what("knowledges"))?;
        ids::check_sorted(&self.armies, &what("armies"))?;
        ids::check_sorted_ids(&self.lieges, &what("lieges"))?;

        if self.overlord == Some(self.id) {
            return Err(Error::consistency(format!("city {} is its own overlord", self.id)));
        }
        for a in &self.armies {
            ids::check_sorted(&a.units, &format!("army {} units", a.id))?;
            if a.city != self.id {
                return Err(Error::consistency(format!(
                    "army {} listed by city {} but owned by {}",
                    a.id, self.id, a.city
                )));
            }
        }
        let units = self.units.iter().chain(self.armies.iter().flat_map(|a| &a.units));
        for u in units {
            defs.require_unit_type(u.type_id)
                .map_err(|_| Error::consistency(format!("unit {} has unknown type", u.id)))?;
        }
        for b in &self.buildings {
            defs.require_building_type(b.type_id)
                .map_err(|_| Error::consistency(format!("building {} has unknown type", b.id)))?;
        }
        for k in &self.knowledges {
            defs.require_knowledge_type(k.type_id)
                .map_err(|_| Error::consistency(format!("knowledge {} has unknown type", k.id)))?;
        }
        Ok(())
    }

    /// Every ID owned by the city, its own included.
    pub(crate) fn all_ids(&self) -> impl Iterator<Item = Id> + '_ {
        std::iter::once(self.id)
            .chain(self.units.iter().map(|u| u.id))
            .chain(self.buildings.iter().map(|b| b.id))
            .chain(self.knowledges.iter().map(|k| k.id))
            .chain(
                self.armies
                    .iter()
                    .flat_map(|a| std::iter::once(a.id).chain(a.units.iter().map(|u| u.id))),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TaxTransfer, WorldConfig};
    use crate::region::events::NoopNotifier;
    use crate::region::ids::IdAllocator;
    use crate::region::resources::ResourcesIncrement;

    struct Fixture {
        config: WorldConfig,
        defs: Definitions,
        ids: IdAllocator,
    }

    const INFANTRY: Id = 1;
    const KNIGHT: Id = 2;
    const FARM: Id = 3;
    const STABLE: Id = 4;
    const WRITING: Id = 5;

    impl Fixture {
        fn new() -> Self {
            let unit = |id: Id, ticks: u32, required_building: Option<Id>| UnitType {
                id,
                name: format!("u{id}"),
                health: 10,
                ticks,
                cost: Resources([1, 0, 0, 0, 0, 0]),
                pop_bonus: 1,
                pop_bonus_train: 0,
                pop_required: 0,
                required_building,
            };
            let mut farm_prod = ResourceModifiers::noop();
            farm_prod.plus = ResourcesIncrement([5, 0, 0, 0, 0, 0]);
            let building = |id: Id, unique: bool, prod: ResourceModifiers| BuildingType {
                id,
                name: format!("b{id}"),
                ticks: 0,
                cost0: Resources([2, 0, 0, 0, 0, 0]),
                cost: Resources::ZERO,
                unique,
                pop_required: 0,
                pop_bonus: 0,
                pop_bonus_build: 0,
                stock: ResourceModifiers::noop(),
                prod,
                requires: vec![],
                conflicts: vec![],
            };
            let defs = Definitions {
                units: vec![unit(INFANTRY, 2, None), unit(KNIGHT, 1, Some(STABLE))],
                buildings: vec![
                    building(FARM, false, farm_prod),
                    building(STABLE, true, ResourceModifiers::noop()),
                ],
                knowledges: vec![KnowledgeType {
                    id: WRITING,
                    name: "writing".into(),
                    ticks: 3,
                    cost: Resources::ZERO,
                    pop_bonus: 0,
                    pop_bonus_learn: 4,
                    stock: ResourceModifiers::noop(),
                    prod: ResourceModifiers::noop(),
                    requires: vec![],
                    conflicts: vec![],
                }],
            };
            Self {
                config: WorldConfig::new(TaxTransfer::Instant),
                defs,
                ids: IdAllocator::starting_after(100),
            }
        }

        fn rules(&self) -> Rules<'_> {
            Rules {
                config: &self.config,
                definitions: &self.defs,
                ids: &self.ids,
                notifier: &NoopNotifier,
            }
        }
    }

    fn city() -> City {
        let mut c = City::new(10, 1, 7, "Ur");
        c.stock_capacity = Resources::uniform(1000);
        c
    }

    #[test]
    fn test_produce_trims_to_capacity() {
        let fx = Fixture::new();
        let mut c = City::new(10, 1, 7, "Ur");
        c.production = Resources([10, 0, 0, 0, 0, 0]);
        c.stock_capacity = Resources([5, 0, 0, 0, 0, 0]);
        assert_eq!(c.produce(&fx.rules(), None), None);
        assert_eq!(c.stock, Resources([5, 0, 0, 0, 0, 0]));
    }

    #[test]
    fn test_massacre_decay() {
        let fx = Fixture::new();
        let mut c = city();
        c.production = Resources([80, 0, 0, 0, 0, 0]);
        c.ticks_massacres = 2;
        c.produce(&fx.rules(), None);
        assert_eq!(c.stock.0[0], 20);
        assert_eq!(c.ticks_massacres, 1);
        c.produce(&fx.rules(), None);
        assert_eq!(c.stock.0[0], 60);
        c.produce(&fx.rules(), None);
        assert_eq!(c.stock.0[0], 140);
        assert_eq!(c.ticks_massacres, 0);
    }

    #[test]
    fn test_tax_is_trimmed_and_returned() {
        let fx = Fixture::new();
        let mut c = city();
        c.production = Resources([100, 0, 0, 0, 0, 0]);
        c.set_uniform_tax_rate(0.2);
        let tax = c.produce(&fx.rules(), Some(99)).unwrap();
        assert_eq!(tax.0[0], 20);
        assert_eq!(c.stock.0[0], 80);

        // Invalid rates never take more than the stock.
        c.set_uniform_tax_rate(5.0);
        let tax = c.produce(&fx.rules(), Some(99)).unwrap();
        assert_eq!(tax.0[0], 180);
        assert!(c.stock.is_zero());
    }

    #[test]
    fn test_training_consumes_ticks() {
        let fx = Fixture::new();
        let rules = fx.rules();
        let mut c = city();
        c.production = Resources([1, 0, 0, 0, 0, 0]);
        let u = c.train(&rules, INFANTRY).unwrap();
        assert_eq!(c.unit(u).unwrap().ticks, 2);
        c.produce(&rules, None);
        assert_eq!(c.unit(u).unwrap().ticks, 1);
        c.produce(&rules, None);
        assert!(c.unit(u).unwrap().is_idle());
        assert!(c.stock.is_zero());
    }

    #[test]
    fn test_funding_order_starves_later_queues() {
        let mut fx = Fixture::new();
        fx.defs.knowledges[0].cost = Resources([1, 0, 0, 0, 0, 0]);
        let mut c = city();
        c.production = Resources([1, 0, 0, 0, 0, 0]);
        let u = c.train(&fx.rules(), INFANTRY).unwrap();
        let k = c.study(&fx.rules(), WRITING).unwrap();
        c.produce(&fx.rules(), None);
        assert_eq!(c.unit(u).unwrap().ticks, 1);
        assert_eq!(c.knowledge(k).unwrap().ticks, 3);

        fx.config.funding_order = [
            FundingQueue::Knowledge,
            FundingQueue::Units,
            FundingQueue::Buildings,
        ];
        c.produce(&fx.rules(), None);
        assert_eq!(c.unit(u).unwrap().ticks, 1);
        assert_eq!(c.knowledge(k).unwrap().ticks, 2);
    }

    #[test]
    fn test_train_requires_building() {
        let fx = Fixture::new();
        let rules = fx.rules();
        let mut c = city();
        c.stock = Resources::uniform(10);
        assert!(matches!(c.train(&rules, KNIGHT), Err(Error::Conflict(_))));
        assert!(matches!(c.train(&rules, 999), Err(Error::NotFound { .. })));
        c.build(&rules, STABLE).unwrap();
        c.train(&rules, KNIGHT).unwrap();
    }

    #[test]
    fn test_build_rules() {
        let fx = Fixture::new();
        let rules = fx.rules();
        let mut c = city();
        assert!(matches!(
            c.build(&rules, FARM),
            Err(Error::InsufficientResources)
        ));
        c.stock = Resources::uniform(10);
        c.build(&rules, STABLE).unwrap();
        assert_eq!(c.stock.0[0], 8);
        assert!(matches!(
            c.build(&rules, STABLE),
            Err(Error::AlreadyExists(_))
        ));
        c.build(&rules, FARM).unwrap();
        c.build(&rules, FARM).unwrap();
        // Two farms: +10 on the first resource.
        assert_eq!(c.production_view(&fx.defs).actual.0[0], 10);
    }

    #[test]
    fn test_study_twice_rejected() {
        let fx = Fixture::new();
        let rules = fx.rules();
        let mut c = city();
        c.study(&rules, WRITING).unwrap();
        assert!(matches!(
            c.study(&rules, WRITING),
            Err(Error::AlreadyExists(_))
        ));
        for _ in 0..3 {
            c.produce(&rules, None);
        }
        assert_eq!(c.permanent_popularity, 4);
    }

    #[test]
    fn test_create_army_all_or_nothing() {
        let fx = Fixture::new();
        let rules = fx.rules();
        let mut c = city();
        let idle = c.train(&rules, INFANTRY).unwrap();
        let busy = c.train(&rules, INFANTRY).unwrap();
        c.unit_finish(idle).unwrap();

        let err = c.create_army(&rules, &[idle, busy]).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(c.units().len(), 2);
        assert!(c.armies().is_empty());

        let army = c.create_army(&rules, &[idle, idle]).unwrap();
        assert_eq!(c.units().len(), 1);
        let a = c.army(army).unwrap();
        assert_eq!(a.units().len(), 1);
        assert_eq!(a.cell, c.cell);
        assert_eq!(a.city, c.id);
    }

    #[test]
    fn test_failed_army_insert_keeps_units_and_stock() {
        let fx = Fixture::new();
        let rules = fx.rules();
        let mut c = city();
        c.stock = Resources::uniform(10);
        let first = c.train(&rules, INFANTRY).unwrap();
        let second = c.train(&rules, INFANTRY).unwrap();
        c.unit_finish(first).unwrap();
        c.unit_finish(second).unwrap();
        let army = c.create_army(&rules, &[first]).unwrap();
        let popularity = c.permanent_popularity;

        // The next ID clashes with the army just raised.
        fx.ids.reset_after(army - 1);
        let err = c.create_army(&rules, &[second]).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert_eq!(c.units().len(), 1);
        assert!(c.unit(second).unwrap().is_idle());
        assert_eq!(c.armies().len(), 1);
        assert_eq!(c.permanent_popularity, popularity);

        fx.ids.reset_after(army - 1);
        let err = c.create_transport(&rules, Resources::uniform(4)).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert_eq!(c.stock, Resources::uniform(10));
        assert_eq!(c.armies().len(), 1);
    }

    #[test]
    fn test_create_army_defence_needs_idle_units() {
        let fx = Fixture::new();
        let rules = fx.rules();
        let mut c = city();
        assert!(matches!(
            c.create_army_defence(&rules),
            Err(Error::NotFound { .. })
        ));
        let u = c.train(&rules, INFANTRY).unwrap();
        c.unit_finish(u).unwrap();
        let a = c.create_army_defence(&rules).unwrap();
        assert!(c.units().is_empty());
        assert_eq!(c.army(a).unwrap().power(), 10);
    }

    #[test]
    fn test_transport_and_resource_transfer() {
        let fx = Fixture::new();
        let rules = fx.rules();
        let mut c = city();
        c.stock = Resources::uniform(10);
        let a = c.create_transport(&rules, Resources::uniform(4)).unwrap();
        assert_eq!(c.stock, Resources::uniform(6));
        c.transfer_own_resources(a, Resources::uniform(6)).unwrap();
        assert!(c.stock.is_zero());
        assert_eq!(c.army(a).unwrap().stock, Resources::uniform(10));
        assert!(matches!(
            c.transfer_own_resources(a, Resources::uniform(1)),
            Err(Error::InsufficientResources)
        ));
        assert!(matches!(
            c.transfer_own_resources(12345, Resources::ZERO),
            Err(Error::Forbidden(_))
        ));
    }

    #[test]
    fn test_popularity_counts_live_assets() {
        let mut fx = Fixture::new();
        fx.config.pop_bonus_army_alive = 3;
        fx.config.pop_bonus_army_create = 10;
        let rules = fx.rules();
        let mut c = city();
        c.permanent_popularity = 2;
        let u = c.train(&rules, INFANTRY).unwrap();
        assert_eq!(c.popularity(&rules), 3);
        c.unit_finish(u).unwrap();
        c.create_army(&rules, &[u]).unwrap();
        // 2 permanent + 10 creation + 1 unit + 3 live army
        assert_eq!(c.popularity(&rules), 16);
    }

    #[test]
    fn test_check_catches_unsorted_units() {
        let fx = Fixture::new();
        let mut c = city();
        c.units = vec![
            Unit {
                id: 5,
                type_id: INFANTRY,
                ticks: 0,
                health: 1,
            },
            Unit {
                id: 3,
                type_id: INFANTRY,
                ticks: 0,
                health: 1,
            },
        ];
        assert!(c.check(&fx.defs).is_err());
        c.post_load();
        c.check(&fx.defs).unwrap();
    }
}
