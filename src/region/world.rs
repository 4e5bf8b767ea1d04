//! Regions, the world that owns them, and its shared handle.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use tracing::info;

use super::army::{Action, Army, Command, Stance};
use super::city::City;
use super::definitions::Definitions;
use super::events::{Event, NoopNotifier, Notifier, emit};
use super::fight::{Fight, Side};
use super::ids::{self, IdAllocator};
use super::resources::ResourcesMultiplier;
use crate::Id;
use crate::config::WorldConfig;
use crate::error::{Error, Result};
use crate::map::{Map, MapRegistry};

/// Read-only context shared by every region operation.
#[derive(Debug, Clone, Copy)]
pub struct Rules<'a> {
    /// World configuration.
    pub config: &'a WorldConfig,
    /// Type tables.
    pub definitions: &'a Definitions,
    /// World-wide ID counter.
    pub ids: &'a IdAllocator,
    /// Event sink.
    pub notifier: &'a dyn Notifier,
}

/// A region and everything needed to act on it.
#[derive(Debug)]
pub struct RegionMut<'a> {
    /// Shared context.
    pub rules: Rules<'a>,
    /// The region's map, routing table included.
    pub map: &'a Map,
    /// The region itself.
    pub region: &'a mut Region,
}

/// Cities and fights living on one map.
#[derive(Debug, Clone, Default)]
pub struct Region {
    /// Unique name.
    pub name: String,
    /// Name of the map in the [`MapRegistry`].
    pub map: String,
    pub(crate) cities: Vec<City>,
    pub(crate) fights: Vec<Fight>,
}

impl Region {
    /// An empty region on the named map.
    #[must_use]
    pub fn new(name: impl Into<String>, map: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            map: map.into(),
            cities: Vec::new(),
            fights: Vec::new(),
        }
    }

    /// Assemble a region from persisted parts. Call [`World::prepare`] afterwards.
    #[must_use]
    pub fn from_parts(
        name: impl Into<String>,
        map: impl Into<String>,
        cities: Vec<City>,
        fights: Vec<Fight>,
    ) -> Self {
        Self {
            name: name.into(),
            map: map.into(),
            cities,
            fights,
        }
    }

    /// Cities, deleted ones included, sorted by ID.
    #[must_use]
    pub fn cities(&self) -> &[City] {
        &self.cities
    }

    /// Running fights, sorted by ID.
    #[must_use]
    pub fn fights(&self) -> &[Fight] {
        &self.fights
    }

    /// Look a city up.
    #[must_use]
    pub fn city(&self, id: Id) -> Option<&City> {
        ids::get(&self.cities, id)
    }

    /// Look a city up for giving it orders.
    pub fn city_mut(&mut self, id: Id) -> Option<&mut City> {
        ids::get_mut(&mut self.cities, id)
    }

    /// Like [`Region::city_mut`], as an error.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown city.
    pub fn require_city_mut(&mut self, id: Id) -> Result<&mut City> {
        self.city_mut(id).ok_or_else(|| Error::not_found("city", id))
    }

    /// The active city standing on `cell`.
    #[must_use]
    pub fn city_at(&self, cell: Id) -> Option<&City> {
        self.cities.iter().find(|c| c.cell == cell && c.is_active())
    }

    /// A city `character` manages.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown city, [`Error::Forbidden`] when
    /// `character` is neither owner nor deputy.
    pub fn city_get_and_check(&mut self, character: Id, city: Id) -> Result<&mut City> {
        let c = self.require_city_mut(city)?;
        if !c.is_managed_by(character) {
            return Err(Error::Forbidden(format!(
                "character {character} does not manage city {city}"
            )));
        }
        Ok(c)
    }

    /// Cities managed by `character`.
    pub fn cities_of(&self, character: Id) -> impl Iterator<Item = &City> {
        self.cities.iter().filter(move |c| c.is_managed_by(character))
    }

    /// Look an army up in every city.
    #[must_use]
    pub fn army(&self, id: Id) -> Option<&Army> {
        self.cities.iter().find_map(|c| c.army(id))
    }

    /// Mutable lookup in every city.
    pub fn army_mut(&mut self, id: Id) -> Option<&mut Army> {
        self.cities.iter_mut().find_map(|c| c.army_mut(id))
    }

    pub(crate) fn require_army_mut(&mut self, id: Id) -> Result<&mut Army> {
        self.army_mut(id).ok_or_else(|| Error::not_found("army", id))
    }

    /// Look a fight up.
    #[must_use]
    pub fn fight(&self, id: Id) -> Option<&Fight> {
        ids::get(&self.fights, id)
    }

    pub(crate) fn fight_mut(&mut self, id: Id) -> Option<&mut Fight> {
        ids::get_mut(&mut self.fights, id)
    }

    /// The fight running on `cell`.
    #[must_use]
    pub fn fight_at(&self, cell: Id) -> Option<&Fight> {
        self.fights.iter().find(|f| f.cell == cell)
    }

    /// Queue a command on an army after checking the target cell exists.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown army or cell, plus the errors of
    /// [`Army::defer_command`].
    pub fn defer(&mut self, map: &Map, army: Id, command: Command) -> Result<()> {
        if command.cell != 0 && !map.cell_has(command.cell) {
            return Err(Error::not_found("cell", command.cell));
        }
        self.require_army_mut(army)?.defer_command(command)
    }

    /// Drop an army's pending commands.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown army.
    pub fn cancel(&mut self, army: Id) -> Result<()> {
        self.require_army_mut(army)?.cancel();
        Ok(())
    }

    /// Leave the army's fight.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown army, [`Error::Conflict`] when it
    /// is not fighting.
    pub fn flee(&mut self, army: Id) -> Result<()> {
        let fight = self
            .require_army_mut(army)?
            .fight
            .take()
            .ok_or_else(|| Error::Conflict(format!("army {army} is not fighting")))?;
        if let Some(f) = self.fight_mut(fight) {
            f.leave(army);
        }
        Ok(())
    }

    /// Switch the army to the other side of its fight.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown army, [`Error::Conflict`] when it
    /// is not fighting.
    pub fn flip(&mut self, army: Id) -> Result<()> {
        let a = self.require_army_mut(army)?;
        let fight = a
            .fight
            .ok_or_else(|| Error::Conflict(format!("army {army} is not fighting")))?;
        let cell = a.cell;
        let f = self
            .fight_mut(fight)
            .ok_or_else(|| Error::not_found("fight", fight))?;
        let stance = match f.side_of(army) {
            Some(Side::Attack) => {
                f.join_defense(army);
                Stance::Defend
            }
            Some(Side::Defense) => {
                f.join_attack(army, Action::Attack)?;
                Stance::Attack
            }
            None => {
                return Err(Error::consistency(format!(
                    "army {army} points to fight {fight} which does not list it"
                )));
            }
        };
        let target = self.city_at(cell).map(|c| c.id);
        if let (Some(city), Some(a)) = (target, self.army_mut(army)) {
            a.set_posture(city, stance);
        }
        Ok(())
    }

    fn set_overlord(&mut self, city: Id, overlord: Option<Id>) -> Result<Option<Id>> {
        let c = self.require_city_mut(city)?;
        let previous = std::mem::replace(&mut c.overlord, overlord);
        c.tax_rate = ResourcesMultiplier::zero();
        if let Some(p) = previous.and_then(|p| self.city_mut(p)) {
            ids::remove_id(&mut p.lieges, city);
        }
        if let Some(o) = overlord.and_then(|o| self.city_mut(o)) {
            ids::insert_id(&mut o.lieges, city);
        }
        Ok(previous)
    }

    /// Make `overlord` the overlord of `liege` and impose the default tax.
    ///
    /// Conquering one's own overlord frees the conqueror first.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] when both are the same city,
    /// [`Error::NotFound`] for an unknown city.
    pub fn conquer_city(&mut self, rules: &Rules<'_>, overlord: Id, liege: Id) -> Result<()> {
        if overlord == liege {
            return Err(Error::InvalidArgument(format!(
                "city {overlord} cannot conquer itself"
            )));
        }
        let conqueror = self
            .city(overlord)
            .ok_or_else(|| Error::not_found("city", overlord))?;
        let reversal = conqueror.overlord == Some(liege);
        let target = self
            .city(liege)
            .ok_or_else(|| Error::not_found("city", liege))?;
        if target.overlord == Some(overlord) {
            return Ok(());
        }
        if reversal {
            self.gain_freedom(rules, overlord)?;
        }
        if let Some(previous) = self.set_overlord(liege, Some(overlord))? {
            emit(
                rules.notifier,
                Event::CityLiberated {
                    city: liege,
                    overlord: previous,
                },
            );
        }
        self.require_city_mut(liege)?
            .set_uniform_tax_rate(rules.config.rate_overlord);
        emit(
            rules.notifier,
            Event::CityConquered {
                city: liege,
                overlord,
            },
        );
        Ok(())
    }

    /// Free `liege` from `overlord`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown city, [`Error::Conflict`] when
    /// `overlord` does not dominate `liege`.
    pub fn liberate_city(&mut self, rules: &Rules<'_>, overlord: Id, liege: Id) -> Result<()> {
        let target = self
            .city(liege)
            .ok_or_else(|| Error::not_found("city", liege))?;
        if target.overlord != Some(overlord) {
            return Err(Error::Conflict(format!(
                "city {liege} is not a liege of {overlord}"
            )));
        }
        self.set_overlord(liege, None)?;
        emit(
            rules.notifier,
            Event::CityLiberated {
                city: liege,
                overlord,
            },
        );
        Ok(())
    }

    /// Drop the city's overlord, if any.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown city.
    pub fn gain_freedom(&mut self, rules: &Rules<'_>, city: Id) -> Result<()> {
        if let Some(overlord) = self.set_overlord(city, None)? {
            emit(rules.notifier, Event::CityLiberated { city, overlord });
        }
        Ok(())
    }

    /// Rebuild the liege lists from the overlord fields.
    pub(crate) fn relink(&mut self) {
        for c in &mut self.cities {
            c.lieges.clear();
        }
        let links: Vec<(Id, Id)> = self
            .cities
            .iter()
            .filter_map(|c| c.overlord.map(|o| (o, c.id)))
            .collect();
        for (overlord, liege) in links {
            if let Some(o) = self.city_mut(overlord) {
                o.lieges.push(liege);
            }
        }
        // Cities are iterated in ID order, so each list is already sorted.
    }

    /// Sort every collection and rebuild derived links.
    pub fn post_load(&mut self) {
        ids::sort(&mut self.cities);
        ids::sort(&mut self.fights);
        for c in &mut self.cities {
            c.post_load();
        }
        for f in &mut self.fights {
            ids::sort(&mut f.attack);
            f.defense.sort_unstable();
        }
        self.relink();
    }

    /// Structural invariants of the region.
    ///
    /// # Errors
    ///
    /// [`Error::Consistency`] describing the first violation.
    pub fn check(&self, defs: &Definitions, map: &Map) -> Result<()> {
        let here = |msg: String| Error::consistency(format!("region {}: {msg}", self.name));
        ids::check_sorted(&self.cities, &format!("region {} cities", self.name))?;
        ids::check_sorted(&self.fights, &format!("region {} fights", self.name))?;

        let mut occupied = HashSet::new();
        for c in &self.cities {
            c.check(defs)?;
            if !map.cell_has(c.cell) {
                return Err(here(format!("city {} on unknown cell {}", c.id, c.cell)));
            }
            if c.is_active() && !occupied.insert(c.cell) {
                return Err(here(format!("two cities on cell {}", c.cell)));
            }
            if let Some(o) = c.overlord {
                let listed = self
                    .city(o)
                    .is_some_and(|oc| oc.lieges.binary_search(&c.id).is_ok());
                if !listed {
                    return Err(here(format!("overlord {o} of city {} does not list it", c.id)));
                }
            }
            for &l in &c.lieges {
                if self.city(l).and_then(|lc| lc.overlord) != Some(c.id) {
                    return Err(here(format!("city {} lists {l} as a liege", c.id)));
                }
            }
            for a in &c.armies {
                if a.is_active() && !map.cell_has(a.cell) {
                    return Err(here(format!("army {} on unknown cell {}", a.id, a.cell)));
                }
                if let Some(f) = a.fight {
                    let listed = self.fight(f).is_some_and(|f| f.side_of(a.id).is_some());
                    if !listed {
                        return Err(here(format!("army {} not listed by fight {f}", a.id)));
                    }
                }
            }
        }

        for f in &self.fights {
            f.check()?;
            for a in f.armies() {
                let engaged = self
                    .army(a)
                    .is_some_and(|army| army.fight == Some(f.id) && army.cell == f.cell);
                if !engaged {
                    return Err(here(format!("fight {} lists army {a} not engaged", f.id)));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn all_ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.cities
            .iter()
            .flat_map(City::all_ids)
            .chain(self.fights.iter().map(|f| f.id))
    }
}

/// Everything the simulation knows.
#[derive(Debug)]
pub struct World {
    /// Rules shared by every region.
    pub config: WorldConfig,
    /// Type tables.
    pub definitions: Definitions,
    /// Maps by name.
    pub maps: MapRegistry,
    pub(crate) regions: Vec<Region>,
    pub(crate) ids: IdAllocator,
    pub(crate) notifier: Box<dyn Notifier>,
}

impl World {
    /// An empty world.
    #[must_use]
    pub fn new(config: WorldConfig) -> Self {
        Self::from_parts(
            config,
            Definitions::default(),
            MapRegistry::new(),
            Vec::new(),
        )
    }

    /// Assemble a world from persisted parts. Call [`World::prepare`] before use.
    #[must_use]
    pub fn from_parts(
        config: WorldConfig,
        definitions: Definitions,
        maps: MapRegistry,
        regions: Vec<Region>,
    ) -> Self {
        Self {
            config,
            definitions,
            maps,
            regions,
            ids: IdAllocator::new(),
            notifier: Box::new(NoopNotifier),
        }
    }

    /// Replace the event sink.
    pub fn set_notifier(&mut self, notifier: Box<dyn Notifier>) {
        self.notifier = notifier;
    }

    /// Take a fresh world-unique ID.
    pub fn next_id(&self) -> Id {
        self.ids.next()
    }

    /// The ID counter.
    #[must_use]
    pub const fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    /// Shared context for region operations.
    #[must_use]
    pub fn rules(&self) -> Rules<'_> {
        Rules {
            config: &self.config,
            definitions: &self.definitions,
            ids: &self.ids,
            notifier: &*self.notifier,
        }
    }

    /// Regions sorted by name.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    fn region_index(&self, name: &str) -> std::result::Result<usize, usize> {
        self.regions
            .binary_search_by(|r| r.name.as_str().cmp(name))
    }

    /// Look a region up.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown name.
    pub fn region(&self, name: &str) -> Result<&Region> {
        self.region_index(name)
            .map(|i| &self.regions[i])
            .map_err(|_| Error::not_found("region", name))
    }

    /// A region with its map and the shared context, ready for actions.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown region or map.
    pub fn region_mut(&mut self, name: &str) -> Result<RegionMut<'_>> {
        let index = self
            .region_index(name)
            .map_err(|_| Error::not_found("region", name))?;
        let region = &mut self.regions[index];
        let map = self.maps.get(&region.map)?;
        Ok(RegionMut {
            rules: Rules {
                config: &self.config,
                definitions: &self.definitions,
                ids: &self.ids,
                notifier: &*self.notifier,
            },
            map,
            region,
        })
    }

    /// Add an empty region on a registered map.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown map, [`Error::AlreadyExists`] for
    /// a taken name.
    pub fn region_create(&mut self, name: &str, map: &str) -> Result<()> {
        self.maps.get(map)?;
        match self.region_index(name) {
            Ok(_) => Err(Error::AlreadyExists(format!("region {name}"))),
            Err(pos) => {
                self.regions.insert(pos, Region::new(name, map));
                Ok(())
            }
        }
    }

    /// Found a city on a free cell and flag the cell as a city site.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown region or cell,
    /// [`Error::AlreadyExists`] when an active city stands on the cell.
    pub fn city_create(&mut self, region: &str, cell: Id, owner: Id, name: &str) -> Result<Id> {
        let index = self
            .region_index(region)
            .map_err(|_| Error::not_found("region", region))?;
        let r = &mut self.regions[index];
        let vertex = self
            .maps
            .get_mut(&r.map)?
            .cell_get_mut(cell)
            .ok_or_else(|| Error::not_found("cell", cell))?;
        if r.city_at(cell).is_some() {
            return Err(Error::AlreadyExists(format!("city on cell {cell}")));
        }
        vertex.city = true;
        let id = self.ids.next();
        ids::insert(&mut r.cities, City::new(id, cell, owner, name))?;
        Ok(id)
    }

    /// Highest ID in use anywhere.
    #[must_use]
    pub fn max_id(&self) -> Id {
        self.all_ids().max().unwrap_or(0)
    }

    fn all_ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.definitions
            .all_ids()
            .chain(self.regions.iter().flat_map(Region::all_ids))
    }

    /// Sort everything, rebuild derived links and restart the ID counter
    /// after the highest ID found.
    pub fn post_load(&mut self) {
        self.definitions.post_load();
        self.maps.post_load();
        self.regions.sort_by(|a, b| a.name.cmp(&b.name));
        for r in &mut self.regions {
            r.post_load();
        }
        self.ids.reset_after(self.max_id());
    }

    /// Every structural invariant, flat ID uniqueness included.
    ///
    /// # Errors
    ///
    /// [`Error::Consistency`] or [`Error::InvalidArgument`] for the first
    /// violation found.
    pub fn check(&self) -> Result<()> {
        self.config.validate()?;
        self.definitions.check()?;
        self.maps.check()?;
        if let Some(w) = self.regions.windows(2).find(|w| w[0].name >= w[1].name) {
            return Err(Error::consistency(format!(
                "regions not sorted at {} / {}",
                w[0].name, w[1].name
            )));
        }
        for r in &self.regions {
            let map = self
                .maps
                .get(&r.map)
                .map_err(|_| Error::consistency(format!("region {} on unknown map {}", r.name, r.map)))?;
            r.check(&self.definitions, map)?;
        }

        let mut seen = HashSet::new();
        if let Some(dup) = self.all_ids().find(|&id| !seen.insert(id)) {
            return Err(Error::consistency(format!("id {dup} used twice")));
        }
        if self.ids.last() < self.max_id() {
            return Err(Error::consistency(format!(
                "id counter {} behind the highest id {}",
                self.ids.last(),
                self.max_id()
            )));
        }
        Ok(())
    }

    /// Activation pipeline for a freshly loaded world: post-load, check,
    /// then build every routing table. A failed check leaves the world unusable.
    ///
    /// # Errors
    ///
    /// The first error of [`World::check`].
    pub fn prepare(&mut self) -> Result<()> {
        self.post_load();
        self.check()?;
        self.maps.rehash_stale();
        info!(
            regions = self.regions.len(),
            maps = self.maps.len(),
            next_id = self.ids.last() + 1,
            "world ready"
        );
        Ok(())
    }
}

/// A world behind a read/write lock.
///
/// Ticks take the write side; queries share the read side.
#[derive(Debug, Clone)]
pub struct SharedWorld(Arc<RwLock<World>>);

impl SharedWorld {
    /// Wrap a prepared world.
    #[must_use]
    pub fn new(world: World) -> Self {
        Self(Arc::new(RwLock::new(world)))
    }

    /// Run `f` under the read lock.
    ///
    /// # Errors
    ///
    /// [`Error::Consistency`] if a writer panicked while holding the lock.
    pub fn read<T>(&self, f: impl FnOnce(&World) -> T) -> Result<T> {
        let guard = self
            .0
            .read()
            .map_err(|_| Error::consistency("world lock poisoned"))?;
        Ok(f(&guard))
    }

    /// Run `f` under the write lock.
    ///
    /// # Errors
    ///
    /// [`Error::Consistency`] if a writer panicked while holding the lock.
    pub fn write<T>(&self, f: impl FnOnce(&mut World) -> T) -> Result<T> {
        let mut guard = self
            .0
            .write()
            .map_err(|_| Error::consistency("world lock poisoned"))?;
        Ok(f(&mut guard))
    }
}
