//! The simulation step: production, then movement, then fights.

use std::ops::AddAssign;

use tracing::{debug, warn};

use super::army::{Action, Army, Command, Stance, Step};
use super::city::City;
use super::events::{Event, emit};
use super::fight::{Fight, Outcome};
use super::ids;
use super::resources::Resources;
use super::world::{Region, Rules, SharedWorld, World};
use crate::Id;
use crate::config::TaxTransfer;
use crate::error::{Error, Result};
use crate::map::Map;

/// Counters of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Cities that produced.
    pub cities: usize,
    /// Taxes handed to an overlord.
    pub taxes: usize,
    /// Hops walked by armies.
    pub moves: usize,
    /// Commands completed.
    pub arrivals: usize,
    /// Commands dropped for lack of a route.
    pub blocked: usize,
    /// Fights resolved.
    pub fights: usize,
}

impl AddAssign for TickReport {
    fn add_assign(&mut self, other: Self) {
        self.cities += other.cities;
        self.taxes += other.taxes;
        self.moves += other.moves;
        self.arrivals += other.arrivals;
        self.blocked += other.blocked;
        self.fights += other.fights;
    }
}

impl Region {
    /// Production pass over every active city, with tax remittance.
    pub fn produce(&mut self, rules: &Rules<'_>) -> TickReport {
        let mut report = TickReport::default();
        for index in 0..self.cities.len() {
            if !self.cities[index].is_active() {
                continue;
            }
            // A deleted overlord collects nothing.
            let overlord = self.cities[index]
                .overlord
                .filter(|&o| self.city(o).is_some_and(City::is_active));
            let tax = self.cities[index].produce(rules, overlord);
            report.cities += 1;
            if let (Some(overlord), Some(tax)) = (overlord, tax.filter(|t| !t.is_zero())) {
                match self.pay_tax(rules, index, overlord, tax) {
                    Ok(()) => report.taxes += 1,
                    Err(e) => {
                        let city = &mut self.cities[index];
                        warn!(city = city.id, overlord, error = %e, "tax returned to the liege");
                        city.credit(rules.definitions, &tax);
                    }
                }
            }
        }
        report
    }

    /// Hand `tax` to the overlord, directly or by convoy.
    fn pay_tax(&mut self, rules: &Rules<'_>, index: usize, overlord: Id, tax: Resources) -> Result<()> {
        let liege = self.cities[index].id;
        let target = self
            .city(overlord)
            .map(|c| c.cell)
            .ok_or_else(|| Error::not_found("city", overlord))?;
        match rules.config.tax_transfer {
            TaxTransfer::Instant => self
                .require_city_mut(overlord)?
                .credit(rules.definitions, &tax),
            TaxTransfer::Transport => {
                self.cities[index].spawn_convoy(rules, tax, target)?;
            }
        }
        emit(
            rules.notifier,
            Event::TaxPaid {
                city: liege,
                overlord,
                amount: tax,
            },
        );
        Ok(())
    }

    /// Advance every army one hop, then apply the actions of those that
    /// reached their target.
    ///
    /// A failed arrival action is logged and never stops the pass.
    pub fn move_armies(&mut self, rules: &Rules<'_>, map: &Map) -> TickReport {
        let mut report = TickReport::default();
        let mut arrivals: Vec<(Id, Command)> = Vec::new();

        for army in self.cities.iter_mut().flat_map(|c| c.armies.iter_mut()) {
            match army.advance(map) {
                Step::Idle | Step::Holding => {}
                Step::Moved { from, to } => {
                    report.moves += 1;
                    emit(
                        rules.notifier,
                        Event::ArmyMoved {
                            army: army.id,
                            src: from,
                            dst: to,
                        },
                    );
                }
                Step::Arrived { from, to, command } => {
                    if from != to {
                        report.moves += 1;
                        emit(
                            rules.notifier,
                            Event::ArmyMoved {
                                army: army.id,
                                src: from,
                                dst: to,
                            },
                        );
                    }
                    arrivals.push((army.id, command));
                }
                Step::Blocked { from, target } => {
                    report.blocked += 1;
                    emit(
                        rules.notifier,
                        Event::ArmyBlocked {
                            army: army.id,
                            src: from,
                            dst: target,
                        },
                    );
                }
            }
        }

        for (army, command) in arrivals {
            report.arrivals += 1;
            emit(
                rules.notifier,
                Event::ArmyArrived {
                    army,
                    cell: command.cell,
                    action: command.action,
                },
            );
            if let Err(e) = self.arrive(rules, army, command) {
                warn!(army, cell = command.cell, action = ?command.action, error = %e, "arrival action failed");
            }
        }
        report
    }

    fn arrive(&mut self, rules: &Rules<'_>, army: Id, command: Command) -> Result<()> {
        match command.action {
            Action::Pause | Action::Wait => Ok(()),
            Action::Deposit => self.deposit(rules, army, command.cell),
            Action::Disband => self.disband(rules, army, command.cell),
            Action::Defend => self.defend(army, command.cell),
            Action::Attack | Action::Overlord | Action::Break | Action::Massacre => {
                self.assault(rules, army, command.cell, command.action)
            }
        }
    }

    fn deposit(&mut self, rules: &Rules<'_>, army: Id, cell: Id) -> Result<()> {
        let city = self
            .city_at(cell)
            .map(|c| c.id)
            .ok_or_else(|| Error::not_found("city on cell", cell))?;
        let cargo = std::mem::take(&mut self.require_army_mut(army)?.stock);
        self.require_city_mut(city)?
            .credit(rules.definitions, &cargo);
        Ok(())
    }

    fn disband(&mut self, rules: &Rules<'_>, army: Id, cell: Id) -> Result<()> {
        let owner = self.require_army_mut(army)?.city;
        let (units, cargo) = self
            .require_city_mut(owner)?
            .dissolve_army(army)
            .ok_or_else(|| Error::Conflict(format!("army {army} already disbanded")))?;
        let receiver = self.city_at(cell).map_or(owner, |c| c.id);
        self.require_city_mut(receiver)?
            .receive(rules.definitions, units, &cargo);
        self.require_city_mut(owner)?.permanent_popularity += rules.config.pop_bonus_army_disband;
        emit(
            rules.notifier,
            Event::ArmyDisbanded {
                army,
                city: receiver,
            },
        );
        Ok(())
    }

    fn defend(&mut self, army: Id, cell: Id) -> Result<()> {
        let Some(fight) = self.fight_at(cell).map(|f| f.id) else {
            return Ok(());
        };
        let city = self.city_at(cell).map(|c| c.id);
        if let Some(f) = self.fight_mut(fight) {
            f.join_defense(army);
        }
        let a = self.require_army_mut(army)?;
        a.fight = Some(fight);
        if let Some(city) = city {
            a.set_posture(city, Stance::Defend);
        }
        Ok(())
    }

    fn assault(&mut self, rules: &Rules<'_>, army: Id, cell: Id, action: Action) -> Result<()> {
        let target = self
            .city_at(cell)
            .map(|c| c.id)
            .ok_or_else(|| Error::not_found("city on cell", cell))?;
        if self.require_army_mut(army)?.city == target {
            return Err(Error::Forbidden(format!(
                "army {army} cannot attack its own city {target}"
            )));
        }
        let fight = match self.fight_at(cell).map(|f| f.id) {
            Some(id) => id,
            None => {
                let id = rules.ids.next();
                ids::insert(&mut self.fights, Fight::new(id, cell))?;
                emit(rules.notifier, Event::FightStarted { fight: id, cell });
                id
            }
        };
        self.fight_mut(fight)
            .ok_or_else(|| Error::not_found("fight", fight))?
            .join_attack(army, action)?;
        let a = self.require_army_mut(army)?;
        a.fight = Some(fight);
        a.set_posture(target, Stance::Attack);
        Ok(())
    }

    /// Resolve and close every running fight.
    pub fn resolve_fights(&mut self, rules: &Rules<'_>) -> TickReport {
        let fights = std::mem::take(&mut self.fights);
        let mut report = TickReport::default();
        for fight in &fights {
            self.resolve(rules, fight);
            report.fights += 1;
        }
        report
    }

    fn side_power(&self, armies: impl Iterator<Item = Id>) -> u64 {
        armies.filter_map(|a| self.army(a)).map(Army::power).sum()
    }

    fn resolve(&mut self, rules: &Rules<'_>, fight: &Fight) {
        let city = self.city_at(fight.cell).map(|c| c.id);
        let garrison = city
            .and_then(|c| self.city(c))
            .map_or(0, City::garrison_power);
        let attack = self.side_power(fight.attack.iter().map(|e| e.army));
        let defense = self.side_power(fight.defense.iter().copied()) + garrison;
        let outcome = Outcome::decide(attack, defense, rules.config.defender_bonus);
        let mut damage = outcome.damage_to_winner();

        if outcome.attackers_won {
            for e in &fight.attack {
                if let Some(a) = self.army_mut(e.army) {
                    damage = a.absorb(damage);
                }
            }
            for &a in &fight.defense {
                self.destroy_army(a);
            }
            if let Some(c) = city.and_then(|c| self.city_mut(c)) {
                c.garrison_slain();
            }
            if let Some(c) = city {
                for e in &fight.attack {
                    self.apply_victory(rules, e.army, e.action, c);
                }
            }
        } else {
            for &a in &fight.defense {
                if let Some(a) = self.army_mut(a) {
                    damage = a.absorb(damage);
                }
            }
            if let Some(c) = city.and_then(|c| self.city_mut(c)) {
                c.garrison_absorb(damage);
            }
            for e in &fight.attack {
                self.destroy_army(e.army);
            }
        }

        for a in fight.armies() {
            if let Some(a) = self.army_mut(a) {
                a.fight = None;
            }
        }
        debug!(
            fight = fight.id,
            cell = fight.cell,
            attack = outcome.attack,
            defense = outcome.defense,
            attackers_won = outcome.attackers_won,
            "fight resolved"
        );
        emit(
            rules.notifier,
            Event::FightResolved {
                fight: fight.id,
                cell: fight.cell,
                attackers_won: outcome.attackers_won,
            },
        );
    }

    fn destroy_army(&mut self, army: Id) {
        if let Some(a) = self.army_mut(army).filter(|a| a.is_active()) {
            a.dissolve();
        }
    }

    fn apply_victory(&mut self, rules: &Rules<'_>, army: Id, action: Action, city: Id) {
        let Some(owner) = self.army(army).filter(|a| a.is_active()).map(|a| a.city) else {
            return;
        };
        match action {
            Action::Overlord => {
                if let Err(e) = self.conquer_city(rules, owner, city) {
                    warn!(army, city, error = %e, "conquest failed");
                }
            }
            Action::Break => {
                let ruined = self
                    .city_mut(city)
                    .and_then(|c| c.ruin_building(rules.definitions));
                if let Some(building) = ruined {
                    debug!(army, city, building, "building ruined");
                }
            }
            Action::Massacre => {
                if let Some(c) = self.city_mut(city) {
                    c.ticks_massacres += 1;
                }
            }
            _ => {}
        }
    }

    /// One full step of the region.
    pub fn tick(&mut self, rules: &Rules<'_>, map: &Map) -> TickReport {
        let mut report = self.produce(rules);
        report += self.move_armies(rules, map);
        report += self.resolve_fights(rules);
        debug!(
            region = %self.name,
            cities = report.cities,
            taxes = report.taxes,
            moves = report.moves,
            arrivals = report.arrivals,
            blocked = report.blocked,
            fights = report.fights,
            "region tick"
        );
        report
    }
}

impl World {
    /// Tick every region, rebuilding stale routing tables first.
    pub fn tick(&mut self) -> TickReport {
        self.maps.rehash_stale();
        let rules = Rules {
            config: &self.config,
            definitions: &self.definitions,
            ids: &self.ids,
            notifier: &*self.notifier,
        };
        let mut report = TickReport::default();
        for region in &mut self.regions {
            match self.maps.get(&region.map) {
                Ok(map) => report += region.tick(&rules, map),
                Err(e) => warn!(region = %region.name, error = %e, "region skipped"),
            }
        }
        report
    }
}

impl SharedWorld {
    /// Tick under the write lock.
    ///
    /// # Errors
    ///
    /// [`Error::Consistency`] on a poisoned lock.
    pub fn tick(&self) -> Result<TickReport> {
        self.write(World::tick)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::WorldConfig;
    use crate::map::MapRegistry;
    use crate::region::definitions::{BuildingType, Definitions, UnitType};
    use crate::region::events::MemoryNotifier;
    use crate::region::resources::{ResourceModifiers, ResourcesIncrement};

    const SOLDIER: Id = 1;

    /// Cells 1-2-3-4 on a two-way line; cell 5 is cut off.
    fn world(transfer: TaxTransfer) -> (World, Arc<MemoryNotifier>) {
        let mut map = Map::new("m");
        for _ in 0..5 {
            map.cell_create();
        }
        for i in 1..4 {
            map.road_create(i, i + 1, true).unwrap();
            map.road_create(i + 1, i, true).unwrap();
        }
        let defs = Definitions {
            units: vec![UnitType {
                id: SOLDIER,
                name: "soldier".into(),
                health: 10,
                ticks: 0,
                cost: Resources::ZERO,
                pop_bonus: 0,
                pop_bonus_train: 0,
                pop_required: 0,
                required_building: None,
            }],
            buildings: vec![],
            knowledges: vec![],
        };
        let mut w = World::from_parts(
            WorldConfig::new(transfer),
            defs,
            MapRegistry::new(),
            vec![],
        );
        w.maps.register(map).unwrap();
        w.region_create("r", "m").unwrap();
        w.prepare().unwrap();
        let notifier = Arc::new(MemoryNotifier::new());
        w.set_notifier(Box::new(notifier.clone()));
        (w, notifier)
    }

    fn city(w: &mut World, cell: Id, soldiers: usize) -> Id {
        let id = w.city_create("r", cell, cell * 100, &format!("c{cell}")).unwrap();
        let r = w.region_mut("r").unwrap();
        let c = r.region.city_mut(id).unwrap();
        c.stock_capacity = Resources::uniform(1000);
        for _ in 0..soldiers {
            c.train(&r.rules, SOLDIER).unwrap();
        }
        id
    }

    fn army(w: &mut World, city: Id) -> Id {
        let r = w.region_mut("r").unwrap();
        r.region
            .city_mut(city)
            .unwrap()
            .create_army_defence(&r.rules)
            .unwrap()
    }

    fn order(w: &mut World, army: Id, cell: Id, action: Action) {
        let r = w.region_mut("r").unwrap();
        r.region.defer(r.map, army, Command { cell, action }).unwrap();
    }

    fn region(w: &World) -> &Region {
        w.region("r").unwrap()
    }

    #[test]
    fn test_instant_tax_credits_overlord() {
        let (mut w, notifier) = world(TaxTransfer::Instant);
        let a = city(&mut w, 1, 0);
        let b = city(&mut w, 3, 0);
        {
            let r = w.region_mut("r").unwrap();
            r.region.city_mut(b).unwrap().production = Resources([100, 0, 0, 0, 0, 0]);
            r.region.conquer_city(&r.rules, a, b).unwrap();
        }
        let report = w.tick();
        assert_eq!(report.taxes, 1);
        assert_eq!(region(&w).city(a).unwrap().stock.0[0], 20);
        assert_eq!(region(&w).city(b).unwrap().stock.0[0], 80);
        let events = notifier.drain().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            Event::TaxPaid { city, overlord, .. } if *city == b && *overlord == a
        )));
    }

    #[test]
    fn test_transport_tax_walks_to_overlord() {
        let (mut w, _) = world(TaxTransfer::Transport);
        let a = city(&mut w, 1, 0);
        let b = city(&mut w, 3, 0);
        {
            let r = w.region_mut("r").unwrap();
            r.region.city_mut(b).unwrap().production = Resources([100, 0, 0, 0, 0, 0]);
            r.region.conquer_city(&r.rules, a, b).unwrap();
        }
        w.tick();
        assert!(region(&w).city(a).unwrap().stock.is_zero());
        let convoy = region(&w).city(b).unwrap().armies()[0].clone();
        assert_eq!(convoy.cell, 2);
        assert_eq!(convoy.stock.0[0], 20);

        w.tick();
        assert_eq!(region(&w).city(a).unwrap().stock.0[0], 20);
        assert_eq!(region(&w).city(b).unwrap().stock.0[0], 160);

        // Back home, then dissolved into the liege.
        w.tick();
        w.tick();
        let first = region(&w).army(convoy.id).unwrap();
        assert!(!first.is_active());
        w.check().unwrap();
    }

    #[test]
    fn test_blocked_army_does_not_stop_others() {
        let (mut w, notifier) = world(TaxTransfer::Instant);
        let c = city(&mut w, 1, 2);
        let lost = army(&mut w, c);
        order(&mut w, lost, 5, Action::Pause);
        {
            let r = w.region_mut("r").unwrap();
            let city = r.region.city_mut(c).unwrap();
            city.train(&r.rules, SOLDIER).unwrap();
        }
        let walker = army(&mut w, c);
        order(&mut w, walker, 3, Action::Pause);

        let report = w.tick();
        assert_eq!(report.blocked, 1);
        assert_eq!(report.moves, 1);
        assert_eq!(region(&w).army(lost).unwrap().cell, 1);
        assert_eq!(region(&w).army(lost).unwrap().commands().count(), 0);
        assert_eq!(region(&w).army(walker).unwrap().cell, 2);
        let events = notifier.drain().unwrap();
        assert!(events.contains(&Event::ArmyBlocked {
            army: lost,
            src: 1,
            dst: 5
        }));
    }

    #[test]
    fn test_defence_wins_ties() {
        let (mut w, notifier) = world(TaxTransfer::Instant);
        w.config.defender_bonus = 0.0;
        let a = city(&mut w, 1, 2);
        let b = city(&mut w, 2, 2);
        let raid = army(&mut w, a);
        order(&mut w, raid, 2, Action::Attack);

        let report = w.tick();
        assert_eq!(report.fights, 1);
        let r = region(&w);
        assert!(!r.army(raid).unwrap().is_active());
        assert!(r.fights().is_empty());
        assert!(r.city(b).unwrap().units().is_empty());
        assert!(notifier.drain().unwrap().iter().any(|e| matches!(
            e,
            Event::FightResolved {
                attackers_won: false,
                ..
            }
        )));
        w.check().unwrap();
    }

    #[test]
    fn test_overlord_assault_conquers() {
        let (mut w, _) = world(TaxTransfer::Instant);
        let a = city(&mut w, 1, 5);
        let b = city(&mut w, 2, 1);
        let host = army(&mut w, a);
        order(&mut w, host, 2, Action::Overlord);

        w.tick();
        let r = region(&w);
        let host = r.army(host).unwrap();
        assert!(host.is_active());
        assert_eq!(host.fight, None);
        assert_eq!(host.power(), 40);
        assert_eq!(host.units().len(), 4);
        assert_eq!(r.city(b).unwrap().overlord, Some(a));
        assert_eq!(r.city(a).unwrap().lieges(), &[b]);
        assert!(r.city(b).unwrap().units().is_empty());
        w.check().unwrap();
    }

    #[test]
    fn test_massacre_adds_pending_tick() {
        let (mut w, _) = world(TaxTransfer::Instant);
        let a = city(&mut w, 1, 3);
        let b = city(&mut w, 2, 0);
        let host = army(&mut w, a);
        order(&mut w, host, 2, Action::Massacre);
        w.tick();
        assert_eq!(region(&w).city(b).unwrap().ticks_massacres, 1);
    }

    #[test]
    fn test_break_trims_stock_to_remaining_capacity() {
        let (mut w, _) = world(TaxTransfer::Instant);
        let granary = w.next_id();
        let mut stock = ResourceModifiers::noop();
        stock.plus = ResourcesIncrement([500, 0, 0, 0, 0, 0]);
        w.definitions.buildings.push(BuildingType {
            id: granary,
            name: "granary".into(),
            ticks: 0,
            cost0: Resources::ZERO,
            cost: Resources::ZERO,
            unique: true,
            pop_required: 0,
            pop_bonus: 0,
            pop_bonus_build: 0,
            stock,
            prod: ResourceModifiers::noop(),
            requires: vec![],
            conflicts: vec![],
        });
        let a = city(&mut w, 1, 3);
        let b = city(&mut w, 2, 0);
        {
            let r = w.region_mut("r").unwrap();
            let c = r.region.city_mut(b).unwrap();
            let building = c.build(&r.rules, granary).unwrap();
            assert!(c.building(building).unwrap().is_standing());
            c.stock = Resources([1500, 0, 0, 0, 0, 0]);
        }
        let raid = army(&mut w, a);
        order(&mut w, raid, 2, Action::Break);
        w.tick();

        let c = region(&w).city(b).unwrap();
        assert_eq!(c.stock_view(&w.definitions).actual.0[0], 1000);
        assert_eq!(c.stock.0[0], 1000);
    }

    #[test]
    fn test_undispatched_convoy_returns_tax() {
        let (mut w, notifier) = world(TaxTransfer::Transport);
        let a = city(&mut w, 1, 0);
        let b = city(&mut w, 3, 1);
        let guard = army(&mut w, b);
        {
            let r = w.region_mut("r").unwrap();
            r.region.city_mut(b).unwrap().production = Resources([100, 0, 0, 0, 0, 0]);
            r.region.conquer_city(&r.rules, a, b).unwrap();
        }
        // The convoy would reuse the guard's ID.
        w.ids.reset_after(guard - 1);
        let report = w.tick();

        assert_eq!(report.taxes, 0);
        let r = region(&w);
        assert_eq!(r.city(b).unwrap().stock.0[0], 100);
        assert_eq!(r.city(b).unwrap().armies().len(), 1);
        assert!(r.city(a).unwrap().stock.is_zero());
        let events = notifier.drain().unwrap();
        assert!(!events.iter().any(|e| matches!(e, Event::TaxPaid { .. })));
    }

    #[test]
    fn test_attacking_own_city_is_ignored() {
        let (mut w, _) = world(TaxTransfer::Instant);
        let a = city(&mut w, 1, 1);
        let host = army(&mut w, a);
        order(&mut w, host, 1, Action::Attack);
        let report = w.tick();
        assert_eq!(report.arrivals, 1);
        assert_eq!(report.fights, 0);
        assert!(region(&w).army(host).unwrap().is_active());
    }

    #[test]
    fn test_disband_hands_units_to_local_city() {
        let (mut w, notifier) = world(TaxTransfer::Instant);
        w.config.pop_bonus_army_disband = 2;
        let a = city(&mut w, 1, 2);
        let b = city(&mut w, 2, 0);
        let host = army(&mut w, a);
        order(&mut w, host, 2, Action::Disband);
        w.tick();
        let r = region(&w);
        assert!(!r.army(host).unwrap().is_active());
        assert_eq!(r.city(b).unwrap().units().len(), 2);
        assert_eq!(r.city(a).unwrap().permanent_popularity, 2);
        assert!(
            notifier
                .drain()
                .unwrap()
                .contains(&Event::ArmyDisbanded { army: host, city: b })
        );
        w.check().unwrap();
    }

    #[test]
    fn test_flip_and_flee() {
        let (mut w, _) = world(TaxTransfer::Instant);
        let a = city(&mut w, 1, 1);
        let b = city(&mut w, 2, 0);
        let host = army(&mut w, a);
        order(&mut w, host, 2, Action::Break);
        {
            let r = w.region_mut("r").unwrap();
            r.region.move_armies(&r.rules, r.map);
            let fight = r.region.fight_at(2).unwrap().id;
            assert_eq!(r.region.army(host).unwrap().fight, Some(fight));

            r.region.flip(host).unwrap();
            let army = r.region.army(host).unwrap();
            assert!(army.postures.iter().any(|p| p.city == b && p.stance == Stance::Defend));
            assert_eq!(r.region.fight(fight).unwrap().defense, vec![host]);

            r.region.flee(host).unwrap();
            assert_eq!(r.region.army(host).unwrap().fight, None);
            assert!(r.region.fight(fight).unwrap().is_over());
            assert!(matches!(r.region.flee(host), Err(Error::Conflict(_))));
        }
        w.check().unwrap();
    }

    #[test]
    fn test_shared_tick() {
        let (w, _) = world(TaxTransfer::Instant);
        let shared = SharedWorld::new(w);
        let report = shared.tick().unwrap();
        assert_eq!(report, TickReport::default());
    }
}
