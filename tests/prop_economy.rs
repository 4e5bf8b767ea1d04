//! Property-based tests for the city economy.
//!
//! Run with: cargo test --release prop_economy

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use proptest::prelude::*;

use hegemon::region::{ResourcesMultiplier, UnitType};
use hegemon::scenario::grid_map;
use hegemon::{Definitions, Error, Id, Resources, TaxTransfer, World, WorldConfig};

const REGION: &str = "r";
const SOLDIER: Id = 1;

fn resources() -> impl Strategy<Value = Resources> {
    prop::array::uniform6(0u64..1_000_000).prop_map(Resources)
}

/// A 4x1 grid with cities on cells 1 and 4.
fn world(transfer: TaxTransfer) -> (World, Id, Id) {
    let definitions = Definitions {
        units: vec![UnitType {
            id: SOLDIER,
            name: "soldier".into(),
            health: 10,
            ticks: 3,
            cost: Resources::ZERO,
            pop_bonus: 0,
            pop_bonus_train: 0,
            pop_required: 0,
            required_building: None,
        }],
        ..Definitions::default()
    };
    let mut world = World::new(WorldConfig::new(transfer));
    world.definitions = definitions;
    world.maps.register(grid_map("m", 4, 1)).unwrap();
    world.region_create(REGION, "m").unwrap();
    world.prepare().unwrap();
    let a = world.city_create(REGION, 1, 1, "a").unwrap();
    let b = world.city_create(REGION, 4, 2, "b").unwrap();
    (world, a, b)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// The end-of-tick stock never exceeds the capacity.
    #[test]
    fn prop_stock_within_capacity(
        production in resources(),
        stock in resources(),
        capacity in resources(),
        rounds in 1usize..4
    ) {
        let (mut world, a, _) = world(TaxTransfer::Instant);
        {
            let r = world.region_mut(REGION).unwrap();
            let c = r.region.city_mut(a).unwrap();
            c.production = production;
            c.stock = stock;
            c.stock_capacity = capacity;
        }
        for _ in 0..rounds {
            world.tick();
            let c = world.region(REGION).unwrap().city(a).unwrap();
            prop_assert!(capacity.greater_or_equal_to(&c.stock));
        }
    }

    /// N pending massacres scale production by the impact N times, and one
    /// of them is recovered.
    #[test]
    fn prop_massacre_decay(production in 0u64..1_000_000, massacres in 0u32..8) {
        let (mut world, a, _) = world(TaxTransfer::Instant);
        {
            let r = world.region_mut(REGION).unwrap();
            let c = r.region.city_mut(a).unwrap();
            c.production = Resources([production, 0, 0, 0, 0, 0]);
            c.stock_capacity = Resources::uniform(u64::MAX / 2);
            c.ticks_massacres = massacres;
        }
        world.tick();
        let c = world.region(REGION).unwrap().city(a).unwrap();
        // The default impact halves production.
        prop_assert_eq!(c.stock.0[0], production >> massacres);
        prop_assert_eq!(c.ticks_massacres, massacres.saturating_sub(1));
    }

    /// Production is restored after N ticks without new massacres.
    #[test]
    fn prop_massacre_recovery(production in 0u64..1_000_000, massacres in 0u32..6) {
        let (mut world, a, _) = world(TaxTransfer::Instant);
        {
            let r = world.region_mut(REGION).unwrap();
            let c = r.region.city_mut(a).unwrap();
            c.production = Resources([production, 0, 0, 0, 0, 0]);
            c.stock_capacity = Resources::uniform(u64::MAX / 2);
            c.ticks_massacres = massacres;
        }
        for _ in 0..massacres {
            world.tick();
        }
        let before = world.region(REGION).unwrap().city(a).unwrap().stock.0[0];
        world.tick();
        let after = world.region(REGION).unwrap().city(a).unwrap().stock.0[0];
        prop_assert_eq!(after - before, production);
    }

    /// Tax moves part of the liege's production and never creates resources.
    #[test]
    fn prop_instant_tax_conserves(
        production in resources(),
        rate in prop::array::uniform6(0.0f64..=1.0)
    ) {
        let (mut world, a, b) = world(TaxTransfer::Instant);
        {
            let r = world.region_mut(REGION).unwrap();
            r.region.conquer_city(&r.rules, a, b).unwrap();
            let liege = r.region.city_mut(b).unwrap();
            liege.production = production;
            liege.stock_capacity = Resources::uniform(u64::MAX / 2);
            liege.set_tax_rate(ResourcesMultiplier(rate));
            r.region.city_mut(a).unwrap().stock_capacity = Resources::uniform(u64::MAX / 2);
        }
        world.tick();
        let region = world.region(REGION).unwrap();
        let overlord = region.city(a).unwrap().stock;
        let liege = region.city(b).unwrap().stock;
        for slot in 0..6 {
            prop_assert_eq!(overlord.0[slot] + liege.0[slot], production.0[slot]);
            prop_assert!(overlord.0[slot] <= production.0[slot]);
        }
        world.check().unwrap();
    }

    /// Army creation with any busy unit moves nothing.
    #[test]
    fn prop_army_creation_all_or_nothing(
        trained in 1usize..6,
        busy in 1usize..4,
        picks in prop::collection::vec(any::<prop::sample::Index>(), 0..6)
    ) {
        let (mut world, a, _) = world(TaxTransfer::Instant);
        let r = world.region_mut(REGION).unwrap();
        let c = r.region.city_mut(a).unwrap();
        let mut idle = Vec::new();
        for _ in 0..trained {
            let u = c.train(&r.rules, SOLDIER).unwrap();
            c.unit_finish(u).unwrap();
            idle.push(u);
        }
        let mut waiting = Vec::new();
        for _ in 0..busy {
            waiting.push(c.train(&r.rules, SOLDIER).unwrap());
        }

        let mut request: Vec<Id> = picks.iter().map(|i| idle[i.index(idle.len())]).collect();
        request.push(waiting[0]);
        let before = c.units().to_vec();
        let err = c.create_army(&r.rules, &request).unwrap_err();
        prop_assert!(matches!(err, Error::Conflict(_)));
        prop_assert_eq!(c.units(), before.as_slice());
        prop_assert!(c.armies().is_empty());

        let army = c.create_army(&r.rules, &idle).unwrap();
        prop_assert_eq!(c.units().len(), busy);
        prop_assert_eq!(c.army(army).unwrap().units().len(), trained);
    }

    /// Trimming never raises a slot and never exceeds the cap.
    #[test]
    fn prop_trim_bounds(a in resources(), cap in resources()) {
        let mut t = a;
        t.trim_to(&cap);
        prop_assert!(a.greater_or_equal_to(&t));
        prop_assert!(cap.greater_or_equal_to(&t));
    }

    /// Removing what was added restores the vector.
    #[test]
    fn prop_add_then_remove(a in resources(), b in resources()) {
        let mut t = a;
        t.add(&b);
        prop_assert!(t.greater_or_equal_to(&a));
        t.remove(&b);
        prop_assert_eq!(t, a);
    }
}
