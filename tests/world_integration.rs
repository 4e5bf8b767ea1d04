//! Multi-tick integration tests over the public API.
//!
//! These tests drive whole worlds through saves, reloads and concurrent
//! access, and follow a conquest from the first step to the first tax.
//!
//! Run with: cargo test --release world_integration

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use hegemon::persist::{JsonDirectory, Persistence, load_world};
use hegemon::region::MemoryNotifier;
use hegemon::scenario::{MASONRY, REGION, SOLDIER, Scenario, WRITING};
use hegemon::{Action, Command, Event, Id, SharedWorld, World};

fn raided() -> Scenario {
    Scenario {
        raids: true,
        ..Scenario::default()
    }
}

/// City standing on `cell`.
fn city_on(world: &World, cell: Id) -> Id {
    world
        .region(REGION)
        .unwrap()
        .cities()
        .iter()
        .find(|c| c.cell == cell)
        .map(|c| c.id)
        .unwrap()
}

#[test]
fn test_save_load_tick_matches() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonDirectory::new(dir.path());

    let mut world = raided().build().unwrap();
    for _ in 0..3 {
        world.tick();
    }
    store.save(&world).unwrap();

    let mut loaded = store.load().unwrap();
    assert_eq!(
        world.region(REGION).unwrap().cities(),
        loaded.region(REGION).unwrap().cities()
    );

    // Raids are over: later ticks only produce.
    for _ in 0..2 {
        assert_eq!(world.tick(), loaded.tick());
    }
    assert_eq!(
        world.region(REGION).unwrap().cities(),
        loaded.region(REGION).unwrap().cities()
    );
    loaded.check().unwrap();
}

#[test]
fn test_ids_stay_fresh_after_load() {
    let dir = tempfile::tempdir().unwrap();
    let world = Scenario::default().build().unwrap();
    JsonDirectory::new(dir.path()).save(&world).unwrap();

    let mut loaded = load_world(dir.path()).unwrap();
    let before = loaded.max_id();
    let id = loaded.city_create(REGION, 2, 99, "late").unwrap();
    assert!(id > before);
    loaded.check().unwrap();
}

#[test]
fn test_concurrent_reads_during_ticks() {
    let shared = SharedWorld::new(raided().build().unwrap());
    let cities = shared
        .read(|w| w.region(REGION).unwrap().cities().len())
        .unwrap();

    std::thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..20 {
                shared.tick().unwrap();
            }
        });
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..50 {
                    let (count, consistent) = shared
                        .read(|w| (w.region(REGION).unwrap().cities().len(), w.check().is_ok()))
                        .unwrap();
                    assert_eq!(count, cities);
                    assert!(consistent);
                }
            });
        }
    });
}

#[test]
fn test_strong_raid_conquers_then_taxes() {
    let mut world = Scenario {
        width: 4,
        height: 1,
        cities: 2,
        garrison: 2,
        ..Scenario::default()
    }
    .build()
    .unwrap();
    let notifier = Arc::new(MemoryNotifier::new());
    world.set_notifier(Box::new(notifier.clone()));

    let target = city_on(&world, 1);
    let raider = city_on(&world, 3);
    {
        let r = world.region_mut(REGION).unwrap();
        let c = r.region.require_city_mut(raider).unwrap();
        for _ in 0..4 {
            let unit = c.train(&r.rules, SOLDIER).unwrap();
            c.unit_finish(unit).unwrap();
        }
        let army = c.create_army_defence(&r.rules).unwrap();
        r.region
            .defer(
                r.map,
                army,
                Command {
                    cell: 1,
                    action: Action::Overlord,
                },
            )
            .unwrap();
    }

    for _ in 0..4 {
        world.tick();
    }
    let region = world.region(REGION).unwrap();
    assert_eq!(region.city(target).unwrap().overlord, Some(raider));
    assert_eq!(region.city(raider).unwrap().lieges(), &[target]);

    let events = notifier.drain().unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::CityConquered { city, overlord } if *city == target && *overlord == raider
    )));

    world.tick();
    let events = notifier.drain().unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::TaxPaid { city, overlord, .. } if *city == target && *overlord == raider
    )));
    world.check().unwrap();
}

#[test]
fn test_knowledge_frontier_advances() {
    let mut world = Scenario {
        cities: 1,
        garrison: 0,
        ..Scenario::default()
    }
    .build()
    .unwrap();
    let city = city_on(&world, 1);

    let frontier = |world: &World| -> Vec<Id> {
        let rules = world.rules();
        world
            .region(REGION)
            .unwrap()
            .city(city)
            .unwrap()
            .knowledge_frontier(&rules)
            .iter()
            .map(|t| t.id)
            .collect()
    };
    assert_eq!(frontier(&world), vec![WRITING]);

    {
        let r = world.region_mut(REGION).unwrap();
        let c = r.region.require_city_mut(city).unwrap();
        c.study(&r.rules, WRITING).unwrap();
    }
    assert!(frontier(&world).is_empty());

    for _ in 0..3 {
        world.tick();
    }
    assert_eq!(frontier(&world), vec![MASONRY]);
}
