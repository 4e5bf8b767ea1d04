#![no_main]

use arbitrary::Arbitrary;
use hegemon::scenario::{BARRACKS, FARM, KNIGHT, REGION, SOLDIER, Scenario, WRITING};
use hegemon::{Action, Command, TaxTransfer, World};
use libfuzzer_sys::fuzz_target;

/// One player move, aimed at a city by index.
#[derive(Arbitrary, Debug)]
enum Order {
    Train { city: u8, knight: bool },
    Build { city: u8, barracks: bool },
    Study { city: u8 },
    March { city: u8, cell: u8, action: u8 },
    Transport { city: u8, amount: u16 },
    Tax { city: u8, percent: u8 },
    Tick,
}

/// Structured input for economy fuzzing.
#[derive(Arbitrary, Debug)]
struct EconomyInput {
    /// Cities on a 6x6 grid (capped).
    cities: u8,
    /// Garrison size (capped).
    garrison: u8,
    /// Transport taxes instead of instant ones.
    transport: bool,
    /// Orders and ticks interleaved.
    orders: Vec<Order>,
}

const ACTIONS: [Action; 9] = [
    Action::Pause,
    Action::Wait,
    Action::Attack,
    Action::Defend,
    Action::Overlord,
    Action::Break,
    Action::Massacre,
    Action::Deposit,
    Action::Disband,
];

/// Apply one order, ignoring refusals: only panics and broken invariants count.
fn apply(world: &mut World, order: &Order) {
    if let Order::Tick = order {
        world.tick();
        return;
    }
    let ids: Vec<_> = match world.region(REGION) {
        Ok(r) => r.cities().iter().map(|c| c.id).collect(),
        Err(_) => return,
    };
    let pick = |i: u8| ids[usize::from(i) % ids.len()];
    let Ok(r) = world.region_mut(REGION) else {
        return;
    };
    let _ = match *order {
        Order::Train { city, knight } => r
            .region
            .require_city_mut(pick(city))
            .and_then(|c| c.train(&r.rules, if knight { KNIGHT } else { SOLDIER }))
            .map(drop),
        Order::Build { city, barracks } => r
            .region
            .require_city_mut(pick(city))
            .and_then(|c| c.build(&r.rules, if barracks { BARRACKS } else { FARM }))
            .map(drop),
        Order::Study { city } => r
            .region
            .require_city_mut(pick(city))
            .and_then(|c| c.study(&r.rules, WRITING))
            .map(drop),
        Order::March { city, cell, action } => {
            let army = r
                .region
                .require_city_mut(pick(city))
                .and_then(|c| c.create_army_defence(&r.rules));
            army.and_then(|army| {
                let command = Command {
                    cell: u64::from(cell) % 36 + 1,
                    action: ACTIONS[usize::from(action) % ACTIONS.len()],
                };
                r.region.defer(r.map, army, command)
            })
        }
        Order::Transport { city, amount } => r
            .region
            .require_city_mut(pick(city))
            .and_then(|c| {
                let cargo = hegemon::Resources([u64::from(amount), 0, 0, 0, 0, 0]);
                c.create_transport(&r.rules, cargo)
            })
            .map(drop),
        Order::Tax { city, percent } => r.region.require_city_mut(pick(city)).map(|c| {
            c.set_uniform_tax_rate(f64::from(percent.min(100)) / 100.0);
        }),
        Order::Tick => Ok(()),
    };
}

fuzz_target!(|input: EconomyInput| {
    let scenario = Scenario {
        width: 6,
        height: 6,
        cities: usize::from(input.cities.clamp(1, 12)),
        garrison: usize::from(input.garrison.min(8)),
        tax_transfer: if input.transport {
            TaxTransfer::Transport
        } else {
            TaxTransfer::Instant
        },
        raids: false,
    };
    let Ok(mut world) = scenario.build() else {
        return;
    };

    for order in input.orders.iter().take(256) {
        apply(&mut world, order);
        if let Err(e) = world.check() {
            panic!("invariant broken after {order:?}: {e}");
        }
    }
    for _ in 0..8 {
        world.tick();
    }
    if let Err(e) = world.check() {
        panic!("invariant broken after the final ticks: {e}");
    }
});
