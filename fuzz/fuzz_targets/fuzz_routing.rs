#![no_main]

use arbitrary::Arbitrary;
use hegemon::{Error, Map};
use libfuzzer_sys::fuzz_target;

/// Structured input for routing fuzzing.
#[derive(Arbitrary, Debug)]
struct RoutingInput {
    /// Number of cells (capped).
    cells: u8,
    /// Roads as raw cell indices, folded onto existing cells.
    roads: Vec<(u8, u8)>,
    /// Roads removed after the first rehash.
    removals: Vec<(u8, u8)>,
}

fn cell(raw: u8, n: u64) -> u64 {
    u64::from(raw) % n + 1
}

fuzz_target!(|input: RoutingInput| {
    let n = u64::from(input.cells.clamp(1, 64));
    let mut map = Map::new("fuzz");
    for _ in 0..n {
        map.cell_create();
    }
    for &(a, b) in input.roads.iter().take(512) {
        let (a, b) = (cell(a, n), cell(b, n));
        // Self-loops and duplicates are refused, never fatal.
        let _ = map.road_create(a, b, true);
    }
    assert!(map.check().is_ok());

    let mut parallel = map.clone();
    map.rehash();
    parallel.rehash_parallel();
    assert_eq!(map.route_count(), parallel.route_count());

    for src in 1..=n {
        for dst in 1..=n {
            assert_eq!(map.next_step(src, dst).ok(), parallel.next_step(src, dst).ok());
            match map.path(src, dst, 0) {
                Ok(hops) => assert!(hops.len() < n as usize),
                Err(Error::Consistency(e)) => panic!("broken routing table: {e}"),
                Err(_) => {}
            }
        }
    }

    let mut removed = false;
    for &(a, b) in input.removals.iter().take(64) {
        removed |= map.road_delete(cell(a, n), cell(b, n), true).is_ok();
    }
    assert_eq!(map.needs_rehash(), removed);
    map.rehash();
    for src in 1..=n {
        for dst in 1..=n {
            if let Err(Error::Consistency(e)) = map.path(src, dst, 0) {
                panic!("broken routing table after edits: {e}");
            }
        }
    }
});
