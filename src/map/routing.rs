//! Next-hop table precomputation.
//!
//! For every source cell, a breadth-first traversal seeded with its direct
//! neighbours tags each discovered cell with the neighbour it was reached
//! through. Breadth-first order makes the first discovery a shortest-hop
//! route, so entries are never overwritten. Cost is O(V·(V+E)), paid only
//! when the topology changes.

use std::collections::{HashSet, VecDeque};

use rayon::prelude::*;
use tracing::debug;

use super::graph::{Map, NextHops};
use crate::Id;

impl Map {
    /// Rebuild the whole routing table.
    ///
    /// Sorts the road set first, which also makes roads appended with
    /// [`Map::road_create_raw`] usable. Duplicate roads are collapsed.
    pub fn rehash(&mut self) {
        self.prepare_roads();
        let mut next = self.direct_hops();
        for cell in &self.cells {
            for (dst, first) in self.explore(cell.id) {
                next.entry((cell.id, dst)).or_insert(first);
            }
        }
        self.install(next);
    }

    /// Same table as [`Map::rehash`], with one traversal per source cell run
    /// on the rayon pool.
    ///
    /// Sources own disjoint key ranges of the table, so per-source results
    /// are merged without contention.
    pub fn rehash_parallel(&mut self) {
        self.prepare_roads();
        let shards: Vec<(Id, Vec<(Id, Id)>)> = self
            .cells
            .par_iter()
            .map(|cell| (cell.id, self.explore(cell.id)))
            .collect();
        let mut next = self.direct_hops();
        for (src, found) in shards {
            for (dst, first) in found {
                next.entry((src, dst)).or_insert(first);
            }
        }
        self.install(next);
    }

    fn prepare_roads(&mut self) {
        self.roads.sort_unstable();
        self.roads.dedup();
    }

    /// Single-hop entries, which take precedence over anything discovered.
    fn direct_hops(&self) -> NextHops {
        let mut next = NextHops::with_capacity(self.roads.len());
        for e in &self.roads {
            next.insert((e.src, e.dst), e.dst);
        }
        next
    }

    /// Cells reachable from `src` in two hops or more, in discovery order,
    /// each paired with the first hop leading to it.
    fn explore(&self, src: Id) -> Vec<(Id, Id)> {
        let mut visited = HashSet::new();
        visited.insert(src);
        let mut queue = VecDeque::new();
        for n in self.adjacency(src) {
            if visited.insert(n) {
                queue.push_back((n, n));
            }
        }

        let mut found = Vec::new();
        while let Some((current, first)) = queue.pop_front() {
            for n in self.adjacency(current) {
                if visited.insert(n) {
                    queue.push_back((n, first));
                    found.push((n, first));
                }
            }
        }
        found
    }

    fn install(&mut self, next: NextHops) {
        debug!(
            map = %self.id,
            cells = self.cells.len(),
            roads = self.roads.len(),
            routes = next.len(),
            "routing table rebuilt"
        );
        self.steps = next;
        self.stale = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: Id, both_ways: bool) -> Map {
        let mut m = Map::new("line");
        for _ in 0..n {
            m.cell_create();
        }
        for i in 1..n {
            m.road_create(i, i + 1, true).unwrap();
            if both_ways {
                m.road_create(i + 1, i, true).unwrap();
            }
        }
        m
    }

    #[test]
    fn test_direct_edges_seed_table() {
        let mut m = line(2, false);
        m.rehash();
        assert_eq!(m.steps.get(&(1, 2)), Some(&2));
        assert_eq!(m.route_count(), 1);
        assert!(!m.needs_rehash());
    }

    #[test]
    fn test_one_way_line() {
        let mut m = line(4, false);
        m.rehash();
        assert_eq!(m.steps.get(&(1, 4)), Some(&2));
        assert_eq!(m.steps.get(&(2, 4)), Some(&3));
        assert_eq!(m.steps.get(&(3, 4)), Some(&4));
        assert!(!m.steps.contains_key(&(2, 1)));
        // 3 + 2 + 1 reachable pairs.
        assert_eq!(m.route_count(), 6);
    }

    #[test]
    fn test_shortcut_preferred() {
        let mut m = line(4, false);
        m.road_create(1, 3, true).unwrap();
        m.rehash();
        assert_eq!(m.steps.get(&(1, 4)), Some(&3));
        assert_eq!(m.steps.get(&(1, 2)), Some(&2));
    }

    #[test]
    fn test_sink_has_no_entries() {
        let mut m = line(3, false);
        m.rehash();
        assert!(m.steps.keys().all(|&(src, _)| src != 3));
    }

    #[test]
    fn test_rehash_idempotent() {
        let mut m = line(6, true);
        m.rehash();
        let first = m.steps.clone();
        m.rehash();
        assert_eq!(first, m.steps);
    }

    #[test]
    fn test_raw_roads_sorted_and_deduplicated() {
        let mut m = line(3, false);
        m.road_create_raw(3, 1).unwrap();
        m.road_create_raw(2, 3).unwrap();
        m.rehash();
        m.check().unwrap();
        assert_eq!(m.roads().len(), 3);
        assert_eq!(m.steps.get(&(3, 2)), Some(&1));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut m = line(8, true);
        m.road_create(1, 5, true).unwrap();
        m.road_create(8, 3, true).unwrap();
        m.rehash();
        let sequential = m.steps.clone();
        m.rehash_parallel();
        assert_eq!(sequential, m.steps);
    }
}
