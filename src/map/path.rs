//! Path queries over the next-hop table.

use super::graph::Map;
use crate::Id;
use crate::error::{Error, Result};

impl Map {
    /// First hop on a shortest route from `src` to `dst`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] when `src == dst` or either is zero.
    /// - [`Error::NoRoute`] when `dst` is unreachable, or when roads changed
    ///   since the last rehash.
    pub fn next_step(&self, src: Id, dst: Id) -> Result<Id> {
        if src == 0 || dst == 0 || src == dst {
            return Err(Error::InvalidArgument(format!("route {src}->{dst}")));
        }
        if self.stale {
            return Err(Error::NoRoute { src, dst });
        }
        self.steps
            .get(&(src, dst))
            .copied()
            .ok_or(Error::NoRoute { src, dst })
    }

    /// Every hop from `src` to `dst`, excluding `src` itself.
    ///
    /// With `max > 0` the list stops after `max` hops even if `dst` was not
    /// reached yet.
    ///
    /// # Errors
    ///
    /// Errors of [`Map::next_step`], and [`Error::Consistency`] when the walk
    /// exceeds the number of roads, which only a corrupted table allows.
    pub fn path(&self, src: Id, dst: Id, max: usize) -> Result<Vec<Id>> {
        let guard = self.roads.len();
        let mut hops = Vec::new();
        let mut current = src;
        loop {
            current = self.next_step(current, dst)?;
            hops.push(current);
            if current == dst || (max > 0 && hops.len() >= max) {
                return Ok(hops);
            }
            if hops.len() >= guard {
                return Err(Error::consistency(format!(
                    "map {}: route {src}->{dst} loops after {} hops",
                    self.id,
                    hops.len()
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(width: Id, height: Id) -> Map {
        let mut m = Map::new("grid");
        for _ in 0..width * height {
            m.cell_create();
        }
        let id = |x: Id, y: Id| y * width + x + 1;
        for y in 0..height {
            for x in 0..width {
                if x + 1 < width {
                    m.road_create(id(x, y), id(x + 1, y), true).unwrap();
                    m.road_create(id(x + 1, y), id(x, y), true).unwrap();
                }
                if y + 1 < height {
                    m.road_create(id(x, y), id(x, y + 1), true).unwrap();
                    m.road_create(id(x, y + 1), id(x, y), true).unwrap();
                }
            }
        }
        m.rehash();
        m
    }

    #[test]
    fn test_next_step_invalid_arguments() {
        let m = grid(2, 2);
        for src in 0..3 {
            for dst in 0..3 {
                let res = m.next_step(src, dst);
                if src == 0 || dst == 0 || src == dst {
                    assert!(matches!(res, Err(Error::InvalidArgument(_))));
                } else {
                    assert!(res.is_ok());
                }
            }
        }
    }

    #[test]
    fn test_one_way_line() {
        let mut m = Map::new("line");
        for _ in 0..4 {
            m.cell_create();
        }
        for i in 1..4 {
            m.road_create(i, i + 1, true).unwrap();
        }
        m.rehash();
        assert_eq!(m.next_step(1, 4).unwrap(), 2);
        assert_eq!(m.next_step(2, 4).unwrap(), 3);
        assert_eq!(m.next_step(3, 4).unwrap(), 4);
        assert!(matches!(
            m.next_step(2, 1),
            Err(Error::NoRoute { src: 2, dst: 1 })
        ));
    }

    #[test]
    fn test_grid_path_is_shortest() {
        let m = grid(4, 3);
        // Opposite corners: 3 moves right, 2 moves down.
        let hops = m.path(1, 12, 0).unwrap();
        assert_eq!(hops.len(), 5);
        assert_eq!(hops.last(), Some(&12));
        let mut prev = 1;
        for &h in &hops {
            assert!(m.road_has(prev, h));
            prev = h;
        }
    }

    #[test]
    fn test_path_truncated() {
        let m = grid(4, 3);
        assert_eq!(m.path(1, 12, 2).unwrap().len(), 2);
    }

    #[test]
    fn test_stale_table_reports_no_route() {
        let mut m = Map::new("fresh");
        m.cell_create();
        m.cell_create();
        m.road_create(1, 2, true).unwrap();
        assert!(m.needs_rehash());
        assert!(matches!(m.next_step(1, 2), Err(Error::NoRoute { .. })));
    }

    #[test]
    fn test_deleted_road_not_routed_before_rehash() {
        let mut m = Map::new("edit");
        for _ in 0..3 {
            m.cell_create();
        }
        m.road_create(1, 2, true).unwrap();
        m.road_create(2, 3, true).unwrap();
        m.rehash();
        assert_eq!(m.path(1, 3, 0).unwrap(), vec![2, 3]);

        m.road_delete(1, 2, true).unwrap();
        assert!(matches!(m.next_step(1, 3), Err(Error::NoRoute { .. })));
        assert!(matches!(m.path(1, 3, 0), Err(Error::NoRoute { .. })));
        m.rehash();
        assert!(matches!(m.next_step(1, 3), Err(Error::NoRoute { .. })));
        assert_eq!(m.next_step(2, 3).unwrap(), 3);
    }

    #[test]
    fn test_corrupted_table_detected() {
        let mut m = grid(2, 1);
        // 1 -> 2 for every destination, 2 -> 1 for destination 3: a cycle.
        m.steps.insert((1, 3), 2);
        m.steps.insert((2, 3), 1);
        assert!(matches!(m.path(1, 3, 0), Err(Error::Consistency(_))));
    }
}
