//! Cells, roads and their sorted storage.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::Id;
use crate::error::{Error, Result};

/// A cell of the map.
///
/// The position only matters for rendering; routing ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    /// Unique within the map, never zero.
    pub id: Id,
    /// Horizontal position.
    #[serde(default)]
    pub x: u64,
    /// Vertical position.
    #[serde(default)]
    pub y: u64,
    /// Whether a city may stand on this cell.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub city: bool,
}

impl Vertex {
    /// A cell at the origin with no city slot.
    #[must_use]
    pub const fn new(id: Id) -> Self {
        Self {
            id,
            x: 0,
            y: 0,
            city: false,
        }
    }
}

/// A directed road. Ordered by `(src, dst)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Origin cell.
    pub src: Id,
    /// Destination cell.
    pub dst: Id,
}

impl Edge {
    /// Create an edge without validating it.
    #[must_use]
    pub const fn new(src: Id, dst: Id) -> Self {
        Self { src, dst }
    }
}

/// Next hop indexed by `(src, dst)`.
pub(super) type NextHops = HashMap<(Id, Id), Id>;

fn stale() -> bool {
    true
}

/// A directed graph of cells with its routing table.
///
/// `cells` is sorted by ID and `roads` by `(src, dst)`; both invariants are
/// checked by [`Map::check`]. The routing table is never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Map {
    /// Name under which the map is registered.
    pub id: String,
    pub(super) cells: Vec<Vertex>,
    pub(super) roads: Vec<Edge>,
    /// Last ID handed out by [`Map::cell_create`].
    #[serde(skip)]
    pub(super) next_id: Id,
    #[serde(skip)]
    pub(super) steps: NextHops,
    /// Set by every road mutation, cleared by a rehash.
    #[serde(skip, default = "stale")]
    pub(super) stale: bool,
}

impl Map {
    /// Create an empty map.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// All cells, sorted by ID.
    #[must_use]
    pub fn cells(&self) -> &[Vertex] {
        &self.cells
    }

    /// All roads, sorted by `(src, dst)` unless raw roads were appended since
    /// the last rehash.
    #[must_use]
    pub fn roads(&self) -> &[Edge] {
        &self.roads
    }

    /// Whether the routing table lags behind the road set.
    #[must_use]
    pub const fn needs_rehash(&self) -> bool {
        self.stale
    }

    /// Number of `(src, dst)` pairs with a known next hop.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.steps.len()
    }

    /// Create a cell with the next free ID.
    pub fn cell_create(&mut self) -> &mut Vertex {
        self.next_id += 1;
        let id = self.next_id;
        let pos = self.cells.partition_point(|c| c.id < id);
        self.cells.insert(pos, Vertex::new(id));
        &mut self.cells[pos]
    }

    /// Look a cell up by ID.
    #[must_use]
    pub fn cell_get(&self, id: Id) -> Option<&Vertex> {
        self.cells
            .binary_search_by_key(&id, |c| c.id)
            .ok()
            .map(|i| &self.cells[i])
    }

    /// Mutable lookup. The ID itself must not be changed through it.
    pub fn cell_get_mut(&mut self, id: Id) -> Option<&mut Vertex> {
        match self.cells.binary_search_by_key(&id, |c| c.id) {
            Ok(i) => Some(&mut self.cells[i]),
            Err(_) => None,
        }
    }

    /// Whether the cell exists.
    #[must_use]
    pub fn cell_has(&self, id: Id) -> bool {
        self.cell_get(id).is_some()
    }

    fn validate_pair(src: Id, dst: Id) -> Result<()> {
        if src == 0 || dst == 0 {
            return Err(Error::InvalidArgument(format!(
                "zero cell id in road {src}->{dst}"
            )));
        }
        if src == dst {
            return Err(Error::InvalidArgument(format!("self-loop on cell {src}")));
        }
        Ok(())
    }

    fn require_endpoints(&self, src: Id, dst: Id) -> Result<()> {
        if !self.cell_has(src) {
            return Err(Error::not_found("source cell", src));
        }
        if !self.cell_has(dst) {
            return Err(Error::not_found("destination cell", dst));
        }
        Ok(())
    }

    /// Append a road without sorting nor duplicate detection.
    ///
    /// Meant for bulk loading: the road set is sorted again by the next
    /// [`Map::rehash`] or [`Map::post_load`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] on a zero ID or a self-loop.
    pub fn road_create_raw(&mut self, src: Id, dst: Id) -> Result<()> {
        Self::validate_pair(src, dst)?;
        self.roads.push(Edge::new(src, dst));
        self.stale = true;
        Ok(())
    }

    /// Create the directed road `src -> dst`.
    ///
    /// Only the trailing suffix is re-sorted, which keeps sequential loads
    /// of already ordered roads linear.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] on a zero ID or a self-loop.
    /// - [`Error::NotFound`] when `check_existence` is set and an endpoint is missing.
    /// - [`Error::AlreadyExists`] when the road is already present.
    pub fn road_create(&mut self, src: Id, dst: Id, check_existence: bool) -> Result<()> {
        Self::validate_pair(src, dst)?;
        if check_existence {
            self.require_endpoints(src, dst)?;
        }
        let edge = Edge::new(src, dst);
        if self.road_position(edge).is_ok() {
            return Err(Error::AlreadyExists(format!("road {src}->{dst}")));
        }
        self.roads.push(edge);
        let last = self.roads.len() - 1;
        if last > 0 && self.roads[last - 1] > edge {
            let pos = self.roads[..last].partition_point(|e| *e < edge);
            self.roads[pos..].rotate_right(1);
        }
        self.stale = true;
        Ok(())
    }

    /// Remove the directed road `src -> dst`.
    ///
    /// # Errors
    ///
    /// Same validation as [`Map::road_create`], and [`Error::NotFound`] when
    /// the road is absent.
    pub fn road_delete(&mut self, src: Id, dst: Id, check_existence: bool) -> Result<()> {
        Self::validate_pair(src, dst)?;
        if check_existence {
            self.require_endpoints(src, dst)?;
        }
        match self.road_position(Edge::new(src, dst)) {
            Ok(pos) => {
                self.roads.remove(pos);
                self.stale = true;
                Ok(())
            }
            Err(_) => Err(Error::not_found("road", format!("{src}->{dst}"))),
        }
    }

    /// Whether the directed road exists.
    #[must_use]
    pub fn road_has(&self, src: Id, dst: Id) -> bool {
        self.road_position(Edge::new(src, dst)).is_ok()
    }

    fn road_position(&self, edge: Edge) -> std::result::Result<usize, usize> {
        self.roads.binary_search(&edge)
    }

    /// Neighbours reachable in one hop from `id`, in ascending order.
    pub fn adjacency(&self, id: Id) -> impl Iterator<Item = Id> + '_ {
        let start = self.roads.partition_point(|e| e.src < id);
        self.roads[start..]
            .iter()
            .take_while(move |e| e.src == id)
            .map(|e| e.dst)
    }

    /// Up to `max` cells with an ID strictly greater than `marker`.
    #[must_use]
    pub fn cells_slice(&self, marker: Id, max: usize) -> &[Vertex] {
        let start = self.cells.partition_point(|c| c.id <= marker);
        let end = start.saturating_add(max).min(self.cells.len());
        &self.cells[start..end]
    }

    /// Up to `max` roads strictly after `(marker_src, marker_dst)`.
    #[must_use]
    pub fn roads_slice(&self, marker_src: Id, marker_dst: Id, max: usize) -> &[Edge] {
        let marker = Edge::new(marker_src, marker_dst);
        let start = self.roads.partition_point(|e| *e <= marker);
        let end = start.saturating_add(max).min(self.roads.len());
        &self.roads[start..end]
    }

    /// Sort both collections and rebuild the ID counter.
    ///
    /// Must run after deserialization and before [`Map::check`].
    pub fn post_load(&mut self) {
        self.cells.sort_unstable_by_key(|c| c.id);
        self.roads.sort_unstable();
        self.next_id = self.cells.last().map_or(0, |c| c.id);
        self.stale = true;
    }

    /// Verify the structural invariants: sorted unique cells, sorted unique
    /// and valid roads.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Consistency`] describing the first violation.
    pub fn check(&self) -> Result<()> {
        if let Some(c) = self.cells.iter().find(|c| c.id == 0) {
            return Err(Error::consistency(format!(
                "map {}: cell with zero id at ({}, {})",
                self.id, c.x, c.y
            )));
        }
        if let Some(w) = self.cells.windows(2).find(|w| w[0].id >= w[1].id) {
            return Err(Error::consistency(format!(
                "map {}: cells not sorted at {} / {}",
                self.id, w[0].id, w[1].id
            )));
        }
        if let Some(e) = self
            .roads
            .iter()
            .find(|e| Self::validate_pair(e.src, e.dst).is_err())
        {
            return Err(Error::consistency(format!(
                "map {}: invalid road {}->{}",
                self.id, e.src, e.dst
            )));
        }
        if let Some(w) = self.roads.windows(2).find(|w| w[0] >= w[1]) {
            return Err(Error::consistency(format!(
                "map {}: roads not sorted at {}->{} / {}->{}",
                self.id, w[0].src, w[0].dst, w[1].src, w[1].dst
            )));
        }
        Ok(())
    }

    /// Graphviz rendering of the map.
    #[must_use]
    pub fn dot(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph g {{");
        for c in &self.cells {
            let shape = if c.city { "box" } else { "point" };
            let _ = writeln!(
                out,
                "n{} [label=\"{}\" shape={shape} pos=\"{},{}\"];",
                c.id, c.id, c.x, c.y
            );
        }
        for e in &self.roads {
            let _ = writeln!(out, "n{} -> n{};", e.src, e.dst);
        }
        out.push_str("}\n");
        out
    }
}
