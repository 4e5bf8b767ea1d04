//! Map routing engine.
//!
//! A [`Map`] stores cells (vertices) and roads (directed edges) in sorted
//! vectors, and a derived next-hop table rebuilt by [`Map::rehash`].
//! [`Map::next_step`] answers in O(1) from that table.

mod graph;
mod path;
mod registry;
mod routing;

pub use graph::{Edge, Map, Vertex};
pub use registry::MapRegistry;
