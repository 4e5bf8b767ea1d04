// Allow unwrap and unreadable literals in tests (test code is not production)
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::unreadable_literal))]
//! Hegemon: the simulation core of a persistent-world strategy game.
//!
//! A region is a directed graph of cells joined by roads. Cities sit on cells,
//! accumulate resources and train units; armies carry units across the map
//! following a precomputed next-hop routing table, and fight over cities.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │   World (RwLock, ID counter)        │
//! ├─────────────────────────────────────┤
//! │   Region tick: produce, move, fight │
//! ├──────────────────┬──────────────────┤
//! │ City economy     │ Army commands    │
//! ├──────────────────┴──────────────────┤
//! │   Map: graph store + next-hop table │
//! └─────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod map;
pub mod persist;
pub mod region;
pub mod scenario;

pub use config::{FundingQueue, TaxTransfer, WorldConfig};
pub use error::{Error, Result};

// Re-export key types at crate root for convenience
pub use map::{Edge, Map, MapRegistry, Vertex};
pub use region::{
    Action, Army, City, Command, Definitions, Event, Fight, IdAllocator, Notifier, Region,
    Resources, SharedWorld, World,
};

/// Identifier shared by every entity of the world.
///
/// Zero is never a valid identifier: it is reserved to mean "none" in
/// persisted records and is rejected by every operation taking an ID.
pub type Id = u64;
