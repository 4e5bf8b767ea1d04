//! Region simulation: cities, armies, fights and the world that owns them.
//!
//! Every entity is kept in a vector sorted by ID so lookups are binary
//! searches and iteration is deterministic. Deleted cities, armies and
//! buildings stay in place with a [`Lifecycle::Deleted`] tag.

mod army;
mod assets;
mod city;
mod definitions;
mod events;
mod fight;
mod ids;
mod resources;
mod tick;
mod world;

pub use army::{Action, Army, Command, Posture, Stance, Step};
pub use assets::{Building, Knowledge, Lifecycle, Unit};
pub use city::{City, CityProduction, CityStock};
pub use definitions::{BuildingType, Definitions, KnowledgeType, UnitType};
pub use events::{Event, LogNotifier, MemoryNotifier, NoopNotifier, Notifier};
pub use fight::{Engagement, Fight, Outcome, Side};
pub use ids::{IdAllocator, Identified};
pub use resources::{
    RESOURCE_SLOTS, ResourceModifiers, Resources, ResourcesIncrement, ResourcesMultiplier,
};
pub use tick::TickReport;
pub use world::{Region, RegionMut, Rules, SharedWorld, World};
