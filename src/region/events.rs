//! Notifications emitted by the simulation.
//!
//! Delivery is best effort: a failing [`Notifier`] is logged and the tick
//! goes on.

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::army::Action;
use super::resources::Resources;
use crate::Id;
use crate::error::{Error, Result};

/// Something that happened during a tick or an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// The army moved one hop.
    ArmyMoved {
        /// Army.
        army: Id,
        /// Cell left.
        src: Id,
        /// Cell reached.
        dst: Id,
    },
    /// No route to the command's target; the command was dropped.
    ArmyBlocked {
        /// Army.
        army: Id,
        /// Current cell.
        src: Id,
        /// Unreachable target.
        dst: Id,
    },
    /// The army reached a command's target.
    ArmyArrived {
        /// Army.
        army: Id,
        /// Target cell.
        cell: Id,
        /// What it does there.
        action: Action,
    },
    /// The army was disbanded into a city.
    ArmyDisbanded {
        /// Army.
        army: Id,
        /// City receiving its units and cargo.
        city: Id,
    },
    /// One training tick was paid; zero ticks left means trained.
    UnitProgress {
        /// City.
        city: Id,
        /// Unit.
        unit: Id,
        /// Ticks left.
        ticks_left: u32,
    },
    /// One construction tick was paid.
    BuildingProgress {
        /// City.
        city: Id,
        /// Building.
        building: Id,
        /// Ticks left.
        ticks_left: u32,
    },
    /// One study tick was paid.
    KnowledgeProgress {
        /// City.
        city: Id,
        /// Knowledge.
        knowledge: Id,
        /// Ticks left.
        ticks_left: u32,
    },
    /// A liege paid its tax.
    TaxPaid {
        /// Liege.
        city: Id,
        /// Overlord.
        overlord: Id,
        /// Amount taken from the liege.
        amount: Resources,
    },
    /// A fight opened on a cell.
    FightStarted {
        /// Fight.
        fight: Id,
        /// Cell.
        cell: Id,
    },
    /// A fight was resolved and closed.
    FightResolved {
        /// Fight.
        fight: Id,
        /// Cell.
        cell: Id,
        /// Whether the attack side won.
        attackers_won: bool,
    },
    /// A city became the liege of another.
    CityConquered {
        /// New liege.
        city: Id,
        /// New overlord.
        overlord: Id,
    },
    /// A city lost its overlord.
    CityLiberated {
        /// Freed city.
        city: Id,
        /// Former overlord.
        overlord: Id,
    },
}

/// Sink for [`Event`]s.
pub trait Notifier: Send + Sync + fmt::Debug {
    /// Deliver one event.
    ///
    /// # Errors
    ///
    /// Any delivery failure. Callers log it and carry on.
    fn notify(&self, event: &Event) -> Result<()>;
}

/// Deliver and swallow failures.
pub(crate) fn emit(notifier: &dyn Notifier, event: Event) {
    if let Err(e) = notifier.notify(&event) {
        warn!(error = %e, ?event, "notification dropped");
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: &Event) -> Result<()> {
        Ok(())
    }
}

/// Writes every event to the `hegemon::events` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &Event) -> Result<()> {
        info!(target: "hegemon::events", ?event);
        Ok(())
    }
}

/// Keeps events in memory, for tests and tools.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    events: Mutex<Vec<Event>>,
}

impl MemoryNotifier {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every event received so far.
    ///
    /// # Errors
    ///
    /// [`Error::Consistency`] if a writer panicked while holding the lock.
    pub fn drain(&self) -> Result<Vec<Event>> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| Error::consistency("event buffer poisoned"))?;
        Ok(std::mem::take(&mut *events))
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, event: &Event) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| Error::consistency("event buffer poisoned"))?
            .push(*event);
        Ok(())
    }
}

impl<N: Notifier + ?Sized> Notifier for std::sync::Arc<N> {
    fn notify(&self, event: &Event) -> Result<()> {
        (**self).notify(event)
    }
}
