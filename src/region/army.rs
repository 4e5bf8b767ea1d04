//! Armies and their command queue.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::assets::{Lifecycle, Unit, spread_damage};
use super::ids::Identified;
use super::resources::Resources;
use crate::Id;
use crate::error::{Error, Result};
use crate::map::Map;

/// What an army does once it reaches a command's cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Nothing: the cell is a waypoint.
    Pause,
    /// Stay on the cell until the queue is cancelled.
    Wait,
    /// Start a fight, or join a running one as an attacker.
    Attack,
    /// Join a running fight as a defender, or watch the city.
    Defend,
    /// Attack, and become the city's overlord on victory.
    Overlord,
    /// Attack, and ruin a building on victory.
    Break,
    /// Attack, and add one pending massacre on victory.
    Massacre,
    /// Hand the cargo to the city on the cell.
    Deposit,
    /// Hand units and cargo to the city on the cell and dissolve.
    Disband,
}

impl Action {
    /// Actions that open or join a fight on the attack side.
    #[must_use]
    pub const fn is_assault(self) -> bool {
        matches!(
            self,
            Self::Attack | Self::Overlord | Self::Break | Self::Massacre
        )
    }
}

/// A target cell and what to do there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Target cell.
    pub cell: Id,
    /// Action on arrival.
    pub action: Action,
}

/// Side taken against a city.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    /// Fight alongside the city.
    Defend,
    /// Fight against the city.
    Attack,
}

/// Stance of an army toward one city.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posture {
    /// City concerned.
    pub city: Id,
    /// Stance taken.
    pub stance: Stance,
}

/// What [`Army::advance`] did this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Nothing queued, deleted, or held in a fight.
    Idle,
    /// Waiting on the target of a [`Action::Wait`] command.
    Holding,
    /// One hop done, target not reached yet.
    Moved {
        /// Cell left.
        from: Id,
        /// Cell reached.
        to: Id,
    },
    /// The front command's target is reached and the command is popped.
    /// `from == to` when the army was already there.
    Arrived {
        /// Cell left.
        from: Id,
        /// Target cell.
        to: Id,
        /// The completed command.
        command: Command,
    },
    /// No route to the target; the command was dropped.
    Blocked {
        /// Current cell.
        from: Id,
        /// Unreachable target.
        target: Id,
    },
}

/// Units and cargo moving across the map on behalf of a city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Army {
    /// Unique ID.
    pub id: Id,
    /// Display name.
    pub name: String,
    /// Owning city.
    pub city: Id,
    /// Current cell.
    pub cell: Id,
    /// Fight the army is engaged in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fight: Option<Id>,
    /// Deleted once disbanded or destroyed.
    #[serde(default, skip_serializing_if = "Lifecycle::is_active")]
    pub lifecycle: Lifecycle,
    /// Carried resources.
    #[serde(default)]
    pub stock: Resources,
    #[serde(default)]
    pub(crate) units: Vec<Unit>,
    #[serde(default, skip_serializing_if = "VecDeque::is_empty")]
    pub(crate) targets: VecDeque<Command>,
    /// Stances toward cities.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub postures: Vec<Posture>,
}

impl Identified for Army {
    fn id(&self) -> Id {
        self.id
    }
}

impl Army {
    /// An empty army standing on its city's cell and defending it.
    #[must_use]
    pub fn new(id: Id, city: Id, cell: Id) -> Self {
        Self {
            id,
            name: format!("A-{id}"),
            city,
            cell,
            fight: None,
            lifecycle: Lifecycle::Active,
            stock: Resources::ZERO,
            units: Vec::new(),
            targets: VecDeque::new(),
            postures: vec![Posture {
                city,
                stance: Stance::Defend,
            }],
        }
    }

    /// Not disbanded nor destroyed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    /// Units, sorted by ID.
    #[must_use]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Pending commands, front first.
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.targets.iter()
    }

    /// Sum of the health of living units.
    #[must_use]
    pub fn power(&self) -> u64 {
        self.units.iter().map(|u| u64::from(u.health)).sum()
    }

    fn defer(&mut self, cell: Id, action: Action) -> Result<()> {
        if cell == 0 {
            return Err(Error::InvalidArgument("zero target cell".to_string()));
        }
        if !self.is_active() {
            return Err(Error::Conflict(format!("army {} is deleted", self.id)));
        }
        self.targets.push_back(Command { cell, action });
        Ok(())
    }

    /// Queue a waypoint.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for cell 0, [`Error::Conflict`] on a deleted army.
    pub fn defer_move(&mut self, cell: Id) -> Result<()> {
        self.defer(cell, Action::Pause)
    }

    /// Queue a move then hold the cell.
    ///
    /// # Errors
    ///
    /// See [`Army::defer_move`].
    pub fn defer_wait(&mut self, cell: Id) -> Result<()> {
        self.defer(cell, Action::Wait)
    }

    /// Queue an assault with one of the attack actions.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `action` is not an assault, plus the
    /// errors of [`Army::defer_move`].
    pub fn defer_attack(&mut self, cell: Id, action: Action) -> Result<()> {
        if !action.is_assault() {
            return Err(Error::InvalidArgument(format!(
                "{action:?} is not an assault"
            )));
        }
        self.defer(cell, action)
    }

    /// Queue a defence of the cell.
    ///
    /// # Errors
    ///
    /// See [`Army::defer_move`].
    pub fn defer_defend(&mut self, cell: Id) -> Result<()> {
        self.defer(cell, Action::Defend)
    }

    /// Queue a cargo drop.
    ///
    /// # Errors
    ///
    /// See [`Army::defer_move`].
    pub fn defer_deposit(&mut self, cell: Id) -> Result<()> {
        self.defer(cell, Action::Deposit)
    }

    /// Queue the dissolution of the army.
    ///
    /// # Errors
    ///
    /// See [`Army::defer_move`].
    pub fn defer_disband(&mut self, cell: Id) -> Result<()> {
        self.defer(cell, Action::Disband)
    }

    /// Queue any command, validated like the dedicated `defer_*` methods.
    ///
    /// # Errors
    ///
    /// See [`Army::defer_move`].
    pub fn defer_command(&mut self, command: Command) -> Result<()> {
        self.defer(command.cell, command.action)
    }

    /// Drop every pending command.
    pub fn cancel(&mut self) {
        self.targets.clear();
    }

    /// Move one hop toward the front command's target.
    ///
    /// A missing route drops the command instead of retrying it.
    pub fn advance(&mut self, map: &Map) -> Step {
        if !self.is_active() || self.fight.is_some() {
            return Step::Idle;
        }
        let Some(&command) = self.targets.front() else {
            return Step::Idle;
        };
        let from = self.cell;
        if from == command.cell {
            return self.reach(from, command);
        }
        match map.next_step(from, command.cell) {
            Ok(hop) => {
                self.cell = hop;
                if hop == command.cell {
                    self.reach(from, command)
                } else {
                    Step::Moved { from, to: hop }
                }
            }
            Err(_) => {
                self.targets.pop_front();
                Step::Blocked {
                    from,
                    target: command.cell,
                }
            }
        }
    }

    fn reach(&mut self, from: Id, command: Command) -> Step {
        if command.action == Action::Wait {
            return if from == command.cell {
                Step::Holding
            } else {
                Step::Moved {
                    from,
                    to: command.cell,
                }
            };
        }
        self.targets.pop_front();
        Step::Arrived {
            from,
            to: command.cell,
            command,
        }
    }

    /// Spread `damage` over living units in ID order.
    pub(crate) fn absorb(&mut self, damage: u64) -> u64 {
        let left = spread_damage(self.units.iter_mut(), damage);
        self.units.retain(|u| u.health > 0);
        left
    }

    /// Empty the army and mark it deleted.
    pub(crate) fn dissolve(&mut self) -> (Vec<Unit>, Resources) {
        self.lifecycle = Lifecycle::Deleted;
        self.targets.clear();
        self.fight = None;
        let stock = std::mem::take(&mut self.stock);
        (std::mem::take(&mut self.units), stock)
    }

    /// Set the stance toward `city`.
    pub fn set_posture(&mut self, city: Id, stance: Stance) {
        match self.postures.iter_mut().find(|p| p.city == city) {
            Some(p) => p.stance = stance,
            None => self.postures.push(Posture { city, stance }),
        }
    }
}
