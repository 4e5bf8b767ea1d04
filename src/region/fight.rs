//! Fights between armies on a cell.

use serde::{Deserialize, Serialize};

use super::army::Action;
use super::ids::{self, Identified};
use crate::Id;
use crate::error::{Error, Result};

/// Side of a fight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The side that opened the fight.
    Attack,
    /// The city's side.
    Defense,
}

/// An attacking army and what it will do if the attack wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    /// Army.
    pub army: Id,
    /// One of the assault actions.
    pub action: Action,
}

impl Identified for Engagement {
    fn id(&self) -> Id {
        self.army
    }
}

/// A running fight. Engaged armies do not move until it is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fight {
    /// Unique ID.
    pub id: Id,
    /// Cell where it happens.
    pub cell: Id,
    /// Attacking armies, sorted by army ID.
    #[serde(default)]
    pub attack: Vec<Engagement>,
    /// Defending armies, sorted.
    #[serde(default)]
    pub defense: Vec<Id>,
}

impl Identified for Fight {
    fn id(&self) -> Id {
        self.id
    }
}

/// Result of a resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    /// Whether the attack side won.
    pub attackers_won: bool,
    /// Raw attack power.
    pub attack: u64,
    /// Raw defence power, before the bonus.
    pub defense: u64,
}

impl Outcome {
    /// Compare powers. Defence gets `1 + defender_bonus` and wins ties.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn decide(attack: u64, defense: u64, defender_bonus: f64) -> Self {
        let effective = defense as f64 * (1.0 + defender_bonus);
        Self {
            attackers_won: attack as f64 > effective,
            attack,
            defense,
        }
    }

    /// Damage taken by the winning side: the loser's raw power.
    #[must_use]
    pub const fn damage_to_winner(&self) -> u64 {
        if self.attackers_won {
            self.defense
        } else {
            self.attack
        }
    }
}

impl Fight {
    /// An empty fight.
    #[must_use]
    pub const fn new(id: Id, cell: Id) -> Self {
        Self {
            id,
            cell,
            attack: Vec::new(),
            defense: Vec::new(),
        }
    }

    /// The side of `army`, if engaged here.
    #[must_use]
    pub fn side_of(&self, army: Id) -> Option<Side> {
        if ids::get(&self.attack, army).is_some() {
            Some(Side::Attack)
        } else if self.defense.binary_search(&army).is_ok() {
            Some(Side::Defense)
        } else {
            None
        }
    }

    /// Engage `army` as an attacker, leaving the defence if needed.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] when `action` is not an assault.
    pub fn join_attack(&mut self, army: Id, action: Action) -> Result<()> {
        if !action.is_assault() {
            return Err(Error::InvalidArgument(format!(
                "{action:?} is not an assault"
            )));
        }
        ids::remove_id(&mut self.defense, army);
        ids::remove(&mut self.attack, army);
        ids::insert(&mut self.attack, Engagement { army, action })
    }

    /// Engage `army` as a defender, leaving the attack if needed.
    pub fn join_defense(&mut self, army: Id) {
        ids::remove(&mut self.attack, army);
        ids::insert_id(&mut self.defense, army);
    }

    /// Disengage `army`. Returns whether it was engaged.
    pub fn leave(&mut self, army: Id) -> bool {
        let attacking = ids::remove(&mut self.attack, army).is_some();
        let defending = ids::remove_id(&mut self.defense, army);
        attacking || defending
    }

    /// Every engaged army.
    pub fn armies(&self) -> impl Iterator<Item = Id> + '_ {
        self.attack
            .iter()
            .map(|e| e.army)
            .chain(self.defense.iter().copied())
    }

    /// Whether no army is left on the attack side.
    #[must_use]
    pub fn is_over(&self) -> bool {
        self.attack.is_empty()
    }

    /// Sortedness and disjoint sides.
    ///
    /// # Errors
    ///
    /// [`Error::Consistency`] on the first violation.
    pub fn check(&self) -> Result<()> {
        ids::check_sorted(&self.attack, &format!("fight {} attack", self.id))?;
        ids::check_sorted_ids(&self.defense, &format!("fight {} defense", self.id))?;
        if let Some(e) = self.attack.iter().find(|e| !e.action.is_assault()) {
            return Err(Error::consistency(format!(
                "fight {}: army {} attacks with {:?}",
                self.id, e.army, e.action
            )));
        }
        if let Some(a) = self
            .defense
            .iter()
            .find(|&&a| ids::get(&self.attack, a).is_some())
        {
            return Err(Error::consistency(format!(
                "fight {}: army {a} on both sides",
                self.id
            )));
        }
        Ok(())
    }
}
