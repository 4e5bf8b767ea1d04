//! World configuration.
//!
//! Persisted next to the definitions as `config.json`. Every field has a
//! default except [`WorldConfig::tax_transfer`], which must be chosen
//! explicitly.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Production ratio kept per pending massacre (0.5 halves production).
pub const DEFAULT_MASSACRE_IMPACT: f64 = 0.5;

/// Share of a liege's production taxed by a new overlord.
pub const DEFAULT_RATE_OVERLORD: f64 = 0.2;

/// Defender's combat advantage multiplier.
/// At 0.25, defenders effectively have 125% strength.
pub const DEFAULT_DEFENDER_BONUS: f64 = 0.25;

/// How the tax of a liege reaches its overlord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxTransfer {
    /// The overlord's stock is credited during the liege's production.
    Instant,
    /// The liege spawns a transport army that walks the tax to the overlord.
    Transport,
}

/// One of the three construction queues funded during production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingQueue {
    /// Units in training.
    Units,
    /// Buildings under construction.
    Buildings,
    /// Knowledge being studied.
    Knowledge,
}

/// Funding priority when the stock cannot cover every queue.
pub const DEFAULT_FUNDING_ORDER: [FundingQueue; 3] = [
    FundingQueue::Units,
    FundingQueue::Buildings,
    FundingQueue::Knowledge,
];

/// Rules shared by every region of a world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Ratio applied to a city's production once per pending massacre.
    #[serde(default = "default_massacre_impact")]
    pub massacre_impact: f64,

    /// Instant credit or transport army. No default on purpose.
    pub tax_transfer: TaxTransfer,

    /// Uniform tax rate imposed on a conquered city.
    #[serde(default = "default_rate_overlord")]
    pub rate_overlord: f64,

    /// Permanent popularity gained when a city raises an army.
    #[serde(default)]
    pub pop_bonus_army_create: i64,

    /// Permanent popularity gained when a city disbands an army.
    #[serde(default)]
    pub pop_bonus_army_disband: i64,

    /// Transient popularity per live army.
    #[serde(default)]
    pub pop_bonus_army_alive: i64,

    /// Order in which the construction queues are funded.
    #[serde(default = "default_funding_order")]
    pub funding_order: [FundingQueue; 3],

    /// Defender's combat bonus (fraction of the defence power).
    #[serde(default = "default_defender_bonus")]
    pub defender_bonus: f64,
}

fn default_massacre_impact() -> f64 {
    DEFAULT_MASSACRE_IMPACT
}

fn default_rate_overlord() -> f64 {
    DEFAULT_RATE_OVERLORD
}

fn default_funding_order() -> [FundingQueue; 3] {
    DEFAULT_FUNDING_ORDER
}

fn default_defender_bonus() -> f64 {
    DEFAULT_DEFENDER_BONUS
}

impl WorldConfig {
    /// Create a configuration with the given tax strategy and default values elsewhere.
    #[must_use]
    pub fn new(tax_transfer: TaxTransfer) -> Self {
        Self {
            massacre_impact: DEFAULT_MASSACRE_IMPACT,
            tax_transfer,
            rate_overlord: DEFAULT_RATE_OVERLORD,
            pop_bonus_army_create: 0,
            pop_bonus_army_disband: 0,
            pop_bonus_army_alive: 0,
            funding_order: DEFAULT_FUNDING_ORDER,
            defender_bonus: DEFAULT_DEFENDER_BONUS,
        }
    }

    /// Parse a configuration from its JSON form and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] on malformed input and [`Error::InvalidArgument`]
    /// when a value is out of range.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and the funding order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] describing the first bad field.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.massacre_impact) {
            return Err(Error::InvalidArgument(format!(
                "massacre_impact {} outside [0, 1]",
                self.massacre_impact
            )));
        }
        if !(0.0..=1.0).contains(&self.rate_overlord) {
            return Err(Error::InvalidArgument(format!(
                "rate_overlord {} outside [0, 1]",
                self.rate_overlord
            )));
        }
        if !self.defender_bonus.is_finite() || self.defender_bonus < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "defender_bonus {} must be a non-negative number",
                self.defender_bonus
            )));
        }
        let [a, b, c] = self.funding_order;
        if a == b || b == c || a == c {
            return Err(Error::InvalidArgument(
                "funding_order must list each queue exactly once".to_string(),
            ));
        }
        Ok(())
    }
}
