//! Fixed-size resource vectors and their modifiers.

use serde::{Deserialize, Serialize};

/// Number of resource categories.
pub const RESOURCE_SLOTS: usize = 6;

/// Amounts of each resource category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resources(pub [u64; RESOURCE_SLOTS]);

/// Signed per-slot increment, e.g. a building's flat production bonus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourcesIncrement(pub [i64; RESOURCE_SLOTS]);

/// Per-slot ratio, e.g. a tax rate or a production multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourcesMultiplier(pub [f64; RESOURCE_SLOTS]);

/// A multiplicative then additive adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceModifiers {
    /// Applied first.
    #[serde(default = "ResourcesMultiplier::identity")]
    pub mult: ResourcesMultiplier,
    /// Applied after the multiplier.
    #[serde(default)]
    pub plus: ResourcesIncrement,
}

impl Resources {
    /// All slots empty.
    pub const ZERO: Self = Self([0; RESOURCE_SLOTS]);

    /// The same amount in every slot.
    #[must_use]
    pub const fn uniform(value: u64) -> Self {
        Self([value; RESOURCE_SLOTS])
    }

    /// Whether every slot is empty.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&v| v == 0)
    }

    /// Per-slot sum, saturating at `u64::MAX`.
    pub fn add(&mut self, other: &Self) {
        for (a, b) in self.0.iter_mut().zip(other.0) {
            *a = a.saturating_add(b);
        }
    }

    /// Per-slot difference, saturating at zero.
    ///
    /// Cost deductions check [`Resources::greater_or_equal_to`] first, so
    /// saturation only matters for trimmed amounts.
    pub fn remove(&mut self, other: &Self) {
        for (a, b) in self.0.iter_mut().zip(other.0) {
            *a = a.saturating_sub(b);
        }
    }

    /// True when every slot is at least the matching slot of `other`.
    #[must_use]
    pub fn greater_or_equal_to(&self, other: &Self) -> bool {
        self.0.iter().zip(other.0).all(|(&a, b)| a >= b)
    }

    /// Per-slot product, rounded down. Negative ratios give zero.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn multiply(&mut self, m: &ResourcesMultiplier) {
        for (a, r) in self.0.iter_mut().zip(m.0) {
            // `as` saturates: NaN and negatives become 0.
            *a = (*a as f64 * r).floor() as u64;
        }
    }

    /// Per-slot signed increment, clamped to `[0, u64::MAX]`.
    pub fn increment(&mut self, inc: &ResourcesIncrement) {
        for (a, d) in self.0.iter_mut().zip(inc.0) {
            *a = a.saturating_add_signed(d);
        }
    }

    /// Clamp every slot to at most the matching slot of `cap`.
    pub fn trim_to(&mut self, cap: &Self) {
        for (a, c) in self.0.iter_mut().zip(cap.0) {
            *a = (*a).min(c);
        }
    }

    /// Multiply then add the modifiers.
    pub fn apply(&mut self, m: &ResourceModifiers) {
        self.multiply(&m.mult);
        self.increment(&m.plus);
    }
}

impl ResourcesMultiplier {
    /// The same ratio in every slot.
    #[must_use]
    pub const fn uniform(ratio: f64) -> Self {
        Self([ratio; RESOURCE_SLOTS])
    }

    /// Ratio 1 everywhere.
    #[must_use]
    pub const fn identity() -> Self {
        Self::uniform(1.0)
    }

    /// Ratio 0 everywhere, the tax rate of a free city.
    #[must_use]
    pub const fn zero() -> Self {
        Self::uniform(0.0)
    }
}

impl ResourceModifiers {
    /// Leaves any vector unchanged.
    #[must_use]
    pub const fn noop() -> Self {
        Self {
            mult: ResourcesMultiplier::identity(),
            plus: ResourcesIncrement([0; RESOURCE_SLOTS]),
        }
    }

    /// Accumulate another source: ratios multiply, increments add.
    pub fn compose_with(&mut self, other: &Self) {
        for (a, b) in self.mult.0.iter_mut().zip(other.mult.0) {
            *a *= b;
        }
        for (a, b) in self.plus.0.iter_mut().zip(other.plus.0) {
            *a = a.saturating_add(b);
        }
    }
}

impl Default for ResourceModifiers {
    fn default() -> Self {
        Self::noop()
    }
}
