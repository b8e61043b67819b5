//! Difficulty adaptation from cumulative accuracy.

use serde::{Deserialize, Serialize};

use crate::model::DifficultyTier;

/// Accuracy thresholds driving tier changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Escalate when cumulative accuracy is strictly above this.
    pub upper: f64,
    /// De-escalate when cumulative accuracy is strictly below this.
    pub lower: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            upper: 0.80,
            lower: 0.60,
        }
    }
}

impl Thresholds {
    /// Check that `0 <= lower <= upper <= 1`.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.lower) || !(0.0..=1.0).contains(&self.upper) {
            return Err(format!(
                "thresholds must be within 0.0..=1.0 (lower {}, upper {})",
                self.lower, self.upper
            ));
        }
        if self.lower > self.upper {
            return Err(format!(
                "lower threshold {} is above upper threshold {}",
                self.lower, self.upper
            ));
        }
        Ok(())
    }
}

/// Compute the tier of the next item.
///
/// Pure: depends only on the current tier and cumulative accuracy.
pub fn next_tier(current: DifficultyTier, accuracy: f64, thresholds: Thresholds) -> DifficultyTier {
    if accuracy > thresholds.upper {
        current.harder().unwrap_or(current)
    } else if accuracy < thresholds.lower {
        current.easier().unwrap_or(current)
    } else {
        current
    }
}

/// Holds the current tier and moves it one step at a time.
///
/// The tier is only changed by [`DifficultyAdapter::adapt`], which the
/// session calls after a verdict is recorded and before the next item is
/// requested.
#[derive(Debug, Clone)]
pub struct DifficultyAdapter {
    tier: DifficultyTier,
    thresholds: Thresholds,
}

impl DifficultyAdapter {
    pub fn new(initial: DifficultyTier, thresholds: Thresholds) -> Self {
        Self {
            tier: initial,
            thresholds,
        }
    }

    pub fn tier(&self) -> DifficultyTier {
        self.tier
    }

    /// Apply cumulative accuracy and return the tier for the next item.
    pub fn adapt(&mut self, cumulative_accuracy: f64) -> DifficultyTier {
        let next = next_tier(self.tier, cumulative_accuracy, self.thresholds);
        if next != self.tier {
            tracing::debug!(from = %self.tier, to = %next, accuracy = cumulative_accuracy, "difficulty changed");
        }
        self.tier = next;
        next
    }
}
