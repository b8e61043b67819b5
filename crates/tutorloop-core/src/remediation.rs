//! Detection of trusted conceptual-error streaks.

use serde::{Deserialize, Serialize};

use crate::model::Verdict;

/// Raised once per qualifying streak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationEvent {
    /// Topic of the verdict that completed the streak.
    pub topic: String,
    /// Number of consecutive trusted conceptual verdicts that triggered it.
    pub streak: u32,
    /// Index of the triggering entry in the session log.
    pub log_index: usize,
}

/// Counts consecutive oracle-confidence conceptual verdicts.
///
/// When the count reaches the threshold an event is emitted and the count
/// resets to zero. The streak stays spent until a verdict breaks it, so an
/// unbroken run of conceptual errors triggers only once.
#[derive(Debug, Clone)]
pub struct RemediationMonitor {
    threshold: u32,
    streak: u32,
    spent: bool,
}

impl RemediationMonitor {
    /// A threshold of zero is treated as one.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            streak: 0,
            spent: false,
        }
    }

    /// Current streak counter.
    pub fn streak(&self) -> u32 {
        self.streak
    }

    /// Observe a verdict; returns the event if this verdict completes a streak.
    pub fn observe(&mut self, verdict: &Verdict, topic: &str, log_index: usize) -> Option<RemediationEvent> {
        if !verdict.is_trusted_conceptual() {
            self.streak = 0;
            self.spent = false;
            return None;
        }
        if self.spent {
            return None;
        }

        self.streak += 1;
        if self.streak < self.threshold {
            return None;
        }

        let event = RemediationEvent {
            topic: topic.to_string(),
            streak: self.streak,
            log_index,
        };
        self.streak = 0;
        self.spent = true;
        Some(event)
    }
}
