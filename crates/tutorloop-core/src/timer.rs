//! Pausable session countdown and per-item stopwatch.
//!
//! Both take explicit `tokio::time::Instant`s so they are deterministic under
//! a paused test clock. Time only counts while running.

use std::time::Duration;

use tokio::time::Instant;

/// Countdown over an optional time budget. `None` means unbounded.
#[derive(Debug, Clone)]
pub struct SessionTimer {
    remaining: Option<Duration>,
    running_since: Option<Instant>,
}

impl SessionTimer {
    pub fn new(budget: Option<Duration>) -> Self {
        Self {
            remaining: budget,
            running_since: None,
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.remaining.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    /// Start or resume counting down.
    pub fn resume(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    /// Stop counting down, keeping whatever budget is left.
    pub fn pause(&mut self, now: Instant) {
        self.settle(now);
        self.running_since = None;
    }

    /// Charge the time elapsed since the last settle against the budget.
    ///
    /// Returns `true` once the budget is exhausted.
    pub fn settle(&mut self, now: Instant) -> bool {
        if let (Some(remaining), Some(since)) = (self.remaining, self.running_since) {
            let elapsed = now.saturating_duration_since(since);
            self.remaining = Some(remaining.saturating_sub(elapsed));
            self.running_since = Some(now);
        }
        self.is_expired()
    }

    /// Remaining budget as of the last settle.
    pub fn remaining(&self) -> Option<Duration> {
        self.remaining
    }

    pub fn is_expired(&self) -> bool {
        self.remaining == Some(Duration::ZERO)
    }

    /// The instant the budget runs out if nothing pauses it.
    pub fn deadline(&self) -> Option<Instant> {
        match (self.remaining, self.running_since) {
            (Some(remaining), Some(since)) => Some(since + remaining),
            _ => None,
        }
    }
}

/// Accumulates running time, excluding pauses.
#[derive(Debug, Clone, Default)]
pub struct Stopwatch {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl Stopwatch {
    /// A stopwatch that is already running.
    pub fn started(now: Instant) -> Self {
        Self {
            accumulated: Duration::ZERO,
            running_since: Some(now),
        }
    }

    pub fn pause(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += now.saturating_duration_since(since);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.accumulated
            + self
                .running_since
                .map(|since| now.saturating_duration_since(since))
                .unwrap_or_default()
    }
}
