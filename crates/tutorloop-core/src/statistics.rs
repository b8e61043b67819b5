//! Running score statistics for a session.
//!
//! Accuracy is marks-weighted everywhere: marks obtained / marks possible,
//! defined as 0 when nothing has been attempted. Average time is a true
//! running mean over every recorded attempt.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{LogEntry, Verdict};

/// Marks-weighted ratio that is 0 (not NaN) for an empty denominator.
pub fn ratio(obtained: u64, possible: u64) -> f64 {
    if possible == 0 {
        0.0
    } else {
        obtained as f64 / possible as f64
    }
}

/// Per-topic tallies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicStats {
    /// Correct attempts.
    pub correct: u32,
    /// Total attempts.
    pub total: u32,
    /// Marks obtained on this topic.
    pub marks_obtained: u64,
    /// Marks possible on this topic.
    pub marks_possible: u64,
    /// Marks-weighted accuracy for this topic.
    pub accuracy: f64,
}

/// Snapshot of a session's score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub marks_possible: u64,
    pub marks_obtained: u64,
    /// `marks_obtained / marks_possible`, 0 when nothing was attempted.
    pub accuracy: f64,
    /// Mean elapsed time per answered item, in milliseconds.
    pub average_time_ms: f64,
    pub items_answered: u32,
    pub items_correct: u32,
    /// Keyed by topic, sorted for stable output.
    pub per_topic: BTreeMap<String, TopicStats>,
}

/// Accumulates verdicts into running statistics.
#[derive(Debug, Clone, Default)]
pub struct ScoreAggregator {
    marks_possible: u64,
    marks_obtained: u64,
    items_answered: u32,
    items_correct: u32,
    mean_time_ms: f64,
    per_topic: BTreeMap<String, TopicStats>,
}

impl ScoreAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an aggregator from a session log.
    pub fn from_log(entries: &[LogEntry]) -> Self {
        let mut aggregator = Self::new();
        for entry in entries {
            aggregator.record(&entry.item.topic, entry.item.marks, entry.attempt.elapsed_ms, &entry.verdict);
        }
        aggregator
    }

    /// Record one verdict.
    pub fn record(&mut self, topic: &str, marks: u32, elapsed_ms: u64, verdict: &Verdict) {
        let marks = u64::from(marks);
        let obtained = if verdict.correct { marks } else { 0 };

        self.marks_possible += marks;
        self.marks_obtained += obtained;
        self.items_answered += 1;
        if verdict.correct {
            self.items_correct += 1;
        }
        self.mean_time_ms += (elapsed_ms as f64 - self.mean_time_ms) / f64::from(self.items_answered);

        let stats = self.per_topic.entry(topic.to_string()).or_default();
        stats.total += 1;
        if verdict.correct {
            stats.correct += 1;
        }
        stats.marks_possible += marks;
        stats.marks_obtained += obtained;
        stats.accuracy = ratio(stats.marks_obtained, stats.marks_possible);
    }

    /// Cumulative marks-weighted accuracy so far.
    pub fn accuracy(&self) -> f64 {
        ratio(self.marks_obtained, self.marks_possible)
    }

    pub fn items_answered(&self) -> u32 {
        self.items_answered
    }

    /// Produce a summary; valid at any point in the session.
    pub fn summary(&self) -> ScoreSummary {
        ScoreSummary {
            marks_possible: self.marks_possible,
            marks_obtained: self.marks_obtained,
            accuracy: self.accuracy(),
            average_time_ms: self.mean_time_ms,
            items_answered: self.items_answered,
            items_correct: self.items_correct,
            per_topic: self.per_topic.clone(),
        }
    }
}
