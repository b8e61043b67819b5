//! Session report types with JSON persistence.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{
    Confidence, DifficultyTier, EndReason, ErrorKind, LogEntry, SessionMode, SessionStatus,
};
use crate::remediation::RemediationEvent;
use crate::statistics::ScoreSummary;

/// Everything a finished (or in-progress) session produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub id: Uuid,
    pub mode: SessionMode,
    pub topic: String,
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<EndReason>,
    pub initial_tier: DifficultyTier,
    pub final_tier: DifficultyTier,
    /// The append-only session log, in submission order.
    pub entries: Vec<LogEntry>,
    pub summary: ScoreSummary,
    #[serde(default)]
    pub remediation_events: Vec<RemediationEvent>,
}

impl SessionReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: SessionReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Default file name for this report inside an output directory.
    pub fn file_name(&self) -> String {
        format!("session-{}.json", self.id)
    }

    /// Count of incorrect verdicts per error kind.
    pub fn errors_by_kind(&self) -> BTreeMap<ErrorKind, u32> {
        let mut counts = BTreeMap::new();
        for entry in self.entries.iter().filter(|e| !e.verdict.correct) {
            *counts.entry(entry.verdict.error_kind).or_insert(0) += 1;
        }
        counts
    }

    /// How many verdicts came from the local heuristics rather than the oracle.
    pub fn heuristic_verdicts(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.verdict.confidence == Confidence::Heuristic)
            .count()
    }

    /// Tier of each answered item, in order.
    pub fn tier_path(&self) -> Vec<DifficultyTier> {
        self.entries.iter().map(|e| e.item.tier).collect()
    }
}
