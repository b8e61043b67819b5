//! Core data model types for tutorloop.
//!
//! Items, answer attempts, verdicts and the session vocabulary shared by the
//! pipeline, the aggregators and the session controller.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single question or solution step issued to the student.
///
/// Items are immutable once issued; the session log keeps its own clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier for this item.
    pub id: String,
    /// The prompt shown to the student.
    pub prompt: String,
    /// How the answer is given.
    pub item_type: ItemType,
    /// Difficulty tier this item belongs to.
    pub tier: DifficultyTier,
    /// Topic used for per-topic statistics and item selection.
    pub topic: String,
    /// What a correct answer looks like.
    pub expected: Expected,
    /// Options for multiple-choice items, in display order.
    #[serde(default)]
    pub options: Vec<String>,
    /// Mark weight, at least 1.
    #[serde(default = "default_marks")]
    pub marks: u32,
}

fn default_marks() -> u32 {
    1
}

/// Expected answer of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expected {
    /// A single final answer.
    Answer(String),
    /// Worked steps; the last entry is the final answer, earlier entries are
    /// intermediate values a complete solution should contain.
    Steps(Vec<String>),
}

impl Expected {
    /// The final answer.
    pub fn final_answer(&self) -> &str {
        match self {
            Expected::Answer(answer) => answer,
            Expected::Steps(steps) => steps.last().map(String::as_str).unwrap_or_default(),
        }
    }

    /// Intermediate values, excluding the final answer.
    pub fn intermediates(&self) -> &[String] {
        match self {
            Expected::Answer(_) => &[],
            Expected::Steps(steps) => &steps[..steps.len().saturating_sub(1)],
        }
    }
}

/// How an item is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemType {
    MultipleChoice,
    FreeForm,
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::MultipleChoice => write!(f, "multiple-choice"),
            ItemType::FreeForm => write!(f, "free-form"),
        }
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "multiple-choice" | "multiple_choice" | "mcq" | "choice" => Ok(ItemType::MultipleChoice),
            "free-form" | "free_form" | "freeform" | "open" => Ok(ItemType::FreeForm),
            other => Err(format!("unknown item type: {other}")),
        }
    }
}

/// Ordered difficulty tiers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyTier {
    Easy,
    Medium,
    Advanced,
}

impl DifficultyTier {
    /// All tiers from lowest to highest.
    pub const ALL: [DifficultyTier; 3] = [
        DifficultyTier::Easy,
        DifficultyTier::Medium,
        DifficultyTier::Advanced,
    ];

    /// One tier up, or `None` at the top.
    pub fn harder(self) -> Option<Self> {
        match self {
            DifficultyTier::Easy => Some(DifficultyTier::Medium),
            DifficultyTier::Medium => Some(DifficultyTier::Advanced),
            DifficultyTier::Advanced => None,
        }
    }

    /// One tier down, or `None` at the bottom.
    pub fn easier(self) -> Option<Self> {
        match self {
            DifficultyTier::Easy => None,
            DifficultyTier::Medium => Some(DifficultyTier::Easy),
            DifficultyTier::Advanced => Some(DifficultyTier::Medium),
        }
    }

    /// Distance in tiers, used for nearest-tier item selection.
    pub fn distance(self, other: Self) -> u8 {
        (self as u8).abs_diff(other as u8)
    }
}

impl fmt::Display for DifficultyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DifficultyTier::Easy => write!(f, "easy"),
            DifficultyTier::Medium => write!(f, "medium"),
            DifficultyTier::Advanced => write!(f, "advanced"),
        }
    }
}

impl FromStr for DifficultyTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "easy" => Ok(DifficultyTier::Easy),
            "medium" => Ok(DifficultyTier::Medium),
            "advanced" | "hard" => Ok(DifficultyTier::Advanced),
            other => Err(format!("unknown difficulty tier: {other}")),
        }
    }
}

/// A single submitted answer. Created once per submit, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerAttempt {
    /// Unique identifier; also scopes the evaluation's cancellation token.
    pub id: Uuid,
    /// The item this attempt answers.
    pub item_id: String,
    /// Raw submitted content.
    pub content: String,
    /// Wall-clock submission time.
    pub submitted_at: DateTime<Utc>,
    /// Active time since the item was issued, in milliseconds.
    pub elapsed_ms: u64,
}

impl AnswerAttempt {
    pub fn new(item_id: impl Into<String>, content: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_id: item_id.into(),
            content: content.into(),
            submitted_at: Utc::now(),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Classification of what went wrong with an answer.
///
/// A closed set; anything else coming back from an oracle is a malformed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    None,
    Syntax,
    Calculation,
    Conceptual,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::None => write!(f, "none"),
            ErrorKind::Syntax => write!(f, "syntax"),
            ErrorKind::Calculation => write!(f, "calculation"),
            ErrorKind::Conceptual => write!(f, "conceptual"),
            ErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(ErrorKind::None),
            "syntax" => Ok(ErrorKind::Syntax),
            "calculation" => Ok(ErrorKind::Calculation),
            "conceptual" => Ok(ErrorKind::Conceptual),
            "unknown" => Ok(ErrorKind::Unknown),
            other => Err(format!("unknown error kind: {other}")),
        }
    }
}

/// Where a verdict's judgment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// A well-formed structured judgment from the oracle.
    Oracle,
    /// Local rules or lexical inference; lower trust.
    Heuristic,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Oracle => write!(f, "oracle"),
            Confidence::Heuristic => write!(f, "heuristic"),
        }
    }
}

/// The judgment of one answer attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub correct: bool,
    pub error_kind: ErrorKind,
    pub feedback: String,
    pub confidence: Confidence,
}

impl Verdict {
    /// Whether this verdict counts toward a remediation streak.
    pub fn is_trusted_conceptual(&self) -> bool {
        self.confidence == Confidence::Oracle && self.error_kind == ErrorKind::Conceptual
    }
}

/// One entry of the append-only session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub item: Item,
    pub attempt: AnswerAttempt,
    pub verdict: Verdict,
}

/// Session mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Practice,
    Exam,
    Freeform,
}

impl SessionMode {
    /// Item type requested from the content provider when the caller does not pick one.
    pub fn default_item_type(self) -> ItemType {
        match self {
            SessionMode::Exam => ItemType::MultipleChoice,
            SessionMode::Practice | SessionMode::Freeform => ItemType::FreeForm,
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Practice => write!(f, "practice"),
            SessionMode::Exam => write!(f, "exam"),
            SessionMode::Freeform => write!(f, "freeform"),
        }
    }
}

impl FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "practice" => Ok(SessionMode::Practice),
            "exam" => Ok(SessionMode::Exam),
            "freeform" | "free-form" => Ok(SessionMode::Freeform),
            other => Err(format!("unknown session mode: {other}")),
        }
    }
}

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Setup,
    Active,
    Paused,
    Completed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Setup => write!(f, "setup"),
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Paused => write!(f, "paused"),
            SessionStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Why a session reached `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The configured number of items was answered.
    ItemCountReached,
    /// The time budget ran out while active.
    TimeExpired,
    /// The caller ended the session.
    EndedByCaller,
    /// The content provider could not produce the next item.
    ContentUnavailable,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::ItemCountReached => write!(f, "item count reached"),
            EndReason::TimeExpired => write!(f, "time expired"),
            EndReason::EndedByCaller => write!(f, "ended by caller"),
            EndReason::ContentUnavailable => write!(f, "content unavailable"),
        }
    }
}
