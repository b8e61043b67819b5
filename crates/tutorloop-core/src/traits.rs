//! Core trait definitions for the judgment oracle and the content provider.
//!
//! `JudgmentClient` is implemented by the `tutorloop-judges` crate;
//! `ContentProvider` by the item bank in this crate or by the embedding
//! application.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ContentUnavailable;
use crate::model::{AnswerAttempt, DifficultyTier, Expected, Item, ItemType, LogEntry};

// ---------------------------------------------------------------------------
// Judgment client trait
// ---------------------------------------------------------------------------

/// Trait for oracle backends that judge an answer attempt.
///
/// Implementations return the raw text response. Failures should be
/// `crate::error::JudgeError` wrapped in `anyhow::Error` so the pipeline can
/// classify them.
#[async_trait]
pub trait JudgmentClient: Send + Sync {
    /// Human-readable client name (e.g. "anthropic").
    fn name(&self) -> &str;

    /// Ask the oracle to judge one attempt.
    async fn judge(&self, request: &JudgeRequest) -> anyhow::Result<JudgeResponse>;

    /// List models this client can use.
    fn available_models(&self) -> Vec<ModelInfo>;
}

/// Request to judge an attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeRequest {
    /// Model identifier (e.g. "claude-sonnet-4-20250514").
    pub model: String,
    /// The item being answered.
    pub item: Item,
    /// The attempt to judge.
    pub attempt: AnswerAttempt,
    /// Earlier log entries, oldest first, already trimmed to the history window.
    #[serde(default)]
    pub history: Vec<LogEntry>,
    /// Optional system prompt override.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

/// Raw response from the oracle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JudgeResponse {
    /// The raw response text.
    pub content: String,
    /// Model that actually produced the response.
    pub model: String,
    /// Token usage.
    pub token_usage: TokenUsage,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

/// Token accounting for one oracle call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Information about an available model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub id: String,
    /// Human-readable model name.
    pub name: String,
    /// Provider name.
    pub provider: String,
    /// Maximum context window size in tokens.
    pub max_context: u32,
}

// ---------------------------------------------------------------------------
// Content provider trait
// ---------------------------------------------------------------------------

/// Source of items for a session.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Produce the next item for a topic at a tier.
    async fn get_item(
        &self,
        topic: &str,
        tier: DifficultyTier,
        item_type: ItemType,
    ) -> Result<Item, ContentUnavailable>;
}

// ---------------------------------------------------------------------------
// Judge prompt
// ---------------------------------------------------------------------------

/// Default system prompt for judgment clients.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a strict but encouraging tutor grading a student's answer. Reply ONLY with a JSON object of the form {\"correct\": true|false, \"error_kind\": \"none\"|\"syntax\"|\"calculation\"|\"conceptual\"|\"unknown\", \"feedback\": \"<one or two sentences for the student>\"}. Use \"conceptual\" only when the student misunderstands the underlying idea, \"calculation\" for arithmetic or algebra slips, and \"syntax\" for malformed or incomplete notation.";

/// Render the user prompt sent to the oracle.
pub fn render_judge_prompt(request: &JudgeRequest) -> String {
    let item = &request.item;
    let mut prompt = String::new();

    if !request.history.is_empty() {
        prompt.push_str("Earlier steps in this session:\n");
        for (i, entry) in request.history.iter().enumerate() {
            prompt.push_str(&format!(
                "{}. Q: {}\n   A: {}\n   Judged: {} ({})\n",
                i + 1,
                entry.item.prompt.trim(),
                entry.attempt.content.trim(),
                if entry.verdict.correct { "correct" } else { "incorrect" },
                entry.verdict.error_kind,
            ));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "Topic: {}\nDifficulty: {}\nQuestion ({}):\n{}\n",
        item.topic,
        item.tier,
        item.item_type,
        item.prompt.trim()
    ));

    if !item.options.is_empty() {
        prompt.push_str("Options:\n");
        for (label, option) in option_labels().zip(&item.options) {
            prompt.push_str(&format!("  {label}) {option}\n"));
        }
    }

    match &item.expected {
        Expected::Answer(answer) => {
            prompt.push_str(&format!("Reference answer: {answer}\n"));
        }
        Expected::Steps(steps) => {
            prompt.push_str("Reference solution steps:\n");
            for step in steps {
                prompt.push_str(&format!("  - {step}\n"));
            }
        }
    }

    prompt.push_str(&format!(
        "\nStudent answer:\n{}\n",
        request.attempt.content.trim()
    ));
    prompt
}

/// Option labels `A`, `B`, `C`, ... in display order.
pub fn option_labels() -> impl Iterator<Item = char> {
    'A'..='Z'
}
