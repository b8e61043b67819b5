//! Error types for the judgment client and the session controller.
//!
//! `JudgeError` lives in `tutorloop-core` so the validation pipeline can
//! downcast and classify oracle failures without string matching.

use thiserror::Error;

use crate::model::{DifficultyTier, ItemType, SessionStatus};

/// Errors that can occur when calling the external judgment capability.
#[derive(Debug, Error)]
pub enum JudgeError {
    /// The oracle did not answer in time.
    #[error("judgment timed out after {0}ms")]
    Timeout(u64),

    /// The oracle could not be reached at all.
    #[error("judgment service unreachable: {0}")]
    Unreachable(String),

    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },
}

impl JudgeError {
    /// Short label used in logs when the pipeline falls back.
    pub fn kind(&self) -> &'static str {
        match self {
            JudgeError::Timeout(_) => "timeout",
            JudgeError::Unreachable(_) => "unreachable",
            JudgeError::RateLimited { .. } => "rate_limited",
            JudgeError::AuthenticationFailed(_) => "authentication",
            JudgeError::ModelNotFound(_) => "model_not_found",
            JudgeError::ApiError { .. } => "api_error",
        }
    }
}

/// The content provider could not produce an item.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no {item_type} item available for topic '{topic}' at {tier}: {reason}")]
pub struct ContentUnavailable {
    pub topic: String,
    pub tier: DifficultyTier,
    pub item_type: ItemType,
    pub reason: String,
}

/// A command sent to the session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Submit,
    Pause,
    Resume,
    End,
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Start => "start",
            Command::Submit => "submit",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::End => "end",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the session controller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The command is not valid in the current status. Nothing was changed.
    #[error("cannot {command} while session is {status}")]
    InvalidStateTransition {
        command: Command,
        status: SessionStatus,
    },

    /// A previous attempt is still being evaluated.
    #[error("an evaluation is already in flight for attempt {0}")]
    EvaluationInFlight(uuid::Uuid),

    /// The start request is unusable (e.g. an item count of zero).
    #[error("invalid session request: {0}")]
    InvalidRequest(String),

    /// No item could be produced.
    #[error(transparent)]
    ContentUnavailable(#[from] ContentUnavailable),

    /// The controller task has shut down.
    #[error("session controller is no longer running")]
    ControllerClosed,
}
