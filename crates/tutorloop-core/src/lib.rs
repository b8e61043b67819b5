//! tutorloop-core: Adaptive validation pipeline and session engine.
//!
//! This crate defines the data model, the judgment and content traits, the
//! validation pipeline with its heuristic fallback, and the session
//! controller that ties scoring, difficulty adaptation, remediation and
//! timing together.

pub mod bank;
pub mod controller;
pub mod difficulty;
pub mod error;
pub mod heuristic;
pub mod judgment;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod remediation;
pub mod report;
pub mod session;
pub mod statistics;
pub mod timer;
pub mod traits;

pub use controller::{
    DiscardReason, NextStep, PendingSubmit, SessionEvent, SessionHandle, SubmitOutcome,
    SubmitReply,
};
pub use error::{ContentUnavailable, JudgeError, SessionError};
pub use pipeline::{PipelineConfig, ValidationPipeline};
pub use session::{SessionConfig, SessionSnapshot, StartRequest};
