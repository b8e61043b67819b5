//! tutorloop-judges: Judgment oracle clients.
//!
//! Implements the `JudgmentClient` trait for Anthropic, OpenAI, and Ollama,
//! plus a scripted mock for tests and an offline client that forces the
//! heuristic fallback.

pub mod anthropic;
pub mod config;
pub mod error;
pub mod mock;
pub mod offline;
pub mod ollama;
pub mod openai;

pub use config::{create_judge, load_config, JudgeConfig, TutorloopConfig};
pub use error::{ConfigError, JudgeError};
