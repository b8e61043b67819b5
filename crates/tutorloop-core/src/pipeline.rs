//! The validation pipeline: oracle first, local heuristics as fallback.
//!
//! `evaluate` is total: every attempt yields exactly one verdict, within the
//! oracle timeout plus the (synchronous) heuristic pass. There is no retry
//! loop; an evaluation makes at most one oracle call and one fallback.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::JudgeError;
use crate::heuristic::HeuristicValidator;
use crate::judgment::{interpret_response, Interpretation};
use crate::model::{AnswerAttempt, Confidence, ErrorKind, Item, LogEntry, Verdict};
use crate::traits::{JudgeRequest, JudgmentClient};

/// Configuration for the validation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Model passed to the judgment client.
    pub model: String,
    /// Attempts shorter than this (in characters, after trimming) are
    /// rejected without calling the oracle. Values below 1 act as 1.
    pub min_attempt_chars: usize,
    /// Upper bound on a single oracle call.
    pub oracle_timeout_ms: u64,
    /// How many earlier log entries are sent as context.
    pub history_window: usize,
    /// Max tokens for the oracle response.
    pub max_tokens: u32,
    /// Sampling temperature for the oracle.
    pub temperature: f64,
    /// Optional system prompt override.
    pub system_prompt: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            min_attempt_chars: 1,
            oracle_timeout_ms: 10_000,
            history_window: 5,
            max_tokens: 512,
            temperature: 0.0,
            system_prompt: None,
        }
    }
}

impl PipelineConfig {
    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }
}

/// Why the pipeline did not use an oracle verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    Timeout,
    /// The client failed; the label is `JudgeError::kind` or `"error"`.
    ClientError(&'static str),
    EmptyResponse,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::Timeout => write!(f, "timeout"),
            FallbackReason::ClientError(kind) => write!(f, "client error ({kind})"),
            FallbackReason::EmptyResponse => write!(f, "empty response"),
        }
    }
}

/// Which stage of the pipeline produced the verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationPath {
    /// Empty or too short; the oracle was not called.
    Rejected,
    /// Well-formed oracle payload.
    Oracle,
    /// Malformed oracle payload, classified lexically.
    Inferred,
    /// Heuristic validator after an oracle failure.
    Fallback(FallbackReason),
}

/// A verdict plus the path that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub path: EvaluationPath,
}

/// Orchestrates the judgment client and the heuristic validator.
pub struct ValidationPipeline {
    client: Arc<dyn JudgmentClient>,
    heuristic: HeuristicValidator,
    config: PipelineConfig,
}

impl ValidationPipeline {
    pub fn new(client: Arc<dyn JudgmentClient>, config: PipelineConfig) -> Self {
        Self {
            client,
            heuristic: HeuristicValidator::new(),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Judge an attempt. Never fails.
    pub async fn evaluate(&self, item: &Item, attempt: &AnswerAttempt, prior: &[LogEntry]) -> Verdict {
        self.evaluate_traced(item, attempt, prior).await.verdict
    }

    /// Judge an attempt and report which stage decided it.
    pub async fn evaluate_traced(
        &self,
        item: &Item,
        attempt: &AnswerAttempt,
        prior: &[LogEntry],
    ) -> Evaluation {
        let length = attempt.content.trim().chars().count();
        if length < self.config.min_attempt_chars.max(1) {
            debug!(item = %item.id, length, "attempt rejected before judgment");
            return Evaluation {
                verdict: Verdict {
                    correct: false,
                    error_kind: ErrorKind::Syntax,
                    feedback: if length == 0 {
                        "No answer was given.".to_string()
                    } else {
                        "The answer is too short to judge.".to_string()
                    },
                    confidence: Confidence::Heuristic,
                },
                path: EvaluationPath::Rejected,
            };
        }

        let window = self.config.history_window.min(prior.len());
        let request = JudgeRequest {
            model: self.config.model.clone(),
            item: item.clone(),
            attempt: attempt.clone(),
            history: prior[prior.len() - window..].to_vec(),
            system_prompt: self.config.system_prompt.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let timeout = self.config.oracle_timeout();
        let reason = match tokio::time::timeout(timeout, self.client.judge(&request)).await {
            Ok(Ok(response)) => match interpret_response(&response.content) {
                Interpretation::Structured(verdict) => {
                    debug!(
                        item = %item.id,
                        client = self.client.name(),
                        correct = verdict.correct,
                        error_kind = %verdict.error_kind,
                        "oracle verdict"
                    );
                    return Evaluation {
                        verdict,
                        path: EvaluationPath::Oracle,
                    };
                }
                Interpretation::Inferred(verdict) => {
                    warn!(item = %item.id, client = self.client.name(), "malformed oracle payload, inferring lexically");
                    return Evaluation {
                        verdict,
                        path: EvaluationPath::Inferred,
                    };
                }
                Interpretation::Empty => FallbackReason::EmptyResponse,
            },
            Ok(Err(e)) => {
                let kind = e.downcast_ref::<JudgeError>().map(JudgeError::kind).unwrap_or("error");
                warn!(item = %item.id, client = self.client.name(), "judgment failed: {e:#}");
                FallbackReason::ClientError(kind)
            }
            Err(_) => {
                warn!(item = %item.id, client = self.client.name(), timeout_ms = self.config.oracle_timeout_ms, "judgment timed out");
                FallbackReason::Timeout
            }
        };

        debug!(item = %item.id, %reason, "falling back to heuristic validator");
        Evaluation {
            verdict: self.heuristic.validate(item, attempt),
            path: EvaluationPath::Fallback(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::model::{DifficultyTier, Expected, ItemType};
    use crate::traits::{JudgeResponse, ModelInfo};

    enum Behavior {
        Reply(&'static str),
        Fail(fn() -> anyhow::Error),
        Hang,
    }

    struct StubJudge {
        behavior: Behavior,
        calls: AtomicU32,
        last_history_len: AtomicU32,
    }

    impl StubJudge {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicU32::new(0),
                last_history_len: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl JudgmentClient for StubJudge {
        fn name(&self) -> &str {
            "stub"
        }

        async fn judge(&self, request: &JudgeRequest) -> anyhow::Result<JudgeResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_history_len
                .store(request.history.len() as u32, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Reply(text) => Ok(JudgeResponse {
                    content: text.to_string(),
                    ..Default::default()
                }),
                Behavior::Fail(make) => Err(make()),
                Behavior::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }

        fn available_models(&self) -> Vec<ModelInfo> {
            vec![]
        }
    }

    fn item() -> Item {
        Item {
            id: "q".into(),
            prompt: "7 * 6?".into(),
            item_type: ItemType::FreeForm,
            tier: DifficultyTier::Easy,
            topic: "arithmetic".into(),
            expected: Expected::Answer("42".into()),
            options: vec![],
            marks: 1,
        }
    }

    fn attempt(content: &str) -> AnswerAttempt {
        AnswerAttempt::new("q", content, Duration::from_secs(2))
    }

    fn pipeline(client: Arc<StubJudge>) -> ValidationPipeline {
        ValidationPipeline::new(
            client,
            PipelineConfig {
                oracle_timeout_ms: 500,
                min_attempt_chars: 1,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn empty_attempt_skips_oracle() {
        let judge = StubJudge::new(Behavior::Reply(r#"{"correct": true}"#));
        let eval = pipeline(judge.clone())
            .evaluate_traced(&item(), &attempt("   "), &[])
            .await;
        assert_eq!(eval.path, EvaluationPath::Rejected);
        assert!(!eval.verdict.correct);
        assert_eq!(eval.verdict.error_kind, ErrorKind::Syntax);
        assert_eq!(eval.verdict.confidence, Confidence::Heuristic);
        assert_eq!(judge.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn short_attempt_rejected_by_threshold() {
        let judge = StubJudge::new(Behavior::Reply(r#"{"correct": true}"#));
        let pipeline = ValidationPipeline::new(
            judge.clone(),
            PipelineConfig {
                min_attempt_chars: 3,
                ..Default::default()
            },
        );
        let eval = pipeline.evaluate_traced(&item(), &attempt("42"), &[]).await;
        assert_eq!(eval.path, EvaluationPath::Rejected);
        assert_eq!(judge.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn structured_oracle_verdict() {
        let judge = StubJudge::new(Behavior::Reply(
            r#"{"correct": false, "error_kind": "conceptual", "feedback": "Multiplication, not addition."}"#,
        ));
        let eval = pipeline(judge).evaluate_traced(&item(), &attempt("13"), &[]).await;
        assert_eq!(eval.path, EvaluationPath::Oracle);
        assert_eq!(eval.verdict.confidence, Confidence::Oracle);
        assert_eq!(eval.verdict.error_kind, ErrorKind::Conceptual);
    }

    #[tokio::test]
    async fn malformed_payload_is_inferred() {
        let judge = StubJudge::new(Behavior::Reply("Wrong, check your times tables."));
        let eval = pipeline(judge).evaluate_traced(&item(), &attempt("48"), &[]).await;
        assert_eq!(eval.path, EvaluationPath::Inferred);
        assert_eq!(eval.verdict.confidence, Confidence::Heuristic);
        assert_eq!(eval.verdict.error_kind, ErrorKind::Calculation);
        assert!(!eval.verdict.correct);
    }

    #[tokio::test]
    async fn client_error_falls_back_to_heuristic() {
        let judge = StubJudge::new(Behavior::Fail(|| {
            anyhow::Error::from(JudgeError::Unreachable("connection refused".into()))
        }));
        let eval = pipeline(judge.clone()).evaluate_traced(&item(), &attempt("42"), &[]).await;
        assert_eq!(
            eval.path,
            EvaluationPath::Fallback(FallbackReason::ClientError("unreachable"))
        );
        assert!(eval.verdict.correct);
        assert_eq!(eval.verdict.confidence, Confidence::Heuristic);
        assert_eq!(judge.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn untyped_error_falls_back() {
        let judge = StubJudge::new(Behavior::Fail(|| anyhow::anyhow!("boom")));
        let eval = pipeline(judge).evaluate_traced(&item(), &attempt("41"), &[]).await;
        assert_eq!(eval.path, EvaluationPath::Fallback(FallbackReason::ClientError("error")));
        assert!(!eval.verdict.correct);
    }

    #[tokio::test]
    async fn empty_response_falls_back() {
        let judge = StubJudge::new(Behavior::Reply("  "));
        let eval = pipeline(judge).evaluate_traced(&item(), &attempt("42"), &[]).await;
        assert_eq!(eval.path, EvaluationPath::Fallback(FallbackReason::EmptyResponse));
        assert!(eval.verdict.correct);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_oracle_times_out() {
        let judge = StubJudge::new(Behavior::Hang);
        let eval = pipeline(judge).evaluate_traced(&item(), &attempt("42"), &[]).await;
        assert_eq!(eval.path, EvaluationPath::Fallback(FallbackReason::Timeout));
        assert!(eval.verdict.correct);
        assert_eq!(eval.verdict.confidence, Confidence::Heuristic);
    }

    #[tokio::test]
    async fn history_is_windowed() {
        let judge = StubJudge::new(Behavior::Reply(r#"{"correct": true}"#));
        let prior: Vec<LogEntry> = (0..8)
            .map(|_| LogEntry {
                item: item(),
                attempt: attempt("42"),
                verdict: Verdict {
                    correct: true,
                    error_kind: ErrorKind::None,
                    feedback: String::new(),
                    confidence: Confidence::Oracle,
                },
            })
            .collect();
        pipeline(judge.clone()).evaluate(&item(), &attempt("42"), &prior).await;
        assert_eq!(judge.last_history_len.load(Ordering::SeqCst), 5);
    }
}
