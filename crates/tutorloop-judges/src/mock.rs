//! Mock judge for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use tutorloop_core::error::JudgeError;
use tutorloop_core::model::ErrorKind;
use tutorloop_core::traits::{JudgeRequest, JudgeResponse, JudgmentClient, ModelInfo, TokenUsage};

/// One scripted behaviour of the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Respond immediately with this text.
    Text(String),
    /// Respond with this text after a delay.
    Delayed(String, Duration),
    /// Fail as if the service could not be reached.
    Unreachable,
    /// Fail with a 429.
    RateLimited,
    /// Never respond.
    Hang,
}

impl MockReply {
    /// A well-formed structured verdict payload.
    pub fn verdict(correct: bool, error_kind: ErrorKind) -> Self {
        MockReply::Text(
            serde_json::json!({
                "correct": correct,
                "error_kind": error_kind.to_string(),
                "feedback": if correct { "Correct." } else { "Not quite." },
            })
            .to_string(),
        )
    }
}

/// A mock judgment client for exercising the pipeline without real API calls.
///
/// Scripted replies are consumed in order. Once the script is exhausted the
/// mock answers by matching the attempt content against its response map,
/// then falls back to the default reply.
pub struct MockJudge {
    script: Mutex<VecDeque<MockReply>>,
    /// Map of attempt substring → response text.
    responses: HashMap<String, String>,
    default_reply: MockReply,
    call_count: AtomicU32,
    last_request: Mutex<Option<JudgeRequest>>,
}

impl MockJudge {
    /// Create a mock with attempt→response mappings.
    pub fn new(responses: HashMap<String, String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            responses,
            default_reply: MockReply::verdict(false, ErrorKind::Unknown),
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            default_reply: MockReply::Text(response.to_string()),
            ..Self::new(HashMap::new())
        }
    }

    /// Create a mock that plays `replies` in order.
    pub fn scripted(replies: Vec<MockReply>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            ..Self::new(HashMap::new())
        }
    }

    /// Get the number of calls made to this judge.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last request made to this judge.
    pub fn last_request(&self) -> Option<JudgeRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn next_reply(&self, request: &JudgeRequest) -> MockReply {
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        scripted
            .or_else(|| {
                self.responses
                    .iter()
                    .find(|(key, _)| request.attempt.content.contains(key.as_str()))
                    .map(|(_, v)| MockReply::Text(v.clone()))
            })
            .unwrap_or_else(|| self.default_reply.clone())
    }
}

#[async_trait]
impl JudgmentClient for MockJudge {
    fn name(&self) -> &str {
        "mock"
    }

    async fn judge(&self, request: &JudgeRequest) -> anyhow::Result<JudgeResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(request.clone());

        let content = match self.next_reply(request) {
            MockReply::Text(text) => text,
            MockReply::Delayed(text, delay) => {
                tokio::time::sleep(delay).await;
                text
            }
            MockReply::Unreachable => {
                return Err(JudgeError::Unreachable("mock judge offline".into()).into())
            }
            MockReply::RateLimited => {
                return Err(JudgeError::RateLimited {
                    retry_after_ms: 1000,
                }
                .into())
            }
            MockReply::Hang => std::future::pending().await,
        };

        let prompt_tokens = (request.attempt.content.len() / 4) as u32;
        let completion_tokens = (content.len() / 4) as u32; // Rough estimate
        Ok(JudgeResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            latency_ms: 1,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".into(),
            name: "Mock Model".into(),
            provider: "mock".into(),
            max_context: 100_000,
        }]
    }
}
