//! Anthropic Messages API judge.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tutorloop_core::traits::{
    render_judge_prompt, JudgeRequest, JudgeResponse, JudgmentClient, ModelInfo, TokenUsage,
    DEFAULT_SYSTEM_PROMPT,
};

use crate::error::{check_status, http_client, malformed_body, transport_error, ConfigError};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Anthropic API judge.
pub struct AnthropicJudge {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicJudge {
    pub fn new(api_key: &str, base_url: Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: http_client(DEFAULT_TIMEOUT)?,
        })
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    #[serde(default)]
    usage: AnthropicUsage,
    model: String,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

#[async_trait]
impl JudgmentClient for AnthropicJudge {
    fn name(&self) -> &str {
        "anthropic"
    }

    #[instrument(skip(self, request), fields(model = %request.model, item = %request.item.id))]
    async fn judge(&self, request: &JudgeRequest) -> anyhow::Result<JudgeResponse> {
        let start = Instant::now();

        let body = AnthropicRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: Some(
                request
                    .system_prompt
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            ),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: render_judge_prompt(request),
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e, DEFAULT_TIMEOUT, "Anthropic API"))?;

        let response = check_status(response, &request.model, |body| {
            serde_json::from_str::<AnthropicError>(body)
                .ok()
                .map(|e| e.error.message)
        })
        .await?;

        let api_response: AnthropicResponse = response.json().await.map_err(malformed_body)?;

        let content = api_response
            .content
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("");
        let usage = api_response.usage;

        Ok(JudgeResponse {
            content,
            model: api_response.model,
            token_usage: TokenUsage {
                prompt_tokens: usage.input_tokens,
                completion_tokens: usage.output_tokens,
                total_tokens: usage.input_tokens + usage.output_tokens,
            },
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![
            ModelInfo {
                id: "claude-sonnet-4-20250514".into(),
                name: "Claude Sonnet 4".into(),
                provider: "anthropic".into(),
                max_context: 200_000,
            },
            ModelInfo {
                id: "claude-haiku-4-5-20251001".into(),
                name: "Claude Haiku 4.5".into(),
                provider: "anthropic".into(),
                max_context: 200_000,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutorloop_core::error::JudgeError;
    use tutorloop_core::model::{AnswerAttempt, DifficultyTier, Expected, Item, ItemType};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> JudgeRequest {
        JudgeRequest {
            model: "claude-sonnet-4-20250514".into(),
            item: Item {
                id: "frac-1".into(),
                prompt: "What is 1/2 + 1/3?".into(),
                item_type: ItemType::FreeForm,
                tier: DifficultyTier::Medium,
                topic: "fractions".into(),
                expected: Expected::Answer("5/6".into()),
                options: vec![],
                marks: 1,
            },
            attempt: AnswerAttempt::new("frac-1", "2/5", Duration::from_secs(9)),
            history: vec![],
            system_prompt: None,
            max_tokens: 256,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn successful_judgment() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "content": [{"type": "text", "text": "{\"correct\": false, \"error_kind\": \"conceptual\", \"feedback\": \"Find a common denominator first.\"}"}],
            "model": "claude-sonnet-4-20250514",
            "usage": {"input_tokens": 120, "output_tokens": 30}
        });

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(body_string_contains("Student answer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let judge = AnthropicJudge::new("test-key", Some(server.uri())).unwrap();
        let response = judge.judge(&request()).await.unwrap();
        assert!(response.content.contains("conceptual"));
        assert_eq!(response.token_usage.prompt_tokens, 120);
        assert_eq!(response.token_usage.total_tokens, 150);
    }

    #[tokio::test]
    async fn authentication_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            })))
            .mount(&server)
            .await;

        let judge = AnthropicJudge::new("bad-key", Some(server.uri())).unwrap();
        let err = judge.judge(&request()).await.unwrap_err();
        match err.downcast_ref::<JudgeError>() {
            Some(JudgeError::AuthenticationFailed(message)) => {
                assert_eq!(message, "invalid x-api-key")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rate_limiting() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "5"))
            .mount(&server)
            .await;

        let judge = AnthropicJudge::new("test-key", Some(server.uri())).unwrap();
        let err = judge.judge(&request()).await.unwrap_err();
        assert!(err.to_string().contains("rate limited"));
        assert!(matches!(
            err.downcast_ref::<JudgeError>(),
            Some(JudgeError::RateLimited { retry_after_ms: 5000 })
        ));
    }

    #[tokio::test]
    async fn server_error_is_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_json(serde_json::json!({
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            })))
            .mount(&server)
            .await;

        let judge = AnthropicJudge::new("test-key", Some(server.uri())).unwrap();
        let err = judge.judge(&request()).await.unwrap_err();
        assert_eq!(err.downcast_ref::<JudgeError>().map(JudgeError::kind), Some("api_error"));
        assert!(err.to_string().contains("Overloaded"));
    }

    #[tokio::test]
    async fn unreachable_server() {
        let judge = AnthropicJudge::new("test-key", Some("http://127.0.0.1:1".into())).unwrap();
        let err = judge.judge(&request()).await.unwrap_err();
        assert_eq!(err.downcast_ref::<JudgeError>().map(JudgeError::kind), Some("unreachable"));
    }
}
