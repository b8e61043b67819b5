//! OpenAI-compatible chat completions judge.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tutorloop_core::traits::{
    render_judge_prompt, JudgeRequest, JudgeResponse, JudgmentClient, ModelInfo, TokenUsage,
    DEFAULT_SYSTEM_PROMPT,
};

use crate::error::{check_status, http_client, malformed_body, transport_error, ConfigError};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// OpenAI-compatible API judge.
pub struct OpenAiJudge {
    api_key: String,
    base_url: String,
    org_id: Option<String>,
    client: reqwest::Client,
}

impl OpenAiJudge {
    pub fn new(
        api_key: &str,
        base_url: Option<String>,
        org_id: Option<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            org_id,
            client: http_client(DEFAULT_TIMEOUT)?,
        })
    }
}

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<OpenAiMessage>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: OpenAiUsage,
    model: String,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiError {
    error: OpenAiErrorBody,
}

#[derive(Deserialize)]
struct OpenAiErrorBody {
    message: String,
}

#[async_trait]
impl JudgmentClient for OpenAiJudge {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip(self, request), fields(model = %request.model, item = %request.item.id))]
    async fn judge(&self, request: &JudgeRequest) -> anyhow::Result<JudgeResponse> {
        let start = Instant::now();

        let system_prompt = request
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        let body = OpenAiRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: vec![
                OpenAiMessage {
                    role: "system".to_string(),
                    content: system_prompt,
                },
                OpenAiMessage {
                    role: "user".to_string(),
                    content: render_judge_prompt(request),
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let mut req = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json");

        if let Some(org) = &self.org_id {
            req = req.header("OpenAI-Organization", org);
        }

        let response = req
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e, DEFAULT_TIMEOUT, "OpenAI API"))?;

        let response = check_status(response, &request.model, |body| {
            serde_json::from_str::<OpenAiError>(body)
                .ok()
                .map(|e| e.error.message)
        })
        .await?;

        let api_response: OpenAiResponse = response.json().await.map_err(malformed_body)?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(JudgeResponse {
            content,
            model: api_response.model,
            token_usage: TokenUsage {
                prompt_tokens: api_response.usage.prompt_tokens,
                completion_tokens: api_response.usage.completion_tokens,
                total_tokens: api_response.usage.total_tokens,
            },
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![
            ModelInfo {
                id: "gpt-4.1".into(),
                name: "GPT-4.1".into(),
                provider: "openai".into(),
                max_context: 1_000_000,
            },
            ModelInfo {
                id: "gpt-4.1-mini".into(),
                name: "GPT-4.1 Mini".into(),
                provider: "openai".into(),
                max_context: 1_000_000,
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
            model: "gpt-4.1-mini".into(),
            item: Item {
                id: "mc-1".into(),
                prompt: "Which is prime?".into(),
                item_type: ItemType::MultipleChoice,
                tier: DifficultyTier::Easy,
                topic: "number theory".into(),
                expected: Expected::Answer("B".into()),
                options: vec!["9".into(), "7".into(), "15".into()],
                marks: 1,
            },
            attempt: AnswerAttempt::new("mc-1", "B", Duration::from_secs(3)),
            history: vec![],
            system_prompt: Some("Grade it.".into()),
            max_tokens: 128,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn successful_judgment() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "choices": [{"message": {"content": "{\"correct\": true, \"error_kind\": \"none\", \"feedback\": \"Yes.\"}", "role": "assistant"}, "index": 0}],
            "model": "gpt-4.1-mini",
            "usage": {"prompt_tokens": 80, "completion_tokens": 12, "total_tokens": 92}
        });

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_string_contains("json_object"))
            .and(body_string_contains("Grade it."))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let judge = OpenAiJudge::new("test-key", Some(server.uri()), None).unwrap();
        let response = judge.judge(&request()).await.unwrap();
        assert!(response.content.contains("\"correct\": true"));
        assert_eq!(response.token_usage.total_tokens, 92);
    }

    #[tokio::test]
    async fn org_header_is_sent() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("OpenAI-Organization", "org-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": null, "role": "assistant"}, "index": 0}],
                "model": "gpt-4.1-mini"
            })))
            .mount(&server)
            .await;

        let judge =
            OpenAiJudge::new("test-key", Some(server.uri()), Some("org-123".into())).unwrap();
        let response = judge.judge(&request()).await.unwrap();
        assert!(response.content.is_empty());
    }

    #[tokio::test]
    async fn authentication_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let judge = OpenAiJudge::new("bad", Some(server.uri()), None).unwrap();
        let err = judge.judge(&request()).await.unwrap_err();
        assert!(err.to_string().contains("authentication"));
        assert!(err.to_string().contains("Incorrect API key"));
    }

    #[tokio::test]
    async fn unknown_model() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let judge = OpenAiJudge::new("test-key", Some(server.uri()), None).unwrap();
        let err = judge.judge(&request()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<JudgeError>(),
            Some(JudgeError::ModelNotFound(model)) if model == "gpt-4.1-mini"
        ));
    }
}
