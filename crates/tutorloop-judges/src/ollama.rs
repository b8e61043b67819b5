//! Ollama (local model) judge.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tutorloop_core::error::JudgeError;
use tutorloop_core::traits::{
    render_judge_prompt, JudgeRequest, JudgeResponse, JudgmentClient, ModelInfo, TokenUsage,
    DEFAULT_SYSTEM_PROMPT,
};

use crate::error::{check_status, http_client, malformed_body, transport_error, ConfigError};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120); // Local models are slower

/// Ollama local model judge.
pub struct OllamaJudge {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaJudge {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let base = if base_url.is_empty() {
            DEFAULT_BASE_URL
        } else {
            base_url
        };

        Ok(Self {
            base_url: base.trim_end_matches('/').to_string(),
            client: http_client(DEFAULT_TIMEOUT)?,
        })
    }

    fn unreachable(&self) -> JudgeError {
        JudgeError::Unreachable(format!(
            "Ollama not reachable at {}. Is it running? Start with: ollama serve",
            self.base_url
        ))
    }

    /// Fetch the models installed on the Ollama instance.
    pub async fn list_models_async(&self) -> anyhow::Result<Vec<ModelInfo>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|_| self.unreachable())?;

        let tags: OllamaTagsResponse = response.json().await.map_err(malformed_body)?;

        Ok(tags
            .models
            .into_iter()
            .map(|m| ModelInfo {
                id: m.name.clone(),
                name: m.name,
                provider: "ollama".into(),
                max_context: 0,
            })
            .collect())
    }
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    format: &'static str,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f64,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaResponseMessage,
    model: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModelEntry>,
}

#[derive(Deserialize)]
struct OllamaModelEntry {
    name: String,
}

#[derive(Deserialize)]
struct OllamaError {
    error: String,
}

#[async_trait]
impl JudgmentClient for OllamaJudge {
    fn name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip(self, request), fields(model = %request.model, item = %request.item.id))]
    async fn judge(&self, request: &JudgeRequest) -> anyhow::Result<JudgeResponse> {
        let start = Instant::now();

        let system_prompt = request
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        let body = OllamaRequest {
            model: request.model.clone(),
            messages: vec![
                OllamaMessage {
                    role: "system".to_string(),
                    content: system_prompt,
                },
                OllamaMessage {
                    role: "user".to_string(),
                    content: render_judge_prompt(request),
                },
            ],
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    self.unreachable()
                } else {
                    transport_error(&e, DEFAULT_TIMEOUT, "Ollama")
                }
            })?;

        if response.status().as_u16() == 404 {
            return Err(JudgeError::ModelNotFound(format!(
                "Model '{}' not found locally. Pull it with: ollama pull {}",
                request.model, request.model
            ))
            .into());
        }
        let response = check_status(response, &request.model, |body| {
            serde_json::from_str::<OllamaError>(body).ok().map(|e| e.error)
        })
        .await?;

        let api_response: OllamaResponse = response.json().await.map_err(malformed_body)?;

        let prompt_tokens = api_response.prompt_eval_count.unwrap_or(0);
        let completion_tokens = api_response.eval_count.unwrap_or(0);

        Ok(JudgeResponse {
            content: api_response.message.content,
            model: api_response.model,
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        // Installed models are only known at runtime; see `list_models_async`.
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutorloop_core::model::{AnswerAttempt, DifficultyTier, Expected, Item, ItemType};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(model: &str) -> JudgeRequest {
        JudgeRequest {
            model: model.into(),
            item: Item {
                id: "eq-1".into(),
                prompt: "Solve 2x + 3 = 11.".into(),
                item_type: ItemType::FreeForm,
                tier: DifficultyTier::Easy,
                topic: "linear equations".into(),
                expected: Expected::Steps(vec!["2x = 8".into(), "x = 4".into()]),
                options: vec![],
                marks: 2,
            },
            attempt: AnswerAttempt::new("eq-1", "2x = 8 so x = 4", Duration::from_secs(20)),
            history: vec![],
            system_prompt: None,
            max_tokens: 200,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn successful_judgment() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "message": {"role": "assistant", "content": "{\"correct\": true, \"error_kind\": \"none\"}"},
            "model": "llama3.1:8b",
            "prompt_eval_count": 30,
            "eval_count": 15
        });

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_string_contains("\"format\":\"json\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let judge = OllamaJudge::new(&server.uri()).unwrap();
        let response = judge.judge(&request("llama3.1:8b")).await.unwrap();
        assert!(response.content.contains("\"correct\": true"));
        assert_eq!(response.token_usage.prompt_tokens, 30);
        assert_eq!(response.token_usage.total_tokens, 45);
    }

    #[tokio::test]
    async fn model_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let judge = OllamaJudge::new(&server.uri()).unwrap();
        let err = judge.judge(&request("nonexistent")).await.unwrap_err();
        assert!(err.to_string().contains("ollama pull nonexistent"));
        assert_eq!(
            err.downcast_ref::<JudgeError>().map(JudgeError::kind),
            Some("model_not_found")
        );
    }

    #[tokio::test]
    async fn not_running_is_unreachable() {
        let judge = OllamaJudge::new("http://127.0.0.1:1").unwrap();
        let err = judge.judge(&request("llama3.1:8b")).await.unwrap_err();
        assert!(err.to_string().contains("ollama serve"));
    }

    #[tokio::test]
    async fn dynamic_model_listing() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "models": [
                {"name": "llama3.1:8b", "size": 4700000000_u64},
                {"name": "qwen2.5:7b", "size": 4400000000_u64}
            ]
        });

        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let judge = OllamaJudge::new(&server.uri()).unwrap();
        let models = judge.list_models_async().await.unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id, "llama3.1:8b");
    }
}
