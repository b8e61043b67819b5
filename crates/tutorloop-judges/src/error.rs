//! Judge error types and HTTP failure mapping.

use std::time::Duration;

use reqwest::header::HeaderMap;
use thiserror::Error;

pub use tutorloop_core::error::JudgeError;

/// Errors that can occur when building a judge from configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No provider with this name is configured.
    #[error("unknown judge provider: {0}")]
    UnknownProvider(String),

    /// The provider needs an API key and none was configured or resolved.
    #[error("no API key for provider '{0}' (set it in the config file or the environment)")]
    MissingApiKey(String),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Build the shared HTTP client for a judge.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}

/// Map a transport failure (no HTTP status) to a `JudgeError`.
pub(crate) fn transport_error(e: &reqwest::Error, timeout: Duration, service: &str) -> JudgeError {
    if e.is_timeout() {
        JudgeError::Timeout(timeout.as_millis() as u64)
    } else if e.is_connect() {
        JudgeError::Unreachable(format!("{service} not reachable: {e}"))
    } else {
        JudgeError::Unreachable(e.to_string())
    }
}

/// `Retry-After` in milliseconds, defaulting to five seconds.
pub(crate) fn retry_after_ms(headers: &HeaderMap) -> u64 {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(5)
        * 1000
}

/// Turn an error status into a `JudgeError`; successful responses pass through.
///
/// `message` extracts a readable message from the provider's error body.
pub(crate) async fn check_status(
    response: reqwest::Response,
    model: &str,
    message: impl Fn(&str) -> Option<String>,
) -> Result<reqwest::Response, JudgeError> {
    let status = response.status().as_u16();
    if status < 400 {
        return Ok(response);
    }
    if status == 429 {
        return Err(JudgeError::RateLimited {
            retry_after_ms: retry_after_ms(response.headers()),
        });
    }
    if status == 404 {
        return Err(JudgeError::ModelNotFound(model.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    let text = message(&body).unwrap_or(body);
    if status == 401 || status == 403 {
        return Err(JudgeError::AuthenticationFailed(text));
    }
    Err(JudgeError::ApiError {
        status,
        message: text,
    })
}

/// A response body that did not match the provider's schema.
pub(crate) fn malformed_body(e: reqwest::Error) -> JudgeError {
    JudgeError::ApiError {
        status: 0,
        message: format!("failed to parse response: {e}"),
    }
}
