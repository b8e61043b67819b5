//! A judge that is never available.
//!
//! Sessions built on it are graded entirely by the heuristic validator.

use async_trait::async_trait;

use tutorloop_core::error::JudgeError;
use tutorloop_core::traits::{JudgeRequest, JudgeResponse, JudgmentClient, ModelInfo};

#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineJudge;

#[async_trait]
impl JudgmentClient for OfflineJudge {
    fn name(&self) -> &str {
        "offline"
    }

    async fn judge(&self, _request: &JudgeRequest) -> anyhow::Result<JudgeResponse> {
        Err(JudgeError::Unreachable("running offline".into()).into())
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![]
    }
}
