//! Configuration file and judge factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use tutorloop_core::pipeline::PipelineConfig;
use tutorloop_core::session::SessionConfig;
use tutorloop_core::traits::JudgmentClient;

use crate::anthropic::AnthropicJudge;
use crate::error::ConfigError;
use crate::offline::OfflineJudge;
use crate::ollama::OllamaJudge;
use crate::openai::OpenAiJudge;

/// Configuration for a single judgment provider.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JudgeConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Anthropic {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
    /// No oracle; every attempt is graded heuristically.
    Offline,
}

impl std::fmt::Debug for JudgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JudgeConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            JudgeConfig::Anthropic {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            JudgeConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
            JudgeConfig::Offline => f.write_str("Offline"),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

/// Top-level tutorloop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorloopConfig {
    /// Judge configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, JudgeConfig>,
    /// Judge to use when none is named on the command line.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Model passed to the judge unless overridden.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Output directory for session reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Validation pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Session controller settings.
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_provider() -> String {
    "anthropic".to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./tutorloop-results")
}

impl Default for TutorloopConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            output_dir: default_output_dir(),
            pipeline: PipelineConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl TutorloopConfig {
    /// Build the named judge, or the default one.
    pub fn judge(&self, name: Option<&str>) -> Result<Arc<dyn JudgmentClient>> {
        let name = name.unwrap_or(&self.default_provider);
        let config = self
            .providers
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProvider(name.to_string()))?;
        create_judge(name, config)
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Resolve env vars in a judge config.
fn resolve_judge_config(config: &JudgeConfig) -> JudgeConfig {
    match config {
        JudgeConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => JudgeConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
            org_id: org_id.as_ref().map(|o| resolve_env_vars(o)),
        },
        JudgeConfig::Anthropic { api_key, base_url } => JudgeConfig::Anthropic {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
        },
        JudgeConfig::Ollama { base_url } => JudgeConfig::Ollama {
            base_url: resolve_env_vars(base_url),
        },
        JudgeConfig::Offline => JudgeConfig::Offline,
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `tutorloop.toml` in the current directory
/// 2. `~/.config/tutorloop/config.toml`
///
/// Environment variable overrides: `TUTORLOOP_OPENAI_KEY`, `TUTORLOOP_ANTHROPIC_KEY`.
pub fn load_config() -> Result<TutorloopConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<TutorloopConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("tutorloop.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => TutorloopConfig::default(),
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a config file body and resolve `${VAR}` references.
pub fn parse_config(content: &str) -> Result<TutorloopConfig> {
    let mut config: TutorloopConfig = toml::from_str(content)?;
    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_judge_config(v)))
        .collect();
    Ok(config)
}

fn apply_env_overrides(config: &mut TutorloopConfig) {
    if let Ok(key) = std::env::var("TUTORLOOP_ANTHROPIC_KEY") {
        let entry = config
            .providers
            .entry("anthropic".into())
            .or_insert(JudgeConfig::Anthropic {
                api_key: String::new(),
                base_url: None,
            });
        if let JudgeConfig::Anthropic { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Ok(key) = std::env::var("TUTORLOOP_OPENAI_KEY") {
        let entry = config
            .providers
            .entry("openai".into())
            .or_insert(JudgeConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
                org_id: None,
            });
        if let JudgeConfig::OpenAI { api_key, .. } = entry {
            *api_key = key;
        }
    }
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("tutorloop"))
}

/// Create a judge instance from its configuration.
pub fn create_judge(name: &str, config: &JudgeConfig) -> Result<Arc<dyn JudgmentClient>> {
    let judge: Arc<dyn JudgmentClient> = match config {
        JudgeConfig::Anthropic { api_key, base_url } => {
            if api_key.trim().is_empty() {
                return Err(ConfigError::MissingApiKey(name.to_string()).into());
            }
            Arc::new(AnthropicJudge::new(api_key, base_url.clone())?)
        }
        JudgeConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => {
            if api_key.trim().is_empty() {
                return Err(ConfigError::MissingApiKey(name.to_string()).into());
            }
            Arc::new(OpenAiJudge::new(api_key, base_url.clone(), org_id.clone())?)
        }
        JudgeConfig::Ollama { base_url } => Arc::new(OllamaJudge::new(base_url)?),
        JudgeConfig::Offline => Arc::new(OfflineJudge),
    };
    Ok(judge)
}
