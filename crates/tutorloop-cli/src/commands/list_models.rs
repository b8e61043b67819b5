//! The `tutorloop list-models` command.

use std::path::PathBuf;

use anyhow::Result;

use tutorloop_judges::config::{load_config_from, JudgeConfig};
use tutorloop_judges::ollama::OllamaJudge;
use tutorloop_judges::create_judge;

pub async fn execute(provider_filter: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;

    let mut names: Vec<&String> = config.providers.keys().collect();
    names.sort();

    let mut found_any = false;

    for name in names {
        if provider_filter.as_ref().is_some_and(|filter| filter != name) {
            continue;
        }

        let models = match &config.providers[name] {
            // Ollama lists whatever is pulled locally.
            JudgeConfig::Ollama { base_url } => {
                let judge = OllamaJudge::new(base_url)?;
                match judge.list_models_async().await {
                    Ok(models) => models,
                    Err(e) => {
                        tracing::warn!(provider = %name, error = %e, "could not query ollama");
                        Vec::new()
                    }
                }
            }
            other => match create_judge(name, other) {
                Ok(judge) => judge.available_models(),
                Err(e) => {
                    println!("Provider: {name} (unavailable: {e:#})\n");
                    continue;
                }
            },
        };

        if !models.is_empty() {
            found_any = true;
            println!("Provider: {name}");
            for model in &models {
                if model.max_context > 0 {
                    println!(
                        "  {}: {} ({}K context)",
                        model.id,
                        model.name,
                        model.max_context / 1000,
                    );
                } else {
                    println!("  {}", model.id);
                }
            }
            println!();
        }
    }

    if !found_any {
        println!("No judge models available. Run `tutorloop init` to create a config file.");
    }

    Ok(())
}
