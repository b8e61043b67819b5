//! TOML item bank parser.
//!
//! Loads item sets from TOML files and directories, and validates them.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{DifficultyTier, Expected, Item, ItemType};
use crate::traits::option_labels;

/// A named collection of items loaded from one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSet {
    pub name: String,
    pub description: String,
    pub items: Vec<Item>,
}

/// Intermediate TOML structure for parsing item set files.
#[derive(Debug, Deserialize)]
struct TomlItemFile {
    set: TomlSetHeader,
    #[serde(default)]
    items: Vec<TomlItem>,
}

#[derive(Debug, Deserialize)]
struct TomlSetHeader {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default = "default_type_str")]
    default_type: String,
}

fn default_type_str() -> String {
    "free-form".to_string()
}

fn default_marks() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct TomlItem {
    id: String,
    prompt: String,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default, rename = "type")]
    item_type: Option<String>,
    tier: String,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    steps: Option<Vec<String>>,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default = "default_marks")]
    marks: u32,
}

/// Parse a single TOML file into an `ItemSet`.
pub fn parse_item_set(path: &Path) -> Result<ItemSet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read item set file: {}", path.display()))?;

    parse_item_set_str(&content, path)
}

/// Parse a TOML string into an `ItemSet` (useful for testing).
pub fn parse_item_set_str(content: &str, source_path: &Path) -> Result<ItemSet> {
    let parsed: TomlItemFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let default_type: ItemType = parsed
        .set
        .default_type
        .parse()
        .map_err(|e: String| anyhow::anyhow!("{}", e))?;
    let set_topic = parsed.set.topic;

    let items = parsed
        .items
        .into_iter()
        .map(|i| {
            let item_type = i
                .item_type
                .map(|t| t.parse().map_err(|e: String| anyhow::anyhow!("{}", e)))
                .transpose()?
                .unwrap_or(default_type);
            let tier: DifficultyTier = i
                .tier
                .parse()
                .map_err(|e: String| anyhow::anyhow!("item {}: {}", i.id, e))?;
            let topic = i
                .topic
                .or_else(|| set_topic.clone())
                .with_context(|| format!("item {} has no topic and the set has no default", i.id))?;
            let expected = match (i.answer, i.steps) {
                (Some(answer), None) => Expected::Answer(answer),
                (None, Some(steps)) => Expected::Steps(steps),
                (Some(_), Some(_)) => {
                    anyhow::bail!("item {} sets both answer and steps", i.id)
                }
                (None, None) => anyhow::bail!("item {} needs an answer or steps", i.id),
            };
            if i.marks == 0 {
                anyhow::bail!("item {} has marks = 0; marks must be at least 1", i.id);
            }

            Ok(Item {
                id: i.id,
                prompt: i.prompt,
                item_type,
                tier,
                topic,
                expected,
                options: i.options,
                marks: i.marks,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ItemSet {
        name: parsed.set.name,
        description: parsed.set.description,
        items,
    })
}

/// Recursively load all `.toml` item set files from a directory.
pub fn load_item_directory(dir: &Path) -> Result<Vec<ItemSet>> {
    let mut sets = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            sets.extend(load_item_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_item_set(&path) {
                Ok(set) => sets.push(set),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(sets)
}

/// Load item sets from a file or a directory.
pub fn load_item_sets(path: &Path) -> Result<Vec<ItemSet>> {
    if path.is_dir() {
        load_item_directory(path)
    } else {
        Ok(vec![parse_item_set(path)?])
    }
}

/// A warning from item set validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The item ID (if applicable).
    pub item_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate an item set for common issues.
pub fn validate_item_set(set: &ItemSet) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut warn = |item: &Item, message: String| {
        warnings.push(ValidationWarning {
            item_id: Some(item.id.clone()),
            message,
        })
    };

    let mut seen_ids = HashSet::new();
    for item in &set.items {
        if !seen_ids.insert(&item.id) {
            warn(item, format!("duplicate item ID: {}", item.id));
        }
        if item.prompt.trim().is_empty() {
            warn(item, "prompt is empty".into());
        }
        match &item.expected {
            Expected::Steps(steps) if steps.is_empty() => {
                warn(item, "steps list is empty".into());
            }
            Expected::Answer(answer) if answer.trim().is_empty() => {
                warn(item, "answer is empty".into());
            }
            _ => {}
        }
        if item.item_type == ItemType::MultipleChoice {
            if item.options.len() < 2 {
                warn(item, "multiple-choice item has fewer than 2 options".into());
            } else if !answer_among_options(item) {
                warn(
                    item,
                    format!(
                        "answer '{}' is not among the options",
                        item.expected.final_answer()
                    ),
                );
            }
        } else if !item.options.is_empty() {
            warn(item, "options are ignored for free-form items".into());
        }
    }

    if set.items.is_empty() {
        warnings.push(ValidationWarning {
            item_id: None,
            message: "set has no items".into(),
        });
    }

    warnings
}

fn answer_among_options(item: &Item) -> bool {
    let answer = item.expected.final_answer().trim();
    item.options
        .iter()
        .zip(option_labels())
        .any(|(option, label)| {
            option.trim().eq_ignore_ascii_case(answer)
                || answer.eq_ignore_ascii_case(&label.to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[set]
name = "Fractions"
description = "Adding and comparing fractions"
topic = "fractions"

[[items]]
id = "add-halves"
tier = "easy"
prompt = "What is 1/2 + 1/2?"
answer = "1"

[[items]]
id = "compare"
type = "multiple-choice"
tier = "medium"
prompt = "Which is larger?"
options = ["2/3", "3/5"]
answer = "A"
marks = 2

[[items]]
id = "common-denominator"
tier = "hard"
topic = "fractions-advanced"
prompt = "Compute 1/3 + 1/4."
steps = ["4/12 + 3/12", "7/12"]
"#;

    #[test]
    fn parse_valid_toml() {
        let set = parse_item_set_str(VALID_TOML, &PathBuf::from("test.toml")).unwrap();
        assert_eq!(set.name, "Fractions");
        assert_eq!(set.items.len(), 3);
        assert_eq!(set.items[0].topic, "fractions");
        assert_eq!(set.items[0].item_type, ItemType::FreeForm);
        assert_eq!(set.items[0].marks, 1);
        assert_eq!(set.items[1].item_type, ItemType::MultipleChoice);
        assert_eq!(set.items[1].marks, 2);
        assert_eq!(set.items[2].tier, DifficultyTier::Advanced);
        assert_eq!(set.items[2].topic, "fractions-advanced");
        assert_eq!(set.items[2].expected.final_answer(), "7/12");
        assert!(validate_item_set(&set).is_empty());
    }

    #[test]
    fn missing_topic_is_an_error() {
        let toml = r#"
[set]
name = "No topic"

[[items]]
id = "q"
tier = "easy"
prompt = "?"
answer = "1"
"#;
        let err = parse_item_set_str(toml, &PathBuf::from("t.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("no topic"));
    }

    #[test]
    fn answer_and_steps_are_exclusive() {
        let toml = r#"
[set]
name = "Both"
topic = "t"

[[items]]
id = "q"
tier = "easy"
prompt = "?"
answer = "1"
steps = ["1"]
"#;
        assert!(parse_item_set_str(toml, &PathBuf::from("t.toml")).is_err());
    }

    #[test]
    fn bad_tier_is_an_error() {
        let toml = r#"
[set]
name = "Tier"
topic = "t"

[[items]]
id = "q"
tier = "impossible"
prompt = "?"
answer = "1"
"#;
        assert!(parse_item_set_str(toml, &PathBuf::from("t.toml")).is_err());
    }

    #[test]
    fn validate_flags_common_mistakes() {
        let toml = r#"
[set]
name = "Broken"
topic = "t"

[[items]]
id = "dup"
tier = "easy"
prompt = "?"
answer = "1"

[[items]]
id = "dup"
type = "multiple-choice"
tier = "easy"
prompt = "Pick"
options = ["x", "y"]
answer = "z"

[[items]]
id = "steps"
tier = "easy"
prompt = "Show work"
steps = []
"#;
        let set = parse_item_set_str(toml, &PathBuf::from("t.toml")).unwrap();
        let warnings = validate_item_set(&set);
        let messages: Vec<&str> = warnings.iter().map(|w| w.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("duplicate")));
        assert!(messages.iter().any(|m| m.contains("not among the options")));
        assert!(messages.iter().any(|m| m.contains("steps list is empty")));
    }

    #[test]
    fn zero_marks_is_an_error() {
        let toml = r#"
[set]
name = "Free points"
topic = "t"

[[items]]
id = "worthless"
tier = "easy"
prompt = "?"
answer = "1"
marks = 0
"#;
        let err = parse_item_set_str(toml, &PathBuf::from("t.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("worthless has marks = 0"));
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        assert!(parse_item_set_str(bad, &PathBuf::from("bad.toml")).is_err());
    }

    #[test]
    fn load_directory_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("bad.toml"), "nope = [").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let sets = load_item_sets(dir.path()).unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].name, "Fractions");
    }
}
