//! The `tutorloop init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("tutorloop.toml").exists() {
        println!("tutorloop.toml already exists, skipping.");
    } else {
        std::fs::write("tutorloop.toml", SAMPLE_CONFIG)?;
        println!("Created tutorloop.toml");
    }

    std::fs::create_dir_all("item-banks")?;
    let example_path = Path::new("item-banks/example.toml");
    if example_path.exists() {
        println!("item-banks/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_ITEM_BANK)?;
        println!("Created item-banks/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit tutorloop.toml with your API keys");
    println!("  2. Run: tutorloop validate --bank item-banks/example.toml");
    println!("  3. Run: tutorloop run --bank item-banks/example.toml --topic arithmetic");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# tutorloop configuration

default_provider = "anthropic"
default_model = "claude-sonnet-4-20250514"
output_dir = "./tutorloop-results"

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"

[providers.offline]
type = "offline"

[pipeline]
oracle_timeout_ms = 10000
history_window = 5
min_attempt_chars = 1

[session]
upper_threshold = 0.8
lower_threshold = 0.6
remediation_threshold = 2
tick_interval_ms = 1000
content_timeout_ms = 10000
"#;

const EXAMPLE_ITEM_BANK: &str = r#"[set]
name = "Arithmetic warm-up"
description = "Whole-number arithmetic from single steps to short chains"
topic = "arithmetic"

[[items]]
id = "add-small"
tier = "easy"
prompt = "What is 7 + 5?"
answer = "12"

[[items]]
id = "times-table"
tier = "easy"
prompt = "What is 6 * 7?"
answer = "42"

[[items]]
id = "order-of-operations"
tier = "medium"
prompt = "What is 3 + 4 * 2?"
steps = ["4 * 2 = 8", "3 + 8 = 11", "11"]

[[items]]
id = "remainder"
tier = "medium"
prompt = "What is the remainder when 47 is divided by 6?"
answer = "5"

[[items]]
id = "chain"
tier = "advanced"
prompt = "Compute (18 - 3) * 4 / 6."
steps = ["18 - 3 = 15", "15 * 4 = 60", "60 / 6 = 10", "10"]

[[items]]
id = "pick-prime"
type = "multiple-choice"
tier = "easy"
prompt = "Which of these numbers is prime?"
options = ["21", "27", "29", "33"]
answer = "C"
"#;
