//! Offline session example: drive a session from code with no oracle.
//!
//! Loads the arithmetic item bank, grades with the local heuristics only and
//! plays a student who slips on the third item.
//!
//! ```bash
//! cargo run -p tutorloop-cli --example offline_session
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tutorloop_core::bank::ItemBank;
use tutorloop_core::model::{DifficultyTier, SessionMode};
use tutorloop_core::{
    NextStep, PipelineConfig, SessionConfig, SessionEvent, SessionHandle, StartRequest,
    SubmitReply, ValidationPipeline,
};
use tutorloop_judges::offline::OfflineJudge;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let bank_path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../item-banks/arithmetic.toml");
    let bank = ItemBank::load(&bank_path)?;
    println!("Loaded {} items from {}", bank.len(), bank_path.display());

    let pipeline = ValidationPipeline::new(Arc::new(OfflineJudge), PipelineConfig::default());
    let session = SessionHandle::spawn(pipeline, Arc::new(bank), SessionConfig::default());

    // Print remediation and completion as they happen
    let mut events = session.subscribe();
    let watcher = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::RemediationTriggered(event) => {
                    println!("  ! remediation suggested on '{}'", event.topic)
                }
                SessionEvent::Completed { reason, .. } => {
                    println!("  session completed: {reason}");
                    break;
                }
                _ => {}
            }
        }
    });

    let mut item = session
        .start(StartRequest {
            mode: SessionMode::Practice,
            topic: "arithmetic".into(),
            item_count: Some(4),
            time_budget: Some(Duration::from_secs(300)),
            initial_tier: DifficultyTier::Easy,
            item_type: None,
        })
        .await?;

    for n in 1.. {
        let answer = if n == 3 {
            "I am not sure".to_string()
        } else {
            item.expected.final_answer().to_string()
        };
        println!("[{}] {} -> {answer}", item.tier, item.prompt);

        let outcome = match session.submit(answer).await? {
            SubmitReply::Judged(outcome) => outcome,
            SubmitReply::Discarded { reason } => {
                println!("  answer discarded: {reason:?}");
                break;
            }
        };
        println!(
            "  {} ({}), accuracy {:.0}%",
            if outcome.verdict.correct { "correct" } else { "incorrect" },
            outcome.verdict.error_kind,
            outcome.summary.accuracy * 100.0
        );

        match outcome.next {
            NextStep::Item(next) => item = next,
            NextStep::Completed(_) => break,
        }
    }

    let _ = watcher.await;

    if let Some(report) = session.report().await? {
        println!(
            "\nAnswered {} item(s), {}/{} marks, final tier {}",
            report.summary.items_answered,
            report.summary.marks_obtained,
            report.summary.marks_possible,
            report.final_tier
        );
    }

    Ok(())
}
