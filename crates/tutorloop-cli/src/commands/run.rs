//! The `tutorloop run` command.

use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

use tutorloop_core::bank::ItemBank;
use tutorloop_core::model::{DifficultyTier, EndReason, Item, ItemType, SessionMode, SessionStatus};
use tutorloop_core::traits::{option_labels, JudgmentClient};
use tutorloop_core::{
    NextStep, PipelineConfig, SessionError, SessionEvent, SessionHandle, StartRequest,
    SubmitReply, ValidationPipeline,
};
use tutorloop_judges::config::load_config_from;
use tutorloop_judges::offline::OfflineJudge;

use super::summary::print_summary;

#[derive(Args)]
pub struct RunArgs {
    /// Path to item bank .toml file or directory
    #[arg(long)]
    pub bank: PathBuf,

    /// Topic to practise
    #[arg(long)]
    pub topic: String,

    /// Session mode: practice, exam, freeform
    #[arg(long, default_value = "practice")]
    pub mode: SessionMode,

    /// Difficulty of the first item: easy, medium, advanced
    #[arg(long, default_value = "easy")]
    pub tier: DifficultyTier,

    /// Item type; defaults from the mode
    #[arg(long = "type")]
    pub item_type: Option<ItemType>,

    /// Number of items to answer
    #[arg(long)]
    pub items: Option<u32>,

    /// Time budget in seconds
    #[arg(long)]
    pub time_limit: Option<u64>,

    /// Judge provider from the config file
    #[arg(long)]
    pub provider: Option<String>,

    /// Judge model
    #[arg(long)]
    pub model: Option<String>,

    /// Grade with local heuristics only
    #[arg(long)]
    pub offline: bool,

    /// Output directory for the session report
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    anyhow::ensure!(args.items != Some(0), "--items must be at least 1");
    anyhow::ensure!(args.time_limit != Some(0), "--time-limit must be at least 1 second");

    let config = load_config_from(args.config.as_deref())?;
    let bank = ItemBank::load(&args.bank)?;

    let judge: Arc<dyn JudgmentClient> = if args.offline {
        Arc::new(OfflineJudge)
    } else if args.provider.is_some() {
        config.judge(args.provider.as_deref())?
    } else {
        match config.judge(None) {
            Ok(judge) => judge,
            Err(e) => {
                eprintln!("Warning: {e:#}. Grading with local heuristics only.");
                Arc::new(OfflineJudge)
            }
        }
    };

    let mut pipeline_config: PipelineConfig = config.pipeline.clone();
    if let Some(model) = &args.model {
        pipeline_config.model = model.clone();
    } else if pipeline_config.model.is_empty() {
        pipeline_config.model = config.default_model.clone();
    }
    let judge_name = judge.name().to_string();
    let pipeline = ValidationPipeline::new(judge, pipeline_config);
    let session = SessionHandle::spawn(pipeline, Arc::new(bank), config.session.clone());
    let mut events = session.subscribe();

    let request = StartRequest {
        mode: args.mode,
        topic: args.topic.clone(),
        item_count: args.items,
        time_budget: args.time_limit.map(Duration::from_secs),
        initial_tier: args.tier,
        item_type: args.item_type,
    };

    eprintln!(
        "tutorloop v{}: {} session on '{}' (judge: {judge_name})",
        env!("CARGO_PKG_VERSION"),
        args.mode,
        args.topic
    );
    println!("Commands: :pause :resume :status :end (or end of input)\n");

    let first = session.start(request).await?;
    let mut number = 1;
    print_item(number, &first);

    // Answers typed while one is being graded wait their turn; commands do not.
    let (replies_tx, mut replies) = mpsc::unbounded_channel();
    let mut queued: VecDeque<String> = VecDeque::new();
    let mut grading = false;
    let mut input_open = true;
    let mut lines = spawn_stdin_reader();
    loop {
        if !grading {
            if let Some(answer) = queued.pop_front() {
                let pending = session.enqueue_submit(answer).await?;
                let replies_tx = replies_tx.clone();
                tokio::spawn(async move {
                    let _ = replies_tx.send(pending.reply().await);
                });
                grading = true;
            } else if !input_open {
                break;
            }
        }

        tokio::select! {
            line = lines.recv(), if input_open => {
                let Some(line) = line else {
                    input_open = false;
                    continue;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if !line.starts_with(':') {
                    queued.push_back(line.to_string());
                    continue;
                }
                match handle_command(&session, line, number).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(SessionError::ControllerClosed) => {
                        anyhow::bail!("session controller stopped unexpectedly")
                    }
                    Err(e) => println!("{e}"),
                }
            }
            Some(reply) = replies.recv() => {
                grading = false;
                match reply {
                    Ok(reply) => {
                        if !show_reply(reply, &mut number) {
                            break;
                        }
                    }
                    Err(SessionError::ControllerClosed) => {
                        anyhow::bail!("session controller stopped unexpectedly")
                    }
                    Err(e) => println!("{e}"),
                }
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Completed { reason: EndReason::TimeExpired, .. }) => {
                    println!("\nTime is up.");
                    break;
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    if grading {
        match replies.recv().await {
            Some(Ok(reply)) => {
                show_reply(reply, &mut number);
            }
            Some(Err(e)) => println!("{e}"),
            None => {}
        }
    }

    if session.snapshot().await?.status != SessionStatus::Completed {
        session.end().await?;
    }

    let Some(report) = session.report().await? else {
        return Ok(());
    };
    print_summary(&report);

    let output = args.output.unwrap_or(config.output_dir);
    let path = output.join(report.file_name());
    report.save_json(&path)?;
    eprintln!("Report saved to: {}", path.display());

    Ok(())
}

/// Read stdin on a plain thread so a pending read never holds up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Apply one `:command` line. Returns `false` once the session is over.
async fn handle_command(
    session: &SessionHandle,
    line: &str,
    number: u32,
) -> Result<bool, SessionError> {
    match line {
        ":pause" => {
            session.pause().await?;
            println!("Paused. Type :resume to continue.");
        }
        ":resume" => {
            session.resume().await?;
            if let Some(item) = session.snapshot().await?.current_item {
                print_item(number, &item);
            }
        }
        ":status" => {
            let snapshot = session.snapshot().await?;
            let remaining = snapshot
                .time_remaining_ms
                .map(|ms| format!(", {}s left", ms / 1000))
                .unwrap_or_default();
            println!(
                "{} | tier {} | {}/{} marks ({:.0}%) | {} answered{remaining}",
                snapshot.status,
                snapshot.tier.map(|t| t.to_string()).unwrap_or_default(),
                snapshot.summary.marks_obtained,
                snapshot.summary.marks_possible,
                snapshot.summary.accuracy * 100.0,
                snapshot.summary.items_answered,
            );
        }
        ":end" => {
            session.end().await?;
            return Ok(false);
        }
        other => println!("Unknown command {other}. Try :pause, :resume, :status or :end."),
    }
    Ok(true)
}

/// Print a verdict and what follows it. Returns `false` once the session is over.
fn show_reply(reply: SubmitReply, number: &mut u32) -> bool {
    match reply {
        SubmitReply::Judged(outcome) => {
            let mark = if outcome.verdict.correct { "Correct" } else { "Incorrect" };
            println!("{mark} ({}). {}", outcome.verdict.error_kind, outcome.verdict.feedback);
            if let Some(event) = &outcome.remediation {
                println!(
                    "Remediation suggested: {} conceptual errors in a row on '{}'. Consider reviewing the topic.",
                    event.streak, event.topic
                );
            }
            match outcome.next {
                NextStep::Item(item) => {
                    *number += 1;
                    print_item(*number, &item);
                }
                NextStep::Completed(reason) => {
                    println!("\nSession complete: {reason}.");
                    return false;
                }
            }
        }
        SubmitReply::Discarded { reason } => {
            println!("Answer discarded ({reason:?}).");
        }
    }
    true
}

fn print_item(number: u32, item: &Item) {
    println!("\nQuestion {number} [{}] ({})", item.tier, item.topic);
    println!("{}", item.prompt.trim());
    for (option, label) in item.options.iter().zip(option_labels()) {
        println!("  {label}) {option}");
    }
    print!("> ");
    let _ = std::io::stdout().flush();
}
