//! The `tutorloop summary` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use tutorloop_core::report::SessionReport;

pub fn execute(report_path: PathBuf, format: String) -> Result<()> {
    let report = SessionReport::load_json(&report_path)?;

    match format.as_str() {
        "text" => print_summary(&report),
        "json" => println!("{}", serde_json::to_string_pretty(&report.summary)?),
        other => anyhow::bail!("unknown format: {other} (expected text or json)"),
    }

    Ok(())
}

/// Print the score table and error breakdown of a session.
pub fn print_summary(report: &SessionReport) {
    let summary = &report.summary;

    println!("\nSession {} ({} on '{}')", report.id, report.mode, report.topic);
    if let Some(reason) = report.end_reason {
        println!("Ended: {reason}");
    }
    println!(
        "Score: {}/{} marks ({:.1}%), {}/{} correct, avg {:.1}s per answer",
        summary.marks_obtained,
        summary.marks_possible,
        summary.accuracy * 100.0,
        summary.items_correct,
        summary.items_answered,
        summary.average_time_ms / 1000.0,
    );

    let path: Vec<String> = report.tier_path().iter().map(|t| t.to_string()).collect();
    if !path.is_empty() {
        println!("Tiers: {}", path.join(" -> "));
    }

    if !summary.per_topic.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Topic", "Correct", "Marks", "Accuracy"]);
        for (topic, stats) in &summary.per_topic {
            table.add_row(vec![
                Cell::new(topic),
                Cell::new(format!("{}/{}", stats.correct, stats.total)),
                Cell::new(format!("{}/{}", stats.marks_obtained, stats.marks_possible)),
                Cell::new(format!("{:.1}%", stats.accuracy * 100.0)),
            ]);
        }
        println!("\n{table}");
    }

    let errors = report.errors_by_kind();
    if !errors.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Error kind", "Count"]);
        for (kind, count) in &errors {
            table.add_row(vec![Cell::new(kind), Cell::new(count)]);
        }
        println!("\n{table}");
    }

    let heuristic = report.heuristic_verdicts();
    if heuristic > 0 {
        println!("{heuristic} answer(s) graded by local heuristics.");
    }
    if !report.remediation_events.is_empty() {
        println!(
            "Remediation suggested {} time(s).",
            report.remediation_events.len()
        );
    }
}
