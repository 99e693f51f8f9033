//! Output formatting for campus-market.
//!
//! Every command renders either colored text for humans or pretty JSON for
//! scripts.

use chrono::Utc;
use colored::Colorize;
use serde::Serialize;

use crate::error::MarketError;
use crate::features::sync::{DrainOutcome, DrainReport, QueuedMutation};

/// Generic JSON formatter for any serializable type.
///
/// # Errors
///
/// Returns `MarketError::Parse` if JSON serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, MarketError> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Human-readable age such as `3 hours ago`.
#[must_use]
pub fn format_age(entry: &QueuedMutation) -> String {
    let Some(at) = entry.enqueued_at_utc() else {
        return "unknown".to_string();
    };

    let age = Utc::now().signed_duration_since(at);
    if age.num_days() > 0 {
        format!("{} days ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{} hours ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{} minutes ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}

/// Table of queued mutations in replay order.
#[must_use]
pub fn format_queue_pretty(entries: &[QueuedMutation], limit: usize) -> String {
    if entries.is_empty() {
        return "Offline queue is empty.".to_string();
    }

    let mut lines = Vec::new();
    lines.push(format!("Offline Queue ({})", entries.len()).bold().to_string());
    lines.push("─".repeat(64));
    lines.push(format!(
        "{:<4} {:<24} {:<20} {}",
        "#", "Mutation", "Resource", "Queued"
    ));
    lines.push("─".repeat(64));

    for (index, entry) in entries.iter().enumerate().take(limit) {
        let queued = entry
            .enqueued_at_utc()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();

        lines.push(format!(
            "{:<4} {:<24} {:<20} {}",
            index,
            entry.mutation.label(),
            entry.mutation.resource_id().unwrap_or("(new)"),
            queued.dimmed()
        ));
    }

    if entries.len() > limit {
        lines.push(
            format!("... and {} more", entries.len() - limit)
                .dimmed()
                .to_string(),
        );
    }

    lines.join("\n")
}

/// Summary of a drain pass.
#[must_use]
pub fn format_drain_report(report: &DrainReport) -> String {
    let mut lines = Vec::new();

    match report.outcome {
        DrainOutcome::Offline => {
            lines.push(format!(
                "{} Backend unreachable, nothing sent ({} queued)",
                "○".yellow(),
                report.remaining
            ));
        },
        DrainOutcome::AlreadyRunning => {
            lines.push(format!("{} A sync pass is already running", "○".yellow()));
        },
        DrainOutcome::Empty => {
            lines.push("No pending mutations to sync.".to_string());
        },
        DrainOutcome::Completed | DrainOutcome::Halted => {
            lines.push(format!("Sync pass: {} of {} applied", report.applied, report.snapshot));
            lines.push("─".repeat(40));
            if report.applied > 0 {
                lines.push(format!(
                    "  {} {}",
                    "✓".green(),
                    format!("{} applied", report.applied).green()
                ));
            }
            if let Some(failure) = &report.failure {
                lines.push(format!(
                    "  {} {}",
                    "✗".red(),
                    format!("#{} {} failed", failure.index, failure.mutation).red()
                ));
                lines.push(format!("    {}", failure.error.dimmed()));
            }
            if report.remaining > 0 {
                lines.push(format!(
                    "  {} {} still queued",
                    "○".yellow(),
                    report.remaining
                ));
            }
        },
    }

    lines.join("\n")
}
