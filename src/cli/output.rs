//! CLI output formatting

use crate::{
    core::{RunReport, RunStatus, StageState},
    execution::ExecutionEvent,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Progress bar over the stages of a run
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    if let Ok(bar_style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        progress.set_style(bar_style.progress_chars("#>-"));
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a stage state for display
pub fn format_stage_state(state: &StageState) -> String {
    match state {
        StageState::Pending => style("PENDING").dim().to_string(),
        StageState::Ready => style("READY").cyan().to_string(),
        StageState::Running { .. } => style("RUNNING").yellow().to_string(),
        StageState::Succeeded { .. } => style("SUCCEEDED").green().to_string(),
        StageState::Failed { reason, .. } => format!("{} ({})", style("FAILED").red(), reason),
        StageState::Skipped { reason } => format!("{} ({})", style("SKIPPED").dim(), reason),
    }
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted {
            run_id,
            pipeline_name,
            stages,
        } => format!(
            "{} Starting pipeline {} with {} stages ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(stages).cyan(),
            style(&run_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::StageReady { stage } => format!("{} {} ready", INFO, style(stage).dim()),
        ExecutionEvent::StageStarted { stage } => format!("{} {}", SPINNER, style(stage).cyan()),
        ExecutionEvent::StageSucceeded { stage } => format!("{} {}", CHECK, style(stage).green()),
        ExecutionEvent::StageFailed { stage, reason } => {
            format!("{} {}: {}", CROSS, style(stage).red(), style(reason).dim())
        }
        ExecutionEvent::StageSkipped { stage, reason } => {
            format!("{} {} skipped: {}", WARN, style(stage).yellow(), style(reason).dim())
        }
        ExecutionEvent::RunFinished { run_id, status } => format!(
            "{} Run ({}) {}",
            INFO,
            style(&run_id.to_string()[..8]).dim(),
            format_status(*status)
        ),
    }
}

/// Final summary: one line per stage that did not succeed
pub fn format_report(report: &RunReport) -> String {
    let icon = if report.is_success() { CHECK } else { CROSS };
    let mut out = format!(
        "{} {} {} - {}/{} stages succeeded",
        icon,
        style(&report.pipeline_name).bold(),
        format_status(report.status),
        report.succeeded().len(),
        report.stages.len()
    );
    if report.cancelled {
        out.push_str(&format!(" {}", style("(cancelled)").yellow()));
    }
    if let Ok(duration) = report.finished_at.signed_duration_since(report.started_at).to_std() {
        out.push_str(&format!(" in {}", style(format_duration(duration)).dim()));
    }
    for outcome in report.non_succeeded() {
        out.push_str(&format!(
            "\n  {} {}",
            style(&outcome.name).bold(),
            format_stage_state(&outcome.state)
        ));
    }
    out
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
