//! CLI output formatting

use crate::{
    core::ExecutionStatus,
    execution::ExecutionEvent,
    persistence::{ExecutionSummary, StepSummary},
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
pub static PACKAGE: Emoji<'_, '_> = Emoji("📦 ", "+ ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Create a progress bar
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    if let Ok(bar_style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        progress.set_style(bar_style.progress_chars("#>-"));
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Horizontal rule sized to the terminal
pub fn separator() -> String {
    let width = term_size::dimensions_stdout()
        .map(|(w, _)| w.min(100))
        .unwrap_or(80);
    "─".repeat(width)
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::NotTriggered => style("NOT TRIGGERED").dim().to_string(),
    }
}

/// Format a recorded step for display
pub fn format_step_summary(step: &StepSummary) -> String {
    let icon = if step.state == "Succeeded" { CHECK } else { CROSS };
    let exit = step
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{}{:>2}. {} (exit {}, {})",
        icon,
        step.index + 1,
        style(&step.step_id).bold(),
        exit,
        style(format_duration(Duration::from_millis(step.duration_ms.max(0) as u64))).dim()
    )
}

/// Format execution summary for display
pub fn format_execution_summary(summary: &ExecutionSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        _ => INFO,
    };

    format!(
        "{} {} - {} [{}] - {} ({}/{})",
        status_icon,
        style(&summary.execution_id.to_string()[..8]).dim(),
        style(&summary.pipeline_name).bold(),
        summary.branch.as_deref().unwrap_or("manual"),
        format_status(summary.status),
        summary.completed_steps,
        summary.total_steps,
    )
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
            total_steps,
        } => format!(
            "{} Starting pipeline {} ({}, {} steps)",
            ROCKET,
            style(pipeline_name).bold(),
            style(&execution_id.to_string()[..8]).dim(),
            total_steps
        ),
        ExecutionEvent::PipelineNotTriggered {
            pipeline_name,
            branch,
        } => format!(
            "{} {} is not triggered by {}",
            INFO,
            style(pipeline_name).bold(),
            style(branch.as_deref().unwrap_or("a manual run")).cyan()
        ),
        ExecutionEvent::StepStarted {
            index,
            step_id,
            command,
        } => format!(
            "{} [{}] {} {}",
            SPINNER,
            index + 1,
            style(step_id).cyan(),
            style(format!("$ {}", command)).dim()
        ),
        ExecutionEvent::StepSucceeded { step_id, .. } => {
            format!("{} {}", CHECK, style(step_id).green())
        }
        ExecutionEvent::StepFailed {
            step_id,
            error,
            output,
            ..
        } => {
            let mut line = format!("{} {}: {}", CROSS, style(step_id).red(), style(error).dim());
            if !output.trim().is_empty() {
                line.push('\n');
                line.push_str(&format_output(output.trim_end(), 20));
            }
            line
        }
        ExecutionEvent::StepSkipped { step_id, .. } => {
            format!("{} {} (skipped)", SKIP, style(step_id).dim())
        }
        ExecutionEvent::ArtifactPublished { file, key, .. } => format!(
            "{} {} → {}",
            PACKAGE,
            style(file).dim(),
            style(key).cyan()
        ),
        ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        } => {
            let status_str = match status {
                ExecutionStatus::Completed => format!("{} completed", style("successfully").green()),
                ExecutionStatus::Failed => style("failed").red().to_string(),
                other => format_status(*other),
            };
            format!(
                "{} Pipeline ({}) {}",
                INFO,
                style(&execution_id.to_string()[..8]).dim(),
                status_str
            )
        }
    }
}

/// Format step output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let hidden = lines.len() - max_lines;
        let tail = lines[hidden..].join("\n");
        format!(
            "{}... ({} earlier lines)\n{}",
            style("[truncated]").dim(),
            hidden,
            tail
        )
    }
}

/// Human-friendly duration
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
