//! CLI output formatting

use crate::{
    core::{PipelineKind, StatsSnapshot},
    execution::ControllerEvent,
    process::StreamKind,
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
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar over pipeline stages
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format one log line
pub fn format_line(stream: StreamKind, text: &str) -> String {
    match stream {
        StreamKind::Stdout => text.to_string(),
        StreamKind::Stderr => style(text).yellow().to_string(),
    }
}

/// Format counters for display
pub fn format_stats(stats: &StatsSnapshot) -> String {
    format!(
        "games {} (lifetime {}), tasks {} (lifetime {})",
        style(stats.session_games).cyan(),
        style(stats.lifetime_games).dim(),
        style(stats.session_tasks).cyan(),
        style(stats.lifetime_tasks).dim()
    )
}

/// Format a controller event for display
pub fn format_controller_event(event: &ControllerEvent) -> String {
    match event {
        ControllerEvent::PipelineStarted { run_id, kind } => format!(
            "{} Starting {} ({})",
            ROCKET,
            style(kind).bold(),
            style(&run_id.to_string()[..8]).dim()
        ),
        ControllerEvent::StageStarted {
            index,
            total,
            label,
            started_at,
        } => format!(
            "{} [{}/{}] {} {}",
            SPINNER,
            style(index + 1).cyan(),
            style(total).dim(),
            style(label).bold(),
            style(started_at.format("%H:%M:%S")).dim()
        ),
        ControllerEvent::Line { stream, text } => format_line(*stream, text),
        ControllerEvent::StatsChanged(stats) => format!("{} {}", INFO, format_stats(stats)),
        ControllerEvent::PipelineComplete { kind, result } => match (kind, result) {
            (PipelineKind::ToolchainProvision, Some(path)) => format!(
                "{} Toolchain installed at {}",
                CHECK,
                style(path.display()).green()
            ),
            _ => format!("{} {} {}", CHECK, style(kind).bold(), style("finished").green()),
        },
        ControllerEvent::PipelineCancelled { kind } => {
            format!("{} {} {}", WARN, style(kind).bold(), style("cancelled").yellow())
        }
        ControllerEvent::StageFailed { index, error } => format!(
            "{} Stage {} failed: {}",
            CROSS,
            style(index + 1).red(),
            style(error).dim()
        ),
    }
}

/// Format a duration compactly
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
