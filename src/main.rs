use anyhow::{Context, Result};
use fishtest_runner::cli::commands::{ProvisionCommand, RunCommand, StatsCommand};
use fishtest_runner::cli::output::*;
use fishtest_runner::cli::supervise::{interrupt_channel, supervise, Supervision};
use fishtest_runner::cli::{Cli, Command};
use fishtest_runner::core::{InstallLayout, PipelineKind};
use fishtest_runner::execution::{ControllerEvent, PipelineController};
use fishtest_runner::persistence::{ConfigStore, IniConfigStore, Runtime};
use fishtest_runner::process::SystemLauncher;
use std::sync::Arc;
use std::time::Instant;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let layout = InstallLayout::with_default_path();
    layout
        .ensure_storage_dir()
        .with_context(|| format!("Failed to create {}", layout.storage_dir().display()))?;

    let config_path = cli
        .config
        .clone()
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| layout.config_path());
    let mut store = IniConfigStore::new(config_path);
    store
        .ensure_exists()
        .context("Failed to create configuration file")?;

    match &cli.command {
        Command::Provision(cmd) => provision(cmd, layout, store).await?,
        Command::Run(cmd) => run_worker(cmd, layout, store).await?,
        Command::Stats(cmd) => show_stats(cmd, &store)?,
    }

    Ok(())
}

async fn provision(cmd: &ProvisionCommand, layout: InstallLayout, store: IniConfigStore) -> Result<()> {
    let config = store.load().context("Failed to load configuration")?;

    if let Some(existing) = layout.resolve_toolchain(config.settings.install_path.as_deref()) {
        if !cmd.force {
            println!(
                "{} Toolchain already available at {} (use --force to reinstall)",
                INFO,
                style(existing.display()).bold()
            );
            return Ok(());
        }
    }

    println!("{} This may take 5-10 minutes.", WARN);

    let mut controller = PipelineController::new(Arc::new(SystemLauncher::new()), Box::new(store), layout)
        .context("Failed to initialize pipeline controller")?;

    let progress = create_progress_bar(3);
    let bar = progress.clone();
    controller.add_event_handler(move |event| match &event {
        ControllerEvent::StageStarted { index, label, .. } => {
            bar.set_position(*index as u64);
            bar.set_message(label.clone());
        }
        ControllerEvent::Line { .. } | ControllerEvent::StageFailed { .. } => {
            bar.println(format_controller_event(&event));
        }
        ControllerEvent::PipelineComplete { .. } | ControllerEvent::PipelineCancelled { .. } => {
            bar.finish_and_clear();
            println!("{}", format_controller_event(&event));
        }
        _ => {}
    });

    controller.start(PipelineKind::ToolchainProvision, config)?;
    run_supervised(&mut controller).await;
    progress.finish_and_clear();

    Ok(())
}

async fn run_worker(cmd: &RunCommand, layout: InstallLayout, store: IniConfigStore) -> Result<()> {
    let mut config = store.load().context("Failed to load configuration")?;
    cmd.apply_to(&mut config);
    config.runtime.validate()?;

    if !layout.worker_dir().is_dir() {
        anyhow::bail!(
            "Worker not found at {}; unpack the Fishtest sources there first",
            layout.worker_dir().display()
        );
    }

    let mut controller = PipelineController::new(Arc::new(SystemLauncher::new()), Box::new(store), layout)
        .context("Failed to initialize pipeline controller")?;
    controller.add_event_handler(|event| println!("{}", format_controller_event(&event)));

    let started = Instant::now();
    controller.start(PipelineKind::WorkerRun, config)?;
    run_supervised(&mut controller).await;

    println!(
        "{} Session: {} in {}",
        INFO,
        format_stats(&controller.stats()),
        format_duration(started.elapsed())
    );

    Ok(())
}

/// Drive the controller on Ctrl-C, reporting streams left behind
async fn run_supervised(controller: &mut PipelineController) {
    let mut interrupts = interrupt_channel();
    if supervise(controller, &mut interrupts).await == Supervision::Abandoned {
        println!("{} Stopped without waiting for the remaining output", WARN);
    }
}

fn show_stats(cmd: &StatsCommand, store: &IniConfigStore) -> Result<()> {
    let config = store.load().context("Failed to load configuration")?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&config.stats)?);
        return Ok(());
    }

    println!("{} Lifetime statistics:", INFO);
    println!("  Games: {}", style(config.stats.games).cyan());
    println!("  Tasks: {}", style(config.stats.tasks).cyan());
    println!(
        "  Concurrency: {} (max {})",
        style(config.runtime.concurrency).dim(),
        Runtime::max_concurrency()
    );

    Ok(())
}
