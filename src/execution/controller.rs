//! Pipeline controller - chains stages and owns the run state
//!
//! The controller is driven by a single task. Streamer tasks never touch its
//! state; they post [`StageMessage`]s which the driving task drains through
//! [`PipelineController::process_next`]. Stage advancement is a transition on
//! [`RunState`] triggered by the `Closed` message of the active stage's
//! standard output.

use crate::{
    core::{InstallLayout, PipelineKind, PipelinePlan, PlanError, RunState, StatsAggregator, StatsSnapshot},
    execution::runner::{ActiveStage, StageMessage, StageRunner, StageToken},
    persistence::{ConfigError, ConfigSnapshot, ConfigStore},
    process::{ProcessLauncher, SpawnError, StreamEnd, StreamKind},
};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Errors returned synchronously by controller operations
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("A pipeline is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error("Failed to save configuration: {0}")]
    Persist(#[from] ConfigError),

    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// Events surfaced to the UI collaborator
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    PipelineStarted {
        run_id: Uuid,
        kind: PipelineKind,
    },
    StageStarted {
        index: usize,
        total: usize,
        label: String,
        started_at: DateTime<Utc>,
    },
    Line {
        stream: StreamKind,
        text: String,
    },
    StatsChanged(StatsSnapshot),
    PipelineComplete {
        kind: PipelineKind,
        result: Option<PathBuf>,
    },
    PipelineCancelled {
        kind: PipelineKind,
    },
    StageFailed {
        index: usize,
        error: SpawnError,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ControllerEvent) + Send + Sync>;

/// Runs one pipeline at a time, one stage at a time
pub struct PipelineController {
    runner: StageRunner,
    rx: UnboundedReceiver<StageMessage>,
    store: Box<dyn ConfigStore>,
    layout: InstallLayout,
    config: ConfigSnapshot,
    stats: StatsAggregator,
    state: RunState,
    plan: Option<PipelinePlan>,
    active: Option<ActiveStage>,
    next_token: StageToken,
    /// First token of the current (or most recent) run
    run_floor: StageToken,
    open_streams: usize,
    event_handlers: Vec<EventHandler>,
}

impl PipelineController {
    /// Create a controller, loading the configuration and lifetime counters
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        store: Box<dyn ConfigStore>,
        layout: InstallLayout,
    ) -> Result<Self, ConfigError> {
        let config = store.load()?;
        let stats = StatsAggregator::new(config.stats);
        let (tx, rx) = mpsc::unbounded_channel();

        Ok(Self {
            runner: StageRunner::new(launcher, tx),
            rx,
            store,
            layout,
            config,
            stats,
            state: RunState::Idle,
            plan: None,
            active: None,
            next_token: 0,
            run_floor: 1,
            open_streams: 0,
            event_handlers: Vec::new(),
        })
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ControllerEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    fn emit_event(&self, event: ControllerEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Configuration as last loaded or persisted
    pub fn config(&self) -> &ConfigSnapshot {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// True once idle and every streamer has reported completion
    pub fn is_settled(&self) -> bool {
        self.state.is_idle() && self.open_streams == 0
    }

    /// Start a pipeline
    ///
    /// Persists `config` (keeping the current lifetime counters), plans the
    /// pipeline and spawns its first stage. A spawn failure leaves the
    /// controller idle.
    pub fn start(
        &mut self,
        kind: PipelineKind,
        config: ConfigSnapshot,
    ) -> Result<Uuid, ControllerError> {
        if !self.state.is_idle() {
            return Err(ControllerError::AlreadyRunning);
        }

        let mut config = config;
        config.stats = self.stats.snapshot().lifetime();
        if kind == PipelineKind::WorkerRun {
            // Remember where the toolchain was found
            if let Some(found) = self.layout.resolve_toolchain(config.settings.install_path.as_deref()) {
                config.settings.install_path = Some(found);
            }
        }
        self.store.persist(&config)?;
        self.config = config;

        let plan = PipelinePlan::build(kind, &self.layout, &self.config)?;
        if kind == PipelineKind::WorkerRun {
            // New worker process, new session
            self.stats = StatsAggregator::new(self.config.stats);
        }
        let run_id = Uuid::new_v4();
        info!("Starting {} pipeline ({}) with {} stages", kind, run_id, plan.len());

        self.plan = Some(plan);
        self.run_floor = self.next_token + 1;
        self.state = RunState::Running { stage: 0 };
        self.emit_event(ControllerEvent::PipelineStarted { run_id, kind });

        if let Err(e) = self.spawn_stage(0) {
            error!("Stage 0 of {} pipeline failed to start: {}", kind, e);
            self.finish();
            return Err(e.into());
        }

        Ok(run_id)
    }

    /// Cancel the running pipeline
    ///
    /// No-op when idle. Otherwise marks the controller as cancelling, stops
    /// both streamers and kills the process; the controller becomes idle when
    /// the resulting stdout close is processed.
    pub async fn cancel(&mut self) {
        let stage = match self.state {
            RunState::Idle => return,
            RunState::Cancelling { .. } => return,
            RunState::Running { stage } => stage,
        };

        info!("Cancelling pipeline at stage {}", stage);
        self.state = RunState::Cancelling { stage };

        match self.active.as_mut() {
            Some(active) => {
                active.request_stop();
                active.terminate().await;
            }
            None => {
                // No process left to wait for
                self.finish_cancelled();
            }
        }
    }

    /// Cancel and wait until every streamer has finished
    pub async fn shutdown(&mut self) {
        self.cancel().await;
        self.run_until_settled().await;
    }

    /// Wait for and handle one message from the streamers
    ///
    /// Returns `false` if the message channel is closed.
    pub async fn process_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(msg) => {
                self.handle_message(msg);
                true
            }
            None => false,
        }
    }

    /// Drive the controller until it is idle
    pub async fn run_until_idle(&mut self) {
        while !self.state.is_idle() {
            if !self.process_next().await {
                break;
            }
        }
    }

    /// Drive the controller until it is idle and all streams are drained
    pub async fn run_until_settled(&mut self) {
        while !self.is_settled() {
            if !self.process_next().await {
                break;
            }
        }
    }

    /// Apply one streamer message
    ///
    /// Output of earlier stages of the current run is still delivered while
    /// their streams drain. Output of a previous run is dropped, so it never
    /// shows up in the new run's log or counters.
    pub fn handle_message(&mut self, msg: StageMessage) {
        match msg {
            StageMessage::Line { token, stream, text } => {
                if self.is_previous_run(token) {
                    debug!("Dropping {} line of finished run (stage {}): {}", stream, token, text);
                    return;
                }
                self.emit_event(ControllerEvent::Line { stream, text });
            }
            StageMessage::Observe { token, text } => {
                if !self.is_previous_run(token) {
                    self.observe_line(&text);
                }
            }
            StageMessage::Closed { token, stream, end } => {
                self.open_streams = self.open_streams.saturating_sub(1);
                match &end {
                    StreamEnd::ReadError(e) => warn!("{} of stage {} closed with error: {}", stream, token, e),
                    _ => debug!("{} of stage {} closed: {}", stream, token, end),
                }

                let is_active = self.active.as_ref().is_some_and(|a| a.token == token);
                if stream == StreamKind::Stdout && is_active {
                    self.on_stage_complete();
                }
            }
        }
    }

    fn is_previous_run(&self, token: StageToken) -> bool {
        token < self.run_floor
    }

    fn observe_line(&mut self, line: &str) {
        let Some(snapshot) = self.stats.observe(line) else {
            return;
        };

        self.config.stats = snapshot.lifetime();
        if let Err(e) = self.store.persist_stats(snapshot.lifetime()) {
            warn!("Failed to persist statistics: {}", e);
        }
        self.emit_event(ControllerEvent::StatsChanged(snapshot));
    }

    fn spawn_stage(&mut self, index: usize) -> Result<(), SpawnError> {
        let Some(stage) = self.plan.as_ref().and_then(|p| p.stage(index)).cloned() else {
            return Err(SpawnError::NotFound(format!("stage {}", index)));
        };
        let total = self.plan.as_ref().map_or(0, |p| p.len());

        self.next_token += 1;
        let token = self.next_token;
        let active = self.runner.run(token, &stage)?;

        debug!("Stage {} ({}) started with token {}", index, stage.label, token);
        self.active = Some(active);
        self.open_streams += 2;
        self.emit_event(ControllerEvent::StageStarted {
            index,
            total,
            label: stage.label,
            started_at: Utc::now(),
        });
        Ok(())
    }

    fn on_stage_complete(&mut self) {
        if let Some(active) = self.active.take() {
            active.release();
        }

        match self.state {
            RunState::Idle => {}
            RunState::Cancelling { .. } => self.finish_cancelled(),
            RunState::Running { stage } => {
                let total = self.plan.as_ref().map_or(0, |p| p.len());
                if stage + 1 >= total {
                    self.finish_complete();
                    return;
                }

                let next = stage + 1;
                self.state = RunState::Running { stage: next };
                if let Err(e) = self.spawn_stage(next) {
                    error!("Stage {} failed to start: {}", next, e);
                    self.emit_event(ControllerEvent::StageFailed { index: next, error: e });
                    self.finish();
                }
            }
        }
    }

    fn finish_complete(&mut self) {
        let Some(plan) = self.plan.take() else {
            self.finish();
            return;
        };

        if let (PipelineKind::ToolchainProvision, Some(path)) = (plan.kind, &plan.result) {
            self.config.settings.install_path = Some(path.clone());
            if let Err(e) = self.store.persist(&self.config) {
                warn!("Failed to persist toolchain path: {}", e);
            }
        }

        info!("{} pipeline complete", plan.kind);
        self.finish();
        self.emit_event(ControllerEvent::PipelineComplete {
            kind: plan.kind,
            result: plan.result,
        });
    }

    fn finish_cancelled(&mut self) {
        let kind = self.plan.as_ref().map(|p| p.kind);
        self.finish();
        if let Some(kind) = kind {
            info!("{} pipeline cancelled", kind);
            self.emit_event(ControllerEvent::PipelineCancelled { kind });
        }
    }

    fn finish(&mut self) {
        if let Some(active) = self.active.take() {
            active.release();
        }
        self.plan = None;
        self.state = RunState::Idle;
    }
}
