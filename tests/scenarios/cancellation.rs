//! Test: Cancellation - a cancelled pipeline returns to idle and spawns nothing more

use crate::helpers::*;
use fishtest_runner::core::{PipelineKind, RunState};
use fishtest_runner::execution::{ControllerEvent, PipelineController};
use fishtest_runner::persistence::{ConfigSnapshot, InMemoryConfigStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Process messages until `stage` has started
async fn wait_for_stage(controller: &mut PipelineController, log: &EventLog, stage: usize) {
    let reached = |log: &EventLog| {
        log.count(|e| matches!(e, ControllerEvent::StageStarted { index, .. } if *index == stage)) > 0
    };
    tokio::time::timeout(Duration::from_secs(5), async {
        while !reached(log) {
            assert!(controller.process_next().await);
        }
    })
    .await
    .expect("stage never started");
}

#[tokio::test]
async fn test_cancel_first_stage() {
    let dir = TempDir::new().unwrap();
    let launcher = Arc::new(MockLauncher::new(vec![
        ScriptedProcess::runs_until_killed(&["downloading"]),
        ScriptedProcess::exits_with(&[]),
        ScriptedProcess::exits_with(&[]),
    ]));
    let (mut controller, log) = controller_with(launcher.clone(), InMemoryConfigStore::new(), dir.path());

    controller
        .start(PipelineKind::ToolchainProvision, ConfigSnapshot::default())
        .unwrap();
    controller.cancel().await;

    assert_eq!(controller.state(), RunState::Cancelling { stage: 0 });

    settle(&mut controller).await;

    assert_eq!(controller.state(), RunState::Idle);
    assert_eq!(launcher.kill_count(), 1);
    assert_eq!(launcher.launched(), vec!["environment installer"]);
    assert_eq!(
        log.count(|e| matches!(
            e,
            ControllerEvent::PipelineCancelled {
                kind: PipelineKind::ToolchainProvision
            }
        )),
        1
    );
    assert_eq!(log.count(|e| matches!(e, ControllerEvent::PipelineComplete { .. })), 0);
}

#[tokio::test]
async fn test_cancel_mid_pipeline_skips_remaining_stages() {
    let dir = TempDir::new().unwrap();
    let launcher = Arc::new(MockLauncher::new(vec![
        ScriptedProcess::exits_with(&["installer done"]),
        ScriptedProcess::runs_until_killed(&["Installing msys2"]),
        ScriptedProcess::exits_with(&["never printed"]),
    ]));
    let store = InMemoryConfigStore::new();
    let (mut controller, log) = controller_with(launcher.clone(), store.clone(), dir.path());

    controller
        .start(PipelineKind::ToolchainProvision, ConfigSnapshot::default())
        .unwrap();
    wait_for_stage(&mut controller, &log, 1).await;

    controller.cancel().await;
    settle(&mut controller).await;

    assert_eq!(controller.state(), RunState::Idle);
    assert_eq!(
        launcher.launched(),
        vec!["environment installer", "build environment"]
    );
    assert!(!log.lines().contains(&"never printed".to_string()));
    assert_eq!(log.count(|e| matches!(e, ControllerEvent::PipelineCancelled { .. })), 1);
    assert_eq!(store.snapshot().settings.install_path, None);
}

#[tokio::test]
async fn test_second_cancel_is_ignored() {
    let dir = TempDir::new().unwrap();
    let launcher = Arc::new(MockLauncher::new(vec![ScriptedProcess::runs_until_killed(&[])]));
    let (mut controller, log) = controller_with(launcher.clone(), InMemoryConfigStore::new(), dir.path());

    controller
        .start(PipelineKind::ToolchainProvision, ConfigSnapshot::default())
        .unwrap();
    controller.cancel().await;
    controller.cancel().await;
    settle(&mut controller).await;

    assert_eq!(launcher.kill_count(), 1);
    assert_eq!(log.count(|e| matches!(e, ControllerEvent::PipelineCancelled { .. })), 1);

    // Cancelling again once idle changes nothing
    controller.cancel().await;
    assert!(controller.is_settled());
    assert_eq!(log.count(|e| matches!(e, ControllerEvent::PipelineCancelled { .. })), 1);
}

#[tokio::test]
async fn test_shutdown_stops_worker() {
    let dir = TempDir::new().unwrap();
    let toolchain = TempDir::new().unwrap();
    let launcher = Arc::new(MockLauncher::new(vec![ScriptedProcess::runs_until_killed(&[
        "Worker version 1 connecting",
    ])]));
    let (mut controller, log) = controller_with(launcher.clone(), InMemoryConfigStore::new(), dir.path());

    controller
        .start(PipelineKind::WorkerRun, worker_config(toolchain.path()))
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), controller.shutdown())
        .await
        .expect("shutdown hung");

    assert!(controller.is_settled());
    assert_eq!(launcher.kill_count(), 1);
    assert_eq!(
        log.count(|e| matches!(e, ControllerEvent::PipelineCancelled { kind: PipelineKind::WorkerRun })),
        1
    );
}
