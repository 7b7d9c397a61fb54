//! Test: Stream Completion - only the stdout close of a stage advances the pipeline

use crate::helpers::*;
use fishtest_runner::core::{PipelineKind, RunState};
use fishtest_runner::execution::ControllerEvent;
use fishtest_runner::persistence::{ConfigSnapshot, InMemoryConfigStore};
use fishtest_runner::process::StreamKind;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

#[tokio::test]
async fn test_stderr_close_does_not_advance_stage() {
    let dir = TempDir::new().unwrap();
    let gate = Arc::new(Notify::new());
    let launcher = Arc::new(MockLauncher::new(vec![
        ScriptedProcess::stderr_closes_first(&["downloading"], &["warning: slow mirror"], gate.clone()),
        ScriptedProcess::exits_with(&["msys2 installed"]),
        ScriptedProcess::exits_with(&["packages installed"]),
    ]));
    let (mut controller, log) = controller_with(launcher.clone(), InMemoryConfigStore::new(), dir.path());

    controller
        .start(PipelineKind::ToolchainProvision, ConfigSnapshot::default())
        .unwrap();
    drain_for(&mut controller, Duration::from_millis(200)).await;

    // stderr has finished, stdout is still open
    assert_eq!(controller.state(), RunState::Running { stage: 0 });
    assert!(!controller.is_settled());
    assert_eq!(launcher.launched(), vec!["environment installer"]);
    assert_eq!(log.count(|e| matches!(e, ControllerEvent::StageStarted { .. })), 1);
    assert_eq!(
        log.count(|e| matches!(
            e,
            ControllerEvent::Line { stream: StreamKind::Stderr, text } if text == "warning: slow mirror"
        )),
        1
    );

    gate.notify_one();
    settle(&mut controller).await;

    assert_eq!(
        launcher.launched(),
        vec!["environment installer", "build environment", "packages"]
    );
    assert_eq!(log.count(|e| matches!(e, ControllerEvent::PipelineComplete { .. })), 1);
    let lines = log.lines();
    assert_eq!(lines.len(), 4);
    assert!(lines[..2].contains(&"warning: slow mirror".to_string()));
    assert!(lines[..2].contains(&"downloading".to_string()));
    assert_eq!(lines[2..], ["msys2 installed", "packages installed"]);
}
