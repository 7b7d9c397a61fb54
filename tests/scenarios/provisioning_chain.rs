//! Test: Provisioning Chain - three stages run in order and record the toolchain

use crate::helpers::*;
use fishtest_runner::core::{PipelineKind, RunState};
use fishtest_runner::execution::ControllerEvent;
use fishtest_runner::persistence::{ConfigSnapshot, InMemoryConfigStore};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_stages_run_in_order() {
    let dir = TempDir::new().unwrap();
    let launcher = Arc::new(MockLauncher::new(vec![
        ScriptedProcess::exits_with(&["Chocolatey installed", "done"]),
        ScriptedProcess::exits_with(&["Installing msys2"]),
        ScriptedProcess::exits_with(&["resolving dependencies...", "installing gcc"]),
    ]));
    let store = InMemoryConfigStore::new();
    let (mut controller, log) = controller_with(launcher.clone(), store.clone(), dir.path());

    controller
        .start(PipelineKind::ToolchainProvision, ConfigSnapshot::default())
        .unwrap();
    settle(&mut controller).await;

    assert_eq!(controller.state(), RunState::Idle);
    assert_eq!(
        launcher.launched(),
        vec!["environment installer", "build environment", "packages"]
    );
    assert_eq!(
        log.lines(),
        vec![
            "Chocolatey installed",
            "done",
            "Installing msys2",
            "resolving dependencies...",
            "installing gcc"
        ]
    );

    let started: Vec<usize> = log
        .events()
        .iter()
        .filter_map(|e| match e {
            ControllerEvent::StageStarted { index, total, .. } => {
                assert_eq!(*total, 3);
                Some(*index)
            }
            _ => None,
        })
        .collect();
    assert_eq!(started, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_completion_persists_toolchain_path() {
    let dir = TempDir::new().unwrap();
    let launcher = Arc::new(MockLauncher::new(vec![
        ScriptedProcess::exits_with(&["a"]),
        ScriptedProcess::exits_with(&["b"]),
        ScriptedProcess::exits_with(&["c"]),
    ]));
    let store = InMemoryConfigStore::new();
    let (mut controller, log) = controller_with(launcher, store.clone(), dir.path());

    controller
        .start(PipelineKind::ToolchainProvision, ConfigSnapshot::default())
        .unwrap();
    settle(&mut controller).await;

    let expected = dir.path().join("msys64");
    let completions: Vec<_> = log
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ControllerEvent::PipelineComplete { kind, result } => Some((kind, result)),
            _ => None,
        })
        .collect();
    assert_eq!(
        completions,
        vec![(PipelineKind::ToolchainProvision, Some(expected.clone()))]
    );

    // One write at start, one on completion
    assert_eq!(store.full_writes(), 2);
    assert_eq!(store.snapshot().settings.install_path, Some(expected.clone()));
    assert_eq!(controller.config().settings.install_path, Some(expected));
}

#[tokio::test]
async fn test_blank_lines_are_not_forwarded() {
    let dir = TempDir::new().unwrap();
    let launcher = Arc::new(MockLauncher::new(vec![
        ScriptedProcess::exits_with(&["first", "", "   ", "second"]),
        ScriptedProcess::exits_with(&[]),
        ScriptedProcess::exits_with(&[]),
    ]));
    let (mut controller, log) = controller_with(launcher, InMemoryConfigStore::new(), dir.path());

    controller
        .start(PipelineKind::ToolchainProvision, ConfigSnapshot::default())
        .unwrap();
    settle(&mut controller).await;

    assert_eq!(log.lines(), vec!["first", "second"]);
    assert_eq!(
        log.count(|e| matches!(e, ControllerEvent::PipelineComplete { .. })),
        1
    );
}
