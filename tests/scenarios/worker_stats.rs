//! Test: Worker Stats - counters follow the worker's output and are persisted per increment

use crate::helpers::*;
use fishtest_runner::core::{LifetimeStats, PipelineKind, StatsSnapshot};
use fishtest_runner::execution::ControllerEvent;
use fishtest_runner::persistence::{ConfigSnapshot, InMemoryConfigStore};
use std::sync::Arc;
use tempfile::TempDir;

fn store_with_lifetime(games: u64, tasks: u64) -> InMemoryConfigStore {
    let mut snapshot = ConfigSnapshot::default();
    snapshot.stats = LifetimeStats { games, tasks };
    InMemoryConfigStore::with_snapshot(snapshot)
}

#[tokio::test]
async fn test_worker_output_updates_counters() {
    let dir = TempDir::new().unwrap();
    let toolchain = TempDir::new().unwrap();
    let launcher = Arc::new(MockLauncher::new(vec![ScriptedProcess::exits_with(&[
        "Finished game 1",
        "Task exited 0",
        "Finished game 2",
    ])]));
    let store = store_with_lifetime(5, 10);
    let (mut controller, log) = controller_with(launcher.clone(), store.clone(), dir.path());

    controller
        .start(PipelineKind::WorkerRun, worker_config(toolchain.path()))
        .unwrap();
    settle(&mut controller).await;

    assert_eq!(launcher.launched(), vec!["worker"]);
    assert_eq!(
        controller.stats(),
        StatsSnapshot {
            session_games: 2,
            session_tasks: 1,
            lifetime_games: 7,
            lifetime_tasks: 11,
        }
    );
    assert_eq!(
        store.stats_history(),
        vec![
            LifetimeStats { games: 6, tasks: 10 },
            LifetimeStats { games: 6, tasks: 11 },
            LifetimeStats { games: 7, tasks: 11 },
        ]
    );
    assert_eq!(store.snapshot().stats, LifetimeStats { games: 7, tasks: 11 });
    assert_eq!(log.count(|e| matches!(e, ControllerEvent::StatsChanged(_))), 3);
    assert_eq!(log.lines().len(), 3);
}

#[tokio::test]
async fn test_unrelated_output_is_not_persisted() {
    let dir = TempDir::new().unwrap();
    let toolchain = TempDir::new().unwrap();
    let launcher = Arc::new(MockLauncher::new(vec![ScriptedProcess::exits_with(&[
        "Worker version 242 connecting to https://tests.stockfishchess.org",
        "Fetching task...",
    ])]));
    let store = store_with_lifetime(5, 10);
    let (mut controller, log) = controller_with(launcher, store.clone(), dir.path());

    controller
        .start(PipelineKind::WorkerRun, worker_config(toolchain.path()))
        .unwrap();
    settle(&mut controller).await;

    assert!(store.stats_history().is_empty());
    assert_eq!(log.count(|e| matches!(e, ControllerEvent::StatsChanged(_))), 0);
    assert_eq!(controller.stats().lifetime(), LifetimeStats { games: 5, tasks: 10 });
}

#[tokio::test]
async fn test_new_worker_run_starts_new_session() {
    let dir = TempDir::new().unwrap();
    let toolchain = TempDir::new().unwrap();
    let launcher = Arc::new(MockLauncher::new(vec![
        ScriptedProcess::exits_with(&["Finished game 1"]),
        ScriptedProcess::exits_with(&["Finished game 1"]),
    ]));
    let store = store_with_lifetime(0, 0);
    let (mut controller, _log) = controller_with(launcher, store.clone(), dir.path());

    for _ in 0..2 {
        controller
            .start(PipelineKind::WorkerRun, worker_config(toolchain.path()))
            .unwrap();
        settle(&mut controller).await;
    }

    let stats = controller.stats();
    assert_eq!(stats.session_games, 1);
    assert_eq!(stats.lifetime_games, 2);
    assert_eq!(store.snapshot().stats.games, 2);
}

#[tokio::test]
async fn test_counter_persist_failure_does_not_stop_worker() {
    let dir = TempDir::new().unwrap();
    let toolchain = TempDir::new().unwrap();
    let launcher = Arc::new(MockLauncher::new(vec![ScriptedProcess::exits_with(&[
        "Finished game 1",
        "Finished game 2",
    ])]));
    let store = store_with_lifetime(0, 0);
    let (mut controller, log) = controller_with(launcher, store.clone(), dir.path());

    controller
        .start(PipelineKind::WorkerRun, worker_config(toolchain.path()))
        .unwrap();
    store.set_fail_writes(true);
    settle(&mut controller).await;

    assert_eq!(controller.stats().session_games, 2);
    assert!(store.stats_history().is_empty());
    assert_eq!(log.count(|e| matches!(e, ControllerEvent::PipelineComplete { .. })), 1);
}
