//! Worker statistics derived from log lines

use serde::{Deserialize, Serialize};

/// Marker the worker prints when a game has been played
pub const GAME_FINISHED_MARKER: &str = "Finished game ";

/// Marker the worker prints when a task ends
pub const TASK_EXITED_MARKER: &str = "Task exited";

/// Counters that survive restarts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifetimeStats {
    pub games: u64,
    pub tasks: u64,
}

/// Session and lifetime counters at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub session_games: u64,
    pub session_tasks: u64,
    pub lifetime_games: u64,
    pub lifetime_tasks: u64,
}

impl StatsSnapshot {
    pub fn lifetime(&self) -> LifetimeStats {
        LifetimeStats {
            games: self.lifetime_games,
            tasks: self.lifetime_tasks,
        }
    }
}

/// Line-pattern matcher maintaining session and lifetime counters
///
/// Session counters start at zero for every process start; lifetime counters
/// are seeded from the configuration store.
#[derive(Debug, Clone, Default)]
pub struct StatsAggregator {
    counters: StatsSnapshot,
}

impl StatsAggregator {
    pub fn new(lifetime: LifetimeStats) -> Self {
        Self {
            counters: StatsSnapshot {
                session_games: 0,
                session_tasks: 0,
                lifetime_games: lifetime.games,
                lifetime_tasks: lifetime.tasks,
            },
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.counters
    }

    /// Scan one line for markers
    ///
    /// Returns the new counters when anything was incremented; the caller is
    /// expected to persist the lifetime counters right away.
    pub fn observe(&mut self, line: &str) -> Option<StatsSnapshot> {
        let mut changed = false;

        if line.contains(GAME_FINISHED_MARKER) {
            self.counters.session_games += 1;
            self.counters.lifetime_games += 1;
            changed = true;
        }

        if line.contains(TASK_EXITED_MARKER) {
            self.counters.session_tasks += 1;
            self.counters.lifetime_tasks += 1;
            changed = true;
        }

        changed.then_some(self.counters)
    }
}
