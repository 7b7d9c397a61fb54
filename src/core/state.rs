//! Run state of a pipeline controller

use serde::{Deserialize, Serialize};

/// Overall state of the controller
///
/// Exactly one per controller. Transitions happen only on the task that
/// drives the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// No pipeline is running
    Idle,
    /// The stage at this index is running
    Running { stage: usize },
    /// Cancel was requested while this stage was running; waiting for its
    /// output stream to close
    Cancelling { stage: usize },
}

impl RunState {
    pub fn is_idle(&self) -> bool {
        matches!(self, RunState::Idle)
    }

    pub fn is_cancelling(&self) -> bool {
        matches!(self, RunState::Cancelling { .. })
    }

    /// Index of the stage currently owning a process, if any
    pub fn current_stage(&self) -> Option<usize> {
        match self {
            RunState::Idle => None,
            RunState::Running { stage } | RunState::Cancelling { stage } => Some(*stage),
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        RunState::Idle
    }
}
