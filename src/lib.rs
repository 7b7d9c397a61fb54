//! fishtest-runner - provisions a build toolchain and supervises a Fishtest worker

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod process;

// Re-export commonly used types
pub use core::{InstallLayout, PipelineKind, PipelinePlan, RunState, Stage, StatsAggregator, StatsSnapshot};
pub use execution::{ControllerError, ControllerEvent, PipelineController};
pub use persistence::{ConfigSnapshot, ConfigStore, IniConfigStore, InMemoryConfigStore};
pub use process::{LineSink, LineStreamer, ProcessHandle, ProcessLauncher, SpawnError, StreamKind, SystemLauncher};
