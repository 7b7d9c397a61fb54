//! Pipeline execution - stage spawning and the controller state machine

pub mod controller;
pub mod runner;

pub use controller::{ControllerError, ControllerEvent, EventHandler, PipelineController};
pub use runner::{ActiveStage, StageMessage, StageRunner, StageToken};
