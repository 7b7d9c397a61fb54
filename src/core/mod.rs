//! Core domain models
//!
//! This module defines the pipelines and stages the controller runs, the
//! controller's run state, the on-disk install layout and the statistics
//! derived from worker output.

pub mod layout;
pub mod pipeline;
pub mod state;
pub mod stats;

pub use layout::*;
pub use pipeline::*;
pub use state::*;
pub use stats::*;
