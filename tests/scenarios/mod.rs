//! Scenario-based tests for fishtest-runner

mod cancellation;
mod provisioning_chain;
mod stream_completion;
mod worker_stats;
