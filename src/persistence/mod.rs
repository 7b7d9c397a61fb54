//! Persistence layer for the runner's configuration
//!
//! The configuration store is shared by the form-submit path (settings,
//! credentials, concurrency written on pipeline start) and the statistics
//! path (lifetime counters written on every increment). Both go through the
//! single [`ConfigStore`] owned by the pipeline controller.

pub mod store;

pub use store::IniConfigStore;

use crate::core::LifetimeStats;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Configuration store errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] ini::Error),

    #[error("Failed to write config file: {0}")]
    Write(String),

    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("Failed to create config directory: {0}")]
    Directory(std::io::Error),
}

/// `[Settings]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Toolchain install directory (None = not provisioned yet)
    pub install_path: Option<PathBuf>,
}

/// `[Credentials]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// `[Runtime]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runtime {
    /// Number of concurrent games the worker plays
    pub concurrency: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

impl Runtime {
    /// Highest concurrency the host supports, leaving one core free
    pub fn max_concurrency() -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        cores.saturating_sub(1).max(1)
    }

    /// Check `concurrency` against `1..=max_concurrency()`
    pub fn validate(&self) -> Result<(), ConfigError> {
        let max = Self::max_concurrency();
        if self.concurrency == 0 || self.concurrency > max {
            return Err(ConfigError::InvalidValue {
                section: "Runtime".to_string(),
                key: "concurrency".to_string(),
                value: self.concurrency.to_string(),
                reason: format!("must be between 1 and {}", max),
            });
        }
        Ok(())
    }
}

/// Full contents of the configuration store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub settings: Settings,
    pub credentials: Credentials,
    pub runtime: Runtime,
    pub stats: LifetimeStats,
}

/// Trait for configuration backends
///
/// Writes are last-writer-wins; callers serialize them through the
/// controller's message loop.
pub trait ConfigStore: Send {
    /// Read the whole configuration
    fn load(&self) -> Result<ConfigSnapshot, ConfigError>;

    /// Write every section
    fn persist(&mut self, snapshot: &ConfigSnapshot) -> Result<(), ConfigError>;

    /// Write only the `[Stats]` section, leaving the rest untouched
    fn persist_stats(&mut self, stats: LifetimeStats) -> Result<(), ConfigError>;
}

/// In-memory configuration store (for testing or ephemeral use)
///
/// Clones share the same contents, so a test can keep a handle after moving
/// the store into a controller.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConfigStore {
    inner: Arc<Mutex<InMemoryState>>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    snapshot: ConfigSnapshot,
    full_writes: usize,
    stats_history: Vec<LifetimeStats>,
    fail_writes: bool,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: ConfigSnapshot) -> Self {
        let store = Self::default();
        store.lock().snapshot = snapshot;
        store
    }

    /// Make every subsequent write fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        self.lock().snapshot.clone()
    }

    /// Number of successful full writes
    pub fn full_writes(&self) -> usize {
        self.lock().full_writes
    }

    /// Every successful `persist_stats` call, in order
    pub fn stats_history(&self) -> Vec<LifetimeStats> {
        self.lock().stats_history.clone()
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn load(&self) -> Result<ConfigSnapshot, ConfigError> {
        Ok(self.snapshot())
    }

    fn persist(&mut self, snapshot: &ConfigSnapshot) -> Result<(), ConfigError> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(ConfigError::Write("store is read-only".to_string()));
        }
        state.snapshot = snapshot.clone();
        state.full_writes += 1;
        Ok(())
    }

    fn persist_stats(&mut self, stats: LifetimeStats) -> Result<(), ConfigError> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(ConfigError::Write("store is read-only".to_string()));
        }
        state.snapshot.stats = stats;
        state.stats_history.push(stats);
        Ok(())
    }
}
