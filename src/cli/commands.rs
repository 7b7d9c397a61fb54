//! CLI command definitions

use crate::persistence::ConfigSnapshot;
use clap::Args;
use std::path::PathBuf;

/// Install the build toolchain
#[derive(Debug, Args, Clone)]
pub struct ProvisionCommand {
    /// Continue even if a toolchain is already configured
    #[arg(long)]
    pub force: bool,
}

/// Run the worker
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Fishtest username
    #[arg(short, long)]
    pub username: Option<String>,

    /// Fishtest password
    #[arg(short, long)]
    pub password: Option<String>,

    /// Number of games played concurrently
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Toolchain install directory
    #[arg(long)]
    pub install_path: Option<PathBuf>,
}

impl RunCommand {
    /// Overlay the values given on the command line onto `config`
    pub fn apply_to(&self, config: &mut ConfigSnapshot) {
        if let Some(username) = &self.username {
            config.credentials.username = username.clone();
        }
        if let Some(password) = &self.password {
            config.credentials.password = password.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.runtime.concurrency = concurrency;
        }
        if let Some(path) = &self.install_path {
            config.settings.install_path = Some(path.clone());
        }
    }
}

/// Show lifetime statistics
#[derive(Debug, Args, Clone)]
pub struct StatsCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
