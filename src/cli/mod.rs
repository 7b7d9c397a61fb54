//! Command-line interface

pub mod commands;
pub mod output;
pub mod supervise;

use clap::{Parser, Subcommand};
use commands::{ProvisionCommand, RunCommand, StatsCommand};
use std::ffi::OsString;

/// Fishtest worker runner
#[derive(Debug, Parser, Clone)]
#[command(name = "fishtest-runner")]
#[command(author = "fishtest-runner Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Provisions a build toolchain and supervises a Fishtest worker", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Install the build toolchain and its packages
    Provision(ProvisionCommand),

    /// Run the worker until it exits or Ctrl-C is pressed
    Run(RunCommand),

    /// Show lifetime statistics
    Stats(StatsCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
