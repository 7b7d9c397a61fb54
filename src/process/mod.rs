//! External process plumbing
//!
//! This module wraps the OS processes that make up a pipeline stage and the
//! line streams they produce:
//! - [`ProcessHandle`] owns one spawned process and its standard streams
//! - [`ProcessLauncher`] is the seam that turns a [`Stage`] into a handle
//! - [`LineStreamer`] drains one output stream line by line

pub mod launcher;
pub mod streamer;

use crate::core::Stage;
use async_trait::async_trait;
use std::fmt;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

pub use launcher::SystemLauncher;
pub use streamer::{LineSink, LineStreamer, StopFlag, StreamEnd};

/// Readable end of a child's output stream
pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// Writable end of a child's input stream
pub type InputStream = Box<dyn AsyncWrite + Send + Unpin>;

/// Error raised when a stage's process cannot be created
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpawnError {
    #[error("Executable not found: {0}")]
    NotFound(String),

    #[error("Failed to start {program}: {reason}")]
    Refused { program: String, reason: String },
}

impl SpawnError {
    /// Classify an I/O error returned by the OS while spawning `program`
    pub fn from_io(program: &str, err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => SpawnError::NotFound(program.to_string()),
            _ => SpawnError::Refused {
                program: program.to_string(),
                reason: err.to_string(),
            },
        }
    }
}

/// Which output stream of a process a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => write!(f, "stdout"),
            StreamKind::Stderr => write!(f, "stderr"),
        }
    }
}

/// Lifecycle control over a spawned process
#[async_trait]
pub trait ProcessControl: Send {
    /// OS process id, if the process has not been reaped yet
    fn id(&self) -> Option<u32>;

    /// Forcibly terminate the process
    async fn kill(&mut self) -> io::Result<()>;

    /// Wait for the process to exit and reap it
    ///
    /// The exit code is only reported for logging; it does not drive the pipeline.
    async fn wait(&mut self) -> io::Result<Option<i32>>;
}

/// Trait for turning a stage description into a running process
pub trait ProcessLauncher: Send + Sync {
    /// Spawn the stage's process with all three standard streams piped
    fn launch(&self, stage: &Stage) -> Result<ProcessHandle, SpawnError>;
}

/// One spawned external process
///
/// Owned exclusively by the stage that created it. Output streams are taken
/// out of the handle by the streamers; the handle keeps the process itself.
pub struct ProcessHandle {
    stdin: Option<InputStream>,
    stdout: Option<OutputStream>,
    stderr: Option<OutputStream>,
    control: Box<dyn ProcessControl>,
}

impl ProcessHandle {
    pub fn new(
        control: Box<dyn ProcessControl>,
        stdin: Option<InputStream>,
        stdout: Option<OutputStream>,
        stderr: Option<OutputStream>,
    ) -> Self {
        Self {
            stdin,
            stdout,
            stderr,
            control,
        }
    }

    pub fn id(&self) -> Option<u32> {
        self.control.id()
    }

    pub fn take_stdin(&mut self) -> Option<InputStream> {
        self.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<OutputStream> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<OutputStream> {
        self.stderr.take()
    }

    /// Forcibly terminate the process
    pub async fn kill(&mut self) -> io::Result<()> {
        self.control.kill().await
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> io::Result<Option<i32>> {
        self.control.wait().await
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.control.id())
            .field("stdin", &self.stdin.is_some())
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .finish()
    }
}
