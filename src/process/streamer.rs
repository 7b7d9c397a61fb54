//! Line streaming from child process output
//!
//! A [`LineStreamer`] drains one readable stream and hands every non-blank
//! line to its observers, in read order. It stops on end of stream, on a read
//! error, or when its [`StopFlag`] is raised, and then fires a one-shot
//! completion callback carrying the [`StreamEnd`] reason.
//!
//! # Example
//!
//! ```
//! use fishtest_runner::process::{LineSink, LineStreamer, StreamKind};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl LineSink for Printer {
//!     fn on_line(&self, stream: StreamKind, line: &str) {
//!         println!("[{}] {}", stream, line);
//!     }
//! }
//!
//! # async fn example() {
//! let streamer = LineStreamer::new(StreamKind::Stdout, &b"hello\nworld\n"[..], Arc::new(Printer));
//! let end = streamer.run(|_end| Ok::<(), String>(())).await;
//! # }
//! ```

use crate::process::StreamKind;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, warn};

/// Observer for lines read from a stream
///
/// This trait is object-safe and is shared between tasks as `Arc<dyn LineSink>`.
pub trait LineSink: Send + Sync {
    /// Called once per delivered line, without its line terminator
    fn on_line(&self, stream: StreamKind, line: &str);
}

/// Why a streamer stopped reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The stream reached end of file
    Eof,
    /// A stop was requested before the next read
    Stopped,
    /// The read failed (broken pipe, stream already closed, ...)
    ReadError(String),
}

impl fmt::Display for StreamEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamEnd::Eof => write!(f, "end of stream"),
            StreamEnd::Stopped => write!(f, "stopped"),
            StreamEnd::ReadError(e) => write!(f, "read error: {}", e),
        }
    }
}

/// Cooperative stop request shared with a running streamer
///
/// Raising the flag does not interrupt a read that is already blocked; the
/// streamer observes it before its next read attempt.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drains one output stream of a child process
pub struct LineStreamer<R> {
    stream: StreamKind,
    reader: R,
    primary: Arc<dyn LineSink>,
    secondary: Option<Arc<dyn LineSink>>,
    stop: StopFlag,
}

impl<R: AsyncRead + Unpin> LineStreamer<R> {
    /// Create a streamer delivering to a single observer
    pub fn new(stream: StreamKind, reader: R, primary: Arc<dyn LineSink>) -> Self {
        Self {
            stream,
            reader,
            primary,
            secondary: None,
            stop: StopFlag::new(),
        }
    }

    /// Register an observer that sees each line after the primary one
    pub fn with_secondary(mut self, sink: Arc<dyn LineSink>) -> Self {
        self.secondary = Some(sink);
        self
    }

    /// Get a handle that can ask this streamer to stop
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Read lines until the stream closes or a stop is requested
    ///
    /// `on_complete` is invoked exactly once with the reason the loop ended.
    /// A failure reported by `on_complete` is logged and otherwise ignored.
    pub async fn run<F, E>(self, on_complete: F) -> StreamEnd
    where
        F: FnOnce(StreamEnd) -> Result<(), E>,
        E: fmt::Display,
    {
        let stream = self.stream;
        let mut reader = BufReader::new(self.reader);
        let mut buf = Vec::new();

        let end = loop {
            if self.stop.is_stop_requested() {
                break StreamEnd::Stopped;
            }

            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break StreamEnd::Eof,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    let line = text.trim_end_matches(['\r', '\n']);
                    if line.trim().is_empty() {
                        continue;
                    }
                    self.primary.on_line(stream, line);
                    if let Some(secondary) = &self.secondary {
                        secondary.on_line(stream, line);
                    }
                }
                Err(e) => {
                    warn!("Reading {} failed: {}", stream, e);
                    break StreamEnd::ReadError(e.to_string());
                }
            }
        };

        debug!("{} streamer finished: {}", stream, end);

        if let Err(e) = on_complete(end.clone()) {
            debug!("{} completion callback failed: {}", stream, e);
        }

        end
    }
}
