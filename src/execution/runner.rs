//! Stage runner - spawns one stage and wires its output streams

use crate::{
    core::Stage,
    process::{
        LineSink, LineStreamer, OutputStream, ProcessHandle, ProcessLauncher, SpawnError,
        StopFlag, StreamEnd, StreamKind,
    },
};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// Identifies one spawned stage; messages from older stages carry older tokens
pub type StageToken = u64;

/// Messages posted from streamer tasks to the controller loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageMessage {
    /// A line for the log
    Line {
        token: StageToken,
        stream: StreamKind,
        text: String,
    },
    /// A standard-output line for the statistics matcher
    Observe { token: StageToken, text: String },
    /// A streamer finished
    Closed {
        token: StageToken,
        stream: StreamKind,
        end: StreamEnd,
    },
}

/// Primary observer: forwards lines to the controller's log path
struct DispatchSink {
    token: StageToken,
    tx: UnboundedSender<StageMessage>,
}

impl LineSink for DispatchSink {
    fn on_line(&self, stream: StreamKind, line: &str) {
        let _ = self.tx.send(StageMessage::Line {
            token: self.token,
            stream,
            text: line.to_string(),
        });
    }
}

/// Secondary observer on stdout: forwards lines to the statistics path
struct ObserveSink {
    token: StageToken,
    tx: UnboundedSender<StageMessage>,
}

impl LineSink for ObserveSink {
    fn on_line(&self, _stream: StreamKind, line: &str) {
        let _ = self.tx.send(StageMessage::Observe {
            token: self.token,
            text: line.to_string(),
        });
    }
}

/// A stage whose process has been spawned
#[derive(Debug)]
pub struct ActiveStage {
    pub token: StageToken,
    pub index: usize,
    pub label: String,
    handle: ProcessHandle,
    stdout_stop: StopFlag,
    stderr_stop: StopFlag,
}

impl ActiveStage {
    /// Ask both streamers to stop before their next read
    pub fn request_stop(&self) {
        self.stdout_stop.request_stop();
        self.stderr_stop.request_stop();
    }

    /// Forcibly terminate the stage's process
    pub async fn terminate(&mut self) {
        if let Err(e) = self.handle.kill().await {
            // Usually means the process already exited on its own
            debug!("Killing stage {} ({}) failed: {}", self.index, self.label, e);
        }
    }

    /// Reap the process in the background, logging its exit code
    pub fn release(mut self) {
        tokio::spawn(async move {
            match self.handle.wait().await {
                Ok(code) => debug!("Stage {} ({}) exited with {:?}", self.index, self.label, code),
                Err(e) => debug!("Waiting for stage {} ({}) failed: {}", self.index, self.label, e),
            }
        });
    }
}

/// Spawns stages and attaches a streamer to each output stream
pub struct StageRunner {
    launcher: Arc<dyn ProcessLauncher>,
    tx: UnboundedSender<StageMessage>,
}

impl StageRunner {
    pub fn new(launcher: Arc<dyn ProcessLauncher>, tx: UnboundedSender<StageMessage>) -> Self {
        Self { launcher, tx }
    }

    /// Spawn `stage` and start draining its output
    ///
    /// Spawn failures are returned here and never reach the message channel.
    /// On success exactly two `Closed` messages (stdout and stderr) will be
    /// posted for `token`; the stage is complete when the stdout one arrives.
    pub fn run(&self, token: StageToken, stage: &Stage) -> Result<ActiveStage, SpawnError> {
        let mut handle = self.launcher.launch(stage)?;

        self.feed_stdin(&mut handle, stage);

        let dispatch: Arc<dyn LineSink> = Arc::new(DispatchSink {
            token,
            tx: self.tx.clone(),
        });
        let observe: Arc<dyn LineSink> = Arc::new(ObserveSink {
            token,
            tx: self.tx.clone(),
        });

        let stdout_stop = self.attach(
            token,
            StreamKind::Stdout,
            handle.take_stdout(),
            dispatch.clone(),
            Some(observe),
        );
        let stderr_stop = self.attach(
            token,
            StreamKind::Stderr,
            handle.take_stderr(),
            dispatch,
            None,
        );

        Ok(ActiveStage {
            token,
            index: stage.id,
            label: stage.label.clone(),
            handle,
            stdout_stop,
            stderr_stop,
        })
    }

    /// Write the stage's scripted input, then close stdin
    fn feed_stdin(&self, handle: &mut ProcessHandle, stage: &Stage) {
        let Some(mut stdin) = handle.take_stdin() else {
            return;
        };
        let Some(input) = stage.stdin_input.clone() else {
            return;
        };

        let label = stage.label.clone();
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                warn!("Writing input to {} failed: {}", label, e);
                return;
            }
            let _ = stdin.shutdown().await;
        });
    }

    fn attach(
        &self,
        token: StageToken,
        kind: StreamKind,
        reader: Option<OutputStream>,
        primary: Arc<dyn LineSink>,
        secondary: Option<Arc<dyn LineSink>>,
    ) -> StopFlag {
        let tx = self.tx.clone();

        let Some(reader) = reader else {
            // Nothing to drain; report the stream closed right away
            let _ = tx.send(StageMessage::Closed {
                token,
                stream: kind,
                end: StreamEnd::Eof,
            });
            return StopFlag::new();
        };

        let mut streamer = LineStreamer::new(kind, reader, primary);
        if let Some(sink) = secondary {
            streamer = streamer.with_secondary(sink);
        }
        let stop = streamer.stop_flag();

        tokio::spawn(async move {
            streamer
                .run(move |end| {
                    tx.send(StageMessage::Closed {
                        token,
                        stream: kind,
                        end,
                    })
                })
                .await
        });

        stop
    }
}
