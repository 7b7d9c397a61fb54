//! Spawns stage processes on the host OS

use crate::core::Stage;
use crate::process::{
    InputStream, OutputStream, ProcessControl, ProcessHandle, ProcessLauncher, SpawnError,
};
use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

/// Keeps console windows from flashing up for every child on Windows
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Launcher backed by `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct SystemLauncher;

impl SystemLauncher {
    pub fn new() -> Self {
        Self
    }

    fn build_command(stage: &Stage) -> Command {
        let mut command = Command::new(&stage.command);
        command
            .args(&stage.arguments)
            .envs(&stage.environment)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &stage.working_directory {
            command.current_dir(dir);
        }

        #[cfg(windows)]
        command.creation_flags(CREATE_NO_WINDOW);

        command
    }
}

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, stage: &Stage) -> Result<ProcessHandle, SpawnError> {
        let program = stage.command.display().to_string();
        debug!("Spawning stage {} ({}): {} {:?}", stage.id, stage.label, program, stage.arguments);

        let mut child = Self::build_command(stage)
            .spawn()
            .map_err(|e| SpawnError::from_io(&program, &e))?;

        let stdin = child.stdin.take().map(|s| Box::new(s) as InputStream);
        let stdout = child.stdout.take().map(|s| Box::new(s) as OutputStream);
        let stderr = child.stderr.take().map(|s| Box::new(s) as OutputStream);

        debug!("Stage {} running as pid {:?}", stage.id, child.id());

        Ok(ProcessHandle::new(
            Box::new(ChildControl { child }),
            stdin,
            stdout,
            stderr,
        ))
    }
}

/// [`ProcessControl`] over a tokio child process
struct ChildControl {
    child: Child,
}

#[async_trait]
impl ProcessControl for ChildControl {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.child.kill().await
    }

    async fn wait(&mut self) -> io::Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }
}
