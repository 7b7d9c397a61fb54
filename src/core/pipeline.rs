//! Pipeline and stage domain model

use crate::core::layout::InstallLayout;
use crate::persistence::ConfigSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Packages installed into the build environment
pub const TOOLCHAIN_PACKAGES: &[&str] = &["unzip", "make", "gcc", "python3"];

/// Bootstrap script for the portable package manager
const PACKAGE_MANAGER_INSTALL_SCRIPT: &str =
    "iex ((New-Object System.Net.WebClient).DownloadString('https://community.chocolatey.org/install.ps1'))";

/// Answer to the package manager's non-admin confirmation prompt
const NON_ADMIN_CONFIRMATION: &str = "Y\n";

/// The pipelines the controller knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineKind {
    /// environment installer -> build environment -> packages
    ToolchainProvision,
    /// A single, long-running worker stage
    WorkerRun,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 2] = [PipelineKind::ToolchainProvision, PipelineKind::WorkerRun];
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineKind::ToolchainProvision => write!(f, "toolchain provisioning"),
            PipelineKind::WorkerRun => write!(f, "worker"),
        }
    }
}

/// What happens after a stage's process finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageLink {
    /// Spawn the stage with this index
    Next(usize),
    /// The pipeline is complete
    Terminal,
}

/// One external process invocation within a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    /// Position of the stage within its pipeline
    pub id: usize,

    /// Short human-readable name
    pub label: String,

    /// Executable to run
    pub command: PathBuf,

    /// Arguments, in order
    pub arguments: Vec<String>,

    /// Working directory (None = inherit)
    pub working_directory: Option<PathBuf>,

    /// Environment variables set on top of the inherited environment
    pub environment: BTreeMap<String, String>,

    /// Text written to the process's stdin right after spawn
    pub stdin_input: Option<String>,

    /// Successor of this stage
    pub on_complete: StageLink,
}

/// Reasons a pipeline cannot be planned from the current configuration
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("No build toolchain found; provision one or set an install path")]
    MissingToolchain,

    #[error("Username and password are required to run the worker")]
    EmptyCredentials,
}

/// The ordered stages of one pipeline invocation
///
/// Plans are built fresh for every `start`; stages are never reused.
#[derive(Debug, Clone)]
pub struct PipelinePlan {
    pub kind: PipelineKind,
    pub stages: Vec<Stage>,

    /// Value reported to the collaborator when the last stage completes
    pub result: Option<PathBuf>,
}

impl PipelinePlan {
    /// Build the plan for `kind` from the install layout and configuration
    pub fn build(
        kind: PipelineKind,
        layout: &InstallLayout,
        config: &ConfigSnapshot,
    ) -> Result<Self, PlanError> {
        match kind {
            PipelineKind::ToolchainProvision => Ok(Self::toolchain(layout)),
            PipelineKind::WorkerRun => Self::worker(layout, config),
        }
    }

    fn toolchain(layout: &InstallLayout) -> Self {
        let storage = layout.storage_dir().to_path_buf();
        let toolchain_dir = layout.default_toolchain_dir();
        let package_root = layout.package_manager_root();

        let mut installer_env = BTreeMap::new();
        installer_env.insert(
            "ChocolateyInstall".to_string(),
            package_root.display().to_string(),
        );

        let environment_installer = StageTemplate {
            label: "environment installer",
            command: powershell_path(),
            arguments: vec![
                "-ExecutionPolicy".to_string(),
                "Bypass".to_string(),
                "-Command".to_string(),
                PACKAGE_MANAGER_INSTALL_SCRIPT.to_string(),
            ],
            working_directory: storage.clone(),
            environment: installer_env.clone(),
            stdin_input: None,
        };

        let mut build_env_env = installer_env;
        build_env_env.insert(
            "PATH".to_string(),
            prepend_path(&[package_root.join("bin")]),
        );

        let build_environment = StageTemplate {
            label: "build environment",
            command: PathBuf::from("choco"),
            arguments: vec![
                "install".to_string(),
                "msys2".to_string(),
                "-y".to_string(),
                "--params".to_string(),
                format!("/InstallDir:{}", toolchain_dir.display()),
            ],
            working_directory: storage.clone(),
            environment: build_env_env,
            stdin_input: Some(NON_ADMIN_CONFIRMATION.to_string()),
        };

        let packages = StageTemplate {
            label: "packages",
            command: toolchain_dir.join("usr").join("bin").join(executable("bash")),
            arguments: vec![
                "-l".to_string(),
                "-c".to_string(),
                format!("pacman -S --noconfirm {}", TOOLCHAIN_PACKAGES.join(" ")),
            ],
            working_directory: storage,
            environment: BTreeMap::new(),
            stdin_input: None,
        };

        Self {
            kind: PipelineKind::ToolchainProvision,
            stages: link_stages(vec![environment_installer, build_environment, packages]),
            result: Some(toolchain_dir),
        }
    }

    fn worker(layout: &InstallLayout, config: &ConfigSnapshot) -> Result<Self, PlanError> {
        let toolchain = layout
            .resolve_toolchain(config.settings.install_path.as_deref())
            .ok_or(PlanError::MissingToolchain)?;

        let credentials = &config.credentials;
        if credentials.username.trim().is_empty() || credentials.password.is_empty() {
            return Err(PlanError::EmptyCredentials);
        }

        let mut environment = BTreeMap::new();
        environment.insert(
            "PATH".to_string(),
            prepend_path(&[toolchain.join("mingw64").join("bin"), toolchain.join("usr").join("bin")]),
        );

        let worker = StageTemplate {
            label: "worker",
            command: PathBuf::from(executable("python3")),
            arguments: vec![
                "-u".to_string(),
                layout.worker_entrypoint().display().to_string(),
                credentials.username.clone(),
                credentials.password.clone(),
                "--concurrency".to_string(),
                config.runtime.concurrency.to_string(),
            ],
            working_directory: layout.storage_dir().to_path_buf(),
            environment,
            stdin_input: None,
        };

        Ok(Self {
            kind: PipelineKind::WorkerRun,
            stages: link_stages(vec![worker]),
            result: None,
        })
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }
}

/// Stage fields before the pipeline position is known
struct StageTemplate {
    label: &'static str,
    command: PathBuf,
    arguments: Vec<String>,
    working_directory: PathBuf,
    environment: BTreeMap<String, String>,
    stdin_input: Option<String>,
}

fn link_stages(templates: Vec<StageTemplate>) -> Vec<Stage> {
    let count = templates.len();
    templates
        .into_iter()
        .enumerate()
        .map(|(id, template)| Stage {
            id,
            label: template.label.to_string(),
            command: template.command,
            arguments: template.arguments,
            working_directory: Some(template.working_directory),
            environment: template.environment,
            stdin_input: template.stdin_input,
            on_complete: if id + 1 < count {
                StageLink::Next(id + 1)
            } else {
                StageLink::Terminal
            },
        })
        .collect()
}

/// PATH with `dirs` in front of the current process's PATH
fn prepend_path(dirs: &[PathBuf]) -> String {
    let current = std::env::var_os("PATH").unwrap_or_default();
    let entries = dirs
        .iter()
        .map(|d| d.as_os_str().to_os_string())
        .chain(
            std::env::split_paths(&current)
                .filter(|p| !p.as_os_str().is_empty())
                .map(OsString::from),
        );

    match std::env::join_paths(entries) {
        Ok(joined) => joined.to_string_lossy().into_owned(),
        // An entry contained the separator; fall back to the inherited PATH
        Err(_) => current.to_string_lossy().into_owned(),
    }
}

fn executable(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

fn powershell_path() -> PathBuf {
    let system_root = std::env::var_os("SystemRoot").unwrap_or_else(|| OsString::from(r"C:\Windows"));
    Path::new(&system_root)
        .join("System32")
        .join("WindowsPowerShell")
        .join("v1.0")
        .join("powershell.exe")
}
