//! On-disk layout of the provisioning root

use std::io;
use std::path::{Path, PathBuf};

/// Install location used by a package manager installed system-wide
pub const WELL_KNOWN_TOOLCHAIN_DIR: &str = r"C:\tools\msys64";

/// Paths below the provisioning root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    storage_dir: PathBuf,
    fallback_toolchain: Option<PathBuf>,
}

impl InstallLayout {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            fallback_toolchain: Some(PathBuf::from(WELL_KNOWN_TOOLCHAIN_DIR)),
        }
    }

    /// Layout rooted at `<local data dir>/Fishtest`
    pub fn with_default_path() -> Self {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(data_dir.join("Fishtest"))
    }

    /// Override the directory probed when no toolchain is configured
    pub fn with_fallback_toolchain(mut self, fallback: Option<PathBuf>) -> Self {
        self.fallback_toolchain = fallback;
        self
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.cfg")
    }

    /// Directory the worker sources are unpacked into
    pub fn worker_dir(&self) -> PathBuf {
        self.storage_dir.join("fishtest-master").join("worker")
    }

    /// Worker script, relative to the storage directory
    pub fn worker_entrypoint(&self) -> PathBuf {
        Path::new("fishtest-master").join("worker").join("worker.py")
    }

    /// Root of the portable package manager install
    pub fn package_manager_root(&self) -> PathBuf {
        self.storage_dir.join("chocoportable")
    }

    /// Where provisioning installs the build toolchain
    pub fn default_toolchain_dir(&self) -> PathBuf {
        self.storage_dir.join("msys64")
    }

    pub fn ensure_storage_dir(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.storage_dir)
    }

    /// Find a usable toolchain directory
    ///
    /// Prefers the configured path, then the well-known system location.
    pub fn resolve_toolchain(&self, configured: Option<&Path>) -> Option<PathBuf> {
        configured
            .filter(|p| !p.as_os_str().is_empty() && p.is_dir())
            .map(Path::to_path_buf)
            .or_else(|| self.fallback_toolchain.clone().filter(|p| p.is_dir()))
    }
}
