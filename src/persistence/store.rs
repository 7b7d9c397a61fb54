//! INI-file configuration store

use crate::core::LifetimeStats;
use crate::persistence::{ConfigError, ConfigSnapshot, ConfigStore};
use ini::Ini;
use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

const SETTINGS: &str = "Settings";
const CREDENTIALS: &str = "Credentials";
const RUNTIME: &str = "Runtime";
const STATS: &str = "Stats";

/// Configuration store backed by an INI file
#[derive(Debug, Clone)]
pub struct IniConfigStore {
    path: PathBuf,
}

impl IniConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file with defaults if it doesn't exist
    pub fn ensure_exists(&mut self) -> Result<(), ConfigError> {
        if !self.path.exists() {
            debug!("Creating default config at {}", self.path.display());
            self.persist(&ConfigSnapshot::default())?;
        }
        Ok(())
    }

    fn read_ini(&self) -> Result<Ini, ConfigError> {
        if self.path.exists() {
            Ok(Ini::load_from_file(&self.path)?)
        } else {
            Ok(Ini::new())
        }
    }

    /// Sibling file the next version is written to before it replaces `path`
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("config"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Replace the file atomically via temp file and rename
    ///
    /// Readers see either the previous or the new contents, never a
    /// truncated file, even if the process dies mid-write.
    fn write_ini(&self, ini: &Ini) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Directory)?;
        }

        let temp_path = self.temp_path();
        let write_err = |e: std::io::Error| ConfigError::Write(format!("{}: {}", temp_path.display(), e));

        let mut file = File::create(&temp_path).map_err(write_err)?;
        ini.write_to(&mut file).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);

        std::fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            ConfigError::Write(format!(
                "rename {} -> {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })
    }
}

impl ConfigStore for IniConfigStore {
    fn load(&self) -> Result<ConfigSnapshot, ConfigError> {
        let ini = self.read_ini()?;
        parse_ini(&ini)
    }

    fn persist(&mut self, snapshot: &ConfigSnapshot) -> Result<(), ConfigError> {
        let mut ini = self.read_ini()?;
        write_snapshot(&mut ini, snapshot);
        self.write_ini(&ini)
    }

    fn persist_stats(&mut self, stats: LifetimeStats) -> Result<(), ConfigError> {
        let mut ini = self.read_ini()?;
        write_stats(&mut ini, stats);
        self.write_ini(&ini)
    }
}

/// Parse an `Ini` into a snapshot, starting from defaults
fn parse_ini(ini: &Ini) -> Result<ConfigSnapshot, ConfigError> {
    let mut config = ConfigSnapshot::default();

    if let Some(section) = ini.section(Some(SETTINGS)) {
        if let Some(v) = section.get("install_path") {
            let v = v.trim();
            if !v.is_empty() {
                config.settings.install_path = Some(PathBuf::from(v));
            }
        }
    }

    if let Some(section) = ini.section(Some(CREDENTIALS)) {
        if let Some(v) = section.get("username") {
            config.credentials.username = v.trim().to_string();
        }
        if let Some(v) = section.get("password") {
            config.credentials.password = v.to_string();
        }
    }

    if let Some(section) = ini.section(Some(RUNTIME)) {
        if let Some(v) = section.get("concurrency") {
            config.runtime.concurrency = parse_number(RUNTIME, "concurrency", v)?;
        }
    }

    if let Some(section) = ini.section(Some(STATS)) {
        if let Some(v) = section.get("lifetime_games") {
            config.stats.games = parse_number(STATS, "lifetime_games", v)?;
        }
        if let Some(v) = section.get("lifetime_tasks") {
            config.stats.tasks = parse_number(STATS, "lifetime_tasks", v)?;
        }
    }

    Ok(config)
}

fn parse_number<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: "must be a non-negative integer".to_string(),
    })
}

fn write_snapshot(ini: &mut Ini, snapshot: &ConfigSnapshot) {
    let install_path = snapshot
        .settings
        .install_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();

    ini.with_section(Some(SETTINGS))
        .set("install_path", install_path);
    ini.with_section(Some(CREDENTIALS))
        .set("username", snapshot.credentials.username.as_str())
        .set("password", snapshot.credentials.password.as_str());
    ini.with_section(Some(RUNTIME))
        .set("concurrency", snapshot.runtime.concurrency.to_string());
    write_stats(ini, snapshot.stats);
}

fn write_stats(ini: &mut Ini, stats: LifetimeStats) {
    ini.with_section(Some(STATS))
        .set("lifetime_games", stats.games.to_string())
        .set("lifetime_tasks", stats.tasks.to_string());
}
