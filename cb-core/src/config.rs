//! src/config.rs
//! ============================================================================
//! # Config: Application Configuration Loader and Saver
//!
//! Loads and saves settings as TOML from the platform config path using the
//! [`directories`](https://docs.rs/directories) crate, then layers the
//! `CLIPBOARD_*` environment variables on top.
//!
//! ## Example
//! ```rust,ignore
//! let mut config = Config::load().await?;
//! config.apply_env(|k| std::env::var(k).ok());
//! let roots = config.slot_roots();
//! ```

use cb_store::{LockConfig, SlotRoots};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use tokio::fs as TokioFs;

use crate::error::AppError;

/// Where slots are stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root for temporary slots (default: `<temp>/Clipboard`)
    pub temporary_dir: Option<PathBuf>,

    /// Root for persistent slots (default: `~/.clipboard`)
    pub persistent_dir: Option<PathBuf>,

    /// Treat every slot as persistent
    pub always_persist: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    /// How often a blocked invocation re-checks the lock owner
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            poll_interval: LockConfig::default().poll_interval,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Show the spinner while working
    pub enabled: bool,

    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_interval: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Never,
    #[default]
    Daily,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,

    /// `tracing` directive, e.g. `info` or `cb_store=debug`
    pub level: String,

    /// Log directory (default: platform data dir + `logs`)
    pub directory: Option<PathBuf>,

    pub rotation: LogRotation,

    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            directory: None,
            rotation: LogRotation::Daily,
            max_files: 7,
        }
    }
}

/// Main configuration struct for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub lock: LockSettings,

    #[serde(default)]
    pub progress: ProgressConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Never touch the GUI clipboard
    #[serde(default)]
    pub no_gui: bool,
}

/// Environment variable counts as set when present and not "0"/"false".
fn flag(value: Option<String>) -> bool {
    value.is_some_and(|v| !matches!(v.trim(), "" | "0" | "false"))
}

impl Config {
    /// Loads config from the platform config dir, creating a default file
    /// when none exists.
    pub async fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            info!("Loading config from {}", path.display());
            Ok(Self::load_from(&path).await?)
        } else {
            info!(
                "No config file found at {}, using default configuration. Creating it now.",
                path.display()
            );

            let default_config = Self::default();
            default_config.save_to(&path).await?;

            Ok(default_config)
        }
    }

    pub async fn load_from(path: &Path) -> Result<Self, AppError> {
        let text = TokioFs::read_to_string(path)
            .await
            .map_err(|source| AppError::ConfigIo {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(toml::from_str(&text)?)
    }

    pub async fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        info!("Saving config to {}", path.display());

        if let Some(parent) = path.parent() {
            TokioFs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        TokioFs::write(path, toml_str).await?;

        Ok(())
    }

    fn project_dirs() -> anyhow::Result<ProjectDirs> {
        ProjectDirs::from("org", "cb", "Clipboard")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory."))
    }

    /// Returns the canonical config file path.
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Default log directory when `logging.directory` is unset.
    pub fn default_log_dir() -> anyhow::Result<PathBuf> {
        Ok(Self::project_dirs()?.data_local_dir().join("logs"))
    }

    /// Layer `CLIPBOARD_*` variables over the file settings.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = var("CLIPBOARD_TMPDIR").filter(|v| !v.is_empty()) {
            self.storage.temporary_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = var("CLIPBOARD_PERSISTDIR").filter(|v| !v.is_empty()) {
            self.storage.persistent_dir = Some(PathBuf::from(dir));
        }
        if flag(var("CLIPBOARD_ALWAYS_PERSIST")) {
            self.storage.always_persist = true;
        }
        if flag(var("CLIPBOARD_NOPROGRESS")) {
            self.progress.enabled = false;
        }
        if flag(var("CLIPBOARD_NOGUI")) {
            self.no_gui = true;
        }
    }

    pub fn slot_roots(&self) -> SlotRoots {
        let defaults = SlotRoots::default();
        SlotRoots {
            temporary: self
                .storage
                .temporary_dir
                .clone()
                .unwrap_or(defaults.temporary),
            persistent: self
                .storage
                .persistent_dir
                .clone()
                .unwrap_or(defaults.persistent),
            always_persist: self.storage.always_persist,
        }
    }

    pub fn lock_config(&self) -> LockConfig {
        LockConfig {
            poll_interval: self.lock.poll_interval,
        }
    }
}
