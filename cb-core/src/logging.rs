//! src/logging.rs
//! ============================================================================
//! # Logging: JSON lines into a rolling file
//!
//! The terminal belongs to the user's data (stdout) and the spinner
//! (stderr), so every `tracing` event goes to a rotating `.jsonl` file
//! through a non-blocking writer. Dropping the returned [`WorkerGuard`]
//! flushes whatever is still queued.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use tokio::fs as TokioFs;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Layer, filter::Directive, fmt::time::ChronoUtc, layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::{LogRotation, LoggingConfig};

const LOG_FILE_PREFIX: &str = "cb";
const LOG_FILE_SUFFIX: &str = "jsonl";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Logger already initialized")]
    AlreadyInitialized,

    #[error("Invalid log directory: {0}")]
    InvalidLogDirectory(String),

    #[error("Failed to create log directory: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Never => Rotation::NEVER,
            LogRotation::Daily => Rotation::DAILY,
        }
    }
}

pub struct LoggerBuilder {
    config: LoggingConfig,
    log_dir: PathBuf,
}

impl LoggerBuilder {
    #[must_use]
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            config: LoggingConfig::default(),
            log_dir: log_dir.into(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: LoggingConfig) -> Self {
        if let Some(dir) = &config.directory {
            self.log_dir = dir.clone();
        }
        self.config = config;
        self
    }

    /// Installs the global subscriber. Returns `None` when logging is
    /// disabled in the config.
    pub async fn build(self) -> Result<Option<WorkerGuard>> {
        if !self.config.enabled {
            return Ok(None);
        }

        validate_config(&self.config, &self.log_dir)?;
        setup_log_directory(&self.log_dir).await?;

        let filter = make_filter(&self.config.level)?;

        let file_appender = RollingFileAppender::builder()
            .rotation(self.config.rotation.into())
            .filename_prefix(LOG_FILE_PREFIX)
            .filename_suffix(LOG_FILE_SUFFIX)
            .max_log_files(self.config.max_files)
            .build(&self.log_dir)
            .context("Failed to create file appender")?;

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(false)
            .with_target(true)
            .with_ansi(false)
            .with_writer(non_blocking)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(json_layer)
            .try_init()
            .map_err(|_| LoggingError::AlreadyInitialized)?;

        tracing::info!(dir = %self.log_dir.display(), level = %self.config.level, "logging initialized");
        Ok(Some(guard))
    }
}

/// `RUST_LOG`, when set, replaces the configured level entirely.
fn make_filter(level: &str) -> Result<EnvFilter> {
    filter_from(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref(), level)
}

fn filter_from(env: Option<&str>, level: &str) -> Result<EnvFilter> {
    match env.filter(|spec| !spec.trim().is_empty()) {
        Some(spec) => EnvFilter::try_new(spec).context("Invalid RUST_LOG directive"),
        None => Ok(EnvFilter::default()
            .add_directive(Directive::from_str(level).context("Invalid log level in config")?)),
    }
}

fn validate_config(config: &LoggingConfig, log_dir: &Path) -> Result<()> {
    if config.max_files == 0 {
        return Err(
            LoggingError::ConfigError("Max log files must be greater than 0".to_string()).into(),
        );
    }

    Directive::from_str(&config.level)
        .map_err(|e| LoggingError::ConfigError(format!("{}: {e}", config.level)))?;

    validate_log_directory(log_dir)?;
    Ok(())
}

fn validate_log_directory(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(LoggingError::InvalidLogDirectory("empty path".to_string()).into());
    }

    if path.exists() && !path.is_dir() {
        return Err(LoggingError::InvalidLogDirectory(format!(
            "{} is not a directory",
            path.display()
        ))
        .into());
    }

    Ok(())
}

async fn setup_log_directory(log_dir: &Path) -> Result<()> {
    if !log_dir.exists() {
        TokioFs::create_dir_all(log_dir)
            .await
            .map_err(LoggingError::DirectoryCreationFailed)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    }
    Ok(())
}
