//! src/error.rs
//! ============================================================================
//! # `AppError`: Unified Error Type for the `cb` application
//!
//! Wraps storage errors together with the failures that only the application
//! layer can hit (configuration, logging setup, terminal I/O). Per-item copy
//! failures are not errors; they are reported from the session ledger.

use cb_store::StoreError;
use std::{io, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Standard IO error, auto-converted from `io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Clipboard storage or locking failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// TOML config parsing error.
    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// Config file I/O error with path.
    #[error("Failed to read config file {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON output failure.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Unknown action or malformed arguments.
    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },
}

impl AppError {
    /// Create an input validation error
    pub fn invalid_input<S1: Into<String>, S2: Into<String>>(field: S1, message: S2) -> Self {
        Self::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Store(StoreError::Cancelled) => 130,
            _ => 1,
        }
    }
}
