//! Error types for slot storage, locking and filtering

use compact_str::CompactString;
use std::io;
use std::path::Path;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by clipboard slots.
///
/// Per-item copy and paste failures never show up here; they are recorded in
/// the session's failed-item ledger instead.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Could not set up clipboard directory {path}: {source}")]
    SlotSetup {
        path: CompactString,
        #[source]
        source: io::Error,
    },

    #[error("Could not write lock file {path}: {source}")]
    LockWrite {
        path: CompactString,
        #[source]
        source: io::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: CompactString,
        #[source]
        source: io::Error,
    },

    #[error("Invalid ignore pattern on line {line} ({pattern}): {message}")]
    InvalidPattern {
        line: usize,
        pattern: CompactString,
        message: CompactString,
    },

    #[error("Invalid clipboard name: {0:?}")]
    InvalidName(CompactString),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("GUI clipboard error: {0}")]
    Gui(CompactString),
}

impl StoreError {
    /// Fatal errors abort the whole invocation.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::SlotSetup { .. } | StoreError::LockWrite { .. })
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StoreError::Cancelled)
    }

    #[inline]
    pub fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: CompactString::from(path.to_string_lossy()),
            source,
        }
    }

    #[inline]
    pub fn slot_setup(path: &Path, source: io::Error) -> Self {
        Self::SlotSetup {
            path: CompactString::from(path.to_string_lossy()),
            source,
        }
    }

    #[inline]
    pub fn lock_write(path: &Path, source: io::Error) -> Self {
        Self::LockWrite {
            path: CompactString::from(path.to_string_lossy()),
            source,
        }
    }

    pub fn invalid_pattern(line: usize, pattern: &str, err: &regex::Error) -> Self {
        Self::InvalidPattern {
            line,
            pattern: CompactString::from(pattern),
            message: CompactString::from(err.to_string()),
        }
    }

    pub fn gui(message: impl Into<CompactString>) -> Self {
        Self::Gui(message.into())
    }
}

/// Attach a path to an `io::Result`.
pub(crate) trait IoContext<T> {
    fn at(self, path: &Path) -> StoreResult<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    #[inline]
    fn at(self, path: &Path) -> StoreResult<T> {
        self.map_err(|e| StoreError::io(path, e))
    }
}
