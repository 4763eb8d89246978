use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CLIPBOARD_NAME: &str = "0";
pub const TEMPORARY_DIRECTORY_NAME: &str = "Clipboard";
pub const PERSISTENT_DIRECTORY_NAME: &str = ".clipboard";
pub const DATA_DIRECTORY: &str = "data";
pub const METADATA_DIRECTORY: &str = "metadata";
pub const DATA_FILE_NAME: &str = "rawdata.clipboard";
pub const NOTES_NAME: &str = "notes";
pub const ORIGINALS_NAME: &str = "originals";
pub const LOCK_NAME: &str = "lock";
pub const IGNORE_NAME: &str = "ignore";
pub const MIME_NAME: &str = "mime";

/// Marker character that makes a slot persistent.
pub const PERSISTENT_MARKER: char = '_';

/// Base directories that slot roots hang off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRoots {
    /// Root for ephemeral slots
    pub temporary: PathBuf,

    /// Root for slots that survive reboots
    pub persistent: PathBuf,

    /// Route every slot to the persistent root
    pub always_persist: bool,
}

impl SlotRoots {
    pub fn new(temporary: impl Into<PathBuf>, persistent: impl Into<PathBuf>) -> Self {
        Self {
            temporary: temporary.into(),
            persistent: persistent.into(),
            always_persist: false,
        }
    }

    #[must_use]
    pub fn with_always_persist(mut self, always_persist: bool) -> Self {
        self.always_persist = always_persist;
        self
    }

    /// Whether `name` lives under the persistent root.
    pub fn is_persistent(&self, name: &str) -> bool {
        self.always_persist || name.contains(PERSISTENT_MARKER)
    }

    pub fn base_for(&self, name: &str) -> &PathBuf {
        if self.is_persistent(name) {
            &self.persistent
        } else {
            &self.temporary
        }
    }
}

impl Default for SlotRoots {
    fn default() -> Self {
        let temporary = std::env::temp_dir().join(TEMPORARY_DIRECTORY_NAME);
        let persistent = BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(PERSISTENT_DIRECTORY_NAME))
            .unwrap_or_else(|| temporary.join(PERSISTENT_DIRECTORY_NAME));

        Self {
            temporary,
            persistent,
            always_persist: false,
        }
    }
}

/// Lock polling behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    pub poll_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
        }
    }
}
