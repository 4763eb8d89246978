//! Per-invocation session context
//!
//! Everything one run of the tool mutates lives here: the items being
//! processed, the failure ledger, the piped buffer, the conflict resolver and
//! a shared handle to the progress tracker.

use crate::policy::ConflictResolver;
use crate::progress::ProgressTracker;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// One item that could not be processed.
#[derive(Debug)]
pub struct FailedItem {
    pub item: String,
    pub error: io::Error,
}

impl FailedItem {
    pub fn new(item: impl Into<String>, error: io::Error) -> Self {
        Self {
            item: item.into(),
            error,
        }
    }
}

#[derive(Debug, Default)]
pub struct Session {
    pub items: Vec<PathBuf>,
    pub failed: Vec<FailedItem>,
    pub buffer: Vec<u8>,
    pub mime: Option<String>,
    pub resolver: ConflictResolver,
    pub progress: Arc<ProgressTracker>,
}

impl Session {
    pub fn new(resolver: ConflictResolver, progress: Arc<ProgressTracker>) -> Self {
        Self {
            resolver,
            progress,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_items<I, P>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.items = items.into_iter().map(Into::into).collect();
        self.dedup_items();
        self
    }

    #[must_use]
    pub fn with_buffer(mut self, buffer: Vec<u8>, mime: Option<String>) -> Self {
        self.buffer = buffer;
        self.mime = mime;
        self
    }

    /// Drop repeated source paths, keeping first occurrences in order.
    pub fn dedup_items(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.items.retain(|p| seen.insert(p.clone()));
    }

    pub fn record_failure(&mut self, item: impl Into<String>, error: io::Error) {
        self.failed.push(FailedItem::new(item, error));
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn is_cancelled(&self) -> bool {
        self.progress.is_cancelled()
    }
}
