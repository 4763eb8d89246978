//! # cb-store - named clipboard slots on disk
//!
//! Storage engine behind the `cb` terminal clipboard:
//!
//! - Named slots, temporary or persistent, each a directory of data and metadata
//! - PID-file locking shared by independent invocations
//! - Per-slot regex ignore filters
//! - Copy-conflict policy state machine
//! - Magic-byte MIME sniffing for buffered content
//! - Progress counters with cooperative cancellation

pub mod clipboard;
pub mod config;
pub mod error;
pub mod gui;
pub mod ignore;
pub mod lock;
pub mod mime;
pub mod operations;
pub mod policy;
pub mod progress;
pub mod session;

// Re-export main types for easy use
pub use clipboard::{ClipboardStore, SlotInfo, list_slots};
pub use config::{DEFAULT_CLIPBOARD_NAME, LockConfig, SlotRoots};
pub use error::{StoreError, StoreResult};
pub use gui::{GuiClipboard, GuiContent, Headless, Pulled, create_gui_clipboard, pull_from_gui, push_to_gui};
pub use ignore::{IgnoreFilter, IgnoreRule};
pub use lock::{LockGuard, LockManager, ProcessProbe, SystemProbe};
pub use mime::sniff;
pub use operations::{CopyMode, Outcome, clear, copy_buffer, copy_items, paste_items};
pub use policy::{ConflictAction, ConflictResolver, CopyPolicy, DecisionSource, Unattended};
pub use progress::{IndicatorFrame, ProgressStatus, ProgressTracker, SuccessCounts, Successes};
pub use session::{FailedItem, Session};
