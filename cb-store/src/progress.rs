//! Success counters, tri-state progress status and the background indicator
//!
//! Counters only ever go up. The status is the single cross-thread signal:
//! the indicator thread renders while it reads `Active`, and the operation
//! loop stops issuing new work once it reads `Cancel`.

use crate::error::{StoreError, StoreResult};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Done = 0,
    Active = 1,
    Cancel = 2,
}

impl ProgressStatus {
    #[inline]
    const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Active,
            2 => Self::Cancel,
            _ => Self::Done,
        }
    }
}

/// Work completed so far in this invocation.
#[derive(Debug, Default)]
pub struct Successes {
    files: AtomicU64,
    directories: AtomicU64,
    bytes: AtomicU64,
    clipboards: AtomicU64,
}

/// Point-in-time copy of [`Successes`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SuccessCounts {
    pub files: u64,
    pub directories: u64,
    pub bytes: u64,
    pub clipboards: u64,
}

impl SuccessCounts {
    pub fn items(&self) -> u64 {
        self.files + self.directories
    }
}

impl Successes {
    #[inline]
    pub fn add_file(&self) {
        self.files.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_directory(&self) {
        self.directories.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_bytes(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_clipboard(&self) {
        self.clipboards.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SuccessCounts {
        SuccessCounts {
            files: self.files.load(Ordering::Relaxed),
            directories: self.directories.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            clipboards: self.clipboards.load(Ordering::Relaxed),
        }
    }
}

/// What the indicator callback gets on every refresh.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorFrame {
    pub tick: u64,
    pub elapsed: Duration,
    pub counts: SuccessCounts,
}

impl IndicatorFrame {
    /// Bytes per second since the indicator started.
    pub fn throughput(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.counts.bytes as f64 / secs) as u64
        } else {
            0
        }
    }
}

#[derive(Debug)]
pub struct ProgressTracker {
    successes: Successes,
    status: AtomicU8,
    halt: AtomicBool,
    wake_lock: Mutex<()>,
    wake: Condvar,
    indicator: Mutex<Option<JoinHandle<()>>>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            successes: Successes::default(),
            status: AtomicU8::new(ProgressStatus::Done as u8),
            halt: AtomicBool::new(false),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
            indicator: Mutex::new(None),
        }
    }

    pub fn successes(&self) -> &Successes {
        &self.successes
    }

    #[inline]
    pub fn status(&self) -> ProgressStatus {
        ProgressStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.status() == ProgressStatus::Cancel
    }

    /// `Err(Cancelled)` once cancellation was requested.
    #[inline]
    pub fn check_cancelled(&self) -> StoreResult<()> {
        if self.is_cancelled() {
            Err(StoreError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Request cooperative cancellation. Safe to call from any thread,
    /// including a signal listener.
    pub fn cancel(&self) {
        self.status.store(ProgressStatus::Cancel as u8, Ordering::Release);
        self.notify();
    }

    /// Mark the operation active and spawn the indicator thread, which calls
    /// `render` every `refresh` until [`stop`](Self::stop). Returns `false`
    /// when an indicator is already running.
    pub fn start<F>(self: &Arc<Self>, refresh: Duration, mut render: F) -> bool
    where
        F: FnMut(IndicatorFrame) + Send + 'static,
    {
        let mut slot = self.indicator.lock();
        if slot.is_some() {
            return false;
        }

        let _ = self.status.compare_exchange(
            ProgressStatus::Done as u8,
            ProgressStatus::Active as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.halt.store(false, Ordering::Release);

        let tracker = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name("cb-indicator".into())
            .spawn(move || {
                let started = Instant::now();
                let mut tick: u64 = 0;
                let mut guard = tracker.wake_lock.lock();
                while tracker.status() == ProgressStatus::Active && !tracker.halt.load(Ordering::Acquire) {
                    render(IndicatorFrame {
                        tick,
                        elapsed: started.elapsed(),
                        counts: tracker.successes.snapshot(),
                    });
                    tick = tick.wrapping_add(1);
                    tracker.wake.wait_for(&mut guard, refresh);
                }
            });

        match spawned {
            Ok(handle) => {
                *slot = Some(handle);
                true
            }
            Err(e) => {
                warn!("Could not start progress indicator: {}", e);
                false
            }
        }
    }

    /// Stop the indicator and join it before returning. With `mark_done`, an
    /// `Active` status becomes `Done`; a `Cancel` status is always kept.
    pub fn stop(&self, mark_done: bool) -> ProgressStatus {
        self.halt.store(true, Ordering::Release);
        if mark_done {
            let _ = self.status.compare_exchange(
                ProgressStatus::Active as u8,
                ProgressStatus::Done as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
        self.notify();

        if let Some(handle) = self.indicator.lock().take() {
            if handle.join().is_err() {
                warn!("Progress indicator thread panicked");
            }
            debug!("Progress indicator joined");
        }

        self.status()
    }

    fn notify(&self) {
        let _guard = self.wake_lock.lock();
        self.wake.notify_all();
    }
}
