//! PID-file mutual exclusion for a single clipboard slot
//!
//! The `lock` file under a slot's metadata directory holds the owner's process
//! id as text. Its presence is the whole locking state. Claiming is a single
//! atomic create; a waiter retries every poll interval until the owner dies
//! or the file disappears.

use crate::config::{LOCK_NAME, LockConfig};
use crate::error::{IoContext, StoreError, StoreResult};
use crate::progress::ProgressTracker;
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};
use tracing::{debug, warn};

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Platform capability the lock algorithm relies on.
pub trait ProcessProbe: Send + Sync {
    /// Process id written into lock files claimed by this process.
    fn current_pid(&self) -> u32;

    /// Whether `pid` names a running process.
    fn is_alive(&self, pid: u32) -> bool;

    /// Whether `pid` belongs to the caller's process group, i.e. the same shell
    /// pipeline. Platforms without process groups report `false`.
    fn shares_group(&self, pid: u32) -> bool;
}

/// Probe backed by the operating system: `sysinfo` for liveness, process
/// groups through `nix` on unix.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl ProcessProbe for SystemProbe {
    fn current_pid(&self) -> u32 {
        std::process::id()
    }

    fn is_alive(&self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        sys.process(pid)
            .is_some_and(|process| process.status() != ProcessStatus::Zombie)
    }

    #[cfg(unix)]
    fn shares_group(&self, pid: u32) -> bool {
        use nix::unistd::{Pid as UnixPid, getpgid, getpgrp};

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        if raw <= 0 {
            return false;
        }
        getpgid(Some(UnixPid::from_raw(raw))).is_ok_and(|theirs| theirs == getpgrp())
    }

    #[cfg(not(unix))]
    fn shares_group(&self, _pid: u32) -> bool {
        false
    }
}

/// Acquires and releases the lock file of one slot.
#[derive(Debug, Clone)]
pub struct LockManager<P: ProcessProbe = SystemProbe> {
    path: PathBuf,
    probe: P,
    poll_interval: Duration,
}

impl LockManager<SystemProbe> {
    pub fn new(path: impl Into<PathBuf>, config: LockConfig) -> Self {
        Self::with_probe(path, config, SystemProbe)
    }
}

impl<P: ProcessProbe> LockManager<P> {
    pub fn with_probe(path: impl Into<PathBuf>, config: LockConfig, probe: P) -> Self {
        Self {
            path: path.into(),
            probe,
            poll_interval: config.poll_interval,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_locked(&self) -> bool {
        self.path.exists()
    }

    /// Pid recorded in the lock file. Unparseable contents read as `None`.
    pub fn owner(&self) -> StoreResult<Option<u32>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text.trim().parse().ok()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }

    /// Block until the slot is free, then claim it.
    pub fn acquire(&self) -> StoreResult<LockGuard> {
        self.acquire_inner(None)
    }

    /// Like [`acquire`](Self::acquire), but gives up with
    /// [`StoreError::Cancelled`] once `tracker` is cancelled.
    pub fn acquire_cancellable(&self, tracker: &ProgressTracker) -> StoreResult<LockGuard> {
        self.acquire_inner(Some(tracker))
    }

    fn acquire_inner(&self, tracker: Option<&ProgressTracker>) -> StoreResult<LockGuard> {
        let mut waiting = false;
        loop {
            match self.claim() {
                Ok(()) => {
                    debug!(pid = self.probe.current_pid(), path = %self.path.display(), "Lock acquired");
                    return Ok(LockGuard::new(self.path.clone()));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(StoreError::lock_write(&self.path, e)),
            }

            match self.owner()? {
                Some(pid) if self.probe.shares_group(pid) => {
                    debug!(pid, "Lock held by our own pipeline, not waiting");
                    return Ok(LockGuard::new(self.path.clone()));
                }
                Some(pid) if !self.probe.is_alive(pid) => {
                    warn!(owner = pid, "Lock owner is gone, treating lock as stale");
                    self.remove_stale(Some(pid))?;
                    continue;
                }
                Some(pid) => {
                    if !waiting {
                        debug!(owner = pid, "Waiting for clipboard lock");
                        waiting = true;
                    }
                }
                // released between the claim and the read
                None if !self.is_locked() => continue,
                None => {
                    warn!(path = %self.path.display(), "Unreadable lock file, overriding");
                    self.remove_stale(None)?;
                    continue;
                }
            }

            if tracker.is_some_and(ProgressTracker::is_cancelled) {
                return Err(StoreError::Cancelled);
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Create the lock file atomically with our pid already inside. The pid is
    /// staged in a private file and hard-linked into place, so the lock never
    /// exists without its owner. Filesystems without hard links fall back to
    /// an exclusive create.
    fn claim(&self) -> io::Result<()> {
        let pid = self.probe.current_pid();
        let staging = self.staging_path(pid);
        fs::write(&staging, pid.to_string())?;
        let linked = fs::hard_link(&staging, &self.path);
        let _ = fs::remove_file(&staging);

        match linked {
            Err(e) if e.kind() != ErrorKind::AlreadyExists => {
                debug!("Hard link claim failed ({}), creating lock in place", e);
                let mut file = OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&self.path)?;
                file.write_all(pid.to_string().as_bytes())
            }
            other => other,
        }
    }

    fn staging_path(&self, pid: u32) -> PathBuf {
        let n = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = format!(".{LOCK_NAME}.{pid}.{n}");
        self.path.with_file_name(name)
    }

    /// Delete a stale lock, but only if it still names the owner that was
    /// judged stale.
    fn remove_stale(&self, expected: Option<u32>) -> StoreResult<()> {
        if self.owner()? == expected {
            release_path(&self.path)?;
        }
        Ok(())
    }

    /// Delete the lock file regardless of who owns it.
    pub fn release(&self) -> StoreResult<()> {
        release_path(&self.path)
    }
}

fn release_path(path: &Path) -> StoreResult<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other.at(path),
    }
}

/// Held lock. Dropping it deletes the lock file, so every exit path of a
/// locked operation releases the slot.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard {
    path: PathBuf,
    released: bool,
}

impl LockGuard {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    /// Release now and report failures instead of logging them on drop.
    pub fn release(mut self) -> StoreResult<()> {
        self.released = true;
        release_path(&self.path)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = release_path(&self.path) {
            warn!("Failed to release clipboard lock: {}", e);
        }
    }
}
