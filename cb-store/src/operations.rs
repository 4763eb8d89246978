//! Copy, paste and clear on a locked slot
//!
//! All operations assume the caller holds the slot's lock. Failures of single
//! items land in the session ledger and never abort the batch. Cancellation is
//! checked before each item; work already done is kept and finalized.

use crate::clipboard::ClipboardStore;
use crate::error::StoreResult;
use crate::mime;
use crate::policy::ConflictAction;
use crate::progress::Successes;
use crate::session::Session;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Replace the slot's contents
    Copy,
    /// Replace the slot's contents and remember sources for removal on paste
    Cut,
    /// Keep existing contents and add to them
    Add,
}

impl CopyMode {
    pub fn replaces_contents(self) -> bool {
        !matches!(self, CopyMode::Add)
    }
}

/// How an operation ended. Per-item failures do not change the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
}

fn exists_no_follow(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn remove_path(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(src)?, dest)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> io::Result<()> {
    fs::copy(src, dest).map(|_| ())
}

/// Copy a file, directory tree or symlink to `dest`, counting bytes.
fn copy_path(src: &Path, dest: &Path, successes: &Successes) -> io::Result<()> {
    let meta = fs::symlink_metadata(src)?;
    if meta.file_type().is_symlink() {
        return copy_symlink(src, dest);
    }
    if meta.is_file() {
        let n = fs::copy(src, dest)?;
        successes.add_bytes(n);
        return Ok(());
    }

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
        let target = dest.join(rel);
        let ft = entry.file_type();

        if ft.is_dir() {
            fs::create_dir_all(&target)?;
        } else if ft.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            let n = fs::copy(entry.path(), &target)?;
            successes.add_bytes(n);
        }
    }
    Ok(())
}

fn count_item(path: &Path, successes: &Successes) {
    if fs::symlink_metadata(path).is_ok_and(|m| m.is_dir()) {
        successes.add_directory();
    } else {
        successes.add_file();
    }
}

/// What happened to one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Copied,
    Skipped,
    Failed,
}

/// Copy `src` to `dest`, asking the resolver first if `dest` exists.
fn place_item(src: &Path, dest: &Path, session: &mut Session) -> Placement {
    let label = src.display().to_string();

    if exists_no_follow(dest) {
        match session.resolver.resolve(dest) {
            ConflictAction::Skip => {
                debug!(item = %label, "Skipping existing item");
                return Placement::Skipped;
            }
            ConflictAction::Replace => {
                if let Err(e) = remove_path(dest) {
                    session.record_failure(label, e);
                    return Placement::Failed;
                }
            }
        }
    }

    match copy_path(src, dest, session.progress.successes()) {
        Ok(()) => {
            count_item(dest, session.progress.successes());
            Placement::Copied
        }
        Err(e) => {
            warn!(item = %label, "Copy failed: {}", e);
            session.record_failure(label, e);
            Placement::Failed
        }
    }
}

/// Copy the session's items into `store`.
pub fn copy_items(store: &ClipboardStore, session: &mut Session, mode: CopyMode) -> StoreResult<Outcome> {
    if session.is_cancelled() {
        return Ok(Outcome::Cancelled);
    }
    if mode.replaces_contents() {
        store.clear_data()?;
    }

    let items = std::mem::take(&mut session.items);
    let mut copied: Vec<PathBuf> = Vec::with_capacity(items.len());
    let mut outcome = Outcome::Completed;

    for item in &items {
        if session.is_cancelled() {
            outcome = Outcome::Cancelled;
            break;
        }

        let Some(name) = item.file_name() else {
            session.record_failure(
                item.display().to_string(),
                io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
            );
            continue;
        };

        let dest = store.data_dir().join(name);
        if place_item(item, &dest, session) == Placement::Copied {
            copied.push(std::path::absolute(item).unwrap_or_else(|_| item.clone()));
        }
    }
    session.items = items;

    let ignored = store.apply_ignore_regexes()?;
    if mode == CopyMode::Cut {
        // sources whose copy was filtered out stay where they are
        let kept: Vec<&PathBuf> = copied
            .iter()
            .filter(|src| {
                src.file_name()
                    .is_some_and(|name| exists_no_follow(&store.data_dir().join(name)))
            })
            .collect();
        if !kept.is_empty() {
            store.add_originals(kept)?;
        }
    }
    if !copied.is_empty() {
        session.progress.successes().add_clipboard();
    }

    info!(
        clipboard = store.name(),
        copied = copied.len(),
        ignored,
        failed = session.failed.len(),
        ?outcome,
        "Copy finished"
    );
    Ok(outcome)
}

/// Store the session buffer as the slot's raw content.
pub fn copy_buffer(store: &ClipboardStore, session: &mut Session, mode: CopyMode) -> StoreResult<Outcome> {
    if session.is_cancelled() {
        return Ok(Outcome::Cancelled);
    }

    let content = if mode.replaces_contents() {
        store.clear_data()?;
        std::mem::take(&mut session.buffer)
    } else {
        let mut existing = store.read_raw()?;
        existing.append(&mut session.buffer);
        existing
    };

    let mime = session
        .mime
        .clone()
        .or_else(|| mime::sniff(&content).map(str::to_owned));

    store.write_raw(&content)?;
    store.set_declared_mime(mime.as_deref())?;
    store.apply_ignore_regexes()?;

    let successes = session.progress.successes();
    successes.add_bytes(content.len() as u64);
    successes.add_clipboard();

    info!(clipboard = store.name(), bytes = content.len(), mime = ?mime, "Buffer stored");
    Ok(Outcome::Completed)
}

/// Copy everything in the slot into `destination`. After a cut, the source
/// of every entry that was actually copied is removed. The slot is emptied
/// only when all of its entries made it; skipped or failed entries keep their
/// sources and stay in the slot.
pub fn paste_items(store: &ClipboardStore, session: &mut Session, destination: &Path) -> StoreResult<Outcome> {
    let mut outcome = Outcome::Completed;
    let mut entries: Vec<PathBuf> = store.entries()?;
    if store.holds_raw_data() {
        entries.push(store.raw_path());
    }

    let mut pasted: HashSet<OsString> = HashSet::with_capacity(entries.len());
    for entry in &entries {
        if session.is_cancelled() {
            outcome = Outcome::Cancelled;
            break;
        }
        let Some(name) = entry.file_name() else { continue };
        if place_item(entry, &destination.join(name), session) == Placement::Copied {
            pasted.insert(name.to_os_string());
        }
    }

    let originals = store.originals()?;
    if !originals.is_empty() {
        let (moved, remaining): (Vec<PathBuf>, Vec<PathBuf>) = originals
            .iter()
            .cloned()
            .partition(|src| src.file_name().is_some_and(|name| pasted.contains(name)));

        for original in &moved {
            if let Err(e) = remove_path(original) {
                if e.kind() != io::ErrorKind::NotFound {
                    session.record_failure(original.display().to_string(), e);
                }
            }
        }

        if pasted.len() == entries.len() {
            store.clear_data()?;
        } else if !moved.is_empty() {
            store.clear_originals()?;
            if !remaining.is_empty() {
                store.add_originals(&remaining)?;
            }
        }
    }
    session.progress.successes().add_clipboard();

    info!(
        clipboard = store.name(),
        destination = %destination.display(),
        pasted = pasted.len(),
        entries = entries.len(),
        cut = !originals.is_empty(),
        ?outcome,
        "Paste finished"
    );
    Ok(outcome)
}

/// Empty the slot.
pub fn clear(store: &ClipboardStore, session: &mut Session) -> StoreResult<Outcome> {
    store.clear_data()?;
    session.progress.successes().add_clipboard();
    Ok(Outcome::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SlotRoots;
    use crate::policy::{ConflictResolver, CopyPolicy};
    use crate::progress::ProgressTracker;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        src: PathBuf,
        out: PathBuf,
        store: ClipboardStore,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let out = dir.path().join("out");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&out).unwrap();
        let roots = SlotRoots::new(dir.path().join("tmp"), dir.path().join("persist"));
        let store = ClipboardStore::open("0", &roots).unwrap();
        Fixture {
            _dir: dir,
            src,
            out,
            store,
        }
    }

    fn scripted(answers: &[CopyPolicy], asked: Arc<AtomicUsize>) -> ConflictResolver {
        let mut queue: VecDeque<CopyPolicy> = answers.iter().copied().collect();
        ConflictResolver::new(move |_: &Path| {
            asked.fetch_add(1, Ordering::Relaxed);
            queue.pop_front().expect("unexpected prompt")
        })
    }

    #[test]
    fn copy_files_and_directories() {
        let fx = fixture();
        fs::write(fx.src.join("a.txt"), "hello").unwrap();
        fs::create_dir_all(fx.src.join("dir/nested")).unwrap();
        fs::write(fx.src.join("dir/nested/b.txt"), "world!").unwrap();

        let mut session = Session::default().with_items([fx.src.join("a.txt"), fx.src.join("dir")]);
        let outcome = copy_items(&fx.store, &mut session, CopyMode::Copy).unwrap();

        assert_eq!(outcome, Outcome::Completed);
        assert!(!session.has_failures());
        assert_eq!(fs::read_to_string(fx.store.data_dir().join("dir/nested/b.txt")).unwrap(), "world!");

        let counts = session.progress.successes().snapshot();
        assert_eq!(counts.files, 1);
        assert_eq!(counts.directories, 1);
        assert_eq!(counts.bytes, 11);
        assert_eq!(counts.clipboards, 1);
    }

    #[test]
    fn missing_item_is_recorded_and_batch_continues() {
        let fx = fixture();
        fs::write(fx.src.join("ok.txt"), "x").unwrap();

        let mut session = Session::default().with_items([fx.src.join("nope.txt"), fx.src.join("ok.txt")]);
        copy_items(&fx.store, &mut session, CopyMode::Copy).unwrap();

        assert_eq!(session.failed.len(), 1);
        assert_eq!(session.failed[0].error.kind(), io::ErrorKind::NotFound);
        assert!(fx.store.data_dir().join("ok.txt").exists());
    }

    #[test]
    fn skip_once_prompts_again_for_next_conflict() {
        let fx = fixture();
        fs::create_dir_all(fx.src.join("one")).unwrap();
        fs::create_dir_all(fx.src.join("two")).unwrap();
        fs::write(fx.src.join("one/a.txt"), "first").unwrap();
        fs::write(fx.src.join("two/a.txt"), "second").unwrap();
        fs::write(fx.store.data_dir().join("a.txt"), "existing").unwrap();

        let asked = Arc::new(AtomicUsize::new(0));
        let resolver = scripted(&[CopyPolicy::SkipOnce, CopyPolicy::SkipOnce], asked.clone());
        let mut session = Session::new(resolver, Arc::new(ProgressTracker::new()))
            .with_items([fx.src.join("one/a.txt"), fx.src.join("two/a.txt")]);

        copy_items(&fx.store, &mut session, CopyMode::Add).unwrap();

        assert_eq!(asked.load(Ordering::Relaxed), 2);
        assert_eq!(session.resolver.policy(), CopyPolicy::Unknown);
        assert_eq!(fs::read_to_string(fx.store.data_dir().join("a.txt")).unwrap(), "existing");
    }

    #[test]
    fn replace_all_stops_prompting() {
        let fx = fixture();
        for sub in ["one", "two", "three"] {
            fs::create_dir_all(fx.src.join(sub)).unwrap();
            fs::write(fx.src.join(sub).join("a.txt"), sub).unwrap();
        }

        let asked = Arc::new(AtomicUsize::new(0));
        let resolver = scripted(&[CopyPolicy::ReplaceAll], asked.clone());
        let mut session = Session::new(resolver, Arc::new(ProgressTracker::new())).with_items([
            fx.src.join("one/a.txt"),
            fx.src.join("two/a.txt"),
            fx.src.join("three/a.txt"),
        ]);

        copy_items(&fx.store, &mut session, CopyMode::Copy).unwrap();

        assert_eq!(asked.load(Ordering::Relaxed), 1);
        assert_eq!(fs::read_to_string(fx.store.data_dir().join("a.txt")).unwrap(), "three");
    }

    #[test]
    fn cancelled_before_start_keeps_existing_contents() {
        let fx = fixture();
        fs::write(fx.src.join("a"), "x").unwrap();
        fs::write(fx.store.data_dir().join("old.txt"), "old").unwrap();
        let mut session = Session::default().with_items([fx.src.join("a")]);
        session.progress.cancel();

        let outcome = copy_items(&fx.store, &mut session, CopyMode::Copy).unwrap();
        assert_eq!(outcome, Outcome::Cancelled);
        assert_eq!(fx.store.entries().unwrap(), vec![fx.store.data_dir().join("old.txt")]);
    }

    #[test]
    fn copy_applies_ignore_patterns() {
        let fx = fixture();
        fs::write(fx.src.join("a.tmp"), "x").unwrap();
        fs::write(fx.src.join("b.txt"), "y").unwrap();
        fx.store.set_ignore_patterns(&[".*\\.tmp"]).unwrap();

        let mut session = Session::default().with_items([fx.src.join("a.tmp"), fx.src.join("b.txt")]);
        copy_items(&fx.store, &mut session, CopyMode::Copy).unwrap();

        assert_eq!(fx.store.entries().unwrap(), vec![fx.store.data_dir().join("b.txt")]);
    }

    #[test]
    fn buffer_copy_sniffs_mime() {
        let fx = fixture();
        let png = b"\x89PNG\r\n\x1a\n\x00\x00".to_vec();
        let mut session = Session::default().with_buffer(png.clone(), None);

        copy_buffer(&fx.store, &mut session, CopyMode::Copy).unwrap();
        assert_eq!(fx.store.read_raw().unwrap(), png);
        assert_eq!(fx.store.declared_mime().unwrap().as_deref(), Some("image/png"));

        let mut more = Session::default().with_buffer(b"tail".to_vec(), Some("text/plain".into()));
        copy_buffer(&fx.store, &mut more, CopyMode::Add).unwrap();
        assert!(fx.store.read_raw().unwrap().ends_with(b"tail"));
        assert_eq!(fx.store.declared_mime().unwrap().as_deref(), Some("text/plain"));
    }

    #[test]
    fn paste_after_cut_removes_originals() {
        let fx = fixture();
        fs::write(fx.src.join("moved.txt"), "data").unwrap();

        let mut session = Session::default().with_items([fx.src.join("moved.txt")]);
        copy_items(&fx.store, &mut session, CopyMode::Cut).unwrap();
        assert_eq!(fx.store.originals().unwrap().len(), 1);

        let mut paste = Session::default();
        paste_items(&fx.store, &mut paste, &fx.out).unwrap();

        assert_eq!(fs::read_to_string(fx.out.join("moved.txt")).unwrap(), "data");
        assert!(!fx.src.join("moved.txt").exists());
        assert!(fx.store.is_unused());
    }

    #[test]
    fn skipped_cut_entry_keeps_its_source() {
        let fx = fixture();
        fs::write(fx.src.join("a.txt"), "precious").unwrap();
        fs::write(fx.out.join("a.txt"), "old").unwrap();

        let mut session = Session::default().with_items([fx.src.join("a.txt")]);
        copy_items(&fx.store, &mut session, CopyMode::Cut).unwrap();

        let asked = Arc::new(AtomicUsize::new(0));
        let resolver = scripted(&[CopyPolicy::SkipOnce], asked.clone());
        let mut paste = Session::new(resolver, Arc::new(ProgressTracker::new()));
        paste_items(&fx.store, &mut paste, &fx.out).unwrap();

        assert_eq!(asked.load(Ordering::Relaxed), 1);
        assert!(!paste.has_failures());
        assert_eq!(fs::read_to_string(fx.src.join("a.txt")).unwrap(), "precious");
        assert_eq!(fs::read_to_string(fx.out.join("a.txt")).unwrap(), "old");
        assert!(fx.store.holds_data());
        assert_eq!(fx.store.originals().unwrap().len(), 1);
    }

    #[test]
    fn partial_cut_paste_moves_only_what_was_copied() {
        let fx = fixture();
        fs::write(fx.src.join("a.txt"), "a").unwrap();
        fs::write(fx.src.join("b.txt"), "b").unwrap();
        fs::write(fx.out.join("b.txt"), "taken").unwrap();

        let mut session = Session::default().with_items([fx.src.join("a.txt"), fx.src.join("b.txt")]);
        copy_items(&fx.store, &mut session, CopyMode::Cut).unwrap();

        let asked = Arc::new(AtomicUsize::new(0));
        let resolver = scripted(&[CopyPolicy::SkipAll], asked);
        let mut paste = Session::new(resolver, Arc::new(ProgressTracker::new()));
        paste_items(&fx.store, &mut paste, &fx.out).unwrap();

        assert!(!fx.src.join("a.txt").exists());
        assert_eq!(fs::read_to_string(fx.out.join("a.txt")).unwrap(), "a");
        assert!(fx.src.join("b.txt").exists());
        let remaining = fx.store.originals().unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].ends_with("b.txt"));
        assert!(fx.store.holds_data());
    }

    #[test]
    fn cut_does_not_claim_ignored_sources() {
        let fx = fixture();
        fs::write(fx.src.join("a.tmp"), "scratch").unwrap();
        fs::write(fx.src.join("b.txt"), "keep").unwrap();
        fx.store.set_ignore_patterns(&[".*\\.tmp"]).unwrap();

        let mut session = Session::default().with_items([fx.src.join("a.tmp"), fx.src.join("b.txt")]);
        copy_items(&fx.store, &mut session, CopyMode::Cut).unwrap();

        let originals = fx.store.originals().unwrap();
        assert_eq!(originals.len(), 1);
        assert!(originals[0].ends_with("b.txt"));

        let mut paste = Session::default();
        paste_items(&fx.store, &mut paste, &fx.out).unwrap();

        assert_eq!(fs::read_to_string(fx.src.join("a.tmp")).unwrap(), "scratch");
        assert!(!fx.out.join("a.tmp").exists());
        assert!(!fx.src.join("b.txt").exists());
        assert_eq!(fs::read_to_string(fx.out.join("b.txt")).unwrap(), "keep");
    }

    #[test]
    fn paste_after_copy_keeps_slot() {
        let fx = fixture();
        fs::write(fx.src.join("kept.txt"), "data").unwrap();

        let mut session = Session::default().with_items([fx.src.join("kept.txt")]);
        copy_items(&fx.store, &mut session, CopyMode::Copy).unwrap();

        let mut paste = Session::default();
        paste_items(&fx.store, &mut paste, &fx.out).unwrap();

        assert!(fx.src.join("kept.txt").exists());
        assert!(fx.out.join("kept.txt").exists());
        assert!(fx.store.holds_data());
    }

    #[test]
    fn clear_empties_slot() {
        let fx = fixture();
        fx.store.write_raw(b"x").unwrap();
        let mut session = Session::default();
        clear(&fx.store, &mut session).unwrap();
        assert!(fx.store.is_unused());
        assert_eq!(session.progress.successes().snapshot().clipboards, 1);
    }
}
