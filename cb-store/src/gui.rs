//! Boundary to the operating system's GUI clipboard
//!
//! Platform bindings live outside this crate and plug in through
//! [`GuiClipboard`]. The functions here decide what crosses the boundary.

use crate::clipboard::ClipboardStore;
use crate::config::DEFAULT_CLIPBOARD_NAME;
use crate::error::StoreResult;
use crate::mime;
use std::path::PathBuf;
use tracing::debug;

pub const FALLBACK_MIME: &str = "text/plain";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuiContent {
    Text { bytes: Vec<u8>, mime: Option<String> },
    Paths { paths: Vec<PathBuf>, cut: bool },
}

pub trait GuiClipboard: Send + Sync {
    /// Current GUI clipboard content, preferring `requested_mime` when the
    /// platform offers several representations.
    fn read(&self, requested_mime: Option<&str>) -> StoreResult<Option<GuiContent>>;

    fn write(&self, content: &GuiContent) -> StoreResult<()>;

    /// Whether the platform can tell a cut apart from a copy.
    fn supports_cut(&self) -> bool;
}

/// No GUI clipboard available.
#[derive(Debug, Default, Clone, Copy)]
pub struct Headless;

impl GuiClipboard for Headless {
    fn read(&self, _requested_mime: Option<&str>) -> StoreResult<Option<GuiContent>> {
        Ok(None)
    }

    fn write(&self, _content: &GuiContent) -> StoreResult<()> {
        Ok(())
    }

    fn supports_cut(&self) -> bool {
        false
    }
}

/// Bridge for this build. No platform binding is compiled in, so this is
/// always [`Headless`].
pub fn create_gui_clipboard() -> Box<dyn GuiClipboard> {
    Box::new(Headless)
}

/// What the slot should look like on the GUI side, if anything.
pub fn gui_content_for(store: &ClipboardStore, supports_cut: bool) -> StoreResult<Option<GuiContent>> {
    if store.holds_raw_data() {
        let bytes = store.read_raw()?;
        let mime = store
            .declared_mime()?
            .or_else(|| mime::sniff(&bytes).map(str::to_owned))
            .unwrap_or_else(|| FALLBACK_MIME.to_owned());
        return Ok(Some(GuiContent::Text {
            bytes,
            mime: Some(mime),
        }));
    }

    let paths = store.entries()?;
    if paths.is_empty() {
        return Ok(None);
    }
    let cut = supports_cut && !store.originals()?.is_empty();
    Ok(Some(GuiContent::Paths { paths, cut }))
}

/// Publish the slot's contents to the GUI clipboard.
pub fn push_to_gui(store: &ClipboardStore, gui: &dyn GuiClipboard) -> StoreResult<bool> {
    match gui_content_for(store, gui.supports_cut())? {
        Some(content) => {
            gui.write(&content)?;
            debug!(clipboard = store.name(), "Pushed clipboard to GUI");
            Ok(true)
        }
        None => Ok(false),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pulled {
    Nothing,
    /// GUI text now sits in the slot's raw buffer
    Text,
    /// GUI holds file paths; the caller decides whether to copy them
    Paths(Vec<PathBuf>),
}

/// Bring GUI clipboard content into the default slot. Slots holding a file
/// set, and every named slot, are left alone.
pub fn pull_from_gui(store: &ClipboardStore, gui: &dyn GuiClipboard) -> StoreResult<Pulled> {
    if store.name() != DEFAULT_CLIPBOARD_NAME {
        return Ok(Pulled::Nothing);
    }
    if !store.is_unused() && !store.holds_raw_data() {
        return Ok(Pulled::Nothing);
    }

    let requested = store.declared_mime()?;
    match gui.read(requested.as_deref())? {
        Some(GuiContent::Text { bytes, mime }) if !bytes.is_empty() => {
            if store.holds_raw_data() && store.read_raw()? == bytes {
                return Ok(Pulled::Nothing);
            }
            let mime = mime.or_else(|| mime::sniff(&bytes).map(str::to_owned));
            store.clear_data()?;
            store.write_raw(&bytes)?;
            store.set_declared_mime(mime.as_deref())?;
            debug!(bytes = bytes.len(), "Pulled text from GUI clipboard");
            Ok(Pulled::Text)
        }
        Some(GuiContent::Paths { paths, .. }) if !paths.is_empty() => Ok(Pulled::Paths(paths)),
        _ => Ok(Pulled::Nothing),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SlotRoots;
    use parking_lot::Mutex;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        offered: Mutex<Option<GuiContent>>,
        written: Mutex<Vec<GuiContent>>,
        cut: bool,
    }

    impl GuiClipboard for Recorder {
        fn read(&self, _requested_mime: Option<&str>) -> StoreResult<Option<GuiContent>> {
            Ok(self.offered.lock().clone())
        }

        fn write(&self, content: &GuiContent) -> StoreResult<()> {
            self.written.lock().push(content.clone());
            Ok(())
        }

        fn supports_cut(&self) -> bool {
            self.cut
        }
    }

    fn slot(dir: &TempDir, name: &str) -> ClipboardStore {
        ClipboardStore::open(name, &SlotRoots::new(dir.path().join("t"), dir.path().join("p"))).unwrap()
    }

    #[test]
    fn push_raw_buffer_labels_mime() {
        let dir = TempDir::new().unwrap();
        let store = slot(&dir, "0");
        store.write_raw(b"plain words").unwrap();

        let gui = Recorder::default();
        assert!(push_to_gui(&store, &gui).unwrap());
        assert_eq!(
            gui.written.lock()[0],
            GuiContent::Text {
                bytes: b"plain words".to_vec(),
                mime: Some("text/plain".into())
            }
        );
    }

    #[test]
    fn push_cut_only_when_supported() {
        let dir = TempDir::new().unwrap();
        let store = slot(&dir, "0");
        fs::write(store.data_dir().join("f"), "x").unwrap();
        store.add_originals(["/somewhere/f"]).unwrap();

        let plain = Recorder::default();
        push_to_gui(&store, &plain).unwrap();
        assert!(matches!(plain.written.lock()[0], GuiContent::Paths { cut: false, .. }));

        let with_cut = Recorder {
            cut: true,
            ..Recorder::default()
        };
        push_to_gui(&store, &with_cut).unwrap();
        assert!(matches!(with_cut.written.lock()[0], GuiContent::Paths { cut: true, .. }));
    }

    #[test]
    fn empty_slot_pushes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = slot(&dir, "0");
        let gui = Recorder::default();
        assert!(!push_to_gui(&store, &gui).unwrap());
        assert!(gui.written.lock().is_empty());
    }

    #[test]
    fn pull_text_into_default_slot() {
        let dir = TempDir::new().unwrap();
        let store = slot(&dir, "0");
        let gui = Recorder::default();
        *gui.offered.lock() = Some(GuiContent::Text {
            bytes: b"%PDF-1.4 body".to_vec(),
            mime: None,
        });

        assert_eq!(pull_from_gui(&store, &gui).unwrap(), Pulled::Text);
        assert_eq!(store.read_raw().unwrap(), b"%PDF-1.4 body");
        assert_eq!(store.declared_mime().unwrap().as_deref(), Some("application/pdf"));

        // unchanged content is not rewritten
        assert_eq!(pull_from_gui(&store, &gui).unwrap(), Pulled::Nothing);
    }

    #[test]
    fn pull_skips_named_and_file_slots() {
        let dir = TempDir::new().unwrap();
        let gui = Recorder::default();
        *gui.offered.lock() = Some(GuiContent::Text {
            bytes: b"x".to_vec(),
            mime: None,
        });

        let named = slot(&dir, "5");
        assert_eq!(pull_from_gui(&named, &gui).unwrap(), Pulled::Nothing);

        let files = slot(&dir, "0");
        fs::write(files.data_dir().join("f"), "x").unwrap();
        assert_eq!(pull_from_gui(&files, &gui).unwrap(), Pulled::Nothing);
    }

    #[test]
    fn headless_is_inert() {
        let gui = create_gui_clipboard();
        assert!(gui.read(None).unwrap().is_none());
        assert!(!gui.supports_cut());
    }
}
