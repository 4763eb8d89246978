use crate::config::{
    DATA_DIRECTORY, DATA_FILE_NAME, IGNORE_NAME, LOCK_NAME, LockConfig, METADATA_DIRECTORY,
    MIME_NAME, NOTES_NAME, ORIGINALS_NAME, SlotRoots,
};
use crate::error::{IoContext, StoreError, StoreResult};
use crate::ignore::IgnoreFilter;
use crate::lock::{LockManager, ProcessProbe, SystemProbe};
use compact_str::CompactString;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// One named clipboard slot on disk.
///
/// ```text
/// <root>/data/rawdata.clipboard
/// <root>/data/<copied entries...>
/// <root>/metadata/{notes,originals,lock,ignore,mime}
/// ```
///
/// Opening a slot is cheap and always reflects what is on disk; nothing is
/// cached between calls.
#[derive(Debug, Clone)]
pub struct ClipboardStore {
    name: CompactString,
    root: PathBuf,
    data: PathBuf,
    metadata: PathBuf,
    is_persistent: bool,
    lock_config: LockConfig,
}

/// Serializable snapshot of a slot.
#[derive(Debug, Clone, Serialize)]
pub struct SlotInfo {
    pub name: String,
    pub path: PathBuf,
    pub persistent: bool,
    pub bytes: u64,
    pub files: u64,
    pub directories: u64,
    pub raw: bool,
    pub mime: Option<String>,
    pub note: Option<String>,
    pub locked_by: Option<u32>,
    pub ignore: Vec<String>,
    pub originals: Vec<PathBuf>,
}

fn validate_name(name: &str) -> StoreResult<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0');
    if bad {
        return Err(StoreError::InvalidName(CompactString::from(name)));
    }
    Ok(())
}

/// Non-empty regular file at `path`.
fn has_content(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.len() > 0)
}

fn read_optional(path: &Path) -> StoreResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

fn remove_if_present(path: &Path) -> StoreResult<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other.at(path),
    }
}

impl ClipboardStore {
    /// Resolve `name` against `roots` and create its directories.
    pub fn open(name: &str, roots: &SlotRoots) -> StoreResult<Self> {
        validate_name(name)?;

        let is_persistent = roots.is_persistent(name);
        let root = roots.base_for(name).join(name);
        let data = root.join(DATA_DIRECTORY);
        let metadata = root.join(METADATA_DIRECTORY);

        fs::create_dir_all(&data).map_err(|e| StoreError::slot_setup(&data, e))?;
        fs::create_dir_all(&metadata).map_err(|e| StoreError::slot_setup(&metadata, e))?;

        debug!(name, root = %root.display(), persistent = is_persistent, "Opened clipboard");

        Ok(Self {
            name: CompactString::from(name),
            root,
            data,
            metadata,
            is_persistent,
            lock_config: LockConfig::default(),
        })
    }

    #[must_use]
    pub fn with_lock_config(mut self, lock_config: LockConfig) -> Self {
        self.lock_config = lock_config;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_persistent(&self) -> bool {
        self.is_persistent
    }

    pub fn data_dir(&self) -> &Path {
        &self.data
    }

    pub fn metadata_dir(&self) -> &Path {
        &self.metadata
    }

    pub fn raw_path(&self) -> PathBuf {
        self.data.join(DATA_FILE_NAME)
    }

    pub fn notes_path(&self) -> PathBuf {
        self.metadata.join(NOTES_NAME)
    }

    pub fn originals_path(&self) -> PathBuf {
        self.metadata.join(ORIGINALS_NAME)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.metadata.join(LOCK_NAME)
    }

    pub fn ignore_path(&self) -> PathBuf {
        self.metadata.join(IGNORE_NAME)
    }

    pub fn mime_path(&self) -> PathBuf {
        self.metadata.join(MIME_NAME)
    }

    // ------------------------------------------------------------------
    // Locking

    pub fn lock(&self) -> LockManager<SystemProbe> {
        LockManager::new(self.lock_path(), self.lock_config)
    }

    pub fn lock_with<P: ProcessProbe>(&self, probe: P) -> LockManager<P> {
        LockManager::with_probe(self.lock_path(), self.lock_config, probe)
    }

    pub fn is_locked(&self) -> bool {
        self.lock_path().exists()
    }

    // ------------------------------------------------------------------
    // Content queries

    /// Data directory is non-empty and, if a raw buffer exists, it has bytes.
    pub fn holds_data(&self) -> bool {
        let non_empty = fs::read_dir(&self.data).is_ok_and(|mut it| it.next().is_some());
        if !non_empty {
            return false;
        }
        let raw = self.raw_path();
        !(raw.exists() && !has_content(&raw))
    }

    pub fn holds_raw_data(&self) -> bool {
        has_content(&self.raw_path())
    }

    pub fn holds_ignore_regexes(&self) -> bool {
        has_content(&self.ignore_path())
    }

    /// No data, no note and no recorded originals.
    pub fn is_unused(&self) -> bool {
        !self.holds_data() && !has_content(&self.notes_path()) && !has_content(&self.originals_path())
    }

    /// Stored file-set entries sorted by name. The raw buffer file is not an
    /// entry.
    pub fn entries(&self) -> StoreResult<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.data).at(&self.data)? {
            let entry = entry.at(&self.data)?;
            if entry.file_name() == DATA_FILE_NAME {
                continue;
            }
            entries.push(entry.path());
        }
        entries.sort();
        Ok(entries)
    }

    // ------------------------------------------------------------------
    // Raw buffer

    pub fn read_raw(&self) -> StoreResult<Vec<u8>> {
        let path = self.raw_path();
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    pub fn write_raw(&self, content: &[u8]) -> StoreResult<()> {
        let path = self.raw_path();
        fs::write(&path, content).at(&path)
    }

    pub fn declared_mime(&self) -> StoreResult<Option<String>> {
        Ok(read_optional(&self.mime_path())?
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty()))
    }

    pub fn set_declared_mime(&self, mime: Option<&str>) -> StoreResult<()> {
        let path = self.mime_path();
        match mime {
            Some(mime) if !mime.is_empty() => fs::write(&path, mime).at(&path),
            _ => remove_if_present(&path),
        }
    }

    // ------------------------------------------------------------------
    // Metadata

    pub fn note(&self) -> StoreResult<Option<String>> {
        Ok(read_optional(&self.notes_path())?.filter(|s| !s.is_empty()))
    }

    /// Empty text removes the note.
    pub fn set_note(&self, text: &str) -> StoreResult<()> {
        let path = self.notes_path();
        if text.is_empty() {
            remove_if_present(&path)
        } else {
            fs::write(&path, text).at(&path)
        }
    }

    /// Source paths recorded by a cut.
    pub fn originals(&self) -> StoreResult<Vec<PathBuf>> {
        Ok(read_optional(&self.originals_path())?
            .map(|text| {
                text.lines()
                    .filter(|l| !l.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default())
    }

    pub fn add_originals<I, P>(&self, paths: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let path = self.originals_path();
        let mut text = read_optional(&path)?.unwrap_or_default();
        for p in paths {
            text.push_str(&p.as_ref().to_string_lossy());
            text.push('\n');
        }
        fs::write(&path, text).at(&path)
    }

    pub fn clear_originals(&self) -> StoreResult<()> {
        remove_if_present(&self.originals_path())
    }

    // ------------------------------------------------------------------
    // Ignore filter

    /// Compiled ignore patterns; invalid lines are skipped with a warning.
    pub fn ignore_regexes(&self) -> StoreResult<IgnoreFilter> {
        IgnoreFilter::load(&self.ignore_path())
    }

    pub fn ignore_patterns(&self) -> StoreResult<Vec<String>> {
        Ok(read_optional(&self.ignore_path())?
            .map(|text| text.lines().filter(|l| !l.is_empty()).map(str::to_owned).collect())
            .unwrap_or_default())
    }

    /// Validate all patterns, then store them. Nothing is written if any
    /// pattern is invalid. An empty list removes the ignore file.
    pub fn set_ignore_patterns<S: AsRef<str>>(&self, patterns: &[S]) -> StoreResult<()> {
        let text: String = patterns
            .iter()
            .map(|p| format!("{}\n", p.as_ref()))
            .collect();
        IgnoreFilter::parse_strict(&text)?;

        let path = self.ignore_path();
        if text.is_empty() {
            remove_if_present(&path)
        } else {
            fs::write(&path, text).at(&path)
        }
    }

    /// Apply the slot's ignore patterns to its current contents. Returns how
    /// many entries were removed (always 0 for raw buffers).
    pub fn apply_ignore_regexes(&self) -> StoreResult<usize> {
        if !self.holds_ignore_regexes() {
            return Ok(0);
        }
        let filter = self.ignore_regexes()?;
        if filter.is_empty() {
            return Ok(0);
        }

        if self.holds_raw_data() {
            let content = self.read_raw()?;
            let filtered = filter.apply_to_buffer(&content);
            if filtered != content {
                self.write_raw(&filtered)?;
            }
            Ok(0)
        } else {
            filter.apply_to_dir(&self.data)
        }
    }

    // ------------------------------------------------------------------
    // Whole-slot operations

    /// Remove all data plus originals and declared MIME. Notes and ignore
    /// patterns stay.
    pub fn clear_data(&self) -> StoreResult<()> {
        for entry in fs::read_dir(&self.data).at(&self.data)? {
            let entry = entry.at(&self.data)?;
            let path = entry.path();
            if entry.file_type().at(&path)?.is_dir() {
                fs::remove_dir_all(&path).at(&path)?;
            } else {
                fs::remove_file(&path).at(&path)?;
            }
        }
        self.clear_originals()?;
        self.set_declared_mime(None)?;
        info!(name = %self.name, "Cleared clipboard");
        Ok(())
    }

    pub fn info(&self) -> StoreResult<SlotInfo> {
        let mut bytes: u64 = 0;
        let mut files: u64 = 0;
        let mut directories: u64 = 0;

        let raw = self.holds_raw_data();
        if raw {
            bytes = fs::metadata(self.raw_path()).map(|m| m.len()).unwrap_or(0);
        } else {
            for entry in self.entries()? {
                for item in WalkDir::new(&entry).follow_links(false).into_iter().flatten() {
                    let ft = item.file_type();
                    if ft.is_dir() {
                        directories += 1;
                    } else {
                        files += 1;
                        bytes += item.metadata().map(|m| m.len()).unwrap_or(0);
                    }
                }
            }
        }

        Ok(SlotInfo {
            name: self.name.to_string(),
            path: self.root.clone(),
            persistent: self.is_persistent,
            bytes,
            files,
            directories,
            raw,
            mime: self.declared_mime()?,
            note: self.note()?,
            locked_by: self.lock().owner()?,
            ignore: self.ignore_patterns()?,
            originals: self.originals()?,
        })
    }
}

/// Names of every slot under either root, sorted and deduplicated.
pub fn list_slots(roots: &SlotRoots) -> StoreResult<Vec<String>> {
    let mut names = Vec::new();
    for base in [&roots.temporary, &roots.persistent] {
        let listing = match fs::read_dir(base) {
            Ok(listing) => listing,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(StoreError::io(base, e)),
        };
        for entry in listing {
            let entry = entry.at(base)?;
            if entry.path().join(DATA_DIRECTORY).is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
    }
    names.sort();
    names.dedup();
    Ok(names)
}
