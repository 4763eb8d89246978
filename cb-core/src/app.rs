//! src/app.rs
//! ============================================================================
//! # App: one `cb` invocation from slot selection to summary
//!
//! Opens the slot, takes its lock when the action needs one, runs the action
//! with a [`Session`] and hands back a [`Report`]. Everything here blocks, so
//! `main` runs it on tokio's blocking pool while the signal listener stays
//! free to cancel.

use std::{
    io::{self, Read, Write},
    path::{Path, PathBuf},
    sync::{Arc, atomic::AtomicBool},
};

use cb_store::{
    ClipboardStore, ConflictResolver, CopyMode, DecisionSource, FailedItem, GuiClipboard, Headless,
    LockGuard, Outcome, ProgressTracker, Pulled, Session, SlotRoots, SuccessCounts, clear, copy_buffer,
    copy_items, create_gui_clipboard, list_slots, paste_items, pull_from_gui, push_to_gui,
};
use crossterm::tty::IsTty;
use tracing::{info, warn};

use crate::{
    cli::{Action, Invocation, Streams},
    config::Config,
    error::AppError,
    indicator,
    prompt::TerminalPrompt,
};

/// Failures listed individually before the rest are summed up.
pub const MAX_REPORTED_FAILURES: usize = 20;

/// Builds the conflict question source for each session.
pub type PromptFactory = Box<dyn Fn() -> Box<dyn DecisionSource + Send> + Send + Sync>;

/// What the process is attached to.
#[derive(Debug, Clone, Copy, Default)]
pub struct Terminal {
    pub stdin_tty: bool,
    pub stdout_tty: bool,
    pub stderr_tty: bool,
    /// `CI` set: nobody is there to answer
    pub ci: bool,
    /// `CLIPBOARD_FORCETTY` set: behave as if attached to a terminal
    pub forced: bool,
}

impl Terminal {
    pub fn detect<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            stdin_tty: io::stdin().is_tty(),
            stdout_tty: io::stdout().is_tty(),
            stderr_tty: io::stderr().is_tty(),
            ci: var("CI").is_some(),
            forced: var("CLIPBOARD_FORCETTY").is_some(),
        }
    }

    /// Conflicts can be asked about.
    pub fn interactive(&self) -> bool {
        self.forced || (self.stdin_tty && self.stderr_tty && !self.ci)
    }

    pub fn streams(&self) -> Streams {
        Streams {
            stdin_piped: !self.stdin_tty && !self.forced,
            stdout_piped: !self.stdout_tty && !self.forced,
        }
    }

    fn shows_progress(&self) -> bool {
        self.forced || self.stderr_tty
    }
}

#[derive(Debug)]
pub struct Report {
    pub action: Action,
    pub slot: String,
    pub outcome: Outcome,
    pub counts: SuccessCounts,
    pub failed: Vec<FailedItem>,
}

impl Report {
    fn quiet(action: Action, slot: &str) -> Self {
        Self {
            action,
            slot: slot.to_string(),
            outcome: Outcome::Completed,
            counts: SuccessCounts::default(),
            failed: Vec::new(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            Outcome::Completed => 0,
            Outcome::Cancelled => 130,
        }
    }
}

pub struct App {
    config: Config,
    roots: SlotRoots,
    terminal: Terminal,
    tracker: Arc<ProgressTracker>,
    gui: Box<dyn GuiClipboard>,
    prompt: PromptFactory,
    paused: Arc<AtomicBool>,
}

impl App {
    pub fn new(config: Config, terminal: Terminal) -> Self {
        let roots = config.slot_roots();
        let gui: Box<dyn GuiClipboard> = if config.no_gui {
            Box::new(Headless)
        } else {
            create_gui_clipboard()
        };

        let paused = Arc::new(AtomicBool::new(false));
        let prompt_paused = Arc::clone(&paused);
        let prompt: PromptFactory = Box::new(move || -> Box<dyn DecisionSource + Send> {
            Box::new(TerminalPrompt::stdio(Arc::clone(&prompt_paused)))
        });

        Self {
            config,
            roots,
            terminal,
            tracker: Arc::new(ProgressTracker::new()),
            gui,
            prompt,
            paused,
        }
    }

    #[must_use]
    pub fn with_gui(mut self, gui: Box<dyn GuiClipboard>) -> Self {
        self.gui = gui;
        self
    }

    /// Replaces the stdin/stderr conflict prompt. The factory receives the
    /// flag that keeps the spinner quiet while a question is on screen.
    #[must_use]
    pub fn with_prompt<F>(mut self, prompt: F) -> Self
    where
        F: Fn(Arc<AtomicBool>) -> Box<dyn DecisionSource + Send> + Send + Sync + 'static,
    {
        let paused = Arc::clone(&self.paused);
        self.prompt = Box::new(move || prompt(Arc::clone(&paused)));
        self
    }

    /// Shared with the signal listener.
    pub fn tracker(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.tracker)
    }

    fn open(&self, slot: &str) -> Result<ClipboardStore, AppError> {
        Ok(ClipboardStore::open(slot, &self.roots)?.with_lock_config(self.config.lock_config()))
    }

    fn lock(&self, store: &ClipboardStore) -> Result<LockGuard, AppError> {
        Ok(store.lock().acquire_cancellable(&self.tracker)?)
    }

    fn session(&self) -> Session {
        let mut source = (self.prompt)();
        let resolver = ConflictResolver::for_terminal(self.terminal.interactive(), move |item: &Path| {
            source.decide(item)
        });
        Session::new(resolver, Arc::clone(&self.tracker))
    }

    fn start_indicator(&self, action: Action) {
        if self.config.progress.enabled && self.terminal.shows_progress() {
            self.tracker.start(
                self.config.progress.refresh_interval,
                indicator::stderr_renderer(action, Arc::clone(&self.paused)),
            );
        }
    }

    fn stop_indicator(&self, outcome: Outcome) {
        self.tracker.stop(outcome == Outcome::Completed);
        if self.config.progress.enabled && self.terminal.shows_progress() {
            let _ = indicator::clear_line(&mut io::stderr().lock());
        }
    }

    fn push(&self, store: &ClipboardStore) {
        match push_to_gui(store, self.gui.as_ref()) {
            Ok(true) => info!(clipboard = store.name(), "Pushed to GUI clipboard"),
            Ok(false) => {}
            Err(e) => warn!("GUI clipboard push failed: {}", e),
        }
    }

    /// GUI content lands in the default slot before it is read.
    fn pull(&self, store: &ClipboardStore, session: &mut Session) -> Result<(), AppError> {
        match pull_from_gui(store, self.gui.as_ref()) {
            Ok(Pulled::Paths(paths)) => {
                session.items = paths;
                session.dedup_items();
                copy_items(store, session, CopyMode::Copy)?;
            }
            Ok(Pulled::Text | Pulled::Nothing) => {}
            Err(e) => warn!("GUI clipboard pull failed: {}", e),
        }
        Ok(())
    }

    /// Run one invocation. `input` is only read for piped copies and notes;
    /// `output` receives pasted buffers, listings and JSON. The conflict
    /// prompt may read the same stream, so `input` must not hold it locked.
    pub fn run<R, W>(
        &self,
        invocation: &Invocation,
        cwd: &Path,
        input: R,
        output: &mut W,
    ) -> Result<Report, AppError>
    where
        R: Read,
        W: Write,
    {
        let Invocation {
            action,
            slot,
            items,
        } = invocation;
        info!(action = %action, slot = %slot, items = items.len(), "Starting action");

        match action {
            Action::Copy | Action::Cut | Action::Add => self.copy(*action, slot, items, cwd, input),
            Action::Paste => self.paste(slot, cwd, output),
            Action::Clear => self.clear(slot),
            Action::Show => self.show(slot, output),
            Action::Note => self.note(slot, items, input, output),
            Action::Ignore => self.ignore(slot, items, output),
            Action::Status => self.status(output),
            Action::Info => self.info(slot, output),
        }
    }

    fn finish(&self, action: Action, store: &ClipboardStore, session: Session, outcome: Outcome) -> Report {
        self.stop_indicator(outcome);
        Report {
            action,
            slot: store.name().to_string(),
            outcome,
            counts: self.tracker.successes().snapshot(),
            failed: session.failed,
        }
    }

    fn copy<R: Read>(
        &self,
        action: Action,
        slot: &str,
        items: &[String],
        cwd: &Path,
        mut input: R,
    ) -> Result<Report, AppError> {
        let mode = match action {
            Action::Cut => CopyMode::Cut,
            Action::Add => CopyMode::Add,
            _ => CopyMode::Copy,
        };

        let mut session = self.session();
        if items.is_empty() {
            if !self.terminal.streams().stdin_piped {
                return Err(AppError::invalid_input(action.name(), "nothing to copy"));
            }
            let mut buffer = Vec::new();
            input.read_to_end(&mut buffer)?;
            session.buffer = buffer;
        } else {
            session = session.with_items(items.iter().map(|item| cwd.join(item)));
        }

        let store = self.open(slot)?;
        let _guard = self.lock(&store)?;
        self.start_indicator(action);

        let outcome = if items.is_empty() {
            copy_buffer(&store, &mut session, mode)
        } else {
            copy_items(&store, &mut session, mode)
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                self.stop_indicator(Outcome::Cancelled);
                return Err(e.into());
            }
        };

        if outcome == Outcome::Completed {
            self.push(&store);
        }
        Ok(self.finish(action, &store, session, outcome))
    }

    fn paste<W: Write>(&self, slot: &str, cwd: &Path, output: &mut W) -> Result<Report, AppError> {
        let store = self.open(slot)?;
        let _guard = self.lock(&store)?;
        let mut session = self.session();
        self.pull(&store, &mut session)?;

        if self.terminal.streams().stdout_piped && store.holds_raw_data() {
            let content = store.read_raw()?;
            output.write_all(&content)?;
            output.flush()?;
            self.tracker.successes().add_bytes(content.len() as u64);
            self.tracker.successes().add_clipboard();
            return Ok(self.finish(Action::Paste, &store, session, Outcome::Completed));
        }

        self.start_indicator(Action::Paste);
        match paste_items(&store, &mut session, cwd) {
            Ok(outcome) => Ok(self.finish(Action::Paste, &store, session, outcome)),
            Err(e) => {
                self.stop_indicator(Outcome::Cancelled);
                Err(e.into())
            }
        }
    }

    fn clear(&self, slot: &str) -> Result<Report, AppError> {
        let store = self.open(slot)?;
        let _guard = self.lock(&store)?;
        let mut session = self.session();
        let outcome = clear(&store, &mut session)?;
        self.push(&store);
        Ok(self.finish(Action::Clear, &store, session, outcome))
    }

    fn show<W: Write>(&self, slot: &str, output: &mut W) -> Result<Report, AppError> {
        let store = self.open(slot)?;
        let mut session = self.session();
        self.pull(&store, &mut session)?;

        if store.holds_raw_data() {
            output.write_all(&store.read_raw()?)?;
        } else {
            for entry in store.entries()? {
                if let Some(name) = entry.file_name() {
                    writeln!(output, "{}", name.to_string_lossy())?;
                }
            }
        }
        output.flush()?;
        Ok(Report::quiet(Action::Show, store.name()))
    }

    fn note<R: Read, W: Write>(
        &self,
        slot: &str,
        items: &[String],
        mut input: R,
        output: &mut W,
    ) -> Result<Report, AppError> {
        let store = self.open(slot)?;

        let text = if !items.is_empty() {
            Some(items.join(" "))
        } else if self.terminal.streams().stdin_piped {
            let mut text = String::new();
            input.read_to_string(&mut text)?;
            Some(text.trim_end_matches('\n').to_string())
        } else {
            None
        };

        match text {
            Some(text) => {
                let _guard = self.lock(&store)?;
                store.set_note(&text)?;
            }
            None => {
                if let Some(note) = store.note()? {
                    writeln!(output, "{note}")?;
                }
            }
        }
        Ok(Report::quiet(Action::Note, store.name()))
    }

    fn ignore<W: Write>(&self, slot: &str, items: &[String], output: &mut W) -> Result<Report, AppError> {
        let store = self.open(slot)?;

        if items.is_empty() {
            for pattern in store.ignore_patterns()? {
                writeln!(output, "{pattern}")?;
            }
        } else {
            let patterns: Vec<&str> = items
                .iter()
                .map(String::as_str)
                .filter(|p| !p.is_empty())
                .collect();
            let _guard = self.lock(&store)?;
            store.set_ignore_patterns(&patterns)?;
            store.apply_ignore_regexes()?;
        }
        Ok(Report::quiet(Action::Ignore, store.name()))
    }

    fn status<W: Write>(&self, output: &mut W) -> Result<Report, AppError> {
        let mut any = false;
        for name in list_slots(&self.roots)? {
            let store = self.open(&name)?;
            if !store.holds_data() {
                continue;
            }
            any = true;
            let info = store.info()?;
            let what = if info.raw {
                info.mime.clone().unwrap_or_else(|| "text".to_string())
            } else {
                format!("{} entries", info.files + info.directories)
            };
            let marker = if info.persistent { " (persistent)" } else { "" };
            writeln!(
                output,
                "{}{}: {}, {}",
                info.name,
                marker,
                what,
                bytesize::ByteSize(info.bytes)
            )?;
        }
        if !any {
            writeln!(output, "All clipboards are empty")?;
        }
        Ok(Report::quiet(Action::Status, "*"))
    }

    fn info<W: Write>(&self, slot: &str, output: &mut W) -> Result<Report, AppError> {
        let store = self.open(slot)?;
        serde_json::to_writer_pretty(&mut *output, &store.info()?)?;
        writeln!(output)?;
        Ok(Report::quiet(Action::Info, store.name()))
    }
}

fn past_tense(action: Action) -> &'static str {
    match action {
        Action::Copy => "Copied",
        Action::Cut => "Cut",
        Action::Add => "Added",
        Action::Paste => "Pasted",
        Action::Clear => "Cleared",
        _ => "Done",
    }
}

/// Human summary of a finished action, written to stderr by `main`.
pub fn write_summary<W: Write>(out: &mut W, report: &Report) -> io::Result<()> {
    if report.outcome == Outcome::Cancelled {
        writeln!(out, "Cancelled {} on clipboard {}", report.action, report.slot)?;
    } else if let Some(line) = indicator::success_line(past_tense(report.action), &report.counts) {
        writeln!(out, "{line}")?;
    }

    if report.failed.is_empty() {
        return Ok(());
    }

    writeln!(out, "Could not {} {} items:", report.action, report.failed.len())?;
    for failed in report.failed.iter().take(MAX_REPORTED_FAILURES) {
        writeln!(out, "  {}: {}", failed.item, failed.error)?;
    }
    if report.failed.len() > MAX_REPORTED_FAILURES {
        writeln!(out, "  and {} more", report.failed.len() - MAX_REPORTED_FAILURES)?;
    }
    Ok(())
}

/// Working directory for relative item paths and paste destinations.
pub fn current_dir() -> Result<PathBuf, AppError> {
    Ok(std::env::current_dir()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::{self, BufReader, Cursor};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// One stream shared by `run` and the prompt. Locks per read, like
    /// `Stdin`, and refuses to read while another handle holds it.
    #[derive(Clone)]
    struct SharedInput(Arc<Mutex<Cursor<Vec<u8>>>>);

    impl SharedInput {
        fn new(text: &str) -> Self {
            Self(Arc::new(Mutex::new(Cursor::new(text.as_bytes().to_vec()))))
        }
    }

    impl Read for SharedInput {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.try_lock() {
                Ok(mut inner) => inner.read(buf),
                Err(_) => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            }
        }
    }

    struct Fixture {
        dir: TempDir,
        app: App,
    }

    fn fixture(terminal: Terminal) -> Fixture {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.temporary_dir = Some(dir.path().join("tmp"));
        config.storage.persistent_dir = Some(dir.path().join("persist"));
        config.progress.enabled = false;
        config.no_gui = true;
        let app = App::new(config, terminal);
        Fixture { dir, app }
    }

    fn piped() -> Terminal {
        Terminal::default()
    }

    fn tty() -> Terminal {
        Terminal {
            stdin_tty: true,
            stdout_tty: true,
            stderr_tty: true,
            ci: true,
            forced: false,
        }
    }

    fn attended() -> Terminal {
        Terminal {
            stdin_tty: true,
            stdout_tty: true,
            stderr_tty: true,
            ci: false,
            forced: false,
        }
    }

    /// Cuts `src/a.txt` into slot 0, then pastes it over an existing
    /// `dest/a.txt` while the prompt answers from `input`.
    fn cut_then_paste_over(answer: &str) -> (Fixture, PathBuf, PathBuf, Report) {
        let input = SharedInput::new(answer);
        let prompt_input = input.clone();
        let mut fx = fixture(attended());
        fx.app = fx.app.with_prompt(move |paused| {
            Box::new(TerminalPrompt::new(BufReader::new(prompt_input.clone()), io::sink(), paused))
        });

        let src = fx.dir.path().join("src");
        let dest = fx.dir.path().join("dest");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dest).unwrap();
        fs::write(src.join("a.txt"), "new").unwrap();
        fs::write(dest.join("a.txt"), "old").unwrap();

        fx.app
            .run(&inv(Action::Cut, "0", &["a.txt"]), &src, input.clone(), &mut Vec::new())
            .unwrap();
        let report = fx
            .app
            .run(&inv(Action::Paste, "0", &[]), &dest, input, &mut Vec::new())
            .unwrap();
        (fx, src, dest, report)
    }

    #[test]
    fn prompt_reads_the_stream_run_was_given() {
        let (fx, src, dest, report) = cut_then_paste_over("y\n");
        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "new");
        assert!(!src.join("a.txt").exists());
        assert!(!fx.dir.path().join("tmp/0/data/a.txt").exists());
    }

    #[test]
    fn declined_paste_after_cut_keeps_the_source() {
        let (fx, src, dest, report) = cut_then_paste_over("n\n");
        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "old");
        assert_eq!(fs::read_to_string(src.join("a.txt")).unwrap(), "new");
        assert!(fx.dir.path().join("tmp/0/data/a.txt").exists());
    }

    fn inv(action: Action, slot: &str, items: &[&str]) -> Invocation {
        Invocation {
            action,
            slot: slot.to_string(),
            items: items.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn piped_text_round_trips_through_a_slot() {
        let fx = fixture(piped());
        let cwd = fx.dir.path();

        let mut out = Vec::new();
        let report = fx
            .app
            .run(&inv(Action::Copy, "0", &[]), cwd, Cursor::new("hello"), &mut out)
            .unwrap();
        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(report.counts.bytes, 5);

        fx.app
            .run(&inv(Action::Paste, "0", &[]), cwd, io::empty(), &mut out)
            .unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn file_copy_and_paste_relative_to_cwd() {
        let fx = fixture(tty());
        let src = fx.dir.path().join("src");
        let dest = fx.dir.path().join("dest");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dest).unwrap();
        fs::write(src.join("a.txt"), "a").unwrap();

        let mut out = Vec::new();
        fx.app
            .run(&inv(Action::Copy, "_keep", &["a.txt"]), &src, io::empty(), &mut out)
            .unwrap();
        assert!(fx.dir.path().join("persist/_keep/data/a.txt").exists());

        let report = fx
            .app
            .run(&inv(Action::Paste, "_keep", &[]), &dest, io::empty(), &mut out)
            .unwrap();
        assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "a");
        assert!(report.failed.is_empty());
    }

    #[test]
    fn copy_without_items_on_a_terminal_is_rejected() {
        let fx = fixture(tty());
        let err = fx
            .app
            .run(&inv(Action::Copy, "0", &[]), fx.dir.path(), io::empty(), &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { .. }));
    }

    #[test]
    fn note_and_ignore_are_stored_and_shown() {
        let fx = fixture(tty());
        let cwd = fx.dir.path();

        fx.app
            .run(&inv(Action::Note, "3", &["for", "later"]), cwd, io::empty(), &mut Vec::new())
            .unwrap();
        let mut out = Vec::new();
        fx.app
            .run(&inv(Action::Note, "3", &[]), cwd, io::empty(), &mut out)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "for later\n");

        let err = fx
            .app
            .run(&inv(Action::Ignore, "3", &["ok", "(bad"]), cwd, io::empty(), &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, AppError::Store(_)));

        fx.app
            .run(&inv(Action::Ignore, "3", &[r"\.log$"]), cwd, io::empty(), &mut Vec::new())
            .unwrap();
        let mut out = Vec::new();
        fx.app
            .run(&inv(Action::Ignore, "3", &[]), cwd, io::empty(), &mut out)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "\\.log$\n");
    }

    #[test]
    fn status_lists_only_slots_with_data() {
        let fx = fixture(piped());
        let cwd = fx.dir.path();
        fx.app
            .run(&inv(Action::Copy, "7", &[]), cwd, Cursor::new("seven"), &mut Vec::new())
            .unwrap();
        fx.app
            .run(&inv(Action::Clear, "8", &[]), cwd, io::empty(), &mut Vec::new())
            .unwrap();

        let mut out = Vec::new();
        fx.app
            .run(&inv(Action::Status, "0", &[]), cwd, io::empty(), &mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("7: "));
        assert!(!text.contains("8:"));
    }

    #[test]
    fn info_prints_json() {
        let fx = fixture(piped());
        let mut out = Vec::new();
        fx.app
            .run(&inv(Action::Info, "4", &[]), fx.dir.path(), io::empty(), &mut out)
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["name"], "4");
        assert_eq!(value["persistent"], false);
    }

    #[test]
    fn cancelled_tracker_aborts_the_copy() {
        let fx = fixture(piped());
        fx.app.tracker().cancel();
        let report = fx
            .app
            .run(&inv(Action::Copy, "0", &[]), fx.dir.path(), Cursor::new("x"), &mut Vec::new());
        match report {
            Ok(report) => assert_eq!(report.exit_code(), 130),
            Err(e) => assert_eq!(e.exit_code(), 130),
        }
    }

    #[test]
    fn summary_caps_listed_failures() {
        let failed = (0..23)
            .map(|i| FailedItem::new(format!("f{i}"), io::Error::from(io::ErrorKind::PermissionDenied)))
            .collect();
        let report = Report {
            action: Action::Copy,
            slot: "0".to_string(),
            outcome: Outcome::Completed,
            counts: SuccessCounts {
                files: 2,
                ..SuccessCounts::default()
            },
            failed,
        };

        let mut out = Vec::new();
        write_summary(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Copied 2 files\n"));
        assert!(text.contains("Could not copy 23 items:"));
        assert!(text.contains("  f19: "));
        assert!(!text.contains("  f20: "));
        assert!(text.ends_with("  and 3 more\n"));
    }
}
