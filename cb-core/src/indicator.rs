//! src/indicator.rs
//! ============================================================================
//! # Spinner line on stderr
//!
//! Builds the render callback handed to `ProgressTracker::start`. Each frame
//! redraws one line in place; [`clear_line`] wipes it when work ends.

use std::{
    io::{self, Write},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use bytesize::ByteSize;
use cb_store::{IndicatorFrame, SuccessCounts};
use crossterm::{
    QueueableCommand,
    cursor::MoveToColumn,
    style::{Print, Stylize},
    terminal::{Clear, ClearType},
};

use crate::cli::Action;

const SPINNER: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

fn verb(action: Action) -> &'static str {
    match action {
        Action::Copy | Action::Add => "Copying",
        Action::Cut => "Cutting",
        Action::Paste => "Pasting",
        Action::Clear => "Clearing",
        _ => "Working",
    }
}

/// Text of one frame, without cursor control.
pub fn frame_text(action: Action, frame: &IndicatorFrame) -> String {
    let spin = SPINNER[(frame.tick % SPINNER.len() as u64) as usize];
    let mut text = format!("{spin} {}...", verb(action));

    let counts = frame.counts;
    if counts.items() > 0 {
        text.push_str(&format!(" {} items", counts.items()));
    }
    if counts.bytes > 0 {
        text.push_str(&format!(
            " ({}, {}/s)",
            ByteSize(counts.bytes),
            ByteSize(frame.throughput())
        ));
    }
    text.push_str(&format!(" {:.1}s", frame.elapsed.as_secs_f64()));
    text
}

/// Render callback writing to stderr. Frames are skipped while `paused`.
pub fn stderr_renderer(
    action: Action,
    paused: Arc<AtomicBool>,
) -> impl FnMut(IndicatorFrame) + Send + 'static {
    move |frame| {
        if paused.load(Ordering::Acquire) {
            return;
        }
        let mut err = io::stderr().lock();
        let _ = draw(&mut err, &frame_text(action, &frame));
    }
}

fn draw<W: Write>(out: &mut W, text: &str) -> io::Result<()> {
    out.queue(MoveToColumn(0))?
        .queue(Clear(ClearType::CurrentLine))?
        .queue(Print(text.dark_grey()))?;
    out.flush()
}

pub fn clear_line<W: Write>(out: &mut W) -> io::Result<()> {
    out.queue(MoveToColumn(0))?
        .queue(Clear(ClearType::CurrentLine))?;
    out.flush()
}

/// One-line summary of what got done, e.g. `Copied 3 files, 1 directory (12 KiB)`.
pub fn success_line(past_tense: &str, counts: &SuccessCounts) -> Option<String> {
    let mut parts = Vec::new();
    if counts.files > 0 {
        parts.push(plural(counts.files, "file", "files"));
    }
    if counts.directories > 0 {
        parts.push(plural(counts.directories, "directory", "directories"));
    }
    if counts.clipboards > 0 && parts.is_empty() {
        parts.push(plural(counts.clipboards, "clipboard", "clipboards"));
    }
    if parts.is_empty() && counts.bytes == 0 {
        return None;
    }

    let mut line = past_tense.to_string();
    if !parts.is_empty() {
        line.push(' ');
        line.push_str(&parts.join(", "));
    }
    if counts.bytes > 0 {
        line.push_str(&format!(" ({})", ByteSize(counts.bytes)));
    }
    Some(line)
}

fn plural(n: u64, one: &str, many: &str) -> String {
    format!("{n} {}", if n == 1 { one } else { many })
}
