//! src/prompt.rs
//! ============================================================================
//! # Terminal conflict prompt
//!
//! Asks the user what to do when a copy or paste destination already exists.
//! Answers map onto [`CopyPolicy`]: `y` replace this one, `a` replace all,
//! `n` skip this one, `s` skip all. Anything else asks again.

use std::{
    io::{self, BufRead, Write},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use cb_store::{CopyPolicy, DecisionSource};
use crossterm::{
    QueueableCommand,
    cursor::MoveToColumn,
    style::{Print, Stylize},
    terminal::{Clear, ClearType},
};
use tracing::debug;

pub fn parse_answer(line: &str) -> Option<CopyPolicy> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(CopyPolicy::ReplaceOnce),
        "a" | "all" => Some(CopyPolicy::ReplaceAll),
        "n" | "no" => Some(CopyPolicy::SkipOnce),
        "s" | "skip" => Some(CopyPolicy::SkipAll),
        _ => None,
    }
}

pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
    /// Raised while a question is on screen so the spinner stays quiet.
    paused: Arc<AtomicBool>,
}

impl TerminalPrompt<io::BufReader<io::Stdin>, io::Stderr> {
    pub fn stdio(paused: Arc<AtomicBool>) -> Self {
        Self::new(io::BufReader::new(io::stdin()), io::stderr(), paused)
    }
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W, paused: Arc<AtomicBool>) -> Self {
        Self {
            input,
            output,
            paused,
        }
    }

    fn ask(&mut self, item: &Path) -> io::Result<CopyPolicy> {
        self.output
            .queue(MoveToColumn(0))?
            .queue(Clear(ClearType::CurrentLine))?;

        loop {
            self.output
                .queue(Print(format!("{} already exists. ", item.display().to_string().bold())))?
                .queue(Print("Replace? [(y)es/(a)ll/(n)o/(s)kip all] "))?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
            }
            if let Some(policy) = parse_answer(&line) {
                return Ok(policy);
            }
        }
    }
}

impl<R: BufRead, W: Write> DecisionSource for TerminalPrompt<R, W> {
    fn decide(&mut self, item: &Path) -> CopyPolicy {
        self.paused.store(true, Ordering::Release);
        let answer = self.ask(item);
        self.paused.store(false, Ordering::Release);

        match answer {
            Ok(policy) => {
                debug!(item = %item.display(), ?policy, "Conflict answered");
                policy
            }
            Err(e) => {
                // input closed: stop touching existing files
                debug!("Conflict prompt unavailable: {}", e);
                CopyPolicy::SkipAll
            }
        }
    }
}
