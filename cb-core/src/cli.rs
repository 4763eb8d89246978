//! src/cli.rs
//! ============================================================================
//! # Command line: action token, slot suffix, operands
//!
//! `cb <action>[slot] [items...]`. The slot rides on the action token
//! (`copy5`, `paste_work`); a bare action uses slot `0`. A suffix is either
//! all digits or starts with `_`, which also makes the slot persistent.

use std::fmt;

use cb_store::DEFAULT_CLIPBOARD_NAME;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Copy,
    Cut,
    Add,
    Paste,
    Clear,
    Show,
    Note,
    Ignore,
    Status,
    Info,
}

/// Full names first, so `paste5` is never read as `p` + `aste5`.
const ACTIONS: &[(&str, Action)] = &[
    ("copy", Action::Copy),
    ("cut", Action::Cut),
    ("add", Action::Add),
    ("paste", Action::Paste),
    ("clear", Action::Clear),
    ("show", Action::Show),
    ("note", Action::Note),
    ("ignore", Action::Ignore),
    ("status", Action::Status),
    ("info", Action::Info),
    ("cp", Action::Copy),
    ("ct", Action::Cut),
    ("ad", Action::Add),
    ("clr", Action::Clear),
    ("sh", Action::Show),
    ("nt", Action::Note),
    ("ig", Action::Ignore),
    ("st", Action::Status),
    ("in", Action::Info),
    ("p", Action::Paste),
];

impl Action {
    pub const fn name(self) -> &'static str {
        match self {
            Action::Copy => "copy",
            Action::Cut => "cut",
            Action::Add => "add",
            Action::Paste => "paste",
            Action::Clear => "clear",
            Action::Show => "show",
            Action::Note => "note",
            Action::Ignore => "ignore",
            Action::Status => "status",
            Action::Info => "info",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn is_slot_suffix(suffix: &str) -> bool {
    suffix.is_empty()
        || suffix.starts_with('_')
        || suffix.bytes().all(|b| b.is_ascii_digit())
}

/// Split an action token into its action and slot name.
pub fn parse_action(token: &str) -> Result<(Action, String), AppError> {
    let lowered = token.to_ascii_lowercase();
    for (name, action) in ACTIONS {
        let Some(rest) = lowered.strip_prefix(name) else {
            continue;
        };
        if is_slot_suffix(rest) {
            // keep the user's spelling of the slot name
            let slot = &token[name.len()..];
            let slot = if slot.is_empty() {
                DEFAULT_CLIPBOARD_NAME.to_string()
            } else {
                slot.to_string()
            };
            return Ok((*action, slot));
        }
    }
    Err(AppError::invalid_input(
        "action",
        format!("unknown action '{token}'"),
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub action: Action,
    pub slot: String,
    pub items: Vec<String>,
}

/// What the process is attached to, used when no action is given.
#[derive(Debug, Clone, Copy, Default)]
pub struct Streams {
    pub stdin_piped: bool,
    pub stdout_piped: bool,
}

pub enum Parsed {
    Run(Invocation),
    Help,
}

pub fn parse_args<I>(args: I, streams: Streams) -> Result<Parsed, AppError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let Some(first) = args.next() else {
        let action = if streams.stdin_piped {
            Action::Copy
        } else if streams.stdout_piped {
            Action::Paste
        } else {
            Action::Status
        };
        return Ok(Parsed::Run(Invocation {
            action,
            slot: DEFAULT_CLIPBOARD_NAME.to_string(),
            items: Vec::new(),
        }));
    };

    if matches!(first.as_str(), "-h" | "--help" | "help") {
        return Ok(Parsed::Help);
    }

    let (action, slot) = parse_action(&first)?;
    let items = args.skip_while(|a| a == "--").collect();
    Ok(Parsed::Run(Invocation {
        action,
        slot,
        items,
    }))
}

pub const USAGE: &str = "\
Usage: cb <action>[slot] [items...]

Actions:
  copy (cp)     copy files, or piped input, into a clipboard
  cut (ct)      like copy, removing the originals on paste
  add (ad)      append files or text to a clipboard
  paste (p)     paste into the current directory, or to piped output
  clear (clr)   empty a clipboard
  show (sh)     list what a clipboard holds
  note (nt)     show or set a clipboard's note
  ignore (ig)   show or set a clipboard's ignore patterns
  status (st)   list clipboards holding data
  info (in)     print clipboard details as JSON

Slots: `copy5` uses slot 5, `copy_work` uses the persistent slot `_work`.
";
