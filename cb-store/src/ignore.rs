//! Regex ignore filters stored per slot
//!
//! The `ignore` metadata file holds one pattern per line. For raw buffers
//! every match is cut out of the content; for file sets each entry whose name
//! matches a pattern is deleted. Patterns run in file order.

use crate::error::{IoContext, StoreError, StoreResult};
use regex::bytes::Regex;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct IgnoreRule {
    pattern: String,
    anywhere: Regex,
    whole: Regex,
}

impl IgnoreRule {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: pattern.to_owned(),
            anywhere: Regex::new(pattern)?,
            whole: if is_anchored(pattern) {
                Regex::new(pattern)?
            } else {
                Regex::new(&format!("^(?:{pattern})$"))?
            },
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Name match for file-set entries. Patterns must cover the whole name,
    /// except a single-branch pattern with its own leading `^` or trailing `$`
    /// is taken as written, so `\.tmp$` matches any name ending in `.tmp`.
    pub fn matches_name(&self, name: &[u8]) -> bool {
        self.whole.is_match(name)
    }
}

fn is_anchored(pattern: &str) -> bool {
    if has_top_level_alternation(pattern) {
        return false;
    }
    pattern.starts_with('^') || ends_with_unescaped_dollar(pattern)
}

fn ends_with_unescaped_dollar(pattern: &str) -> bool {
    let Some(body) = pattern.strip_suffix('$') else {
        return false;
    };
    let backslashes = body.bytes().rev().take_while(|&b| b == b'\\').count();
    backslashes % 2 == 0
}

/// `|` outside any group or character class.
fn has_top_level_alternation(pattern: &str) -> bool {
    let mut depth = 0usize;
    let mut in_class = false;
    let mut escaped = false;
    for c in pattern.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '(' if !in_class => depth += 1,
            ')' if !in_class => depth = depth.saturating_sub(1),
            '|' if !in_class && depth == 0 => return true,
            _ => {}
        }
    }
    false
}

/// Compiled patterns of one slot plus the lines that failed to compile.
#[derive(Debug, Default)]
pub struct IgnoreFilter {
    rules: Vec<IgnoreRule>,
    rejected: Vec<StoreError>,
}

fn pattern_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim_end_matches('\r')))
        .filter(|(_, line)| !line.is_empty())
}

impl IgnoreFilter {
    /// Compile every line; invalid lines are kept aside and skipped.
    pub fn parse(text: &str) -> Self {
        let mut filter = Self::default();
        for (line_no, line) in pattern_lines(text) {
            match IgnoreRule::new(line) {
                Ok(rule) => filter.rules.push(rule),
                Err(e) => {
                    warn!(line = line_no, pattern = line, "Skipping invalid ignore pattern: {}", e);
                    filter.rejected.push(StoreError::invalid_pattern(line_no, line, &e));
                }
            }
        }
        filter
    }

    /// Compile every line and fail on the first invalid one.
    pub fn parse_strict(text: &str) -> StoreResult<Self> {
        let mut rules = Vec::new();
        for (line_no, line) in pattern_lines(text) {
            let rule = IgnoreRule::new(line).map_err(|e| StoreError::invalid_pattern(line_no, line, &e))?;
            rules.push(rule);
        }
        Ok(Self {
            rules,
            rejected: Vec::new(),
        })
    }

    /// Read and compile an ignore file; a missing file yields an empty filter.
    pub fn load(path: &Path) -> StoreResult<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[IgnoreRule] {
        &self.rules
    }

    pub fn rejected(&self) -> &[StoreError] {
        &self.rejected
    }

    /// Remove every match of every pattern, each pass working on the
    /// previous pass's output.
    pub fn apply_to_buffer(&self, content: &[u8]) -> Vec<u8> {
        let mut current = content.to_vec();
        for rule in &self.rules {
            current = rule.anywhere.replace_all(&current, &b""[..]).into_owned();
        }
        current
    }

    /// Delete entries of `dir` whose names match in full. The directory is
    /// listed again for every pattern. Returns the number of removed entries.
    pub fn apply_to_dir(&self, dir: &Path) -> StoreResult<usize> {
        let mut removed = 0;
        for rule in &self.rules {
            for entry in fs::read_dir(dir).at(dir)? {
                let entry = entry.at(dir)?;
                let name = entry.file_name();
                if !rule.matches_name(name.as_encoded_bytes()) {
                    continue;
                }

                let path = entry.path();
                let is_dir = entry.file_type().at(&path)?.is_dir();
                if is_dir {
                    fs::remove_dir_all(&path).at(&path)?;
                } else {
                    fs::remove_file(&path).at(&path)?;
                }
                debug!(pattern = rule.pattern(), path = %path.display(), "Removed ignored entry");
                removed += 1;
            }
        }
        Ok(removed)
    }
}
