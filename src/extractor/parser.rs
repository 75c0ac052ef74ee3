//! Parser for extraction tool output
//!
//! Turns the line-oriented output of yt-dlp into typed [`Event`]s. The tool is
//! invoked with `--print`/`--progress-template` markers (see
//! [`ITEM_MARKER`], [`FILE_MARKER`], [`PROGRESS_MARKER`]) so that the lines
//! this parser depends on are under our control; the stock `[download]`
//! progress and destination lines are still understood as a fallback for
//! tool versions that ignore the templates.
//!
//! Bump [`PARSER_VERSION`] whenever the recognized line shapes change.

use super::OutputLine;
use crate::types::Event;
use std::borrow::Cow;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;

/// Version of the recognized output format
pub const PARSER_VERSION: u32 = 2;

/// Prefix printed before each entry starts downloading: `<marker> <id> <title>`
pub const ITEM_MARKER: &str = "[udown:item]";

/// Prefix printed after each entry reached its final path: `<marker> <path>`
pub const FILE_MARKER: &str = "[udown:file]";

/// Prefix of templated progress lines: `<marker> <percent>%|<speed>|<eta>`
pub const PROGRESS_MARKER: &str = "[udown:progress]";

/// Separator between the fields of a templated progress line
pub const PROGRESS_FIELD_SEPARATOR: char = '|';

/// Stock prefix of the downloader's own status lines
const DOWNLOAD_PREFIX: &str = "[download]";

/// Number of trailing diagnostic lines kept for failure messages
const DIAGNOSTIC_HISTORY: usize = 5;

/// Stateful line classifier for one extraction run
#[derive(Debug, Default)]
pub struct OutputParser {
    seen_ids: HashSet<String>,
    current_item: Option<String>,
    last_percent: Option<f32>,
    items: usize,
    markers_seen: bool,
    files: Vec<PathBuf>,
    last_error: Option<String>,
    diagnostics: VecDeque<String>,
}

impl OutputParser {
    /// Create a parser with no items seen
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one output line and return the events it produces
    pub fn feed(&mut self, line: &OutputLine) -> Vec<Event> {
        let (text, is_stderr) = match line {
            OutputLine::Stdout(text) => (text.as_str(), false),
            OutputLine::Stderr(text) => (text.as_str(), true),
        };
        let cleaned = strip_ansi(text);
        let text = cleaned.trim();
        if text.is_empty() {
            return Vec::new();
        }

        if let Some(rest) = text.strip_prefix(ITEM_MARKER) {
            self.markers_seen = true;
            return self.item_announced(rest.trim());
        }

        if let Some(rest) = text.strip_prefix(FILE_MARKER) {
            self.markers_seen = true;
            let path = rest.trim();
            if path.is_empty() || path == "NA" {
                return Vec::new();
            }
            self.files.push(PathBuf::from(path));
            return vec![Event::log(format!("Download finished: {}", path))];
        }

        if let Some(rest) = text.strip_prefix(PROGRESS_MARKER) {
            let mut fields = rest.split(PROGRESS_FIELD_SEPARATOR);
            let percent = fields.next().unwrap_or_default();
            let speed = fields.next().and_then(reported_value);
            let eta = fields.next().and_then(reported_value);
            return self.progress(percent, speed, eta).into_iter().collect();
        }

        if let Some(rest) = text.strip_prefix("ERROR:") {
            let message = rest.trim().to_string();
            self.remember(text);
            self.last_error = Some(message.clone());
            return vec![Event::log(format!("ERROR: {}", message))];
        }

        if let Some(rest) = text.strip_prefix("WARNING:") {
            return vec![Event::log(format!("WARN: {}", rest.trim()))];
        }

        if let Some(rest) = text.strip_prefix(DOWNLOAD_PREFIX) {
            let rest = rest.trim();
            let token = rest.split_whitespace().next().unwrap_or_default();
            if token.ends_with('%') {
                let speed = value_after(rest, " at ").and_then(reported_value);
                let eta = value_after(rest, " ETA ").and_then(reported_value);
                return self.progress(token, speed, eta).into_iter().collect();
            }
            if let Some(dest) = rest.strip_prefix("Destination:") {
                let mut events = Vec::new();
                if !self.markers_seen {
                    events.extend(self.destination_announced(dest.trim()));
                }
                events.push(Event::log(text));
                return events;
            }
        }

        if is_stderr {
            self.remember(text);
        }
        vec![Event::log(text)]
    }

    /// Number of distinct items announced so far
    pub fn items_seen(&self) -> usize {
        self.items
    }

    /// Final paths the tool reported for completed items
    pub fn reported_files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Message describing an abnormal exit, built from the last diagnostics
    pub fn failure_message(&self, code: Option<i32>) -> String {
        if let Some(error) = &self.last_error {
            return error.clone();
        }
        if let Some(last) = self.diagnostics.back() {
            return last.clone();
        }
        match code {
            Some(code) => format!("extraction tool exited with status {}", code),
            None => "extraction tool was terminated by a signal".to_string(),
        }
    }

    fn item_announced(&mut self, rest: &str) -> Vec<Event> {
        let (id, title) = match rest.split_once(' ') {
            Some((id, title)) => (id.trim(), title.trim()),
            None => (rest, rest),
        };
        if id.is_empty() || !self.seen_ids.insert(id.to_string()) {
            return Vec::new();
        }
        let title = if title.is_empty() || title == "NA" { id } else { title };
        self.start_item(title)
    }

    fn destination_announced(&mut self, dest: &str) -> Vec<Event> {
        let title = item_title_from_path(dest);
        if title.is_empty() || !self.seen_ids.insert(title.clone()) {
            return Vec::new();
        }
        self.start_item(&title)
    }

    fn start_item(&mut self, title: &str) -> Vec<Event> {
        self.items += 1;
        self.current_item = Some(title.to_string());
        self.last_percent = None;
        vec![Event::NewItem {
            title: title.to_string(),
        }]
    }

    /// Progress for the current item, only when it advances
    fn progress(&mut self, raw: &str, speed: Option<String>, eta: Option<String>) -> Option<Event> {
        self.current_item.as_ref()?;
        let percent = parse_percent(raw)?;
        if self.last_percent.is_some_and(|last| percent <= last) {
            return None;
        }
        self.last_percent = Some(percent);
        Some(Event::Progress { percent, speed, eta })
    }

    fn remember(&mut self, line: &str) {
        if self.diagnostics.len() == DIAGNOSTIC_HISTORY {
            self.diagnostics.pop_front();
        }
        self.diagnostics.push_back(line.to_string());
    }
}

/// Parse `" 42.3%"` into `42.3`, clamped to `[0, 100]`
///
/// Returns `None` for anything that is not a finite number (`N/A`, `inf`, ...).
pub fn parse_percent(raw: &str) -> Option<f32> {
    let value = raw.trim().strip_suffix('%')?.trim();
    let percent: f32 = value.parse().ok()?;
    if !percent.is_finite() {
        return None;
    }
    Some(percent.clamp(0.0, 100.0))
}

/// First whitespace-separated token following `label` in a stock progress line
fn value_after<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let (_, rest) = line.split_once(label)?;
    rest.split_whitespace().next()
}

/// A speed or ETA field, `None` when the tool does not know it yet
fn reported_value(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() || value == "NA" || value.contains("N/A") || value.contains("Unknown") {
        return None;
    }
    Some(value.to_string())
}

/// Title derived from a stock destination path
///
/// Drops the directory, the extension and a `.fNNN` format suffix, so the
/// video and audio streams of one entry map to the same title.
fn item_title_from_path(dest: &str) -> String {
    let name = dest.rsplit(['/', '\\']).next().unwrap_or(dest);
    let stem = match name.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem,
        _ => name,
    };
    let stem = match stem.rsplit_once('.') {
        Some((base, format))
            if format.len() > 1
                && format.starts_with('f')
                && format[1..].chars().all(|c| c.is_ascii_digit()) =>
        {
            base
        }
        _ => stem,
    };
    stem.trim().to_string()
}

/// Remove ANSI escape sequences (`ESC [ ... final`)
fn strip_ansi(line: &str) -> Cow<'_, str> {
    if !line.contains('\u{1b}') {
        return Cow::Borrowed(line);
    }
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\u{1b}' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'[') {
            chars.next();
            for c in chars.by_ref() {
                if ('@'..='~').contains(&c) {
                    break;
                }
            }
        }
    }
    Cow::Owned(out)
}
