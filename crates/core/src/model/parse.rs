use std::collections::HashMap;

use super::entry::LogEntry;

/// Default cap on a single source line, in bytes (spec.md §4.1/§4.3).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 100_000;

/// Transient, per-file parser state (spec.md §3 `ParseContext`). Confined
/// to one worker — no synchronization needed (spec.md §5).
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub job_id: String,
    pub file_name: String,
    pub timestamp_format: Option<String>,
    pub strict: bool,
    pub max_line_length: usize,

    // Multi-line buffer (text parser state machine, §4.3.1)
    pub buffered_entry: Option<LogEntry>,
    pub in_multi_line: bool,

    // CSV state (§4.3.3)
    pub csv_headers: Option<Vec<String>>,
    pub csv_column_index: HashMap<String, usize>,
    pub csv_headers_processed: bool,

    // Progress counters mirrored from the owning job
    pub lines_seen: u64,

    /// Extra outcomes a parser needs to surface alongside its primary
    /// return value — chiefly the text parser flushing a buffered
    /// multi-line entry before starting a new one on the same line
    /// (spec.md §4.3.1). The job controller drains this queue before
    /// acting on `parse_line`'s own return value.
    pub pending: Vec<ParseOutcome>,
}

impl ParseContext {
    pub fn new(job_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            file_name: file_name.into(),
            timestamp_format: None,
            strict: false,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            buffered_entry: None,
            in_multi_line: false,
            csv_headers: None,
            csv_column_index: HashMap::new(),
            csv_headers_processed: false,
            lines_seen: 0,
            pending: Vec::new(),
        }
    }

    pub fn with_timestamp_format(mut self, fmt: Option<String>) -> Self {
        self.timestamp_format = fmt;
        self
    }

    /// Called between files; parsers must not retain buffer state across
    /// files (spec.md §4.3: "`reset()` MUST be called between files").
    pub fn reset(&mut self) {
        self.buffered_entry = None;
        self.in_multi_line = false;
        self.csv_headers = None;
        self.csv_column_index.clear();
        self.csv_headers_processed = false;
        self.lines_seen = 0;
        self.pending.clear();
    }
}

/// Tagged result of parsing one line (spec.md §3 `ParseOutcome`).
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    Success(Box<LogEntry>),
    Buffered(u64, String),
    Continuation(u64, String),
    Skipped(u64, String),
    Failed(u64, String, String),
}

impl ParseOutcome {
    pub fn success(entry: LogEntry) -> Self {
        ParseOutcome::Success(Box::new(entry))
    }
}
