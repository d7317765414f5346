use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized severity. Ordering follows increasing severity so callers can
/// compare levels numerically if they need a "at least WARN" style filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }

    /// §4.3.5 level normalization table. Unknown inputs pass through
    /// uppercased rather than being rejected — a parser never fails an
    /// entry over an odd level string.
    pub fn normalize(raw: Option<&str>) -> Level {
        let Some(raw) = raw else { return Level::Info };
        let upper = raw.trim().to_uppercase();
        match upper.as_str() {
            "WARNING" | "WARN" => Level::Warn,
            "SEVERE" | "FATAL" | "CRITICAL" | "ALERT" | "EMERGENCY" => Level::Error,
            "ERROR" | "ERR" => Level::Error,
            "FINE" | "FINER" | "FINEST" | "VERBOSE" | "DBG" => Level::Debug,
            "DEBUG" => Level::Debug,
            "CONFIG" | "NOTICE" | "INFORMATIONAL" => Level::Info,
            "INFO" => Level::Info,
            "TRC" | "TRACE" => Level::Trace,
            "" => Level::Info,
            other => {
                // Unknown severity word: keep it recognizable in logs/UI
                // rather than silently collapsing to INFO, but still land
                // on one of the five normalized buckets so invariant (ii)
                // in spec.md §3 holds. Closest-match by substring.
                if other.contains("WARN") {
                    Level::Warn
                } else if other.contains("ERR") || other.contains("CRIT") {
                    Level::Error
                } else if other.contains("DEBUG") || other.contains("DBG") {
                    Level::Debug
                } else if other.contains("TRACE") || other.contains("TRC") {
                    Level::Trace
                } else {
                    Level::Info
                }
            }
        }
    }

    /// Infer a level from an HTTP status code (Apache/Nginx access logs
    /// carry no explicit level — §4.3.1).
    pub fn from_http_status(status: u16) -> Level {
        if status >= 500 {
            Level::Error
        } else if status >= 400 {
            Level::Warn
        } else {
            Level::Info
        }
    }
}

/// A scalar metadata value, preserving the source type instead of
/// stringifying everything up front (spec.md §3: "mapping from string to
/// heterogeneous scalar").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    String(String),
    Number(f64),
    Bool(bool),
}

impl MetaValue {
    pub fn as_display(&self) -> String {
        match self {
            MetaValue::String(s) => s.clone(),
            MetaValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            MetaValue::Bool(b) => b.to_string(),
        }
    }
}

/// The canonical indexed document (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub job_id: String,
    pub line_number: u64,

    pub timestamp: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,

    pub level: Level,
    pub has_error: bool,
    pub has_stack_trace: bool,

    pub message: String,
    pub raw_line: String,
    pub stack_trace: Option<String>,

    pub logger: Option<String>,
    pub thread: Option<String>,
    pub source: Option<String>,
    pub hostname: Option<String>,
    pub application: Option<String>,
    pub environment: Option<String>,
    pub file_name: String,

    #[serde(default)]
    pub metadata: HashMap<String, MetaValue>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl LogEntry {
    /// Builds an entry while enforcing invariants (ii)/(iv) from spec.md §3
    /// so callers can't construct a document that violates them: level is
    /// always one of the five normalized values (guaranteed by the `Level`
    /// type itself), `has_error` tracks the level, and `has_stack_trace`
    /// tracks whether `stack_trace` is non-empty.
    pub fn new(
        job_id: impl Into<String>,
        line_number: u64,
        file_name: impl Into<String>,
        level: Level,
        message: impl Into<String>,
        raw_line: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.into(),
            line_number,
            timestamp,
            indexed_at: Utc::now(),
            has_error: level == Level::Error,
            level,
            has_stack_trace: false,
            message: message.into(),
            raw_line: raw_line.into(),
            stack_trace: None,
            logger: None,
            thread: None,
            source: None,
            hostname: None,
            application: None,
            environment: None,
            file_name: file_name.into(),
            metadata: HashMap::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_stack_trace(mut self, trace: impl Into<String>) -> Self {
        let trace = trace.into();
        if !trace.is_empty() {
            self.has_stack_trace = true;
            self.stack_trace = Some(trace);
        }
        self
    }

    pub fn append_stack_trace(&mut self, line: &str) {
        let buf = self.stack_trace.get_or_insert_with(String::new);
        if !buf.is_empty() {
            buf.push('\n');
        }
        buf.push_str(line);
        self.has_stack_trace = !buf.is_empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_normalizes_aliases() {
        assert_eq!(Level::normalize(Some("warning")), Level::Warn);
        assert_eq!(Level::normalize(Some("SEVERE")), Level::Error);
        assert_eq!(Level::normalize(Some("dbg")), Level::Debug);
        assert_eq!(Level::normalize(Some("notice")), Level::Info);
        assert_eq!(Level::normalize(Some("trc")), Level::Trace);
        assert_eq!(Level::normalize(None), Level::Info);
    }

    #[test]
    fn level_unknown_falls_back_by_substring() {
        assert_eq!(Level::normalize(Some("SUPER_WARNISH")), Level::Warn);
        assert_eq!(Level::normalize(Some("totally_unknown")), Level::Info);
    }

    #[test]
    fn http_status_maps_to_level() {
        assert_eq!(Level::from_http_status(503), Level::Error);
        assert_eq!(Level::from_http_status(404), Level::Warn);
        assert_eq!(Level::from_http_status(200), Level::Info);
    }

    #[test]
    fn has_error_tracks_level() {
        let entry = LogEntry::new("job-1", 1, "a.log", Level::Error, "boom", "boom", Utc::now());
        assert!(entry.has_error);
        let entry = LogEntry::new("job-1", 1, "a.log", Level::Info, "ok", "ok", Utc::now());
        assert!(!entry.has_error);
    }

    #[test]
    fn stack_trace_sets_has_stack_trace() {
        let mut entry = LogEntry::new("job-1", 1, "a.log", Level::Error, "boom", "boom", Utc::now());
        assert!(!entry.has_stack_trace);
        entry.append_stack_trace("at com.example.Svc.run(Svc.java:12)");
        assert!(entry.has_stack_trace);
        assert_eq!(
            entry.stack_trace.as_deref(),
            Some("at com.example.Svc.run(Svc.java:12)")
        );
    }
}
