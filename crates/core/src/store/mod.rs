pub mod memory;
pub mod tantivy_store;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::model::LogEntry;

pub use memory::InMemoryStore;
pub use tantivy_store::TantivyStore;

/// Keyword (exact-match, low-cardinality) fields eligible for term filters,
/// wildcard matching, and terms aggregations (spec.md §4.6, GLOSSARY).
pub const KEYWORD_FIELDS: &[&str] =
    &["level", "logger", "thread", "source", "hostname", "application", "environment", "file_name", "tags"];

pub fn is_keyword_field(field: &str) -> bool {
    KEYWORD_FIELDS.contains(&field)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMatch<'a> {
    Exact(&'a str),
    Wildcard(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Timestamp,
    LineNumber,
    Level,
    Logger,
    Thread,
    Source,
    Hostname,
    Application,
    IndexedAt,
}

impl SortField {
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "timestamp" => Self::Timestamp,
            "lineNumber" => Self::LineNumber,
            "level" => Self::Level,
            "logger" => Self::Logger,
            "thread" => Self::Thread,
            "source" => Self::Source,
            "hostname" => Self::Hostname,
            "application" => Self::Application,
            "indexedAt" => Self::IndexedAt,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// The wire contract C4/C7 depend on: a compiled filter set a store engine
/// can execute, independent of the query-language used to build it
/// (spec.md §9 "Storage abstraction").
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub job_id: String,
    pub search_text: Option<String>,
    pub search_fields: Vec<String>,
    pub levels: Vec<String>,
    pub term_filters: Vec<(String, String)>,
    pub wildcard_filters: Vec<(String, String)>,
    pub has_error: Option<bool>,
    pub has_stack_trace: Option<bool>,
    pub tags: Vec<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub min_line_number: Option<u64>,
    pub max_line_number: Option<u64>,
    pub sort_by: SortField,
    pub sort_direction: SortDirection,
    pub page: u32,
    pub size: u32,
}

impl CompiledQuery {
    pub fn for_job(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            search_text: None,
            search_fields: vec!["message".to_string(), "raw_line".to_string(), "stack_trace".to_string()],
            levels: Vec::new(),
            term_filters: Vec::new(),
            wildcard_filters: Vec::new(),
            has_error: None,
            has_stack_trace: None,
            tags: Vec::new(),
            start_date: None,
            end_date: None,
            min_line_number: None,
            max_line_number: None,
            sort_by: SortField::Timestamp,
            sort_direction: SortDirection::Desc,
            page: 0,
            size: 50,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchHits {
    pub entries: Vec<LogEntry>,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineInterval {
    OneSecond,
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    OneDay,
    OneWeek,
    OneMonth,
}

impl TimelineInterval {
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "1s" => Self::OneSecond,
            "1m" => Self::OneMinute,
            "5m" => Self::FiveMinutes,
            "15m" => Self::FifteenMinutes,
            "30m" => Self::ThirtyMinutes,
            "1h" => Self::OneHour,
            "1d" => Self::OneDay,
            "1w" => Self::OneWeek,
            "1M" => Self::OneMonth,
            _ => return None,
        })
    }

    /// Whole calendar units (1m/1h/1d/1w/1M) use calendar-aligned
    /// bucketing; sub-unit multiples (5m/15m/30m) use fixed-width buckets
    /// from the epoch (spec.md §4.6).
    pub fn is_calendar_aligned(self) -> bool {
        !matches!(self, Self::FiveMinutes | Self::FifteenMinutes | Self::ThirtyMinutes)
    }

    pub fn duration(self) -> chrono::Duration {
        match self {
            Self::OneSecond => chrono::Duration::seconds(1),
            Self::OneMinute => chrono::Duration::minutes(1),
            Self::FiveMinutes => chrono::Duration::minutes(5),
            Self::FifteenMinutes => chrono::Duration::minutes(15),
            Self::ThirtyMinutes => chrono::Duration::minutes(30),
            Self::OneHour => chrono::Duration::hours(1),
            Self::OneDay => chrono::Duration::days(1),
            Self::OneWeek => chrono::Duration::weeks(1),
            Self::OneMonth => chrono::Duration::days(30),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineBucket {
    pub bucket_start: DateTime<Utc>,
    pub count: u64,
    pub error_count: u64,
    pub warn_count: u64,
}

/// The two contracts C4 and C7 depend on (spec.md §9): bulk write of
/// documents with a partition key (`job_id`), and filtered search with
/// aggregations. Any engine providing an inverted index, date histograms,
/// and terms aggregations can implement this.
pub trait LogStore: Send + Sync {
    fn bulk_write(&self, entries: &[LogEntry]) -> Result<()>;
    fn search(&self, query: &CompiledQuery) -> Result<SearchHits>;
    fn count(&self, query: &CompiledQuery) -> Result<u64>;
    fn timeline(&self, query: &CompiledQuery, interval: TimelineInterval) -> Result<Vec<TimelineBucket>>;
    fn unique_values(&self, query: &CompiledQuery, field: &str, limit: usize) -> Result<Vec<(String, u64)>>;
    fn level_counts(&self, job_id: &str) -> Result<HashMap<String, u64>>;
    fn error_count(&self, job_id: &str) -> Result<u64>;
    /// Lines around `line_number` for the context endpoint, inclusive of
    /// `before`/`after` neighbors.
    fn context(&self, job_id: &str, line_number: u64, before: u64, after: u64) -> Result<Vec<LogEntry>>;
}
