use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{JobStatus, LogEntry};
use crate::store::{CompiledQuery, LogStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    pub current_page: u32,
    pub page_size: u32,
    pub total_elements: u64,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_previous: bool,
    pub first_index: u64,
    pub last_index: u64,
}

impl PaginationInfo {
    /// `totalPages = ceil(totalElements / size)`; `hasNext ⇔ currentPage <
    /// totalPages - 1` (spec.md §8 invariants).
    pub fn new(page: u32, size: u32, total: u64) -> Self {
        let total_pages = if total == 0 { 0 } else { ((total + size as u64 - 1) / size as u64) as u32 };
        let first_index = page as u64 * size as u64;
        let last_index = (first_index + size as u64).min(total).saturating_sub(1);
        Self {
            current_page: page,
            page_size: size,
            total_elements: total,
            total_pages,
            has_next: total_pages > 0 && page < total_pages - 1,
            has_previous: page > 0,
            first_index,
            last_index,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSummary {
    pub level_counts: HashMap<String, u64>,
    pub error_count: u64,
    pub stack_trace_count: u64,
    pub earliest_timestamp: Option<chrono::DateTime<chrono::Utc>>,
    pub latest_timestamp: Option<chrono::DateTime<chrono::Utc>>,
    pub top_loggers: Vec<(String, u64)>,
    pub top_threads: Vec<(String, u64)>,
    pub top_sources: Vec<(String, u64)>,
    pub unique_loggers: u64,
    pub unique_threads: u64,
}

fn summarize(entries: &[LogEntry]) -> FilterSummary {
    let mut summary = FilterSummary::default();
    let mut loggers: HashMap<String, u64> = HashMap::new();
    let mut threads: HashMap<String, u64> = HashMap::new();
    let mut sources: HashMap<String, u64> = HashMap::new();

    for entry in entries {
        *summary.level_counts.entry(entry.level.as_str().to_string()).or_insert(0) += 1;
        if entry.has_error {
            summary.error_count += 1;
        }
        if entry.has_stack_trace {
            summary.stack_trace_count += 1;
        }
        summary.earliest_timestamp = Some(summary.earliest_timestamp.map_or(entry.timestamp, |t: chrono::DateTime<chrono::Utc>| t.min(entry.timestamp)));
        summary.latest_timestamp = Some(summary.latest_timestamp.map_or(entry.timestamp, |t: chrono::DateTime<chrono::Utc>| t.max(entry.timestamp)));
        if let Some(l) = &entry.logger {
            *loggers.entry(l.clone()).or_insert(0) += 1;
        }
        if let Some(t) = &entry.thread {
            *threads.entry(t.clone()).or_insert(0) += 1;
        }
        if let Some(s) = &entry.source {
            *sources.entry(s.clone()).or_insert(0) += 1;
        }
    }

    summary.unique_loggers = loggers.len() as u64;
    summary.unique_threads = threads.len() as u64;
    summary.top_loggers = top_n(loggers, 10);
    summary.top_threads = top_n(threads, 10);
    summary.top_sources = top_n(sources, 10);
    summary
}

fn top_n(counts: HashMap<String, u64>, n: usize) -> Vec<(String, u64)> {
    let mut out: Vec<(String, u64)> = counts.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out.truncate(n);
    out
}

/// Cap on how many matching entries are pulled back to compute an
/// `includeSummary`/`JobSummary` aggregation (spec.md §4.6 "includeSummary").
/// Large jobs should narrow filters rather than rely on an unfiltered full
/// scan; this bounds worst-case memory for a single summary query.
const SUMMARY_SAMPLE_SIZE: u32 = 10_000;

const HIGHLIGHT_PRE: &str = "<mark>";
const HIGHLIGHT_POST: &str = "</mark>";
const HIGHLIGHT_FRAGMENT_SIZE: usize = 150;
const HIGHLIGHT_MAX_FRAGMENTS: usize = 3;

/// Lowercases `haystack` for case-insensitive matching while recording,
/// for every char boundary in the lowercased string, the byte offset of the
/// original char it came from. `to_lowercase()` can change a char's byte
/// (and even char) length (e.g. `'İ'` U+0130 lowers to two chars), so byte
/// offsets found in the lowercased copy are not generally valid indices into
/// `haystack` — this mapping lets us convert back safely instead of reusing
/// offsets across the two strings.
fn lower_with_offsets(haystack: &str) -> (String, Vec<(usize, usize)>) {
    let mut lower = String::with_capacity(haystack.len());
    let mut marks = Vec::with_capacity(haystack.len() + 1);
    for (orig_idx, ch) in haystack.char_indices() {
        for lc in ch.to_lowercase() {
            marks.push((lower.len(), orig_idx));
            lower.push(lc);
        }
    }
    marks.push((lower.len(), haystack.len()));
    (lower, marks)
}

/// Maps a byte offset in the lowercased string back to the matching byte
/// offset in the original string, via the marks table from
/// `lower_with_offsets`. `marks` is sorted by its first element, and match
/// boundaries returned by `str::find` always land on one of its recorded
/// positions, so this always resolves exactly.
fn orig_offset(marks: &[(usize, usize)], lower_byte_pos: usize) -> usize {
    match marks.binary_search_by_key(&lower_byte_pos, |&(l, _)| l) {
        Ok(idx) => marks[idx].1,
        Err(idx) => marks[idx.saturating_sub(1)].1,
    }
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Naive substring highlighter: good enough for the `highlightMatches`
/// contract (pre/post markers, bounded fragment count/size) without
/// depending on the store engine's native highlighter.
fn highlight(entry: &LogEntry, search_text: &str, fields: &[String]) -> HashMap<String, Vec<String>> {
    let mut out = HashMap::new();
    let needle = search_text.to_lowercase();
    if needle.is_empty() {
        return out;
    }
    for field in fields {
        let haystack = match field.as_str() {
            "message" => &entry.message,
            "rawLine" | "raw_line" => &entry.raw_line,
            "stackTrace" | "stack_trace" => entry.stack_trace.as_deref().unwrap_or(""),
            _ => continue,
        };
        let (lower, marks) = lower_with_offsets(haystack);
        let mut fragments = Vec::new();
        let mut start = 0;
        while let Some(pos) = lower[start..].find(&needle) {
            if fragments.len() >= HIGHLIGHT_MAX_FRAGMENTS {
                break;
            }
            let lower_match_start = start + pos;
            let lower_match_end = lower_match_start + needle.len();
            let match_start = orig_offset(&marks, lower_match_start);
            let match_end = orig_offset(&marks, lower_match_end);
            let frag_start = floor_char_boundary(haystack, match_start.saturating_sub(HIGHLIGHT_FRAGMENT_SIZE / 2));
            let frag_end = ceil_char_boundary(haystack, (match_end + HIGHLIGHT_FRAGMENT_SIZE / 2).min(haystack.len()));
            let mut fragment = String::new();
            fragment.push_str(&haystack[frag_start..match_start]);
            fragment.push_str(HIGHLIGHT_PRE);
            fragment.push_str(&haystack[match_start..match_end]);
            fragment.push_str(HIGHLIGHT_POST);
            fragment.push_str(&haystack[match_end..frag_end]);
            fragments.push(fragment);
            start = lower_match_end;
        }
        if !fragments.is_empty() {
            out.insert(field.clone(), fragments);
        }
    }
    out
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQueryResponse {
    pub entries: Vec<LogEntry>,
    pub pagination: PaginationInfo,
    pub summary: Option<FilterSummary>,
    pub highlights: Option<HashMap<String, HashMap<String, Vec<String>>>>,
    pub query_time_ms: u64,
}

/// C7: executes a compiled query and assembles the page + optional
/// summary/highlights (spec.md §4.7).
pub fn execute(
    store: &dyn LogStore,
    query: &CompiledQuery,
    include_summary: bool,
    highlight_matches: bool,
) -> Result<LogQueryResponse> {
    let started = Instant::now();
    let hits = store.search(query)?;
    let pagination = PaginationInfo::new(query.page, query.size, hits.total);

    let summary = if include_summary {
        let mut summary_query = query.clone();
        summary_query.page = 0;
        summary_query.size = SUMMARY_SAMPLE_SIZE;
        let sample = store.search(&summary_query)?;
        Some(summarize(&sample.entries))
    } else {
        None
    };

    let highlights = if highlight_matches {
        query.search_text.as_ref().map(|text| {
            hits.entries
                .iter()
                .map(|e| (e.id.clone(), highlight(e, text, &query.search_fields)))
                .filter(|(_, h)| !h.is_empty())
                .collect()
        })
    } else {
        None
    };

    Ok(LogQueryResponse {
        entries: hits.entries,
        pagination,
        summary,
        highlights,
        query_time_ms: started.elapsed().as_millis() as u64,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub processing_time_ms: Option<u64>,
    pub lines_per_second: Option<f64>,
    pub total_lines: u64,
    pub successful_lines: u64,
    pub failed_lines: u64,
    pub time_span_seconds: Option<i64>,
    pub warning_count: u64,
    pub unique_logger_count: u64,
    pub unique_thread_count: u64,
    pub filter_summary: FilterSummary,
}

/// Composes C7's summary with C5's job metadata plus derived metrics
/// (spec.md §4.7 `JobSummary`).
pub fn job_summary(store: &dyn LogStore, status: &JobStatus) -> Result<JobSummary> {
    let query = CompiledQuery::for_job(&status.job_id);
    let hits = store.search(&{
        let mut q = query.clone();
        q.size = SUMMARY_SAMPLE_SIZE;
        q
    })?;
    let summary = summarize(&hits.entries);

    let time_span_seconds = match (summary.earliest_timestamp, summary.latest_timestamp) {
        (Some(earliest), Some(latest)) => Some((latest - earliest).num_seconds()),
        _ => None,
    };
    let warning_count = *summary.level_counts.get("WARN").unwrap_or(&0);

    Ok(JobSummary {
        job_id: status.job_id.clone(),
        file_name: status.file_name.clone(),
        file_size: status.file_size,
        started_at: status.started_at,
        completed_at: status.completed_at,
        processing_time_ms: status.processing_time_ms,
        lines_per_second: status.lines_per_second,
        total_lines: status.total_lines,
        successful_lines: status.successful_lines,
        failed_lines: status.failed_lines,
        time_span_seconds,
        warning_count,
        unique_logger_count: summary.unique_loggers,
        unique_thread_count: summary.unique_threads,
        filter_summary: summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_total_pages_is_ceiling_division() {
        let p = PaginationInfo::new(0, 50, 120);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next);
        assert!(!p.has_previous);
    }

    #[test]
    fn pagination_has_next_false_on_last_page() {
        let p = PaginationInfo::new(2, 50, 120);
        assert!(!p.has_next);
        assert!(p.has_previous);
    }

    #[test]
    fn pagination_empty_result_has_zero_pages() {
        let p = PaginationInfo::new(0, 50, 0);
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_next);
    }

    #[test]
    fn highlight_wraps_matches_with_markers() {
        let entry = LogEntry::new("job-1", 1, "a.log", crate::model::Level::Info, "connection timeout occurred", "raw", chrono::Utc::now());
        let fragments = highlight(&entry, "timeout", &["message".to_string()]);
        assert!(fragments["message"][0].contains("<mark>timeout</mark>"));
    }

    #[test]
    fn highlight_does_not_panic_on_case_folding_that_changes_byte_length() {
        // 'İ' (U+0130) lowercases to two chars ("i" + combining dot above),
        // so a lowercased copy's byte offsets don't line up with the original.
        let entry = LogEntry::new("job-1", 1, "a.log", crate::model::Level::Info, "request İD timeout", "raw", chrono::Utc::now());
        let fragments = highlight(&entry, "İD", &["message".to_string()]);
        assert!(fragments["message"][0].to_lowercase().contains("<mark>İD</mark>".to_lowercase().as_str()));
    }
}
