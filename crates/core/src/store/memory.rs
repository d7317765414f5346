use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::Result;
use crate::model::LogEntry;
use crate::store::{CompiledQuery, LogStore, SearchHits, SortDirection, SortField, TimelineBucket, TimelineInterval};

/// In-process store used by tests and by the job controller's own test
/// suite; not wired into the HTTP binary. Keeps the `LogStore` contract
/// honest against a trivial, obviously-correct reference implementation.
pub struct InMemoryStore {
    entries: RwLock<Vec<LogEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn count_for_job(&self, job_id: &str) -> usize {
        self.entries.read().unwrap().iter().filter(|e| e.job_id == job_id).count()
    }

    fn matches(entry: &LogEntry, query: &CompiledQuery) -> bool {
        if entry.job_id != query.job_id {
            return false;
        }
        if !query.levels.is_empty() && !query.levels.iter().any(|l| l.eq_ignore_ascii_case(entry.level.as_str())) {
            return false;
        }
        if let Some(text) = &query.search_text {
            let haystacks = [entry.message.as_str(), entry.raw_line.as_str(), entry.stack_trace.as_deref().unwrap_or("")];
            if !haystacks.iter().any(|h| h.to_lowercase().contains(&text.to_lowercase())) {
                return false;
            }
        }
        for (field, value) in &query.term_filters {
            if field_value(entry, field).map(|v| v != *value).unwrap_or(true) {
                return false;
            }
        }
        for (field, pattern) in &query.wildcard_filters {
            let Some(v) = field_value(entry, field) else { return false };
            if !wildcard_match(pattern, &v) {
                return false;
            }
        }
        if let Some(want) = query.has_error {
            if entry.has_error != want {
                return false;
            }
        }
        if let Some(want) = query.has_stack_trace {
            if entry.has_stack_trace != want {
                return false;
            }
        }
        if !query.tags.is_empty() && !query.tags.iter().any(|t| entry.tags.contains(t)) {
            return false;
        }
        if let Some(start) = query.start_date {
            if entry.timestamp < start {
                return false;
            }
        }
        if let Some(end) = query.end_date {
            if entry.timestamp > end {
                return false;
            }
        }
        if let Some(min) = query.min_line_number {
            if entry.line_number < min {
                return false;
            }
        }
        if let Some(max) = query.max_line_number {
            if entry.line_number > max {
                return false;
            }
        }
        true
    }

    fn matching(&self, query: &CompiledQuery) -> Vec<LogEntry> {
        self.entries.read().unwrap().iter().filter(|e| Self::matches(e, query)).cloned().collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn field_value(entry: &LogEntry, field: &str) -> Option<String> {
    Some(match field {
        "level" => entry.level.as_str().to_string(),
        "logger" => entry.logger.clone()?,
        "thread" => entry.thread.clone()?,
        "source" => entry.source.clone()?,
        "hostname" => entry.hostname.clone()?,
        "application" => entry.application.clone()?,
        "environment" => entry.environment.clone()?,
        "file_name" => entry.file_name.clone(),
        _ => return None,
    })
}

fn wildcard_match(pattern: &str, value: &str) -> bool {
    let regex_str = format!(
        "^{}$",
        regex::escape(pattern).replace(r"\*", ".*").replace(r"\?", ".")
    );
    regex::Regex::new(&regex_str).map(|r| r.is_match(value)).unwrap_or(false)
}

fn sort_key(entry: &LogEntry, field: SortField) -> String {
    match field {
        SortField::Timestamp => entry.timestamp.to_rfc3339(),
        SortField::LineNumber => format!("{:020}", entry.line_number),
        SortField::Level => entry.level.as_str().to_string(),
        SortField::Logger => entry.logger.clone().unwrap_or_default(),
        SortField::Thread => entry.thread.clone().unwrap_or_default(),
        SortField::Source => entry.source.clone().unwrap_or_default(),
        SortField::Hostname => entry.hostname.clone().unwrap_or_default(),
        SortField::Application => entry.application.clone().unwrap_or_default(),
        SortField::IndexedAt => entry.indexed_at.to_rfc3339(),
    }
}

impl LogStore for InMemoryStore {
    fn bulk_write(&self, entries: &[LogEntry]) -> Result<()> {
        self.entries.write().unwrap().extend_from_slice(entries);
        Ok(())
    }

    fn search(&self, query: &CompiledQuery) -> Result<SearchHits> {
        let mut matched = self.matching(query);
        matched.sort_by(|a, b| {
            let ord = sort_key(a, query.sort_by).cmp(&sort_key(b, query.sort_by));
            if query.sort_direction == SortDirection::Desc {
                ord.reverse()
            } else {
                ord
            }
        });
        let total = matched.len() as u64;
        let start = (query.page as usize) * (query.size as usize);
        let page: Vec<LogEntry> = matched.into_iter().skip(start).take(query.size as usize).collect();
        Ok(SearchHits { entries: page, total })
    }

    fn count(&self, query: &CompiledQuery) -> Result<u64> {
        Ok(self.matching(query).len() as u64)
    }

    fn timeline(&self, query: &CompiledQuery, interval: TimelineInterval) -> Result<Vec<TimelineBucket>> {
        let matched = self.matching(query);
        let step = interval.duration();
        let mut buckets: HashMap<i64, TimelineBucket> = HashMap::new();
        for entry in &matched {
            let epoch = entry.timestamp.timestamp();
            let step_secs = step.num_seconds().max(1);
            let bucket_epoch = (epoch / step_secs) * step_secs;
            let bucket = buckets.entry(bucket_epoch).or_insert_with(|| TimelineBucket {
                bucket_start: chrono::DateTime::from_timestamp(bucket_epoch, 0).unwrap_or(entry.timestamp),
                count: 0,
                error_count: 0,
                warn_count: 0,
            });
            bucket.count += 1;
            if entry.has_error {
                bucket.error_count += 1;
            }
            if entry.level == crate::model::Level::Warn {
                bucket.warn_count += 1;
            }
        }
        let mut out: Vec<TimelineBucket> = buckets.into_values().collect();
        out.sort_by_key(|b| b.bucket_start);
        Ok(out)
    }

    fn unique_values(&self, query: &CompiledQuery, field: &str, limit: usize) -> Result<Vec<(String, u64)>> {
        let matched = self.matching(query);
        let mut counts: HashMap<String, u64> = HashMap::new();
        for entry in &matched {
            if field == "tags" {
                for t in &entry.tags {
                    *counts.entry(t.clone()).or_insert(0) += 1;
                }
                continue;
            }
            if let Some(v) = field_value(entry, field) {
                *counts.entry(v).or_insert(0) += 1;
            }
        }
        let mut out: Vec<(String, u64)> = counts.into_iter().collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out.truncate(limit);
        Ok(out)
    }

    fn level_counts(&self, job_id: &str) -> Result<HashMap<String, u64>> {
        let mut counts = HashMap::new();
        for entry in self.entries.read().unwrap().iter().filter(|e| e.job_id == job_id) {
            *counts.entry(entry.level.as_str().to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn error_count(&self, job_id: &str) -> Result<u64> {
        Ok(self
            .entries
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.job_id == job_id && e.has_error)
            .count() as u64)
    }

    fn context(&self, job_id: &str, line_number: u64, before: u64, after: u64) -> Result<Vec<LogEntry>> {
        let low = line_number.saturating_sub(before);
        let high = line_number + after;
        let mut out: Vec<LogEntry> = self
            .entries
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.job_id == job_id && e.line_number >= low && e.line_number <= high)
            .cloned()
            .collect();
        out.sort_by_key(|e| e.line_number);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Level;

    fn entry(job: &str, n: u64, level: Level, message: &str) -> LogEntry {
        LogEntry::new(job, n, "a.log", level, message, message, chrono::Utc::now())
    }

    #[test]
    fn search_filters_by_job_and_level() {
        let store = InMemoryStore::new();
        store
            .bulk_write(&[entry("job-1", 1, Level::Error, "boom"), entry("job-1", 2, Level::Info, "ok"), entry("job-2", 1, Level::Error, "other job")])
            .unwrap();
        let mut query = CompiledQuery::for_job("job-1");
        query.levels = vec!["ERROR".to_string()];
        let hits = store.search(&query).unwrap();
        assert_eq!(hits.total, 1);
        assert_eq!(hits.entries[0].message, "boom");
    }

    #[test]
    fn unique_values_ranks_by_count() {
        let store = InMemoryStore::new();
        let mut e1 = entry("job-1", 1, Level::Info, "a");
        e1.logger = Some("svc.Foo".to_string());
        let mut e2 = entry("job-1", 2, Level::Info, "b");
        e2.logger = Some("svc.Foo".to_string());
        let mut e3 = entry("job-1", 3, Level::Info, "c");
        e3.logger = Some("svc.Bar".to_string());
        store.bulk_write(&[e1, e2, e3]).unwrap();
        let query = CompiledQuery::for_job("job-1");
        let values = store.unique_values(&query, "logger", 10).unwrap();
        assert_eq!(values[0], ("svc.Foo".to_string(), 2));
    }
}
