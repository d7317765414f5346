use std::collections::HashMap;
use std::sync::Mutex;

use tantivy::collector::{Count, TopDocs};
use tantivy::query::{AllQuery, BooleanQuery, FuzzyTermQuery, Occur, Query, RangeQuery, RegexQuery, TermQuery};
use tantivy::schema::{IndexRecordOption, Schema, Value, FAST, INDEXED, STORED, STRING, TEXT};
use tantivy::{DateTime as TantivyDateTime, Index, IndexWriter, TantivyDocument, Term};

use crate::error::{Error, Result};
use crate::model::LogEntry;
use crate::store::{CompiledQuery, LogStore, SearchHits, SortDirection, TimelineBucket, TimelineInterval};

/// Matching documents collected per query before in-process sort/paginate
/// or aggregation (spec.md §10.5: tantivy's aggregation API doesn't cover
/// the calendar-vs-fixed interval histogram distinction, so buckets are
/// computed by hand over the collected set). Bounds worst-case memory for
/// a single query; large jobs should narrow filters rather than rely on
/// unfiltered full-job scans.
const MAX_COLLECTED: usize = 100_000;

struct Fields {
    id: tantivy::schema::Field,
    job_id: tantivy::schema::Field,
    line_number: tantivy::schema::Field,
    timestamp: tantivy::schema::Field,
    level: tantivy::schema::Field,
    logger: tantivy::schema::Field,
    thread: tantivy::schema::Field,
    source: tantivy::schema::Field,
    hostname: tantivy::schema::Field,
    application: tantivy::schema::Field,
    environment: tantivy::schema::Field,
    file_name: tantivy::schema::Field,
    has_error: tantivy::schema::Field,
    has_stack_trace: tantivy::schema::Field,
    tags: tantivy::schema::Field,
    message: tantivy::schema::Field,
    raw_line: tantivy::schema::Field,
    stack_trace: tantivy::schema::Field,
    doc_json: tantivy::schema::Field,
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = Schema::builder();
    let id = builder.add_text_field("id", STRING | STORED);
    let job_id = builder.add_text_field("job_id", STRING | STORED | FAST);
    let line_number = builder.add_u64_field("line_number", INDEXED | STORED | FAST);
    let timestamp = builder.add_date_field("timestamp", INDEXED | STORED | FAST);
    let level = builder.add_text_field("level", STRING | STORED | FAST);
    let logger = builder.add_text_field("logger", STRING | STORED);
    let thread = builder.add_text_field("thread", STRING | STORED);
    let source = builder.add_text_field("source", STRING | STORED);
    let hostname = builder.add_text_field("hostname", STRING | STORED);
    let application = builder.add_text_field("application", STRING | STORED);
    let environment = builder.add_text_field("environment", STRING | STORED);
    let file_name = builder.add_text_field("file_name", STRING | STORED);
    let has_error = builder.add_u64_field("has_error", INDEXED | STORED);
    let has_stack_trace = builder.add_u64_field("has_stack_trace", INDEXED | STORED);
    let tags = builder.add_text_field("tags", STRING | STORED);
    let message = builder.add_text_field("message", TEXT | STORED);
    let raw_line = builder.add_text_field("raw_line", TEXT | STORED);
    let stack_trace = builder.add_text_field("stack_trace", TEXT | STORED);
    let doc_json = builder.add_text_field("doc_json", STORED);
    let schema = builder.build();
    (
        schema,
        Fields {
            id,
            job_id,
            line_number,
            timestamp,
            level,
            logger,
            thread,
            source,
            hostname,
            application,
            environment,
            file_name,
            has_error,
            has_stack_trace,
            tags,
            message,
            raw_line,
            stack_trace,
            doc_json,
        },
    )
}

/// Embedded full-text store backing C4/C7 (spec.md §9/§10.5). One index
/// per process; documents partitioned by `job_id`.
pub struct TantivyStore {
    index: Index,
    writer: Mutex<IndexWriter>,
    fields: Fields,
}

impl TantivyStore {
    pub fn new_in_ram() -> Result<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        let writer = index
            .writer(50_000_000)
            .map_err(|e| Error::Store(format!("failed to open index writer: {e}")))?;
        Ok(Self {
            index,
            writer: Mutex::new(writer),
            fields,
        })
    }

    pub fn open_or_create_in_dir(path: &std::path::Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let (schema, fields) = build_schema();
        let dir = tantivy::directory::MmapDirectory::open(path).map_err(|e| Error::Store(e.to_string()))?;
        let index = Index::open_or_create(dir, schema).map_err(|e| Error::Store(e.to_string()))?;
        let writer = index
            .writer(50_000_000)
            .map_err(|e| Error::Store(format!("failed to open index writer: {e}")))?;
        Ok(Self {
            index,
            writer: Mutex::new(writer),
            fields,
        })
    }

    fn field_handle(&self, name: &str) -> Option<tantivy::schema::Field> {
        match name {
            "level" => Some(self.fields.level),
            "logger" => Some(self.fields.logger),
            "thread" => Some(self.fields.thread),
            "source" => Some(self.fields.source),
            "hostname" => Some(self.fields.hostname),
            "application" => Some(self.fields.application),
            "environment" => Some(self.fields.environment),
            "file_name" => Some(self.fields.file_name),
            "tags" => Some(self.fields.tags),
            _ => None,
        }
    }

    fn build_boolean_query(&self, query: &CompiledQuery) -> Box<dyn Query> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        clauses.push((
            Occur::Must,
            Box::new(TermQuery::new(
                Term::from_field_text(self.fields.job_id, &query.job_id),
                IndexRecordOption::Basic,
            )),
        ));

        if let Some(text) = &query.search_text {
            clauses.push((Occur::Must, self.build_fulltext_query(text)));
        }

        if !query.levels.is_empty() {
            let level_clauses: Vec<(Occur, Box<dyn Query>)> = query
                .levels
                .iter()
                .map(|l| {
                    let term = Term::from_field_text(self.fields.level, &l.to_uppercase());
                    (Occur::Should, Box::new(TermQuery::new(term, IndexRecordOption::Basic)) as Box<dyn Query>)
                })
                .collect();
            clauses.push((Occur::Must, Box::new(BooleanQuery::new(level_clauses))));
        }

        for (field, value) in &query.term_filters {
            if let Some(handle) = self.field_handle(field) {
                let term = Term::from_field_text(handle, value);
                clauses.push((Occur::Must, Box::new(TermQuery::new(term, IndexRecordOption::Basic))));
            }
        }

        for (field, pattern) in &query.wildcard_filters {
            if let Some(handle) = self.field_handle(field) {
                let regex = glob_to_regex(pattern);
                if let Ok(q) = RegexQuery::from_pattern(&regex, handle) {
                    clauses.push((Occur::Must, Box::new(q)));
                }
            }
        }

        if let Some(want) = query.has_error {
            let term = Term::from_field_u64(self.fields.has_error, want as u64);
            clauses.push((Occur::Must, Box::new(TermQuery::new(term, IndexRecordOption::Basic))));
        }
        if let Some(want) = query.has_stack_trace {
            let term = Term::from_field_u64(self.fields.has_stack_trace, want as u64);
            clauses.push((Occur::Must, Box::new(TermQuery::new(term, IndexRecordOption::Basic))));
        }

        if !query.tags.is_empty() {
            let tag_clauses: Vec<(Occur, Box<dyn Query>)> = query
                .tags
                .iter()
                .map(|t| {
                    let term = Term::from_field_text(self.fields.tags, t);
                    (Occur::Should, Box::new(TermQuery::new(term, IndexRecordOption::Basic)) as Box<dyn Query>)
                })
                .collect();
            clauses.push((Occur::Must, Box::new(BooleanQuery::new(tag_clauses))));
        }

        if query.start_date.is_some() || query.end_date.is_some() {
            let lower = query
                .start_date
                .map(|d| std::ops::Bound::Included(Term::from_field_date(self.fields.timestamp, TantivyDateTime::from_timestamp_micros(d.timestamp_micros()))))
                .unwrap_or(std::ops::Bound::Unbounded);
            let upper = query
                .end_date
                .map(|d| std::ops::Bound::Included(Term::from_field_date(self.fields.timestamp, TantivyDateTime::from_timestamp_micros(d.timestamp_micros()))))
                .unwrap_or(std::ops::Bound::Unbounded);
            clauses.push((Occur::Must, Box::new(RangeQuery::new(lower, upper))));
        }

        if query.min_line_number.is_some() || query.max_line_number.is_some() {
            let lower = query
                .min_line_number
                .map(|n| std::ops::Bound::Included(Term::from_field_u64(self.fields.line_number, n)))
                .unwrap_or(std::ops::Bound::Unbounded);
            let upper = query
                .max_line_number
                .map(|n| std::ops::Bound::Included(Term::from_field_u64(self.fields.line_number, n)))
                .unwrap_or(std::ops::Bound::Unbounded);
            clauses.push((Occur::Must, Box::new(RangeQuery::new(lower, upper))));
        }

        Box::new(BooleanQuery::new(clauses))
    }

    /// Approximates ElasticSearch's `AUTO` fuzziness: 0 edits for terms of
    /// length <=2, 1 edit for 3-5, 2 edits beyond — OR'd across
    /// `search_fields`, AND'd across whitespace-separated terms (spec.md
    /// §4.6 "operator AND").
    fn build_fulltext_query(&self, text: &str) -> Box<dyn Query> {
        let field_handles = [self.fields.message, self.fields.raw_line, self.fields.stack_trace];

        let mut term_clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for token in text.split_whitespace() {
            let distance: u8 = if token.len() <= 2 {
                0
            } else if token.len() <= 5 {
                1
            } else {
                2
            };
            let field_clauses: Vec<(Occur, Box<dyn Query>)> = field_handles
                .iter()
                .map(|&f| {
                    let term = Term::from_field_text(f, &token.to_lowercase());
                    (Occur::Should, Box::new(FuzzyTermQuery::new(term, distance, true)) as Box<dyn Query>)
                })
                .collect();
            term_clauses.push((Occur::Must, Box::new(BooleanQuery::new(field_clauses))));
        }

        if term_clauses.is_empty() {
            Box::new(AllQuery)
        } else {
            Box::new(BooleanQuery::new(term_clauses))
        }
    }

    fn collect_matching(&self, query: &CompiledQuery) -> Result<Vec<LogEntry>> {
        let reader = self.index.reader().map_err(|e| Error::Store(e.to_string()))?;
        let searcher = reader.searcher();
        let bool_query = self.build_boolean_query(query);
        let docs = searcher
            .search(&bool_query, &TopDocs::with_limit(MAX_COLLECTED))
            .map_err(|e| Error::Store(e.to_string()))?;

        let mut entries = Vec::with_capacity(docs.len());
        for (_score, addr) in docs {
            let doc: TantivyDocument = searcher.doc(addr).map_err(|e| Error::Store(e.to_string()))?;
            if let Some(raw) = doc.get_first(self.fields.doc_json).and_then(|v| v.as_str()) {
                if let Ok(entry) = serde_json::from_str::<LogEntry>(raw) {
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }
}

/// Translates the `*`/`?` glob syntax spec.md §4.6 exact-match fields
/// accept into an anchored regex tantivy's `RegexQuery` can execute.
fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    for segment in pattern.split_inclusive(['*', '?']) {
        let (literal, wildcard) = match segment.chars().last() {
            Some('*') => (&segment[..segment.len() - 1], Some(".*")),
            Some('?') => (&segment[..segment.len() - 1], Some(".")),
            _ => (segment, None),
        };
        out.push_str(&regex::escape(literal));
        if let Some(w) = wildcard {
            out.push_str(w);
        }
    }
    out.push('$');
    out
}

fn sort_key(entry: &LogEntry, field: crate::store::SortField) -> String {
    use crate::store::SortField::*;
    match field {
        Timestamp => entry.timestamp.to_rfc3339(),
        LineNumber => format!("{:020}", entry.line_number),
        Level => entry.level.as_str().to_string(),
        Logger => entry.logger.clone().unwrap_or_default(),
        Thread => entry.thread.clone().unwrap_or_default(),
        Source => entry.source.clone().unwrap_or_default(),
        Hostname => entry.hostname.clone().unwrap_or_default(),
        Application => entry.application.clone().unwrap_or_default(),
        IndexedAt => entry.indexed_at.to_rfc3339(),
    }
}

impl LogStore for TantivyStore {
    fn bulk_write(&self, entries: &[LogEntry]) -> Result<()> {
        let mut writer = self.writer.lock().expect("index writer lock poisoned");
        for entry in entries {
            let doc_json = serde_json::to_string(entry).map_err(|e| Error::Store(e.to_string()))?;
            let mut tdoc = TantivyDocument::default();
            tdoc.add_text(self.fields.id, &entry.id);
            tdoc.add_text(self.fields.job_id, &entry.job_id);
            tdoc.add_u64(self.fields.line_number, entry.line_number);
            tdoc.add_date(self.fields.timestamp, TantivyDateTime::from_timestamp_micros(entry.timestamp.timestamp_micros()));
            tdoc.add_text(self.fields.level, entry.level.as_str());
            if let Some(v) = &entry.logger {
                tdoc.add_text(self.fields.logger, v);
            }
            if let Some(v) = &entry.thread {
                tdoc.add_text(self.fields.thread, v);
            }
            if let Some(v) = &entry.source {
                tdoc.add_text(self.fields.source, v);
            }
            if let Some(v) = &entry.hostname {
                tdoc.add_text(self.fields.hostname, v);
            }
            if let Some(v) = &entry.application {
                tdoc.add_text(self.fields.application, v);
            }
            if let Some(v) = &entry.environment {
                tdoc.add_text(self.fields.environment, v);
            }
            tdoc.add_text(self.fields.file_name, &entry.file_name);
            tdoc.add_u64(self.fields.has_error, entry.has_error as u64);
            tdoc.add_u64(self.fields.has_stack_trace, entry.has_stack_trace as u64);
            for tag in &entry.tags {
                tdoc.add_text(self.fields.tags, tag);
            }
            tdoc.add_text(self.fields.message, &entry.message);
            tdoc.add_text(self.fields.raw_line, &entry.raw_line);
            if let Some(v) = &entry.stack_trace {
                tdoc.add_text(self.fields.stack_trace, v);
            }
            tdoc.add_text(self.fields.doc_json, &doc_json);
            writer
                .add_document(tdoc)
                .map_err(|e| Error::Store(format!("add_document failed: {e}")))?;
        }
        writer.commit().map_err(|e| Error::Store(format!("commit failed: {e}")))?;
        Ok(())
    }

    fn search(&self, query: &CompiledQuery) -> Result<SearchHits> {
        let mut matched = self.collect_matching(query)?;
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
        let page = matched.into_iter().skip(start).take(query.size as usize).collect();
        Ok(SearchHits { entries: page, total })
    }

    fn count(&self, query: &CompiledQuery) -> Result<u64> {
        let reader = self.index.reader().map_err(|e| Error::Store(e.to_string()))?;
        let searcher = reader.searcher();
        let bool_query = self.build_boolean_query(query);
        let count = searcher.search(&bool_query, &Count).map_err(|e| Error::Store(e.to_string()))?;
        Ok(count as u64)
    }

    fn timeline(&self, query: &CompiledQuery, interval: TimelineInterval) -> Result<Vec<TimelineBucket>> {
        let matched = self.collect_matching(query)?;
        let step_secs = interval.duration().num_seconds().max(1);
        let mut buckets: HashMap<i64, TimelineBucket> = HashMap::new();
        for entry in &matched {
            let epoch = entry.timestamp.timestamp();
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
        let matched = self.collect_matching(query)?;
        let mut counts: HashMap<String, u64> = HashMap::new();
        for entry in &matched {
            let values: Vec<String> = match field {
                "tags" => entry.tags.clone(),
                "level" => vec![entry.level.as_str().to_string()],
                "logger" => entry.logger.iter().cloned().collect(),
                "thread" => entry.thread.iter().cloned().collect(),
                "source" => entry.source.iter().cloned().collect(),
                "hostname" => entry.hostname.iter().cloned().collect(),
                "application" => entry.application.iter().cloned().collect(),
                "environment" => entry.environment.iter().cloned().collect(),
                "file_name" => vec![entry.file_name.clone()],
                _ => Vec::new(),
            };
            for v in values {
                *counts.entry(v).or_insert(0) += 1;
            }
        }
        let mut out: Vec<(String, u64)> = counts.into_iter().collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out.truncate(limit);
        Ok(out)
    }

    fn level_counts(&self, job_id: &str) -> Result<HashMap<String, u64>> {
        let query = CompiledQuery::for_job(job_id);
        let matched = self.collect_matching(&query)?;
        let mut counts = HashMap::new();
        for entry in &matched {
            *counts.entry(entry.level.as_str().to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn error_count(&self, job_id: &str) -> Result<u64> {
        let mut query = CompiledQuery::for_job(job_id);
        query.has_error = Some(true);
        self.count(&query)
    }

    fn context(&self, job_id: &str, line_number: u64, before: u64, after: u64) -> Result<Vec<LogEntry>> {
        let mut query = CompiledQuery::for_job(job_id);
        query.min_line_number = Some(line_number.saturating_sub(before));
        query.max_line_number = Some(line_number + after);
        query.size = (before + after + 1) as u32;
        query.sort_by = crate::store::SortField::LineNumber;
        query.sort_direction = SortDirection::Asc;
        let mut matched = self.collect_matching(&query)?;
        matched.sort_by_key(|e| e.line_number);
        Ok(matched)
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
    fn writes_and_searches_by_job_and_level() {
        let store = TantivyStore::new_in_ram().unwrap();
        store
            .bulk_write(&[entry("job-1", 1, Level::Error, "disk failure"), entry("job-1", 2, Level::Info, "started up")])
            .unwrap();
        let mut query = CompiledQuery::for_job("job-1");
        query.levels = vec!["ERROR".to_string()];
        let hits = store.search(&query).unwrap();
        assert_eq!(hits.total, 1);
        assert_eq!(hits.entries[0].message, "disk failure");
    }

    #[test]
    fn full_text_search_matches_message() {
        let store = TantivyStore::new_in_ram().unwrap();
        store.bulk_write(&[entry("job-1", 1, Level::Error, "connection timeout to database")]).unwrap();
        let mut query = CompiledQuery::for_job("job-1");
        query.search_text = Some("timeout".to_string());
        let hits = store.search(&query).unwrap();
        assert_eq!(hits.total, 1);
    }

    #[test]
    fn level_counts_partition_by_job() {
        let store = TantivyStore::new_in_ram().unwrap();
        store
            .bulk_write(&[
                entry("job-1", 1, Level::Error, "a"),
                entry("job-1", 2, Level::Error, "b"),
                entry("job-1", 3, Level::Info, "c"),
                entry("job-2", 1, Level::Error, "d"),
            ])
            .unwrap();
        let counts = store.level_counts("job-1").unwrap();
        assert_eq!(counts.get("ERROR"), Some(&2));
        assert_eq!(counts.get("INFO"), Some(&1));
    }
}
