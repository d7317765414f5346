use crate::error::{Error, Result};
use crate::model::LogEntry;
use crate::query::compile;
use crate::query::request::LogQueryRequest;
use crate::store::LogStore;

/// Default/ceiling record counts for a single export request (spec.md §4.7).
pub const DEFAULT_MAX_RECORDS: usize = 10_000;
pub const MAX_RECORDS_CEILING: usize = 100_000;

/// Fields rendered by CSV export when the caller doesn't specify a list
/// (spec.md §4.7 "CSV").
pub const DEFAULT_CSV_FIELDS: &[&str] = &["timestamp", "level", "logger", "thread", "message", "lineNumber", "fileName"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Ndjson,
}

impl ExportFormat {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "ndjson" => Ok(Self::Ndjson),
            other => Err(Error::InvalidExportFormat(other.to_string())),
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Json => "application/json",
            Self::Ndjson => "application/x-ndjson",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub include_header: bool,
    pub fields: Vec<String>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            include_header: true,
            fields: DEFAULT_CSV_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Fetches up to `max_records` entries matching `request`, rejecting
/// requests whose resolved page size would exceed `ceiling` (spec.md §4.7
/// "Export": "capped at maxRecords, default 10 000, ceiling 100 000").
pub fn fetch_for_export(store: &dyn LogStore, request: &LogQueryRequest, max_records: usize, ceiling: usize) -> Result<Vec<LogEntry>> {
    if max_records > ceiling {
        return Err(Error::ExportTooLarge {
            requested: max_records,
            ceiling,
        });
    }
    let mut query = compile(request)?;
    query.page = 0;
    query.size = max_records as u32;
    let hits = store.search(&query)?;
    Ok(hits.entries)
}

/// Reflection-style field→accessor table, indexed by string name instead of
/// a real reflection API (spec.md §9 "Reflection-based field extraction").
/// Unknown field names yield an empty string rather than failing the export.
fn field_value(entry: &LogEntry, field: &str) -> String {
    match field {
        "timestamp" => entry.timestamp.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
        "level" => entry.level.as_str().to_string(),
        "logger" => entry.logger.clone().unwrap_or_default(),
        "thread" => entry.thread.clone().unwrap_or_default(),
        "source" => entry.source.clone().unwrap_or_default(),
        "hostname" => entry.hostname.clone().unwrap_or_default(),
        "application" => entry.application.clone().unwrap_or_default(),
        "environment" => entry.environment.clone().unwrap_or_default(),
        "message" => entry.message.clone(),
        "rawLine" | "raw_line" => entry.raw_line.clone(),
        "stackTrace" | "stack_trace" => entry.stack_trace.clone().unwrap_or_default(),
        "lineNumber" | "line_number" => entry.line_number.to_string(),
        "fileName" | "file_name" => entry.file_name.clone(),
        "hasError" | "has_error" => entry.has_error.to_string(),
        "hasStackTrace" | "has_stack_trace" => entry.has_stack_trace.to_string(),
        "indexedAt" | "indexed_at" => entry.indexed_at.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
        "id" => entry.id.clone(),
        "jobId" | "job_id" => entry.job_id.clone(),
        _ => String::new(),
    }
}

/// Renders entries as CSV with configurable delimiter/header/field list
/// (spec.md §4.7). Relies on the `csv` crate's writer for correct
/// quoting/escaping of embedded delimiters and quotes rather than
/// hand-rolled string joining.
pub fn render_csv(entries: &[LogEntry], options: &CsvOptions) -> Result<Vec<u8>> {
    let mut writer = ::csv::WriterBuilder::new().delimiter(options.delimiter).from_writer(Vec::new());

    if options.include_header {
        writer
            .write_record(&options.fields)
            .map_err(|e| Error::Internal(format!("csv header write failed: {e}")))?;
    }
    for entry in entries {
        let row: Vec<String> = options.fields.iter().map(|f| field_value(entry, f)).collect();
        writer.write_record(&row).map_err(|e| Error::Internal(format!("csv row write failed: {e}")))?;
    }
    writer.flush().map_err(|e| Error::Internal(format!("csv flush failed: {e}")))?;
    writer.into_inner().map_err(|e| Error::Internal(format!("csv finalize failed: {e}")))
}

/// Pretty-printed JSON array (spec.md §4.7 "JSON").
pub fn render_json(entries: &[LogEntry]) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(entries).map_err(|e| Error::Internal(format!("json export failed: {e}")))
}

/// One compact JSON object per line, no pretty printing (spec.md §4.7
/// "NDJSON").
pub fn render_ndjson(entries: &[LogEntry]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for entry in entries {
        serde_json::to_writer(&mut out, entry).map_err(|e| Error::Internal(format!("ndjson export failed: {e}")))?;
        out.push(b'\n');
    }
    Ok(out)
}

pub fn render(entries: &[LogEntry], format: ExportFormat, csv_options: &CsvOptions) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Csv => render_csv(entries, csv_options),
        ExportFormat::Json => render_json(entries),
        ExportFormat::Ndjson => render_ndjson(entries),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Level;

    fn entry(n: u64, level: Level, message: &str) -> LogEntry {
        let mut e = LogEntry::new("job-1", n, "a.log", level, message, message, chrono::DateTime::UNIX_EPOCH);
        e.logger = Some("com.example.Service".to_string());
        e
    }

    #[test]
    fn csv_round_trips_timestamp_and_level() {
        let entries = vec![entry(1, Level::Error, "boom")];
        let bytes = render_csv(&entries, &CsvOptions::default()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), "timestamp,level,logger,thread,message,lineNumber,fileName");
        let row = lines.next().unwrap();
        assert!(row.contains("ERROR"));
        assert!(row.contains("boom"));
        assert!(row.contains("1970-01-01T00:00:00.000"));
    }

    #[test]
    fn csv_escapes_embedded_delimiter() {
        let entries = vec![entry(1, Level::Info, "hello, world")];
        let bytes = render_csv(&entries, &CsvOptions::default()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"hello, world\""));
    }

    #[test]
    fn ndjson_emits_one_compact_line_per_entry() {
        let entries = vec![entry(1, Level::Info, "a"), entry(2, Level::Warn, "b")];
        let bytes = render_ndjson(&entries).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(!lines[0].contains('\n'));
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["message"], "a");
    }

    #[test]
    fn json_export_is_pretty_printed_array() {
        let entries = vec![entry(1, Level::Info, "a")];
        let bytes = render_json(&entries).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with('['));
        assert!(text.contains('\n'));
    }

    #[test]
    fn unknown_export_format_is_rejected() {
        assert!(ExportFormat::parse("yaml").is_err());
        assert!(ExportFormat::parse("csv").is_ok());
    }
}
