use std::collections::HashMap;

use crate::model::{Level, LogEntry, ParseContext, ParseOutcome};
use crate::parser::metadata::coerce_scalar;
use crate::parser::timestamp::parse_timestamp;
use crate::parser::traits::LogParser;

const TIMESTAMP_ALIASES: &[&str] = &["timestamp", "time", "date", "datetime", "ts"];
const LEVEL_ALIASES: &[&str] = &["level", "severity", "loglevel", "log_level"];
const MESSAGE_ALIASES: &[&str] = &["message", "msg", "text", "description"];
const LOGGER_ALIASES: &[&str] = &["logger", "logger_name", "class", "category"];
const THREAD_ALIASES: &[&str] = &["thread", "thread_name"];
const HOSTNAME_ALIASES: &[&str] = &["hostname", "host"];
const APPLICATION_ALIASES: &[&str] = &["application", "app", "service"];
const ENVIRONMENT_ALIASES: &[&str] = &["environment", "env"];
const STACK_TRACE_ALIASES: &[&str] = &["stack_trace", "stacktrace", "exception"];

/// Delimited plain-text (CSV/TSV/semicolon/pipe) ingest, spec.md §4.3.3.
/// Header row is detected by column-name alias match or an all-non-numeric
/// heuristic; without a header, the first three columns default to
/// timestamp/level/message positionally.
pub struct CsvParser;

impl CsvParser {
    pub fn new() -> Self {
        CsvParser
    }
}

impl Default for CsvParser {
    fn default() -> Self {
        Self::new()
    }
}

fn detect_delimiter(sample: &str) -> u8 {
    let first_line = sample.lines().next().unwrap_or("");
    let candidates: [(u8, char); 4] = [(b',', ','), (b'\t', '\t'), (b';', ';'), (b'|', '|')];
    let mut best = (b',', 0usize);
    let mut in_quotes = false;
    let mut counts: HashMap<u8, usize> = HashMap::new();
    for ch in first_line.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        for (byte, c) in candidates {
            if ch == c {
                *counts.entry(byte).or_insert(0) += 1;
            }
        }
    }
    for (byte, count) in counts {
        if count > best.1 {
            best = (byte, count);
        }
    }
    best.0
}

fn split_row(line: &str, delimiter: u8) -> Vec<String> {
    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());
    if let Some(record) = reader.records().next() {
        if let Ok(record) = record {
            return record.iter().map(str::to_string).collect();
        }
    }
    line.split(delimiter as char).map(str::to_string).collect()
}

fn looks_like_header(cells: &[String]) -> bool {
    let known_aliases: Vec<&str> = TIMESTAMP_ALIASES
        .iter()
        .chain(LEVEL_ALIASES)
        .chain(MESSAGE_ALIASES)
        .chain(LOGGER_ALIASES)
        .chain(THREAD_ALIASES)
        .chain(HOSTNAME_ALIASES)
        .chain(APPLICATION_ALIASES)
        .chain(ENVIRONMENT_ALIASES)
        .chain(STACK_TRACE_ALIASES)
        .copied()
        .collect();
    let any_alias = cells
        .iter()
        .any(|c| known_aliases.contains(&c.trim().to_lowercase().as_str()));
    if any_alias {
        return true;
    }
    !cells.is_empty() && cells.iter().all(|c| c.trim().parse::<f64>().is_err() && !c.trim().is_empty())
}

fn column_index(headers: &[String], aliases: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| aliases.contains(&h.trim().to_lowercase().as_str()))
}

impl LogParser for CsvParser {
    fn can_parse(&self, file_name: &str, sample: &str) -> bool {
        if file_name.ends_with(".csv") || file_name.ends_with(".tsv") {
            return true;
        }
        let delimiter = detect_delimiter(sample);
        let lines: Vec<&str> = sample.lines().take(3).collect();
        !lines.is_empty() && lines.iter().all(|l| split_row(l, delimiter).len() > 1)
    }

    fn parse_line(&self, line: &str, line_number: u64, ctx: &mut ParseContext) -> ParseOutcome {
        if line.trim().is_empty() {
            return ParseOutcome::Skipped(line_number, "blank line".to_string());
        }

        if ctx.csv_headers.is_none() && !ctx.csv_headers_processed {
            let delimiter = detect_delimiter(line);
            ctx.csv_column_index.insert("__delimiter__".to_string(), delimiter as usize);
            let cells = split_row(line, delimiter);
            ctx.csv_headers_processed = true;
            if looks_like_header(&cells) {
                ctx.csv_headers = Some(cells);
                return ParseOutcome::Skipped(line_number, "header row".to_string());
            }
            // No header: positional defaults, continue on to parse this
            // very line as the first data row below.
            ctx.csv_headers = Some(Vec::new());
        }

        let delimiter = *ctx.csv_column_index.get("__delimiter__").unwrap_or(&(b',' as usize)) as u8;
        let cells = split_row(line, delimiter);
        let headers = ctx.csv_headers.clone().unwrap_or_default();

        let get_named = |aliases: &[&str]| -> Option<String> {
            if headers.is_empty() {
                return None;
            }
            column_index(&headers, aliases).and_then(|i| cells.get(i)).map(|s| s.trim().to_string())
        };

        let (timestamp_raw, level_raw, message_raw, rest_start) = if headers.is_empty() {
            (
                cells.first().cloned(),
                cells.get(1).cloned(),
                cells.get(2).cloned(),
                3usize,
            )
        } else {
            (get_named(TIMESTAMP_ALIASES), get_named(LEVEL_ALIASES), get_named(MESSAGE_ALIASES), 0usize)
        };

        let timestamp = timestamp_raw
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| parse_timestamp(s, ctx.timestamp_format.as_deref()))
            .unwrap_or_else(chrono::Utc::now);
        let level = Level::normalize(level_raw.as_deref());
        let message = message_raw.unwrap_or_default();

        let mut entry = LogEntry::new(
            ctx.job_id.clone(),
            line_number,
            ctx.file_name.clone(),
            level,
            message,
            line.to_string(),
            timestamp,
        );
        entry.logger = get_named(LOGGER_ALIASES).filter(|s| !s.is_empty());
        entry.source = entry.logger.as_deref().and_then(|l| l.rsplit('.').next()).map(str::to_string);
        entry.thread = get_named(THREAD_ALIASES).filter(|s| !s.is_empty());
        entry.hostname = get_named(HOSTNAME_ALIASES).filter(|s| !s.is_empty());
        entry.application = get_named(APPLICATION_ALIASES).filter(|s| !s.is_empty());
        entry.environment = get_named(ENVIRONMENT_ALIASES).filter(|s| !s.is_empty());
        if let Some(trace) = get_named(STACK_TRACE_ALIASES).filter(|s| !s.is_empty()) {
            entry = entry.with_stack_trace(trace);
            entry.has_error = true;
        }

        if headers.is_empty() {
            for (i, cell) in cells.iter().enumerate().skip(rest_start) {
                if cell.trim().is_empty() {
                    continue;
                }
                entry.metadata.insert(format!("column_{i}"), coerce_scalar(cell));
            }
        } else {
            let reserved: Vec<usize> = [TIMESTAMP_ALIASES, LEVEL_ALIASES, MESSAGE_ALIASES, LOGGER_ALIASES, THREAD_ALIASES, HOSTNAME_ALIASES, APPLICATION_ALIASES, ENVIRONMENT_ALIASES, STACK_TRACE_ALIASES]
                .iter()
                .filter_map(|aliases| column_index(&headers, aliases))
                .collect();
            for (i, header) in headers.iter().enumerate() {
                if reserved.contains(&i) {
                    continue;
                }
                let Some(cell) = cells.get(i) else { continue };
                if cell.trim().is_empty() {
                    continue;
                }
                entry.metadata.insert(header.clone(), coerce_scalar(cell));
            }
        }

        ParseOutcome::success(entry)
    }

    fn reset(&self) {}

    fn supported_format(&self) -> &'static str {
        "CSV"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn description(&self) -> &'static str {
        "Delimited plain-text ingest (CSV/TSV/semicolon/pipe) with header-aware column mapping"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ParseContext {
        ParseContext::new("job-1", "app.csv")
    }

    #[test]
    fn header_row_is_skipped_and_columns_mapped() {
        let parser = CsvParser::new();
        let mut c = ctx();
        let header = parser.parse_line("timestamp,level,message,user_id", 1, &mut c);
        assert!(matches!(header, ParseOutcome::Skipped(..)));

        let outcome = parser.parse_line("2024-01-15T10:00:00Z,ERROR,disk full,77", 2, &mut c);
        let ParseOutcome::Success(entry) = outcome else { panic!("expected success") };
        assert_eq!(entry.level, Level::Error);
        assert_eq!(entry.message, "disk full");
        assert_eq!(entry.metadata.get("user_id").map(|v| v.as_display()), Some("77".to_string()));
    }

    #[test]
    fn no_header_uses_positional_defaults() {
        let parser = CsvParser::new();
        let mut c = ctx();
        let outcome = parser.parse_line("2024-01-15T10:00:00Z,INFO,service started", 1, &mut c);
        let ParseOutcome::Success(entry) = outcome else { panic!("expected success") };
        assert_eq!(entry.level, Level::Info);
        assert_eq!(entry.message, "service started");
    }

    #[test]
    fn detects_tab_delimiter() {
        let parser = CsvParser::new();
        assert!(parser.can_parse("x.tsv", "a\tb\tc"));
        assert_eq!(detect_delimiter("a\tb\tc"), b'\t');
    }

    #[test]
    fn quoted_fields_with_embedded_comma_stay_intact() {
        let parser = CsvParser::new();
        let mut c = ctx();
        parser.parse_line("timestamp,level,message", 1, &mut c);
        let outcome = parser.parse_line(r#"2024-01-15T10:00:00Z,INFO,"hello, world""#, 2, &mut c);
        let ParseOutcome::Success(entry) = outcome else { panic!("expected success") };
        assert_eq!(entry.message, "hello, world");
    }
}
