use serde_json::Value;

use crate::model::{Level, LogEntry, MetaValue, ParseContext, ParseOutcome};
use crate::parser::timestamp::{from_epoch_number, parse_timestamp};
use crate::parser::traits::LogParser;

const TIMESTAMP_KEYS: &[&str] = &["timestamp", "time", "@timestamp", "datetime", "date", "ts", "log_time", "logTime"];
const LEVEL_KEYS: &[&str] = &["level", "severity", "log_level", "logLevel", "loglevel", "levelname"];
const MESSAGE_KEYS: &[&str] = &["message", "msg", "text", "log_message", "logMessage", "description"];
const LOGGER_KEYS: &[&str] = &["logger", "logger_name", "loggerName", "class", "category", "name"];
const THREAD_KEYS: &[&str] = &["thread", "threadName", "thread_name"];
const STACK_TRACE_KEYS: &[&str] = &["stackTrace", "stack_trace", "exception", "stacktrace"];
const HOSTNAME_KEYS: &[&str] = &["hostname", "host"];
const APPLICATION_KEYS: &[&str] = &["application", "app", "service", "service_name"];
const ENVIRONMENT_KEYS: &[&str] = &["environment", "env"];

/// One JSON object (or NDJSON line) per log event (spec.md §4.3.2). A
/// fixed alias table resolves the handful of well-known fields; anything
/// left over lands in `metadata`.
pub struct JsonParser;

impl JsonParser {
    pub fn new() -> Self {
        JsonParser
    }
}

impl Default for JsonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LogParser for JsonParser {
    fn can_parse(&self, file_name: &str, sample: &str) -> bool {
        if file_name.ends_with(".json") || file_name.ends_with(".ndjson") {
            return true;
        }
        let trimmed = sample.trim();
        (trimmed.starts_with('{') && trimmed.ends_with('}'))
            || (trimmed.starts_with('[') && trimmed.ends_with(']'))
    }

    fn parse_line(&self, line: &str, line_number: u64, ctx: &mut ParseContext) -> ParseOutcome {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return ParseOutcome::Skipped(line_number, "blank line".to_string());
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => return ParseOutcome::Failed(line_number, line.to_string(), format!("invalid JSON: {e}")),
        };

        let Some(obj) = value.as_object() else {
            // A bare JSON array/scalar carries no named fields to resolve;
            // keep the line rather than reject the whole file over it.
            let entry = LogEntry::new(
                ctx.job_id.clone(),
                line_number,
                ctx.file_name.clone(),
                Level::Info,
                trimmed.to_string(),
                line.to_string(),
                chrono::Utc::now(),
            );
            return ParseOutcome::success(entry);
        };

        let mut consumed: Vec<&str> = Vec::new();

        let timestamp = find_first(obj, TIMESTAMP_KEYS, &mut consumed)
            .map(|v| value_to_timestamp(v, ctx.timestamp_format.as_deref()))
            .unwrap_or_else(chrono::Utc::now);

        let level = Level::normalize(find_first(obj, LEVEL_KEYS, &mut consumed).and_then(Value::as_str));

        let message = find_first(obj, MESSAGE_KEYS, &mut consumed)
            .map(value_to_text)
            .unwrap_or_default();

        let logger = find_first(obj, LOGGER_KEYS, &mut consumed).map(value_to_text);
        let source = logger.as_deref().and_then(|l| l.rsplit('.').next()).map(str::to_string);
        let thread = find_first(obj, THREAD_KEYS, &mut consumed).map(value_to_text);
        let stack_trace = find_first(obj, STACK_TRACE_KEYS, &mut consumed).map(value_to_text);
        let hostname = find_first(obj, HOSTNAME_KEYS, &mut consumed).map(value_to_text);
        let application = find_first(obj, APPLICATION_KEYS, &mut consumed).map(value_to_text);
        let environment = find_first(obj, ENVIRONMENT_KEYS, &mut consumed).map(value_to_text);

        let mut entry = LogEntry::new(
            ctx.job_id.clone(),
            line_number,
            ctx.file_name.clone(),
            level,
            message,
            line.to_string(),
            timestamp,
        );
        entry.logger = logger;
        entry.source = source;
        entry.thread = thread;
        entry.hostname = hostname;
        entry.application = application;
        entry.environment = environment;
        if let Some(trace) = stack_trace {
            entry = entry.with_stack_trace(trace);
            entry.has_error = true;
        }

        for (key, val) in obj {
            if consumed.contains(&key.as_str()) {
                continue;
            }
            entry.metadata.insert(key.clone(), value_to_meta(val));
        }

        ParseOutcome::success(entry)
    }

    fn reset(&self) {}

    fn supported_format(&self) -> &'static str {
        "JSON"
    }

    fn priority(&self) -> i32 {
        20
    }

    fn description(&self) -> &'static str {
        "Structured JSON / NDJSON log events with field-alias resolution"
    }
}

fn find_first<'a>(
    obj: &'a serde_json::Map<String, Value>,
    keys: &[&'static str],
    consumed: &mut Vec<&'static str>,
) -> Option<&'a Value> {
    for key in keys {
        if let Some(v) = obj.get(*key) {
            consumed.push(key);
            return Some(v);
        }
    }
    None
}

fn value_to_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_to_meta(v: &Value) -> MetaValue {
    match v {
        Value::String(s) => MetaValue::String(s.clone()),
        Value::Bool(b) => MetaValue::Bool(*b),
        Value::Number(n) => MetaValue::Number(n.as_f64().unwrap_or(0.0)),
        other => MetaValue::String(other.to_string()),
    }
}

fn value_to_timestamp(v: &Value, user_pattern: Option<&str>) -> chrono::DateTime<chrono::Utc> {
    match v {
        Value::Number(n) => from_epoch_number(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => parse_timestamp(s, user_pattern),
        _ => chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ParseContext {
        ParseContext::new("job-1", "app.json")
    }

    #[test]
    fn resolves_aliased_fields() {
        let parser = JsonParser::new();
        let line = r#"{"@timestamp":"2024-01-15T10:30:45Z","severity":"ERROR","msg":"boom","logger_name":"com.example.Service","user_id":42}"#;
        let mut c = ctx();
        let outcome = parser.parse_line(line, 1, &mut c);
        let ParseOutcome::Success(entry) = outcome else { panic!("expected success") };
        assert_eq!(entry.level, Level::Error);
        assert_eq!(entry.message, "boom");
        assert_eq!(entry.logger.as_deref(), Some("com.example.Service"));
        assert_eq!(entry.source.as_deref(), Some("Service"));
        assert_eq!(entry.metadata.get("user_id"), Some(&MetaValue::Number(42.0)));
        assert!(!entry.metadata.contains_key("msg"));
    }

    #[test]
    fn epoch_millis_timestamp_field() {
        let parser = JsonParser::new();
        let line = r#"{"timestamp": 1705314645123, "level": "info", "message": "ok"}"#;
        let mut c = ctx();
        let ParseOutcome::Success(entry) = parser.parse_line(line, 1, &mut c) else { panic!() };
        assert_eq!(entry.timestamp.timestamp_millis(), 1705314645123);
    }

    #[test]
    fn invalid_json_fails() {
        let parser = JsonParser::new();
        let mut c = ctx();
        let outcome = parser.parse_line("{not json", 1, &mut c);
        assert!(matches!(outcome, ParseOutcome::Failed(..)));
    }

    #[test]
    fn stack_trace_field_marks_has_error() {
        let parser = JsonParser::new();
        let line = r#"{"level":"INFO","message":"failed","stackTrace":"java.lang.Exception\n\tat Foo.bar"}"#;
        let mut c = ctx();
        let ParseOutcome::Success(entry) = parser.parse_line(line, 1, &mut c) else { panic!() };
        assert!(entry.has_error);
        assert!(entry.has_stack_trace);
    }

    #[test]
    fn can_parse_detects_ndjson_extension_and_braces() {
        let parser = JsonParser::new();
        assert!(parser.can_parse("events.ndjson", "anything"));
        assert!(parser.can_parse("weird.txt", r#"{"a":1}"#));
        assert!(!parser.can_parse("weird.txt", "plain text line"));
    }
}
