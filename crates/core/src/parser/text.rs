use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{Level, LogEntry, ParseContext, ParseOutcome};
use crate::parser::metadata::extract_common_metadata;
use crate::parser::timestamp::parse_timestamp;
use crate::parser::traits::LogParser;

// Ordered pattern family, spec.md §4.3.1. First match wins.
static SPRING_BOOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^(?P<ts>\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}(?:[.,]\d+)?)
        \s+(?P<level>\S+)
        \s+(?P<pid>\d+)
        \s+---\s+
        \[(?P<thread>[^\]]*)\]
        \s+(?P<logger>\S+)
        \s*:\s*(?P<message>.*)$
        ",
    )
    .unwrap()
});

static LOG4J: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^(?P<ts>\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?)
        \s+(?:\[(?P<thread>[^\]]*)\]\s+)?
        (?P<level>[A-Za-z]+)
        \s+(?P<logger>\S+)
        \s+-\s+(?P<message>.*)$
        ",
    )
    .unwrap()
});

static APACHE_COMBINED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        ^(?P<ip>\S+)\s+(?P<ident>\S+)\s+(?P<user>\S+)
        \s+\[(?P<ts>[^\]]+)\]
        \s+"(?P<request>[^"]*)"
        \s+(?P<status>\d{3})
        \s+(?P<bytes>\S+)
        (?:\s+"(?P<referer>[^"]*)"\s+"(?P<ua>[^"]*)")?
        "#,
    )
    .unwrap()
});

static SYSLOG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^(?P<ts>[A-Za-z]{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})
        \s+(?P<host>\S+)
        \s+(?P<service>[\w.\-/]+)(?:\[(?P<pid>\d+)\])?:
        \s*(?P<message>.*)$
        ",
    )
    .unwrap()
});

static ISO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^(?P<ts>\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?)
        \s*(?:(?P<level>[A-Za-z]+)\s+)?
        (?P<message>.*)$
        ",
    )
    .unwrap()
});

static SIMPLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[(?P<ts>[^\]]+)\]\s*(?P<level>\w+):\s*(?P<message>.*)$").unwrap());

static CONTINUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(at |\.\.\.\s*\d+\s*more|Caused by:|Suppressed:)").unwrap());

static EXCEPTION_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[\w.$]+\.)+(?:Exception|Error|Throwable)\w*(?::\s*.*)?$").unwrap());

fn looks_exceptional(message: &str) -> bool {
    message.contains("Exception") || message.contains("Error") || message.contains("Throwable")
}

/// Free-text, pattern-dispatched parsing with stack-trace continuation
/// buffering (spec.md §4.3.1). Tries each well-known log-line shape in
/// order; anything matching none of them becomes a basic INFO entry whose
/// message is the raw line.
pub struct TextParser;

impl TextParser {
    pub fn new() -> Self {
        TextParser
    }

    fn parse_fresh_line(&self, line: &str, line_number: u64, ctx: &mut ParseContext) -> ParseOutcome {
        if let Some(caps) = SPRING_BOOT.captures(line) {
            return self.finish(line, line_number, ctx, &caps["ts"], Some(&caps["level"]), &caps["message"], |e| {
                e.logger = Some(caps["logger"].to_string());
                e.source = e.logger.as_deref().and_then(|l| l.rsplit('.').next()).map(str::to_string);
                e.thread = Some(caps["thread"].to_string());
            });
        }
        if let Some(caps) = LOG4J.captures(line) {
            return self.finish(line, line_number, ctx, &caps["ts"], Some(&caps["level"]), &caps["message"], |e| {
                e.logger = Some(caps["logger"].to_string());
                e.source = e.logger.as_deref().and_then(|l| l.rsplit('.').next()).map(str::to_string);
                e.thread = caps.name("thread").map(|m| m.as_str().to_string());
            });
        }
        if let Some(caps) = APACHE_COMBINED.captures(line) {
            let status: u16 = caps["status"].parse().unwrap_or(200);
            let level = Level::from_http_status(status);
            let message = caps["request"].to_string();
            let entry_outcome = self.finish_with_level(line, line_number, ctx, &caps["ts"], level, &message, |e| {
                e.hostname = Some(caps["ip"].to_string());
                e.metadata.insert("http_status".to_string(), crate::model::MetaValue::Number(status as f64));
                if let Ok(bytes) = caps["bytes"].parse::<f64>() {
                    e.metadata.insert("bytes".to_string(), crate::model::MetaValue::Number(bytes));
                }
                if &caps["user"] != "-" {
                    e.metadata.insert("user".to_string(), crate::model::MetaValue::String(caps["user"].to_string()));
                }
                if let Some(referer) = caps.name("referer") {
                    e.metadata
                        .insert("referer".to_string(), crate::model::MetaValue::String(referer.as_str().to_string()));
                }
                if let Some(ua) = caps.name("ua") {
                    e.metadata
                        .insert("user_agent".to_string(), crate::model::MetaValue::String(ua.as_str().to_string()));
                }
            });
            return entry_outcome;
        }
        if let Some(caps) = SYSLOG.captures(line) {
            return self.finish(line, line_number, ctx, &caps["ts"], None, &caps["message"], |e| {
                e.hostname = Some(caps["host"].to_string());
                e.application = Some(caps["service"].to_string());
                if let Some(pid) = caps.name("pid") {
                    e.metadata
                        .insert("pid".to_string(), crate::model::MetaValue::String(pid.as_str().to_string()));
                }
            });
        }
        if let Some(caps) = ISO.captures(line) {
            return self.finish(
                line,
                line_number,
                ctx,
                &caps["ts"],
                caps.name("level").map(|m| m.as_str()),
                &caps["message"],
                |_| {},
            );
        }
        if let Some(caps) = SIMPLE.captures(line) {
            return self.finish(line, line_number, ctx, &caps["ts"], Some(&caps["level"]), &caps["message"], |_| {});
        }

        if EXCEPTION_HEADER.is_match(line.trim()) {
            let mut entry = LogEntry::new(
                ctx.job_id.clone(),
                line_number,
                ctx.file_name.clone(),
                Level::Error,
                line.trim().to_string(),
                line.to_string(),
                chrono::Utc::now(),
            );
            entry.has_error = true;
            ctx.buffered_entry = Some(entry);
            ctx.in_multi_line = true;
            return ParseOutcome::Buffered(line_number, line.to_string());
        }

        // Nothing matched: basic entry, per spec.md §4.3.1 fallback.
        let mut entry = LogEntry::new(
            ctx.job_id.clone(),
            line_number,
            ctx.file_name.clone(),
            Level::Info,
            line.to_string(),
            line.to_string(),
            chrono::Utc::now(),
        );
        for (k, v) in extract_common_metadata(line) {
            entry.metadata.insert(k, v);
        }
        ParseOutcome::success(entry)
    }

    fn finish(
        &self,
        line: &str,
        line_number: u64,
        ctx: &mut ParseContext,
        ts_raw: &str,
        level_raw: Option<&str>,
        message: &str,
        attach: impl FnOnce(&mut LogEntry),
    ) -> ParseOutcome {
        let level = Level::normalize(level_raw);
        self.finish_with_level(line, line_number, ctx, ts_raw, level, message, attach)
    }

    fn finish_with_level(
        &self,
        line: &str,
        line_number: u64,
        ctx: &mut ParseContext,
        ts_raw: &str,
        level: Level,
        message: &str,
        attach: impl FnOnce(&mut LogEntry),
    ) -> ParseOutcome {
        let timestamp = parse_timestamp(ts_raw, ctx.timestamp_format.as_deref());
        let mut entry = LogEntry::new(
            ctx.job_id.clone(),
            line_number,
            ctx.file_name.clone(),
            level,
            message.to_string(),
            line.to_string(),
            timestamp,
        );
        attach(&mut entry);
        for (k, v) in extract_common_metadata(line) {
            entry.metadata.entry(k).or_insert(v);
        }

        if level == Level::Error && looks_exceptional(message) {
            entry.has_error = true;
            ctx.buffered_entry = Some(entry);
            ctx.in_multi_line = true;
            return ParseOutcome::Buffered(line_number, line.to_string());
        }

        ParseOutcome::success(entry)
    }
}

impl Default for TextParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LogParser for TextParser {
    fn can_parse(&self, _file_name: &str, _sample: &str) -> bool {
        // Catch-all: always eligible, lowest priority wins the tie-break.
        true
    }

    fn parse_line(&self, line: &str, line_number: u64, ctx: &mut ParseContext) -> ParseOutcome {
        if line.trim().is_empty() {
            return if let Some(entry) = ctx.buffered_entry.take() {
                ctx.in_multi_line = false;
                ParseOutcome::success(entry)
            } else {
                ParseOutcome::Skipped(line_number, "blank line".to_string())
            };
        }

        if ctx.buffered_entry.is_some() {
            if CONTINUATION.is_match(line) {
                if let Some(entry) = ctx.buffered_entry.as_mut() {
                    entry.append_stack_trace(line.trim_end());
                }
                return ParseOutcome::Continuation(line_number, line.to_string());
            }
            let flushed = ctx.buffered_entry.take().expect("checked is_some above");
            ctx.in_multi_line = false;
            ctx.pending.push(ParseOutcome::success(flushed));
            return self.parse_fresh_line(line, line_number, ctx);
        }

        self.parse_fresh_line(line, line_number, ctx)
    }

    fn reset(&self) {}

    fn supported_format(&self) -> &'static str {
        "TEXT"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn supports_multi_line(&self) -> bool {
        true
    }

    fn flush_pending(&self, ctx: &mut ParseContext) -> Option<ParseOutcome> {
        ctx.buffered_entry.take().map(|e| {
            ctx.in_multi_line = false;
            ParseOutcome::success(e)
        })
    }

    fn description(&self) -> &'static str {
        "Free-text log lines with pattern-based field extraction and stack-trace buffering"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ParseContext {
        ParseContext::new("job-1", "app.log")
    }

    #[test]
    fn parses_spring_boot_line() {
        let parser = TextParser::new();
        let mut c = ctx();
        let outcome = parser.parse_line(
            "2024-01-15 10:30:45.123  INFO 12345 --- [main] com.example.Service : started up",
            1,
            &mut c,
        );
        let ParseOutcome::Success(entry) = outcome else { panic!("expected success") };
        assert_eq!(entry.level, Level::Info);
        assert_eq!(entry.logger.as_deref(), Some("com.example.Service"));
        assert_eq!(entry.source.as_deref(), Some("Service"));
        assert_eq!(entry.message, "started up");
    }

    #[test]
    fn parses_log4j_line() {
        let parser = TextParser::new();
        let mut c = ctx();
        let outcome = parser.parse_line(
            "2024-01-15 10:30:45,123 [pool-1-thread-3] WARN com.example.Worker - queue backing up",
            1,
            &mut c,
        );
        let ParseOutcome::Success(entry) = outcome else { panic!("expected success") };
        assert_eq!(entry.level, Level::Warn);
        assert_eq!(entry.thread.as_deref(), Some("pool-1-thread-3"));
    }

    #[test]
    fn parses_apache_combined_line_and_infers_level() {
        let parser = TextParser::new();
        let mut c = ctx();
        let outcome = parser.parse_line(
            r#"127.0.0.1 - - [29/Jan/2026:10:59:12 +0000] "GET /api/users HTTP/1.1" 503 512"#,
            1,
            &mut c,
        );
        let ParseOutcome::Success(entry) = outcome else { panic!("expected success") };
        assert_eq!(entry.level, Level::Error);
        assert_eq!(entry.hostname.as_deref(), Some("127.0.0.1"));
        assert_eq!(entry.message, "GET /api/users HTTP/1.1");
    }

    #[test]
    fn parses_syslog_line() {
        let parser = TextParser::new();
        let mut c = ctx();
        let outcome = parser.parse_line("Jan 15 10:30:45 webserver sshd[1234]: accepted password", 1, &mut c);
        let ParseOutcome::Success(entry) = outcome else { panic!("expected success") };
        assert_eq!(entry.hostname.as_deref(), Some("webserver"));
        assert_eq!(entry.application.as_deref(), Some("sshd"));
    }

    #[test]
    fn parses_simple_bracket_format() {
        let parser = TextParser::new();
        let mut c = ctx();
        let outcome = parser.parse_line("[2024-01-15 10:30:45] ERROR: disk failure", 1, &mut c);
        let ParseOutcome::Success(entry) = outcome else { panic!("expected success") };
        assert_eq!(entry.level, Level::Error);
        assert_eq!(entry.message, "disk failure");
    }

    #[test]
    fn unmatched_line_becomes_basic_info_entry() {
        let parser = TextParser::new();
        let mut c = ctx();
        let outcome = parser.parse_line("just some freeform text with no structure", 1, &mut c);
        let ParseOutcome::Success(entry) = outcome else { panic!("expected success") };
        assert_eq!(entry.level, Level::Info);
        assert_eq!(entry.message, "just some freeform text with no structure");
    }

    #[test]
    fn exception_buffers_and_continuation_lines_append_then_blank_flushes() {
        let parser = TextParser::new();
        let mut c = ctx();
        let outcome = parser.parse_line(
            "2024-01-15 10:30:45.123 ERROR 1 --- [main] com.example.Service : Request failed with NullPointerException",
            1,
            &mut c,
        );
        assert!(matches!(outcome, ParseOutcome::Buffered(..)));
        assert!(c.buffered_entry.is_some());

        let outcome = parser.parse_line("\tat com.example.Service.run(Service.java:42)", 2, &mut c);
        assert!(matches!(outcome, ParseOutcome::Continuation(..)));

        let outcome = parser.parse_line("\t... 6 more", 3, &mut c);
        assert!(matches!(outcome, ParseOutcome::Continuation(..)));

        let outcome = parser.parse_line("", 4, &mut c);
        let ParseOutcome::Success(entry) = outcome else { panic!("expected flushed success") };
        assert!(entry.has_stack_trace);
        assert!(entry.stack_trace.as_deref().unwrap().contains("Service.java:42"));
        assert!(c.buffered_entry.is_none());
    }

    #[test]
    fn non_continuation_line_flushes_buffer_via_pending_queue() {
        let parser = TextParser::new();
        let mut c = ctx();
        parser.parse_line(
            "2024-01-15 10:30:45.123 ERROR 1 --- [main] com.example.Service : boom Exception",
            1,
            &mut c,
        );
        assert!(c.buffered_entry.is_some());

        let outcome = parser.parse_line("2024-01-15 10:30:46.000  INFO 1 --- [main] com.example.Service : next event", 2, &mut c);
        assert_eq!(c.pending.len(), 1);
        assert!(matches!(c.pending[0], ParseOutcome::Success(_)));
        let ParseOutcome::Success(entry) = outcome else { panic!("expected success for the new line") };
        assert_eq!(entry.message, "next event");
    }

    #[test]
    fn bare_exception_header_with_no_log_prefix_starts_buffering() {
        let parser = TextParser::new();
        let mut c = ctx();
        let outcome = parser.parse_line("java.lang.NullPointerException: Cannot invoke method on null object", 1, &mut c);
        assert!(matches!(outcome, ParseOutcome::Buffered(..)));
    }

    #[test]
    fn flush_pending_emits_residual_buffer_at_eof() {
        let parser = TextParser::new();
        let mut c = ctx();
        parser.parse_line(
            "2024-01-15 10:30:45.123 ERROR 1 --- [main] com.example.Service : boom Exception",
            1,
            &mut c,
        );
        let flushed = parser.flush_pending(&mut c);
        assert!(matches!(flushed, Some(ParseOutcome::Success(_))));
        assert!(c.buffered_entry.is_none());
    }
}
