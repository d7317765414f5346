use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::parser::csv::CsvParser;
use crate::parser::json::JsonParser;
use crate::parser::text::TextParser;
use crate::parser::traits::LogParser;

/// Lines sampled from the head of a file to feed `LogParser::can_parse`
/// (spec.md §4.2: "at most 10 lines or 4096 characters, whichever comes
/// first").
pub const SAMPLE_MAX_LINES: usize = 10;
pub const SAMPLE_MAX_CHARS: usize = 4096;

pub fn build_sample(lines: impl IntoIterator<Item = impl AsRef<str>>) -> String {
    let mut sample = String::new();
    for (i, line) in lines.into_iter().enumerate() {
        if i >= SAMPLE_MAX_LINES || sample.len() >= SAMPLE_MAX_CHARS {
            break;
        }
        sample.push_str(line.as_ref());
        sample.push('\n');
    }
    sample.truncate(SAMPLE_MAX_CHARS);
    sample
}

/// Priority-ordered registry of format parsers (spec.md §4.2 C2). Extension
/// hints are tried first; content sampling breaks ties or covers
/// extension-less files. Falls back to the text parser, which always
/// accepts, so selection only fails if the registry itself is empty.
pub struct ParserRegistry {
    parsers: RwLock<Vec<Box<dyn LogParser>>>,
}

impl ParserRegistry {
    /// Registry pre-loaded with the three built-in formats at their
    /// canonical priorities: JSON (20) > CSV (10) > TEXT (0, catch-all).
    pub fn with_defaults() -> Self {
        let registry = Self {
            parsers: RwLock::new(Vec::new()),
        };
        registry.register(Box::new(JsonParser::new()));
        registry.register(Box::new(CsvParser::new()));
        registry.register(Box::new(TextParser::new()));
        registry
    }

    pub fn register(&self, parser: Box<dyn LogParser>) {
        let mut parsers = self.parsers.write().expect("registry lock poisoned");
        parsers.push(parser);
        parsers.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    pub fn unregister(&self, format: &str) {
        let mut parsers = self.parsers.write().expect("registry lock poisoned");
        parsers.retain(|p| !p.supported_format().eq_ignore_ascii_case(format));
    }

    /// Picks the best parser for a file: extension hint by known
    /// extensions, then the first parser (in priority order) whose
    /// `can_parse` accepts the sample.
    pub fn select(&self, file_name: &str, sample: &str) -> Result<Box<dyn LogParser + 'static>> {
        let parsers = self.parsers.read().expect("registry lock poisoned");
        if let Some(format) = extension_hint(file_name) {
            if let Some(p) = parsers.iter().find(|p| p.supported_format().eq_ignore_ascii_case(format)) {
                if p.can_parse(file_name, sample) {
                    return Ok(clone_handle(p.as_ref(), p.supported_format()));
                }
            }
        }
        for p in parsers.iter() {
            if p.can_parse(file_name, sample) {
                return Ok(clone_handle(p.as_ref(), p.supported_format()));
            }
        }
        Err(Error::NoParser(file_name.to_string()))
    }

    pub fn get_by_format(&self, format: &str) -> Option<Box<dyn LogParser + 'static>> {
        let parsers = self.parsers.read().expect("registry lock poisoned");
        parsers
            .iter()
            .find(|p| p.supported_format().eq_ignore_ascii_case(format))
            .map(|p| clone_handle(p.as_ref(), p.supported_format()))
    }

    pub fn list_formats(&self) -> Vec<ParserInfo> {
        let parsers = self.parsers.read().expect("registry lock poisoned");
        parsers
            .iter()
            .map(|p| ParserInfo {
                format: p.supported_format().to_string(),
                description: p.description().to_string(),
                priority: p.priority(),
                supports_multi_line: p.supports_multi_line(),
            })
            .collect()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[derive(Debug, Clone)]
pub struct ParserInfo {
    pub format: String,
    pub description: String,
    pub priority: i32,
    pub supports_multi_line: bool,
}

fn extension_hint(file_name: &str) -> Option<&'static str> {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".json") || lower.ends_with(".ndjson") {
        Some("JSON")
    } else if lower.ends_with(".csv") || lower.ends_with(".tsv") {
        Some("CSV")
    } else if lower.ends_with(".log") || lower.ends_with(".txt") || lower.ends_with(".out") || lower.ends_with(".err") {
        Some("TEXT")
    } else {
        None
    }
}

/// Parsers are stateless (`&self` methods only, no per-instance data), so a
/// fresh instance of the same concrete type is functionally identical to
/// the stored one. Selection hands callers their own owned handle rather
/// than a borrow tied to the registry's read lock.
fn clone_handle(parser: &dyn LogParser, format: &str) -> Box<dyn LogParser + 'static> {
    match format.to_uppercase().as_str() {
        "JSON" => Box::new(JsonParser::new()),
        "CSV" => Box::new(CsvParser::new()),
        _ => {
            let _ = parser;
            Box::new(TextParser::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_json_by_extension() {
        let registry = ParserRegistry::with_defaults();
        let parser = registry.select("app.json", r#"{"level":"INFO"}"#).unwrap();
        assert_eq!(parser.supported_format(), "JSON");
    }

    #[test]
    fn selects_csv_by_content_when_no_known_extension() {
        let registry = ParserRegistry::with_defaults();
        let sample = build_sample(["timestamp,level,message", "2024-01-01T00:00:00Z,INFO,hi"]);
        let parser = registry.select("weird-name", &sample).unwrap();
        assert_eq!(parser.supported_format(), "CSV");
    }

    #[test]
    fn falls_back_to_text_for_plain_lines() {
        let registry = ParserRegistry::with_defaults();
        let parser = registry.select("app.log", "2024-01-01 00:00:00 INFO plain text").unwrap();
        assert_eq!(parser.supported_format(), "TEXT");
    }

    #[test]
    fn unregistering_leaves_text_as_only_fallback() {
        let registry = ParserRegistry::with_defaults();
        registry.unregister("JSON");
        registry.unregister("CSV");
        assert_eq!(registry.list_formats().len(), 1);
    }

    #[test]
    fn sample_caps_at_ten_lines() {
        let lines: Vec<String> = (0..50).map(|i| format!("line {i}")).collect();
        let sample = build_sample(lines);
        assert_eq!(sample.lines().count(), SAMPLE_MAX_LINES);
    }
}
