use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::MetaValue;

static KV_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?P<key>[A-Za-z_][A-Za-z0-9_.-]*)=(?:"(?P<qval>[^"]*)"|(?P<val>[^\s,;]+))"#).unwrap()
});
static IPV4: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:(?:25[0-5]|2[0-4]\d|[01]?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|[01]?\d?\d)\b").unwrap());
static IPV6: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:[A-Fa-f0-9]{1,4}:){2,7}[A-Fa-f0-9]{1,4}\b").unwrap());
static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"https?://[^\s"']+"#).unwrap());
static CORRELATION_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\b(request|correlation|trace|x-request)-id[=: ]+"?([A-Za-z0-9_-]+)"?"#).unwrap());

/// §4.3.1 "metadata extraction always attempts": key=value pairs
/// (quoted or bare), IPv4/IPv6 literals, http(s) URLs, and the family of
/// `*-id` correlation fields. Returns a flat map; callers merge it into
/// `LogEntry::metadata`.
pub fn extract_common_metadata(line: &str) -> Vec<(String, MetaValue)> {
    let mut out = Vec::new();

    for caps in KV_PAIR.captures_iter(line) {
        let key = caps.name("key").unwrap().as_str().to_string();
        let value = caps
            .name("qval")
            .or_else(|| caps.name("val"))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        out.push((key, coerce_scalar(&value)));
    }

    if let Some(m) = IPV4.find(line) {
        out.push(("client_ip".to_string(), MetaValue::String(m.as_str().to_string())));
    } else if let Some(m) = IPV6.find(line) {
        out.push(("client_ip".to_string(), MetaValue::String(m.as_str().to_string())));
    }

    if let Some(m) = URL.find(line) {
        out.push(("url".to_string(), MetaValue::String(m.as_str().to_string())));
    }

    if let Some(caps) = CORRELATION_ID.captures(line) {
        let field = format!("{}-id", caps.get(1).unwrap().as_str().to_lowercase());
        out.push((field, MetaValue::String(caps.get(2).unwrap().as_str().to_string())));
    }

    out
}

/// Boolean → int → long → double → string coercion order from spec.md
/// §4.3.3, reused by both the CSV parser (cell values) and the generic
/// key=value extraction above.
pub fn coerce_scalar(raw: &str) -> MetaValue {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        return MetaValue::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return MetaValue::Bool(false);
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return MetaValue::Number(n as f64);
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        return MetaValue::Number(n);
    }
    MetaValue::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bare_and_quoted_kv_pairs() {
        let meta = extract_common_metadata(r#"user=alice action="login failed""#);
        let find = |k: &str| meta.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_display());
        assert_eq!(find("user"), Some("alice".to_string()));
        assert_eq!(find("action"), Some("login failed".to_string()));
    }

    #[test]
    fn extracts_ipv4() {
        let meta = extract_common_metadata("connection from 10.0.0.5 refused");
        assert!(meta.iter().any(|(k, v)| k == "client_ip" && v.as_display() == "10.0.0.5"));
    }

    #[test]
    fn extracts_url() {
        let meta = extract_common_metadata("fetching https://example.com/api/v1/users?id=1");
        assert!(meta
            .iter()
            .any(|(k, v)| k == "url" && v.as_display().starts_with("https://example.com")));
    }

    #[test]
    fn extracts_correlation_id_variants() {
        let meta = extract_common_metadata("handling request-id=abc-123 for client");
        assert!(meta.iter().any(|(k, v)| k == "request-id" && v.as_display() == "abc-123"));

        let meta = extract_common_metadata("trace-id: xyz987 propagated");
        assert!(meta.iter().any(|(k, v)| k == "trace-id" && v.as_display() == "xyz987"));
    }

    #[test]
    fn coerces_scalar_types_in_order() {
        assert_eq!(coerce_scalar("true"), MetaValue::Bool(true));
        assert_eq!(coerce_scalar("42"), MetaValue::Number(42.0));
        assert_eq!(coerce_scalar("3.14"), MetaValue::Number(3.14));
        assert_eq!(coerce_scalar("hello"), MetaValue::String("hello".to_string()));
    }
}
