use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// §4.3.4 timestamp parsing: try the context's user-supplied pattern, then
/// ISO-8601, then epoch, then a fixed list of legacy patterns, finally
/// falling back to "now" — an entry's timestamp is never allowed to fail
/// the parse (spec.md §3 invariant (v)).
pub fn parse_timestamp(raw: &str, user_pattern: Option<&str>) -> DateTime<Utc> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Utc::now();
    }

    if let Some(pattern) = user_pattern {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, pattern) {
            return Utc.from_utc_datetime(&dt);
        }
    }

    if let Some(dt) = parse_iso8601(raw) {
        return dt;
    }

    if let Some(dt) = parse_epoch(raw) {
        return dt;
    }

    for pattern in LEGACY_PATTERNS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, pattern) {
            return Utc.from_utc_datetime(&dt);
        }
    }

    // A handful of legacy patterns carry no year (syslog, some Apache
    // banners); try them against the current year before giving up.
    for pattern in YEARLESS_PATTERNS {
        let with_year = format!("{} {}", Utc::now().format("%Y"), raw);
        let pattern_with_year = format!("%Y {}", pattern);
        if let Ok(dt) = NaiveDateTime::parse_from_str(&with_year, &pattern_with_year) {
            return Utc.from_utc_datetime(&dt);
        }
    }

    Utc::now()
}

/// Numeric timestamp from a caller that already has an `i64`/`f64` — e.g.
/// the JSON parser's numeric `timestamp` field (spec.md §4.3.2).
pub fn from_epoch_number(n: f64) -> DateTime<Utc> {
    let ts = n as i64;
    if ts.unsigned_abs() > 1_000_000_000_000 {
        DateTime::from_timestamp_millis(ts).unwrap_or_else(Utc::now)
    } else {
        DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
    }
}

fn parse_iso8601(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // Offsetless ISO local datetime, e.g. "2024-01-15T10:30:45.123"
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }
    None
}

fn parse_epoch(raw: &str) -> Option<DateTime<Utc>> {
    let ts: i64 = raw.parse().ok()?;
    if ts.unsigned_abs() > 1_000_000_000_000 {
        DateTime::from_timestamp_millis(ts)
    } else {
        DateTime::from_timestamp(ts, 0)
    }
}

const LEGACY_PATTERNS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S,%3f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%d/%b/%Y:%H:%M:%S",
    "%b %d, %Y %H:%M:%S",
    "%b %d %H:%M:%S",
];

/// Syslog-style "MMM  d HH:MM:SS" (note the double space before a
/// single-digit day) has no year; we interpolate the current year.
const YEARLESS_PATTERNS: &[&str] = &["%b %e %H:%M:%S"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso8601_with_offset() {
        let dt = parse_timestamp("2024-01-15T10:30:45.123Z", None);
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(), "2024-01-15 10:30:45.123");
    }

    #[test]
    fn parses_spring_boot_style() {
        let dt = parse_timestamp("2024-01-15 10:30:45.123", None);
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(), "2024-01-15 10:30:45.123");
    }

    #[test]
    fn parses_log4j_comma_millis() {
        let dt = parse_timestamp("2024-01-15 10:30:45,123", None);
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(), "2024-01-15 10:30:45.123");
    }

    #[test]
    fn parses_epoch_millis() {
        let dt = parse_timestamp("1705314645123", None);
        assert_eq!(dt.timestamp_millis(), 1705314645123);
    }

    #[test]
    fn parses_epoch_seconds() {
        let dt = parse_timestamp("1705314645", None);
        assert_eq!(dt.timestamp(), 1705314645);
    }

    #[test]
    fn falls_back_to_now_on_garbage() {
        let before = Utc::now();
        let dt = parse_timestamp("not a timestamp", None);
        assert!(dt >= before);
    }

    #[test]
    fn respects_user_supplied_pattern() {
        let dt = parse_timestamp("15-01-2024 10:30:45", Some("%d-%m-%Y %H:%M:%S"));
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-01-15 10:30:45");
    }

    #[test]
    fn parses_apache_style() {
        let dt = parse_timestamp("29/Jan/2026:10:59:12", None);
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2026-01-29 10:59:12");
    }
}
