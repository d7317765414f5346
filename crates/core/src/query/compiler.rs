use crate::error::Result;
use crate::query::request::LogQueryRequest;
use crate::store::CompiledQuery;

const EXACT_MATCH_FIELDS: &[&str] = &["file_name", "logger", "thread", "source", "hostname", "application", "environment"];

/// Turns a validated `LogQueryRequest` into the store-facing `CompiledQuery`
/// (spec.md §4.6). Call `request.validate()` first — this function does not
/// re-validate.
pub fn compile(request: &LogQueryRequest) -> Result<CompiledQuery> {
    let mut query = CompiledQuery::for_job(&request.job_id);

    query.search_text = request.search_text.clone().filter(|s| !s.trim().is_empty());
    if let Some(fields) = &request.search_fields {
        if !fields.is_empty() {
            query.search_fields = fields.clone();
        }
    }

    if let Some(levels) = &request.levels {
        query.levels = levels.iter().map(|l| l.to_uppercase()).collect();
    }

    for (field, value) in [
        ("file_name", &request.file_name),
        ("logger", &request.logger),
        ("thread", &request.thread),
        ("source", &request.source),
        ("hostname", &request.hostname),
        ("application", &request.application),
        ("environment", &request.environment),
    ] {
        if let Some(value) = value {
            if value.contains('*') || value.contains('?') {
                query.wildcard_filters.push((field.to_string(), value.clone()));
            } else {
                query.term_filters.push((field.to_string(), value.clone()));
            }
        }
    }
    debug_assert!(query.term_filters.iter().all(|(f, _)| EXACT_MATCH_FIELDS.contains(&f.as_str())));

    query.has_error = request.has_error;
    query.has_stack_trace = request.has_stack_trace;
    query.tags = request.tags.clone().unwrap_or_default();
    query.start_date = request.start_date;
    query.end_date = request.end_date;
    query.min_line_number = request.min_line_number;
    query.max_line_number = request.max_line_number;
    query.sort_by = request.sort_field()?;
    query.sort_direction = request.sort_direction()?;
    query.page = request.page();
    query.size = request.size();

    Ok(query)
}

/// Same filters, `size=1`, used only to get the total count cheaply
/// (spec.md §4.6 "count").
pub fn compile_count(request: &LogQueryRequest) -> Result<CompiledQuery> {
    let mut query = compile(request)?;
    query.page = 0;
    query.size = 1;
    Ok(query)
}

/// Timeline and unique-values reuse the same filter set with no pagination
/// concerns of their own; the interval/field/limit are applied by the
/// caller against `crate::store::LogStore::timeline` /
/// `crate::store::LogStore::unique_values`.
pub fn compile_timeline(request: &LogQueryRequest) -> Result<CompiledQuery> {
    compile(request)
}

pub fn compile_unique_values(request: &LogQueryRequest) -> Result<CompiledQuery> {
    compile(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_values_route_to_wildcard_filters() {
        let mut req = LogQueryRequest::for_job("job-1");
        req.logger = Some("com.example.*".to_string());
        let compiled = compile(&req).unwrap();
        assert_eq!(compiled.wildcard_filters, vec![("logger".to_string(), "com.example.*".to_string())]);
        assert!(compiled.term_filters.is_empty());
    }

    #[test]
    fn exact_values_route_to_term_filters() {
        let mut req = LogQueryRequest::for_job("job-1");
        req.logger = Some("com.example.Service".to_string());
        let compiled = compile(&req).unwrap();
        assert_eq!(compiled.term_filters, vec![("logger".to_string(), "com.example.Service".to_string())]);
    }

    #[test]
    fn levels_are_uppercased() {
        let mut req = LogQueryRequest::for_job("job-1");
        req.levels = Some(vec!["error".to_string(), "Warn".to_string()]);
        let compiled = compile(&req).unwrap();
        assert_eq!(compiled.levels, vec!["ERROR".to_string(), "WARN".to_string()]);
    }

    #[test]
    fn blank_search_text_is_dropped() {
        let mut req = LogQueryRequest::for_job("job-1");
        req.search_text = Some("   ".to_string());
        let compiled = compile(&req).unwrap();
        assert!(compiled.search_text.is_none());
    }
}
