use serde::{Deserialize, Serialize};

/// Response body for `POST /logs/upload` (spec.md §6).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub job_id: String,
    pub status_url: String,
    pub result_url: String,
    pub file_name: String,
    pub file_size: u64,
}

/// One entry of a `GET /logs/job/{jobId}/fields/{field}` response.
#[derive(Debug, Clone, Serialize)]
pub struct FieldValueCount {
    pub value: String,
    pub count: u64,
}

impl From<(String, u64)> for FieldValueCount {
    fn from((value, count): (String, u64)) -> Self {
        Self { value, count }
    }
}

/// Flat query-param shape accepted by `GET /logs/search`, later folded
/// into a `logtrail_core::query::LogQueryRequest` (spec.md §6).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SearchQueryParams {
    pub job_id: String,
    pub search_text: Option<String>,
    pub levels: Option<String>,
    pub logger: Option<String>,
    pub thread: Option<String>,
    pub source: Option<String>,
    pub hostname: Option<String>,
    pub application: Option<String>,
    pub environment: Option<String>,
    pub file_name: Option<String>,
    pub has_error: Option<bool>,
    pub has_stack_trace: Option<bool>,
    pub tags: Option<String>,
    pub start_date: Option<chrono::DateTime<chrono::Utc>>,
    pub end_date: Option<chrono::DateTime<chrono::Utc>>,
    pub min_line_number: Option<u64>,
    pub max_line_number: Option<u64>,
    pub sort_by: Option<String>,
    pub sort_direction: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub include_summary: Option<bool>,
    pub highlight_matches: Option<bool>,
}

impl SearchQueryParams {
    /// Comma-separated query params (`levels`, `tags`) become `Vec<String>`
    /// fields on `LogQueryRequest`.
    pub fn into_request(self) -> logtrail_core::query::LogQueryRequest {
        let mut request = logtrail_core::query::LogQueryRequest::for_job(self.job_id.clone());
        request.search_text = self.search_text;
        request.levels = self.levels.map(|s| s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect());
        request.logger = self.logger;
        request.thread = self.thread;
        request.source = self.source;
        request.hostname = self.hostname;
        request.application = self.application;
        request.environment = self.environment;
        request.file_name = self.file_name;
        request.has_error = self.has_error;
        request.has_stack_trace = self.has_stack_trace;
        request.tags = self.tags.map(|s| s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect());
        request.start_date = self.start_date;
        request.end_date = self.end_date;
        request.min_line_number = self.min_line_number;
        request.max_line_number = self.max_line_number;
        request.sort_by = self.sort_by;
        request.sort_direction = self.sort_direction;
        if let Some(page) = self.page {
            request.page = Some(page);
        }
        if let Some(size) = self.size {
            request.size = Some(size);
        }
        request.include_summary = self.include_summary.unwrap_or(false);
        request.highlight_matches = self.highlight_matches.unwrap_or(false);
        request
    }
}

/// Query params for `GET /logs/job/{jobId}/timeline`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TimelineQueryParams {
    pub interval: Option<String>,
}

/// Query params for `GET /logs/job/{jobId}/fields/{field}`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UniqueValuesQueryParams {
    pub limit: Option<usize>,
}

/// Query params for `GET /logs/job/{jobId}/context/{lineNumber}`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContextQueryParams {
    pub before: Option<u64>,
    pub after: Option<u64>,
}

/// Query params for the export endpoints: the rendering options plus the
/// same optional filter fields `/logs/search` accepts, so an export can be
/// scoped to a filtered subset of a job's entries (spec.md §4.7).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExportQueryParams {
    pub format: Option<String>,
    pub max_records: Option<usize>,
    pub delimiter: Option<String>,
    pub include_header: Option<bool>,
    pub fields: Option<String>,

    #[serde(flatten)]
    pub filter: ExportFilterParams,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExportFilterParams {
    pub search_text: Option<String>,
    pub levels: Option<String>,
    pub logger: Option<String>,
    pub thread: Option<String>,
    pub has_error: Option<bool>,
    pub has_stack_trace: Option<bool>,
    pub start_date: Option<chrono::DateTime<chrono::Utc>>,
    pub end_date: Option<chrono::DateTime<chrono::Utc>>,
}

impl ExportQueryParams {
    pub fn into_request(self, job_id: &str) -> logtrail_core::query::LogQueryRequest {
        let mut request = logtrail_core::query::LogQueryRequest::for_job(job_id);
        request.search_text = self.filter.search_text;
        request.levels = self.filter.levels.map(|s| s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect());
        request.logger = self.filter.logger;
        request.thread = self.filter.thread;
        request.has_error = self.filter.has_error;
        request.has_stack_trace = self.filter.has_stack_trace;
        request.start_date = self.filter.start_date;
        request.end_date = self.filter.end_date;
        request
    }
}
