use std::collections::HashMap;
use std::time::Instant;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;

use logtrail_core::export::{self, CsvOptions, ExportFormat};
use logtrail_core::query::{compile, execute, job_summary, LogQueryRequest};
use logtrail_core::store::TimelineInterval;
use logtrail_core::Error as CoreError;

use crate::dto::{
    ContextQueryParams, ExportQueryParams, FieldValueCount, SearchQueryParams, TimelineQueryParams,
    UniqueValuesQueryParams, UploadResponse,
};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Assembles every route named in spec.md §6 onto a shared `AppState`
/// (mirrors the teacher's `build_router` route table, minus the
/// GraphQL/WebSocket surface this crate doesn't carry).
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/logs/upload", post(upload_handler))
        .route("/logs/status/{job_id}", get(status_handler))
        .route("/logs/result/{job_id}", get(result_handler))
        .route("/logs/search", post(search_post_handler).get(search_get_handler))
        .route("/logs/job/{job_id}/summary", get(summary_handler))
        .route("/logs/job/{job_id}/levels", get(levels_handler))
        .route("/logs/job/{job_id}/timeline", get(timeline_handler))
        .route("/logs/job/{job_id}/fields", get(fields_handler))
        .route("/logs/job/{job_id}/fields/{field}", get(field_values_handler))
        .route("/logs/job/{job_id}/context/{line_number}", get(context_handler))
        .route("/logs/job/{job_id}/export", get(export_handler).post(export_handler))
}

/// `POST /logs/upload` — multipart upload (spec.md §6). The `logfile` part
/// is streamed to `state.upload_dir` under a generated name; `timestampFormat`
/// is an optional text part threaded through to the parser.
async fn upload_handler(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Response> {
    let mut file_name: Option<String> = None;
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut timestamp_format: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::Multipart(e.to_string()))? {
        match field.name().unwrap_or_default() {
            "logfile" => {
                file_name = Some(field.file_name().unwrap_or("upload.log").to_string());
                let bytes = field.bytes().await.map_err(|e| ApiError::Multipart(e.to_string()))?;
                if bytes.len() as u64 > state.config.file.max_size_bytes {
                    return Err(ApiError::PayloadTooLarge);
                }
                file_bytes = Some(bytes.to_vec());
            }
            "timestampFormat" => {
                let text = field.text().await.map_err(|e| ApiError::Multipart(e.to_string()))?;
                if !text.trim().is_empty() {
                    timestamp_format = Some(text);
                }
            }
            _ => {}
        }
    }

    let file_name = file_name.ok_or_else(|| ApiError::MissingField("logfile".to_string()))?;
    let bytes = file_bytes.ok_or_else(|| ApiError::MissingField("logfile".to_string()))?;
    let file_size = bytes.len() as u64;

    let stored_name = format!("{}-{}", uuid::Uuid::new_v4(), file_name);
    let stored_path = state.upload_dir.join(stored_name);
    tokio::fs::write(&stored_path, &bytes).await.map_err(CoreError::Io)?;

    let job_id = state
        .jobs
        .submit_job(stored_path, file_name.clone(), file_size, timestamp_format)
        .await?;

    let body = UploadResponse {
        status_url: format!("/logs/status/{job_id}"),
        result_url: format!("/logs/result/{job_id}"),
        job_id,
        file_name,
        file_size,
    };
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

async fn status_handler(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Json<logtrail_core::model::JobStatus>> {
    Ok(Json(state.jobs.get_status(&job_id)?))
}

async fn result_handler(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Json<logtrail_core::model::JobStatus>> {
    Ok(Json(state.jobs.get_result(&job_id)?))
}

async fn search_post_handler(State(state): State<AppState>, Json(request): Json<LogQueryRequest>) -> ApiResult<Response> {
    run_search(&state, request).await
}

async fn search_get_handler(State(state): State<AppState>, Query(params): Query<SearchQueryParams>) -> ApiResult<Response> {
    run_search(&state, params.into_request()).await
}

async fn run_search(state: &AppState, request: LogQueryRequest) -> ApiResult<Response> {
    request.validate().map_err(ApiError::Core)?;
    let query = compile(&request).map_err(ApiError::Core)?;
    let started = Instant::now();
    let response = execute(state.store.as_ref(), &query, request.include_summary, request.highlight_matches)?;
    state.metrics.query_executed(started.elapsed().as_millis() as u64);
    Ok(Json(response).into_response())
}

async fn summary_handler(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Response> {
    let status = state.jobs.get_status(&job_id)?;
    let summary = job_summary(state.store.as_ref(), &status)?;
    Ok(Json(summary).into_response())
}

async fn levels_handler(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Response> {
    state.jobs.get_status(&job_id)?;
    let counts = state.store.level_counts(&job_id)?;
    Ok(Json(counts).into_response())
}

async fn timeline_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(params): Query<TimelineQueryParams>,
) -> ApiResult<Response> {
    state.jobs.get_status(&job_id)?;
    let raw_interval = params.interval.unwrap_or_else(|| "1h".to_string());
    let interval = TimelineInterval::parse(&raw_interval).ok_or_else(|| ApiError::Validation(format!("invalid interval: {raw_interval}")))?;
    let query = logtrail_core::store::CompiledQuery::for_job(job_id);
    let buckets = state.store.timeline(&query, interval)?;
    Ok(Json(buckets).into_response())
}

/// Number of sample values returned per field by `fields_handler` — enough
/// to give a caller a feel for the field's range without turning this into
/// a full unique-values dump (that's what `field_values_handler` is for).
const FIELD_SAMPLE_LIMIT: usize = 10;

/// `GET /logs/job/{jobId}/fields` — map of common fields to observed sample
/// values for this job (spec.md §6), not just the static field name list.
async fn fields_handler(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Response> {
    state.jobs.get_status(&job_id)?;
    let query = logtrail_core::store::CompiledQuery::for_job(job_id);
    let mut fields: HashMap<&'static str, Vec<String>> = HashMap::new();
    for field in logtrail_core::store::KEYWORD_FIELDS {
        let values = state.store.unique_values(&query, field, FIELD_SAMPLE_LIMIT)?;
        fields.insert(field, values.into_iter().map(|(value, _)| value).collect());
    }
    Ok(Json(fields).into_response())
}

async fn field_values_handler(
    State(state): State<AppState>,
    Path((job_id, field)): Path<(String, String)>,
    Query(params): Query<UniqueValuesQueryParams>,
) -> ApiResult<Response> {
    state.jobs.get_status(&job_id)?;
    LogQueryRequest::validate_unique_values_field(&field).map_err(ApiError::Core)?;
    let query = logtrail_core::store::CompiledQuery::for_job(job_id);
    let limit = params.limit.unwrap_or(50);
    let values = state.store.unique_values(&query, &field, limit)?;
    let values: Vec<FieldValueCount> = values.into_iter().map(FieldValueCount::from).collect();
    Ok(Json(values).into_response())
}

async fn context_handler(
    State(state): State<AppState>,
    Path((job_id, line_number)): Path<(String, u64)>,
    Query(params): Query<ContextQueryParams>,
) -> ApiResult<Response> {
    state.jobs.get_status(&job_id)?;
    let before = params.before.unwrap_or(10);
    let after = params.after.unwrap_or(10);
    let entries = state.store.context(&job_id, line_number, before, after)?;
    Ok(Json(entries).into_response())
}

async fn export_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(params): Query<ExportQueryParams>,
) -> ApiResult<Response> {
    let format = match &params.format {
        Some(raw) => ExportFormat::parse(raw).map_err(ApiError::Core)?,
        None => ExportFormat::Csv,
    };
    let max_records = params.max_records.unwrap_or(state.config.export.default_max_records);

    let request = params.clone().into_request(&job_id);
    let entries = export::fetch_for_export(state.store.as_ref(), &request, max_records, state.config.export.max_records_ceiling)?;

    let mut csv_options = CsvOptions::default();
    if let Some(delimiter) = &params.delimiter {
        if let Some(byte) = delimiter.bytes().next() {
            csv_options.delimiter = byte;
        }
    }
    if let Some(include_header) = params.include_header {
        csv_options.include_header = include_header;
    }
    if let Some(fields) = &params.fields {
        csv_options.fields = fields.split(',').map(|f| f.trim().to_string()).filter(|f| !f.is_empty()).collect();
    }

    let bytes = export::render(&entries, format, &csv_options)?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, format.content_type())],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_builds_without_panicking() {
        let _ = router();
    }
}
