use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

/// HTTP-facing error taxonomy (spec.md §7). Wraps `logtrail_core::Error`
/// and adds the validation/transport failures that only make sense at the
/// HTTP boundary. `IntoResponse` maps each variant to `{code, message}`
/// at the status in spec.md §7's table, sanitizing internal detail the
/// same way the teacher's `ApiError::extend` does for GraphQL.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("missing required multipart field: {0}")]
    MissingField(String),

    #[error("malformed multipart request: {0}")]
    Multipart(String),

    #[error("uploaded file exceeds the configured size limit")]
    PayloadTooLarge,

    #[error(transparent)]
    Core(#[from] logtrail_core::Error),
}

impl ApiError {
    fn code_and_status(&self) -> (&'static str, StatusCode) {
        match self {
            ApiError::Validation(_) => ("VALIDATION_ERROR", StatusCode::BAD_REQUEST),
            ApiError::MissingField(_) => ("MISSING_FIELD", StatusCode::BAD_REQUEST),
            ApiError::Multipart(_) => ("MALFORMED_REQUEST", StatusCode::BAD_REQUEST),
            ApiError::PayloadTooLarge => ("FILE_TOO_LARGE", StatusCode::PAYLOAD_TOO_LARGE),
            ApiError::Core(logtrail_core::Error::JobNotFound(_)) => ("JOB_NOT_FOUND", StatusCode::NOT_FOUND),
            ApiError::Core(logtrail_core::Error::InvalidQuery(_)) => ("INVALID_QUERY", StatusCode::BAD_REQUEST),
            ApiError::Core(logtrail_core::Error::UnsupportedField(_)) => ("UNSUPPORTED_FIELD", StatusCode::BAD_REQUEST),
            // spec.md §6: GET /result/{jobId} on a not-yet-completed job is
            // documented as a 500, not a 409 — keep the stable code string
            // even though the status looks unusual for a client error.
            ApiError::Core(logtrail_core::Error::JobNotCompleted(_)) => ("JOB_NOT_COMPLETED", StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Core(logtrail_core::Error::NoParser(_)) => ("NO_PARSER_AVAILABLE", StatusCode::UNPROCESSABLE_ENTITY),
            ApiError::Core(logtrail_core::Error::FileTooLarge { .. }) => ("FILE_TOO_LARGE", StatusCode::PAYLOAD_TOO_LARGE),
            ApiError::Core(logtrail_core::Error::ExportTooLarge { .. }) => ("EXPORT_TOO_LARGE", StatusCode::BAD_REQUEST),
            ApiError::Core(logtrail_core::Error::InvalidExportFormat(_)) => ("INVALID_EXPORT_FORMAT", StatusCode::BAD_REQUEST),
            ApiError::Core(logtrail_core::Error::Io(_)) => ("INTERNAL_ERROR", StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Core(logtrail_core::Error::Store(_)) => ("STORE_ERROR", StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Core(logtrail_core::Error::Internal(_)) => ("INTERNAL_ERROR", StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, status) = self.code_and_status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal error");
            "an internal error occurred".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "code": code, "message": message }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_are_sanitized() {
        let err = ApiError::Core(logtrail_core::Error::Internal("db password leaked here".to_string()));
        let (code, status) = err.code_and_status();
        assert_eq!(code, "INTERNAL_ERROR");
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn job_not_found_maps_to_404() {
        let err = ApiError::Core(logtrail_core::Error::JobNotFound("job-1".to_string()));
        let (code, status) = err.code_and_status();
        assert_eq!(code, "JOB_NOT_FOUND");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn job_not_completed_maps_to_500() {
        let err = ApiError::Core(logtrail_core::Error::JobNotCompleted("job-1".to_string()));
        let (code, status) = err.code_and_status();
        assert_eq!(code, "JOB_NOT_COMPLETED");
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
