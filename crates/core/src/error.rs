use thiserror::Error;

/// Flat error taxonomy for the ingestion + query pipeline.
///
/// Mirrors the "hierarchical exceptions collapse to a tag + message" design
/// note: the HTTP layer maps each variant to a status code instead of doing
/// type-based dispatch.
#[derive(Debug, Error)]
pub enum Error {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("unsupported field for unique-values: {0}")]
    UnsupportedField(String),

    #[error("job {0} has not completed yet")]
    JobNotCompleted(String),

    #[error("no parser available for file: {0}")]
    NoParser(String),

    #[error("file too large: {size} bytes (max {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("export would exceed max records: requested {requested}, ceiling {ceiling}")]
    ExportTooLarge { requested: usize, ceiling: usize },

    #[error("invalid export format: {0}")]
    InvalidExportFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
