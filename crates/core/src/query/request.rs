use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::{is_keyword_field, SortDirection, SortField};

pub const MAX_PAGE_SIZE: u32 = 1000;
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// The wire request shape for `/logs/search` and friends (spec.md §4.6).
/// Field names mirror the external JSON contract; see `query::compiler`
/// for how this is turned into a `CompiledQuery`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQueryRequest {
    pub job_id: String,
    #[serde(default)]
    pub search_text: Option<String>,
    #[serde(default)]
    pub search_fields: Option<Vec<String>>,
    #[serde(default)]
    pub levels: Option<Vec<String>>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub logger: Option<String>,
    #[serde(default)]
    pub thread: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub application: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub has_error: Option<bool>,
    #[serde(default)]
    pub has_stack_trace: Option<bool>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub min_line_number: Option<u64>,
    #[serde(default)]
    pub max_line_number: Option<u64>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_direction: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub include_fields: Option<Vec<String>>,
    #[serde(default)]
    pub exclude_fields: Option<Vec<String>>,
    #[serde(default)]
    pub include_summary: bool,
    #[serde(default)]
    pub highlight_matches: bool,
}

impl LogQueryRequest {
    pub fn for_job(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            ..Default::default()
        }
    }

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(0)
    }

    pub fn size(&self) -> u32 {
        self.size.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn sort_field(&self) -> Result<SortField> {
        match &self.sort_by {
            None => Ok(SortField::Timestamp),
            Some(raw) => SortField::parse(raw).ok_or_else(|| Error::InvalidQuery(format!("invalid sortBy: {raw}"))),
        }
    }

    pub fn sort_direction(&self) -> Result<SortDirection> {
        match &self.sort_direction {
            None => Ok(SortDirection::Desc),
            Some(raw) => SortDirection::parse(raw).ok_or_else(|| Error::InvalidQuery(format!("invalid sortDirection: {raw}"))),
        }
    }

    /// §4.6 validation table: blank jobId; startDate>endDate;
    /// minLineNumber>maxLineNumber; sortBy not in the allowed set; page
    /// size outside [1, 1000].
    pub fn validate(&self) -> Result<()> {
        if self.job_id.trim().is_empty() {
            return Err(Error::InvalidQuery("jobId must not be blank".to_string()));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(Error::InvalidQuery("startDate must not be after endDate".to_string()));
            }
        }
        if let (Some(min), Some(max)) = (self.min_line_number, self.max_line_number) {
            if min > max {
                return Err(Error::InvalidQuery("minLineNumber must not exceed maxLineNumber".to_string()));
            }
        }
        self.sort_field()?;
        self.sort_direction()?;
        let size = self.size();
        if size < 1 || size > MAX_PAGE_SIZE {
            return Err(Error::InvalidQuery(format!("size must be between 1 and {MAX_PAGE_SIZE}")));
        }
        if matches!(self.page, Some(p) if (p as i64) < 0) {
            return Err(Error::InvalidQuery("page must not be negative".to_string()));
        }
        Ok(())
    }

    /// Validation specific to the unique-values endpoint: the requested
    /// field must be a keyword field (spec.md §4.6 scenario 6).
    pub fn validate_unique_values_field(field: &str) -> Result<()> {
        if is_keyword_field(field) {
            Ok(())
        } else {
            Err(Error::UnsupportedField(field.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_job_id() {
        let req = LogQueryRequest::for_job("");
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_inverted_date_range() {
        let mut req = LogQueryRequest::for_job("job-1");
        req.start_date = Some(Utc::now());
        req.end_date = Some(req.start_date.unwrap() - chrono::Duration::hours(1));
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_inverted_line_range() {
        let mut req = LogQueryRequest::for_job("job-1");
        req.min_line_number = Some(10);
        req.max_line_number = Some(5);
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_unknown_sort_field() {
        let mut req = LogQueryRequest::for_job("job-1");
        req.sort_by = Some("nonsense".to_string());
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_oversized_page_size() {
        let mut req = LogQueryRequest::for_job("job-1");
        req.size = Some(1001);
        assert!(req.validate().is_err());
        req.size = Some(1000);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn unique_values_field_must_be_keyword() {
        assert!(LogQueryRequest::validate_unique_values_field("logger").is_ok());
        assert!(LogQueryRequest::validate_unique_values_field("message").is_err());
    }
}
