use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifecycle state. Transitions are strictly monotone — see
/// [`JobStatus::transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    /// §4.5: QUEUED → PROCESSING → {COMPLETED, FAILED}. A terminal state
    /// never transitions again.
    fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::Processing)
                | (JobState::Processing, JobState::Completed)
                | (JobState::Processing, JobState::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Process-wide observable state per upload (spec.md §3 `JobStatus`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    pub state: JobState,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,

    pub total_lines: u64,
    pub processed_lines: u64,
    pub successful_lines: u64,
    pub failed_lines: u64,

    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_ms: Option<u64>,
    pub lines_per_second: Option<f64>,

    pub file_name: String,
    pub file_size: u64,
    pub timestamp_format: Option<String>,
}

impl JobStatus {
    pub fn queued(job_id: String, file_name: String, file_size: u64, timestamp_format: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            state: JobState::Queued,
            progress: 0,
            message: "queued".to_string(),
            error: None,
            total_lines: 0,
            processed_lines: 0,
            successful_lines: 0,
            failed_lines: 0,
            started_at: now,
            updated_at: now,
            completed_at: None,
            processing_time_ms: None,
            lines_per_second: None,
            file_name,
            file_size,
            timestamp_format,
        }
    }

    /// Enforces the monotone state machine from spec.md §4.5. Callers that
    /// attempt an illegal transition (e.g. COMPLETED → PROCESSING) get an
    /// `Error::Internal` rather than silently corrupting job state.
    pub fn transition_to(&mut self, next: JobState) -> Result<()> {
        if self.state == next {
            return Ok(());
        }
        if !self.state.can_transition_to(next) {
            return Err(Error::Internal(format!(
                "illegal job transition {:?} -> {:?} for job {}",
                self.state, next, self.job_id
            )));
        }
        self.state = next;
        self.updated_at = Utc::now();
        if next.is_terminal() {
            self.completed_at = Some(self.updated_at);
            let elapsed = (self.updated_at - self.started_at).num_milliseconds().max(0) as u64;
            self.processing_time_ms = Some(elapsed);
            self.lines_per_second = if elapsed > 0 {
                Some(self.processed_lines as f64 / (elapsed as f64 / 1000.0))
            } else {
                Some(self.processed_lines as f64)
            };
        }
        Ok(())
    }

    /// §4.5 progress formula: `5 + floor((current * 90) / total)` until
    /// 95%, reserving the last 5% for statistics + finalization.
    pub fn set_ingest_progress(&mut self, current: u64, total: u64) {
        let pct = if total == 0 {
            95
        } else {
            let raw = 5 + (current.saturating_mul(90) / total.max(1));
            raw.min(95) as u8
        };
        self.progress = pct;
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        let msg = error.into();
        self.error = Some(msg.clone());
        self.message = msg;
        // A job may fail before entering PROCESSING (e.g. parser selection
        // error) — allow QUEUED -> FAILED directly by bypassing the normal
        // state-machine check here; this is the only place that happens.
        self.state = JobState::Failed;
        self.updated_at = Utc::now();
        self.completed_at = Some(self.updated_at);
        let elapsed = (self.updated_at - self.started_at).num_milliseconds().max(0) as u64;
        self.processing_time_ms = Some(elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_state_machine() {
        let mut status = JobStatus::queued("job-1".into(), "a.log".into(), 10, None);
        assert_eq!(status.state, JobState::Queued);
        status.transition_to(JobState::Processing).unwrap();
        status.transition_to(JobState::Completed).unwrap();
        assert_eq!(status.state, JobState::Completed);
        assert!(status.completed_at.is_some());
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut status = JobStatus::queued("job-1".into(), "a.log".into(), 10, None);
        status.transition_to(JobState::Processing).unwrap();
        status.transition_to(JobState::Completed).unwrap();
        // COMPLETED is terminal; another transition must fail.
        assert!(status.transition_to(JobState::Processing).is_err());
    }

    #[test]
    fn progress_formula_reserves_last_five_percent() {
        let mut status = JobStatus::queued("job-1".into(), "a.log".into(), 10, None);
        status.set_ingest_progress(0, 100);
        assert_eq!(status.progress, 5);
        status.set_ingest_progress(100, 100);
        assert_eq!(status.progress, 95);
        status.set_ingest_progress(50, 100);
        assert_eq!(status.progress, 50);
    }

    #[test]
    fn progress_with_zero_total_lines() {
        let mut status = JobStatus::queued("job-1".into(), "empty.log".into(), 0, None);
        status.set_ingest_progress(0, 0);
        assert_eq!(status.progress, 95);
    }
}
