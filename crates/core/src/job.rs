use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::batch::{BatchWriter, DEFAULT_BATCH_SIZE};
use crate::error::{Error, Result};
use crate::model::{JobState, JobStatus, ParseContext, ParseOutcome};
use crate::parser::{build_sample, LogParser, ParserRegistry, SAMPLE_MAX_LINES};
use crate::reader::StreamReader;
use crate::store::LogStore;

/// C5 Job Controller config. The teacher's elastic core/max thread pool
/// collapses here to a fixed number of permanently-spawned consumer tasks —
/// tokio has no notion of an elastic worker count, so `max_pool_size` is
/// kept only as a config knob for the bounded submission queue's capacity.
#[derive(Debug, Clone, Copy)]
pub struct JobControllerConfig {
    pub core_pool_size: usize,
    pub max_pool_size: usize,
    pub queue_capacity: usize,
    pub batch_size: usize,
}

impl Default for JobControllerConfig {
    fn default() -> Self {
        Self {
            core_pool_size: 4,
            max_pool_size: 10,
            queue_capacity: 100,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

struct JobTask {
    job_id: String,
    file_path: PathBuf,
    timestamp_format: Option<String>,
}

type StatusMap = DashMap<String, JobStatus>;

/// C5 Job Controller: owns job lifecycle state and a bounded pool of
/// workers draining a submission channel (spec.md §4.5).
pub struct JobController {
    statuses: Arc<StatusMap>,
    sender: mpsc::Sender<JobTask>,
}

impl JobController {
    pub fn new(store: Arc<dyn LogStore>, config: JobControllerConfig) -> Self {
        let statuses: Arc<StatusMap> = Arc::new(DashMap::new());
        let registry = Arc::new(ParserRegistry::with_defaults());
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(AsyncMutex::new(receiver));

        for worker_id in 0..config.core_pool_size.max(1) {
            let receiver = receiver.clone();
            let store = store.clone();
            let registry = registry.clone();
            let statuses = statuses.clone();
            let batch_size = config.batch_size;
            tokio::spawn(async move {
                tracing::debug!(worker_id, "job worker started");
                loop {
                    let task = { receiver.lock().await.recv().await };
                    let Some(task) = task else {
                        tracing::debug!(worker_id, "job worker shutting down, channel closed");
                        break;
                    };
                    run_job(&statuses, &store, &registry, batch_size, task).await;
                }
            });
        }

        Self { statuses, sender }
    }

    /// Registers a QUEUED job and hands the file off to the worker pool.
    /// Returns the generated job id immediately; processing happens
    /// asynchronously (spec.md §4.5 "submitJob").
    pub async fn submit_job(
        &self,
        file_path: PathBuf,
        file_name: String,
        file_size: u64,
        timestamp_format: Option<String>,
    ) -> Result<String> {
        let job_id = uuid::Uuid::new_v4().to_string();
        let status = JobStatus::queued(job_id.clone(), file_name, file_size, timestamp_format.clone());
        self.statuses.insert(job_id.clone(), status);

        self.sender
            .send(JobTask {
                job_id: job_id.clone(),
                file_path,
                timestamp_format,
            })
            .await
            .map_err(|_| Error::Internal("job submission queue is closed".to_string()))?;

        Ok(job_id)
    }

    pub fn get_status(&self, job_id: &str) -> Result<JobStatus> {
        self.statuses.get(job_id).map(|s| s.clone()).ok_or_else(|| Error::JobNotFound(job_id.to_string()))
    }

    /// Returns the terminal status once processing has finished
    /// successfully; any non-COMPLETED state (including FAILED, whose
    /// detail is available via `get_status().error`) is reported as "not
    /// completed" (spec.md §4.5 "getResult").
    pub fn get_result(&self, job_id: &str) -> Result<JobStatus> {
        let status = self.get_status(job_id)?;
        if status.state == JobState::Completed {
            Ok(status)
        } else {
            Err(Error::JobNotCompleted(job_id.to_string()))
        }
    }

    pub fn job_ids(&self) -> Vec<String> {
        self.statuses.iter().map(|e| e.key().clone()).collect()
    }
}

async fn run_job(statuses: &Arc<StatusMap>, store: &Arc<dyn LogStore>, registry: &Arc<ParserRegistry>, batch_size: usize, task: JobTask) {
    let job_id = task.job_id.clone();
    if let Some(mut status) = statuses.get_mut(&job_id) {
        if let Err(e) = status.transition_to(JobState::Processing) {
            tracing::error!(job_id, error = %e, "failed to transition job to PROCESSING");
            return;
        }
    }

    let statuses = statuses.clone();
    let store = store.clone();
    let registry = registry.clone();
    let job_id_for_blocking = job_id.clone();
    let result = tokio::task::spawn_blocking(move || {
        ingest_file(statuses.as_ref(), store.as_ref(), registry.as_ref(), batch_size, &job_id_for_blocking, &task.file_path, task.timestamp_format)
    })
    .await;

    let outcome = match result {
        Ok(inner) => inner,
        Err(join_err) => Err(Error::Internal(format!("job worker panicked: {join_err}"))),
    };

    if let Err(e) = outcome {
        tracing::warn!(job_id, error = %e, "job failed");
        if let Some(mut status) = statuses.get_mut(&job_id) {
            status.fail(e.to_string());
        }
    }
}

/// The blocking ingestion pipeline proper: parser selection, two-pass
/// reading, per-line dispatch through the parser's `ParseOutcome`, batched
/// writes, and final job-status bookkeeping (spec.md §4.5 steps 1-7). Runs
/// on a blocking thread since `StreamReader` is synchronous I/O.
fn ingest_file(
    statuses: &StatusMap,
    store: &dyn LogStore,
    registry: &ParserRegistry,
    batch_size: usize,
    job_id: &str,
    file_path: &Path,
    timestamp_format: Option<String>,
) -> Result<()> {
    let file_name = statuses.get(job_id).map(|s| s.file_name.clone()).unwrap_or_default();

    let sample = read_sample(file_path)?;
    let parser = registry.select(&file_name, &sample)?;

    let reader = StreamReader::new();
    let total_lines = reader.count_lines(File::open(file_path)?)?;
    if let Some(mut status) = statuses.get_mut(job_id) {
        status.total_lines = total_lines;
    }

    let mut ctx = ParseContext::new(job_id, file_name.clone()).with_timestamp_format(timestamp_format);
    let mut writer = BatchWriter::new(store, batch_size, true);
    let mut successful = 0u64;
    let mut failed = 0u64;

    let result = reader.for_each_line(
        File::open(file_path)?,
        0,
        |line, line_number| {
            let outcome = parser.parse_line(line, line_number, &mut ctx);
            for pending in std::mem::take(&mut ctx.pending) {
                apply_outcome(pending, &mut writer, &mut successful, &mut failed).map_err(|e| e.to_string())?;
            }
            apply_outcome(outcome, &mut writer, &mut successful, &mut failed).map_err(|e| e.to_string())
        },
        |current, total| {
            if let Some(mut status) = statuses.get_mut(job_id) {
                status.processed_lines = current;
                status.set_ingest_progress(current, total);
            }
        },
        total_lines,
        None::<fn(u64, &str)>,
    );

    let stats = result?;

    if parser.supports_multi_line() {
        if let Some(final_outcome) = parser.flush_pending(&mut ctx) {
            apply_outcome(final_outcome, &mut writer, &mut successful, &mut failed)?;
        }
    }
    writer.flush()?;

    let _ = std::fs::remove_file(file_path);

    if let Some(mut status) = statuses.get_mut(job_id) {
        status.processed_lines = stats.total_lines;
        status.successful_lines = successful;
        status.failed_lines = failed;
        status.transition_to(JobState::Completed)?;
        status.progress = 100;
    }

    Ok(())
}

fn apply_outcome(outcome: ParseOutcome, writer: &mut BatchWriter<'_>, successful: &mut u64, failed: &mut u64) -> Result<()> {
    match outcome {
        ParseOutcome::Success(entry) => {
            writer.add(*entry)?;
            *successful += 1;
        }
        ParseOutcome::Failed(_, _, _) => {
            *failed += 1;
        }
        ParseOutcome::Buffered(_, _) | ParseOutcome::Continuation(_, _) | ParseOutcome::Skipped(_, _) => {}
    }
    Ok(())
}

/// Samples the first `SAMPLE_MAX_LINES` lines for `ParserRegistry::select`
/// without retaining the whole file (spec.md §4.2).
fn read_sample(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let lines = reader.lines().take(SAMPLE_MAX_LINES).map_while(|l| l.ok());
    Ok(build_sample(lines))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use std::io::Write;

    fn write_temp_log(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".log").tempfile().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn submitted_job_reaches_completed_with_expected_counts() {
        let store: Arc<dyn LogStore> = Arc::new(InMemoryStore::new());
        let controller = JobController::new(store.clone(), JobControllerConfig::default());

        let file = write_temp_log(&["2024-01-01 10:00:00 INFO starting up", "2024-01-01 10:00:01 ERROR boom"]);
        let path = file.path().to_path_buf();
        let job_id = controller
            .submit_job(path, "app.log".to_string(), 64, None)
            .await
            .unwrap();

        let status = wait_for_terminal(&controller, &job_id).await;
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.successful_lines, 2);
        assert_eq!(status.failed_lines, 0);
        assert_eq!(status.progress, 100);

        let result = controller.get_result(&job_id).unwrap();
        assert_eq!(result.job_id, job_id);
    }

    #[tokio::test]
    async fn unknown_job_id_is_reported_as_not_found() {
        let store: Arc<dyn LogStore> = Arc::new(InMemoryStore::new());
        let controller = JobController::new(store, JobControllerConfig::default());
        assert!(matches!(controller.get_status("missing"), Err(Error::JobNotFound(_))));
    }

    #[tokio::test]
    async fn result_unavailable_before_completion_is_reported() {
        let store: Arc<dyn LogStore> = Arc::new(InMemoryStore::new());
        let controller = JobController::new(store.clone(), JobControllerConfig::default());
        let file = write_temp_log(&["hello"]);
        let job_id = controller
            .submit_job(file.path().to_path_buf(), "app.log".to_string(), 8, None)
            .await
            .unwrap();
        // May already be mid-flight, but immediately after submission it is
        // extremely unlikely to be COMPLETED yet.
        let _ = controller.get_status(&job_id).unwrap();
        wait_for_terminal(&controller, &job_id).await;
        assert!(controller.get_result(&job_id).is_ok());
    }

    async fn wait_for_terminal(controller: &JobController, job_id: &str) -> JobStatus {
        for _ in 0..200 {
            let status = controller.get_status(job_id).unwrap();
            if status.state.is_terminal() {
                return status;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("job {job_id} did not reach a terminal state in time");
    }
}
