use std::path::PathBuf;
use std::sync::Arc;

use logtrail_core::job::{JobController, JobControllerConfig};
use logtrail_core::store::{InMemoryStore, LogStore, TantivyStore};

use crate::config::{ApiConfig, StoreBackend};
use crate::metrics::Metrics;

/// Shared application state, handed to every route via axum's `State`
/// extractor (mirrors the teacher's `AppState`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub store: Arc<dyn LogStore>,
    pub jobs: Arc<JobController>,
    pub metrics: Arc<Metrics>,
    pub upload_dir: PathBuf,
}

impl AppState {
    pub fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn LogStore> = match config.store.backend {
            StoreBackend::Memory => Arc::new(InMemoryStore::new()),
            StoreBackend::Tantivy => Arc::new(TantivyStore::open_or_create_in_dir(std::path::Path::new(&config.store.data_dir))?),
        };

        std::fs::create_dir_all(&config.file.upload_dir)?;

        let job_config = JobControllerConfig {
            core_pool_size: config.processing.thread_pool.core_size,
            max_pool_size: config.processing.thread_pool.max_size,
            queue_capacity: config.processing.buffer_size,
            batch_size: config.processing.batch_size,
        };
        let jobs = Arc::new(JobController::new(store.clone(), job_config));

        Ok(Self {
            upload_dir: PathBuf::from(&config.file.upload_dir),
            config: Arc::new(config),
            store,
            jobs,
            metrics: Arc::new(Metrics::new()),
        })
    }
}
