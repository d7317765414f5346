mod config;
mod dto;
mod error;
mod janitor;
mod metrics;
mod routes;
mod state;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};

use crate::config::{ApiConfig, LogFormat};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Phase 1: basic tracing so config loading itself can be logged, via a
    // thread-local subscriber that Phase 2 replaces once config is known.
    let _basic_tracing = init_tracing_basic();

    info!("Starting logtrail API v{}", env!("CARGO_PKG_VERSION"));

    let config = ApiConfig::load().context("failed to load configuration")?;
    config.validate().context("configuration validation failed")?;

    drop(_basic_tracing);
    init_tracing_from_config(&config);

    info!("configuration loaded successfully");
    info!(bind_address = %config.server.bind_address, "server will bind here");

    let state = AppState::new(config.clone()).context("failed to build application state")?;

    tokio::spawn(janitor::run(state.clone()));

    let app = build_router(state, &config);

    let addr: SocketAddr = config.server.bind_address.parse().context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(&addr).await.context("failed to bind to address")?;

    info!("logtrail API is ready, listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server shut down gracefully");
    Ok(())
}

fn build_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.server.enable_cors {
        let origins = config.server.cors_origins.iter().filter_map(|s| s.parse::<axum::http::HeaderValue>().ok()).collect::<Vec<_>>();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        CorsLayer::new()
    };

    let request_timeout = Duration::from_secs(config.server.write_timeout_secs);
    let body_limit = config.file.max_size_bytes as usize;

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(routes::router())
        .layer(
            ServiceBuilder::new()
                .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
                .layer(DefaultBodyLimit::max(body_limit))
                .layer(cors),
        )
        .with_state(state)
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "name": "logtrail API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "upload": "/logs/upload",
            "status": "/logs/status/{jobId}",
            "result": "/logs/result/{jobId}",
            "search": "/logs/search",
            "health": "/health",
            "metrics": "/metrics"
        }
    }))
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let job_ids = state.jobs.job_ids();
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "jobs": { "total": job_ids.len() }
        })),
    )
}

/// Job counts are computed live from the job controller's status map rather
/// than mirrored into a second counter, the same way the teacher's
/// `/health` handler counts agents live from `agent_pool`.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let job_ids = state.jobs.job_ids();
    let mut completed = 0u64;
    let mut failed = 0u64;
    let mut processing = 0u64;
    let mut queued = 0u64;
    for job_id in &job_ids {
        if let Ok(status) = state.jobs.get_status(job_id) {
            match status.state {
                logtrail_core::model::JobState::Completed => completed += 1,
                logtrail_core::model::JobState::Failed => failed += 1,
                logtrail_core::model::JobState::Processing => processing += 1,
                logtrail_core::model::JobState::Queued => queued += 1,
            }
        }
    }

    Json(json!({
        "queries": state.metrics.snapshot(),
        "jobs": {
            "total": job_ids.len(),
            "queued": queued,
            "processing": processing,
            "completed": completed,
            "failed": failed,
        }
    }))
}

fn init_tracing_basic() -> tracing::subscriber::DefaultGuard {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,logtrail_api=debug"));
    let subscriber = fmt().with_env_filter(filter).with_target(true).finish();
    tracing::subscriber::set_default(subscriber)
}

fn init_tracing_from_config(config: &ApiConfig) {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            let layer = fmt::layer().json().with_target(true).with_thread_ids(true);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
        LogFormat::Pretty => {
            let layer = fmt::layer().with_target(true).with_file(false).with_line_number(false);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            warn!("received SIGTERM, initiating graceful shutdown");
        },
    }
}
