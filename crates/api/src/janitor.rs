use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::state::AppState;

/// Periodic sweep of `upload_dir` for files left behind by jobs that failed
/// before reaching their own cleanup step (mirrors the teacher's background
/// mark-and-sweep task in `crates/agent/src/service/background.rs`, adapted
/// from "stale agent" sweeping to "stale upload file" sweeping).
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Files older than this are considered orphaned regardless of job state —
/// a belt-and-suspenders backstop for the per-job cleanup in
/// `logtrail_core::job::ingest_file`, which removes its own input file on
/// success but leaves it behind on failure.
const ORPHAN_AGE: Duration = Duration::from_secs(24 * 60 * 60);

pub async fn run(state: AppState) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        sweep_once(&state).await;
    }
}

async fn sweep_once(state: &AppState) {
    let mut entries = match tokio::fs::read_dir(&state.upload_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(error = %e, "janitor: failed to read upload dir");
            return;
        }
    };

    let mut removed = 0u64;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "janitor: failed to iterate upload dir");
                break;
            }
        };

        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(_) => continue,
        };
        let Ok(age) = metadata.modified().and_then(|m| m.elapsed().map_err(std::io::Error::other)) else {
            continue;
        };
        if age < ORPHAN_AGE {
            continue;
        }

        if tokio::fs::remove_file(entry.path()).await.is_ok() {
            removed += 1;
        }
    }

    if removed > 0 {
        tracing::info!(removed, "janitor: removed orphaned upload files");
    }
}
