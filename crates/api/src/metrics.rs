use std::sync::atomic::{AtomicU64, Ordering};

/// Process-local query counters exposed at `/metrics` (SPEC_FULL.md §11).
/// Job counts aren't tracked here — the job controller's status map is
/// already the source of truth and is cheap to scan on demand, the same
/// way the teacher's `/health` handler counts agents live from
/// `agent_pool` rather than mirroring counts into a second place.
#[derive(Default)]
pub struct Metrics {
    queries_executed: AtomicU64,
    total_query_time_ms: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query_executed(&self, elapsed_ms: u64) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
        self.total_query_time_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> QueryMetricsSnapshot {
        let queries = self.queries_executed.load(Ordering::Relaxed);
        let total_time = self.total_query_time_ms.load(Ordering::Relaxed);
        QueryMetricsSnapshot {
            queries_executed: queries,
            avg_query_time_ms: if queries == 0 { 0.0 } else { total_time as f64 / queries as f64 },
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetricsSnapshot {
    pub queries_executed: u64,
    pub avg_query_time_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_query_time_is_zero_with_no_queries() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot().avg_query_time_ms, 0.0);
    }

    #[test]
    fn average_is_mean_of_recorded_timings() {
        let metrics = Metrics::new();
        metrics.query_executed(10);
        metrics.query_executed(20);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.queries_executed, 2);
        assert_eq!(snapshot.avg_query_time_ms, 15.0);
    }
}
