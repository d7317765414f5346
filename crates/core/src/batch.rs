use std::time::Instant;

use crate::model::LogEntry;
use crate::store::LogStore;

/// Default flush threshold (spec.md §4.4).
pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, Default)]
pub struct FlushStats {
    pub attempted: usize,
    pub saved: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchStatistics {
    pub total: usize,
    pub saved: usize,
    pub failed: usize,
    pub batch_count: usize,
    pub avg_save_time_ms: f64,
}

impl BatchStatistics {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.saved as f64 / self.total as f64
        }
    }
}

/// C4 Batch Writer: accumulates entries and flushes in bulk once the
/// threshold is reached, falling back to per-entry writes on a failed bulk
/// write when `continue_on_error` is set, so one bad batch doesn't lose an
/// otherwise-healthy one.
pub struct BatchWriter<'a> {
    store: &'a dyn LogStore,
    batch_size: usize,
    continue_on_error: bool,
    buffer: Vec<LogEntry>,
    stats: BatchStatistics,
    total_elapsed_ms: u64,
}

impl<'a> BatchWriter<'a> {
    pub fn new(store: &'a dyn LogStore, batch_size: usize, continue_on_error: bool) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            continue_on_error,
            buffer: Vec::with_capacity(batch_size),
            stats: BatchStatistics::default(),
            total_elapsed_ms: 0,
        }
    }

    /// Appends an entry, flushing synchronously once `batch_size` is hit.
    pub fn add(&mut self, entry: LogEntry) -> crate::error::Result<Option<FlushStats>> {
        self.buffer.push(entry);
        if self.buffer.len() >= self.batch_size {
            return Ok(Some(self.flush()?));
        }
        Ok(None)
    }

    pub fn flush(&mut self) -> crate::error::Result<FlushStats> {
        if self.buffer.is_empty() {
            return Ok(FlushStats::default());
        }
        let batch = std::mem::take(&mut self.buffer);
        let attempted = batch.len();
        let started = Instant::now();

        let saved = match self.store.bulk_write(&batch) {
            Ok(()) => attempted,
            Err(e) if self.continue_on_error => {
                tracing::debug!(error = %e, "bulk write failed, falling back to per-entry writes");
                let mut saved = 0;
                for entry in &batch {
                    if self.store.bulk_write(std::slice::from_ref(entry)).is_ok() {
                        saved += 1;
                    }
                }
                saved
            }
            Err(e) => return Err(e),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.total_elapsed_ms += elapsed_ms;
        self.stats.total += attempted;
        self.stats.saved += saved;
        self.stats.failed += attempted - saved;
        self.stats.batch_count += 1;
        self.stats.avg_save_time_ms = self.total_elapsed_ms as f64 / self.stats.batch_count as f64;

        Ok(FlushStats {
            attempted,
            saved,
            elapsed_ms,
        })
    }

    pub fn statistics(&self) -> BatchStatistics {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Level;
    use crate::store::memory::InMemoryStore;

    fn entry(n: u64) -> LogEntry {
        LogEntry::new("job-1", n, "a.log", Level::Info, format!("line {n}"), format!("line {n}"), chrono::Utc::now())
    }

    #[test]
    fn flushes_at_threshold() {
        let store = InMemoryStore::new();
        let mut writer = BatchWriter::new(&store, 2, false);
        assert!(writer.add(entry(1)).unwrap().is_none());
        let flushed = writer.add(entry(2)).unwrap();
        assert!(flushed.is_some());
        assert_eq!(flushed.unwrap().saved, 2);
        assert_eq!(store.count_for_job("job-1"), 2);
    }

    #[test]
    fn final_flush_drains_partial_batch() {
        let store = InMemoryStore::new();
        let mut writer = BatchWriter::new(&store, 10, false);
        writer.add(entry(1)).unwrap();
        writer.add(entry(2)).unwrap();
        let stats = writer.flush().unwrap();
        assert_eq!(stats.saved, 2);
        assert_eq!(writer.statistics().batch_count, 1);
    }

    #[test]
    fn success_rate_is_one_when_nothing_written() {
        let writer_stats = BatchStatistics::default();
        assert_eq!(writer_stats.success_rate(), 1.0);
    }
}
