/// Live processing statistics shared by all workers
use crate::types::StatsSnapshot;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
struct Counters {
    processed: u64,
    total_secs: f64,
    errors: u64,
    last_processed: Option<DateTime<Utc>>,
}

/// Counters updated under one lock, so a snapshot never mixes two updates
#[derive(Debug, Default)]
pub struct StatsAggregator {
    counters: Mutex<Counters>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a successful task and add the duration published on its result.
    /// Returns the new processed count.
    pub fn record_success(&self, duration_secs: f64) -> u64 {
        let mut counters = self.lock();
        counters.processed += 1;
        counters.total_secs += duration_secs;
        counters.last_processed = Some(Utc::now());
        counters.processed
    }

    pub fn record_error(&self) -> u64 {
        let mut counters = self.lock();
        counters.errors += 1;
        counters.errors
    }

    /// Copy of all counters; `queue_depth` is sampled by the caller at snapshot time
    pub fn snapshot(&self, queue_depth: usize) -> StatsSnapshot {
        let counters = self.lock();
        let average = if counters.processed > 0 {
            counters.total_secs / counters.processed as f64
        } else {
            0.0
        };

        StatsSnapshot {
            processed_count: counters.processed,
            total_processing_secs: counters.total_secs,
            average_processing_secs: average,
            current_queue_depth: queue_depth,
            error_count: counters.errors,
            last_processed: counters.last_processed,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_empty_snapshot() {
        let stats = StatsAggregator::new();
        let snapshot = stats.snapshot(3);
        assert_eq!(snapshot.processed_count, 0);
        assert_eq!(snapshot.average_processing_secs, 0.0);
        assert_eq!(snapshot.current_queue_depth, 3);
        assert!(snapshot.last_processed.is_none());
    }

    #[test]
    fn test_average_matches_total() {
        let stats = StatsAggregator::new();
        let durations = [10u64, 20, 30, 45];
        for ms in durations {
            stats.record_success(ms as f64 / 1000.0);
        }
        let snapshot = stats.snapshot(0);

        assert_eq!(snapshot.processed_count, 4);
        assert!((snapshot.total_processing_secs - 0.105).abs() < 1e-9);
        assert!(
            (snapshot.average_processing_secs - snapshot.total_processing_secs / 4.0).abs() < 1e-12
        );
        assert!(snapshot.last_processed.is_some());
    }

    #[test]
    fn test_errors_do_not_touch_durations() {
        let stats = StatsAggregator::new();
        stats.record_error();
        let snapshot = stats.snapshot(0);
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.processed_count, 0);
        assert_eq!(snapshot.total_processing_secs, 0.0);
    }

    #[test]
    fn test_no_lost_updates() {
        let stats = Arc::new(StatsAggregator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..500 {
                        stats.record_success(0.001);
                        stats.record_error();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = stats.snapshot(0);
        assert_eq!(snapshot.processed_count, 4000);
        assert_eq!(snapshot.error_count, 4000);
        assert!((snapshot.total_processing_secs - 4.0).abs() < 1e-6);
    }
}
