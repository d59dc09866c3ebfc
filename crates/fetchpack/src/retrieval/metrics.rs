//! Performance metrics for retrieval runs
//!
//! Counters are atomics so concurrent fetches can update them without
//! locking. A [`Retriever`](crate::retrieval::Retriever) keeps one instance
//! across invocations; take a snapshot to read derived statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct RetrievalMetrics {
    pub runs_started: AtomicU64,
    pub runs_cancelled: AtomicU64,
    pub objects_attempted: AtomicU64,
    pub objects_succeeded: AtomicU64,
    pub objects_failed: AtomicU64,
    pub retries_attempted: AtomicU64,
    pub total_bytes: AtomicU64,
}

impl RetrievalMetrics {
    pub fn record_run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_cancelled(&self) {
        self.runs_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that an object settled successfully after `attempts` attempts
    pub fn record_object_succeeded(&self, size: u64, attempts: usize) {
        self.objects_attempted.fetch_add(1, Ordering::Relaxed);
        self.objects_succeeded.fetch_add(1, Ordering::Relaxed);
        self.total_bytes.fetch_add(size, Ordering::Relaxed);
        self.record_retries(attempts);
    }

    /// Record that an object settled as a failure after `attempts` attempts
    pub fn record_object_failed(&self, attempts: usize) {
        self.objects_attempted.fetch_add(1, Ordering::Relaxed);
        self.objects_failed.fetch_add(1, Ordering::Relaxed);
        self.record_retries(attempts);
    }

    fn record_retries(&self, attempts: usize) {
        let retries = attempts.saturating_sub(1) as u64;
        if retries > 0 {
            self.retries_attempted.fetch_add(retries, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> RetrievalMetricsSnapshot {
        RetrievalMetricsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_cancelled: self.runs_cancelled.load(Ordering::Relaxed),
            objects_attempted: self.objects_attempted.load(Ordering::Relaxed),
            objects_succeeded: self.objects_succeeded.load(Ordering::Relaxed),
            objects_failed: self.objects_failed.load(Ordering::Relaxed),
            retries_attempted: self.retries_attempted.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Immutable point-in-time view of [`RetrievalMetrics`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievalMetricsSnapshot {
    pub runs_started: u64,
    pub runs_cancelled: u64,
    pub objects_attempted: u64,
    pub objects_succeeded: u64,
    pub objects_failed: u64,
    pub retries_attempted: u64,
    pub total_bytes: u64,
}

impl RetrievalMetricsSnapshot {
    /// Success rate between 0.0 and 1.0
    pub fn success_rate(&self) -> f64 {
        if self.objects_attempted == 0 {
            0.0
        } else {
            self.objects_succeeded as f64 / self.objects_attempted as f64
        }
    }

    /// Average size of a successfully retrieved object in bytes
    pub fn average_size(&self) -> f64 {
        if self.objects_succeeded == 0 {
            0.0
        } else {
            self.total_bytes as f64 / self.objects_succeeded as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_statistics() {
        let metrics = RetrievalMetrics::default();
        metrics.record_object_succeeded(300, 1);
        metrics.record_object_succeeded(100, 3);
        metrics.record_object_failed(3);
        metrics.record_object_failed(1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.objects_attempted, 4);
        assert_eq!(snapshot.retries_attempted, 4);
        assert_eq!(snapshot.success_rate(), 0.5);
        assert_eq!(snapshot.average_size(), 200.0);
    }

    #[test]
    fn empty_snapshot_has_zero_rates() {
        let snapshot = RetrievalMetrics::default().snapshot();
        assert_eq!(snapshot.success_rate(), 0.0);
        assert_eq!(snapshot.average_size(), 0.0);
    }
}
