//! Per-invocation bookkeeping shared by both orchestrators
//!
//! Holds the settled counters, the failure list and the throughput
//! estimator of one run, and turns every settled outcome into an
//! [`AggregateProgress`] event. A tracker is created fresh for each
//! invocation and never shared.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::retrieval::RetrievalStrategy;
use crate::retrieval::core::{AggregateProgress, FailedObject, ProgressCallback, RetrievableObject, RetrievalError};
use crate::retrieval::metrics::RetrievalMetrics;
use crate::retrieval::throughput::ThroughputEstimator;

pub(crate) struct RunTracker {
    strategy: RetrievalStrategy,
    total: usize,
    completed: usize,
    succeeded: usize,
    failed: Vec<FailedObject>,
    estimator: ThroughputEstimator,
    progress: Option<ProgressCallback>,
    metrics: Arc<RetrievalMetrics>,
}

impl RunTracker {
    pub(crate) fn new(
        strategy: RetrievalStrategy,
        total: usize,
        speed_sample_window: usize,
        progress: Option<ProgressCallback>,
        metrics: Arc<RetrievalMetrics>,
    ) -> Self {
        Self {
            strategy,
            total,
            completed: 0,
            succeeded: 0,
            failed: Vec::new(),
            estimator: ThroughputEstimator::new(speed_sample_window),
            progress,
            metrics,
        }
    }

    pub(crate) fn record_success(&mut self, object: &RetrievableObject, size: u64, attempts: usize) {
        self.completed += 1;
        self.succeeded += 1;
        self.estimator.record(size);
        self.metrics.record_object_succeeded(size, attempts);
        debug!(
            identifier = object.identifier.as_str(),
            attempts,
            "Retrieved '{}' ({} bytes)",
            object.display_name,
            size
        );
        self.emit(&object.display_name);
    }

    pub(crate) fn record_failure(&mut self, object: &RetrievableObject, reason: String, attempts: usize) {
        self.completed += 1;
        self.estimator.mark_settled();
        self.metrics.record_object_failed(attempts);
        warn!(
            identifier = object.identifier.as_str(),
            attempts,
            "Giving up on '{}': {}",
            object.display_name,
            reason
        );
        self.failed.push(FailedObject {
            display_name: object.display_name.clone(),
            identifier: object.identifier.clone(),
            reason,
            attempts,
        });
        self.emit(&object.display_name);
    }

    fn emit(&self, current_object_name: &str) {
        let Some(callback) = &self.progress else {
            return;
        };
        let estimate = self.estimator.estimate(self.completed, self.total);
        callback(AggregateProgress {
            strategy: self.strategy,
            completed_count: self.completed,
            succeeded_count: self.succeeded,
            total_count: self.total,
            current_object_name: current_object_name.to_string(),
            speed_label: estimate.speed_label,
            eta_label: estimate.eta_label,
            bytes_transferred: self.estimator.total_bytes(),
            failed_object_names: self.failed.iter().map(|f| f.display_name.clone()).collect(),
        });
    }

    pub(crate) fn completed(&self) -> usize {
        self.completed
    }

    pub(crate) fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub(crate) fn total(&self) -> usize {
        self.total
    }

    pub(crate) fn cancelled(&self) -> RetrievalError {
        RetrievalError::Cancelled {
            completed: self.completed,
            total: self.total,
        }
    }

    pub(crate) fn into_failures(self) -> Vec<FailedObject> {
        self.failed
    }
}

/// Sleep for `duration` unless `cancel` fires first; returns false when cancelled
pub(crate) async fn courtesy_pause(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
