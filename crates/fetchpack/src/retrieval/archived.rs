//! Archived mode: fetch everything concurrently and assemble one archive
//!
//! Objects are submitted in fixed-size sub-batches. Within a sub-batch every
//! object's retried fetch goes through the [`ConcurrencyLimiter`], and the
//! sub-batch is drained as outcomes settle, in completion order. A failing
//! object never aborts its siblings. Successful bytes go straight into the
//! [`ArchiveAssembler`], which is finalized once after the last sub-batch.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::retrieval::RetrievalStrategy;
use crate::retrieval::archive::{ArchiveAssembler, ArchiveBlob, ArchiveCompression};
use crate::retrieval::config::RetrievalConfig;
use crate::retrieval::core::{
    normalize_display_name, validate_objects, ByteFetcher, FailedObject, ProgressCallback, Result,
    RetrievableObject, RetrievalError,
};
use crate::retrieval::limiter::ConcurrencyLimiter;
use crate::retrieval::metrics::RetrievalMetrics;
use crate::retrieval::retry::{RetryError, RetryPolicy, Retrieved};
use crate::retrieval::tracker::{courtesy_pause, RunTracker};

/// Outcome of a successful archived run, possibly partial
#[derive(Debug, Clone)]
pub struct ArchivedRun {
    pub archive: ArchiveBlob,
    /// Objects that exhausted their attempts, in the order they settled
    pub failed: Vec<FailedObject>,
}

impl ArchivedRun {
    pub fn failed_object_names(&self) -> Vec<String> {
        self.failed.iter().map(|f| f.display_name.clone()).collect()
    }

    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn summary(&self) -> ArchivedSummary {
        ArchivedSummary {
            entries: self.archive.entry_count(),
            archive_bytes: self.archive.len(),
            failed_object_names: self.failed_object_names(),
        }
    }
}

/// Serializable summary of an archived run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchivedSummary {
    pub entries: usize,
    pub archive_bytes: usize,
    pub failed_object_names: Vec<String>,
}

/// Bulk orchestrator for archived mode
pub struct BulkOrchestrator {
    fetcher: Arc<dyn ByteFetcher>,
    config: RetrievalConfig,
    metrics: Arc<RetrievalMetrics>,
}

impl BulkOrchestrator {
    pub fn new(fetcher: Arc<dyn ByteFetcher>, config: RetrievalConfig) -> Self {
        Self {
            fetcher,
            config,
            metrics: Arc::new(RetrievalMetrics::default()),
        }
    }

    /// Report counters into a shared metrics instance
    pub fn with_metrics(mut self, metrics: Arc<RetrievalMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve every object and assemble the successes into one archive
    ///
    /// Fails with [`RetrievalError::AllFailed`] when nothing succeeded and
    /// with [`RetrievalError::Cancelled`] when `cancel` fires; contract
    /// violations are rejected before any fetch is made.
    pub async fn run(
        &self,
        objects: &[RetrievableObject],
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<ArchivedRun> {
        validate_objects(objects)?;
        self.config.validate()?;
        self.metrics.record_run_started();

        let limiter = ConcurrencyLimiter::new(self.config.concurrency)?;
        let retry = RetryPolicy::from_config(&self.config);
        let mut tracker = RunTracker::new(
            RetrievalStrategy::Archived,
            objects.len(),
            self.config.speed_sample_window,
            progress,
            self.metrics.clone(),
        );
        let mut assembler = ArchiveAssembler::new();

        let batch_count = objects.len().div_ceil(self.config.batch_size);
        info!(
            objects = objects.len(),
            batches = batch_count,
            concurrency = self.config.concurrency,
            "Starting archived retrieval"
        );

        for (batch_index, batch) in objects.chunks(self.config.batch_size).enumerate() {
            if batch_index > 0 && !courtesy_pause(self.config.inter_batch_pause, cancel).await {
                return Err(self.cancel_run(&limiter, &tracker));
            }
            if cancel.is_cancelled() {
                return Err(self.cancel_run(&limiter, &tracker));
            }

            info!(batch = batch_index + 1, batches = batch_count, size = batch.len(), "Submitting sub-batch");
            let cancelled = self
                .run_batch(batch, &limiter, &retry, &mut tracker, &mut assembler, cancel)
                .await?;
            if cancelled {
                return Err(self.cancel_run(&limiter, &tracker));
            }
        }

        if tracker.succeeded() == 0 {
            warn!(total = tracker.total(), "Every object failed, no archive produced");
            return Err(RetrievalError::AllFailed {
                total: tracker.total(),
                failures: tracker.into_failures(),
            });
        }

        let archive = assembler.finalize(ArchiveCompression::Store).await?;
        let failed = tracker.into_failures();
        info!(
            entries = archive.entry_count(),
            failed = failed.len(),
            bytes = archive.len(),
            "Archived retrieval finished"
        );
        Ok(ArchivedRun { archive, failed })
    }

    /// Drain one sub-batch; returns true if cancellation was observed
    async fn run_batch(
        &self,
        batch: &[RetrievableObject],
        limiter: &ConcurrencyLimiter,
        retry: &RetryPolicy,
        tracker: &mut RunTracker,
        assembler: &mut ArchiveAssembler,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let fetcher = self.fetcher.as_ref();
        let owner = self.config.owner_qualifier.as_deref();

        let mut pending: FuturesUnordered<_> = batch
            .iter()
            .map(|object| async move {
                let identifier = object.identifier.as_str();
                let outcome = limiter
                    .admit(retry.attempt(identifier, || fetcher.fetch(identifier, owner), cancel))
                    .await;
                (object, outcome)
            })
            .collect();

        let mut cancelled = false;
        while let Some((object, outcome)) = pending.next().await {
            match outcome {
                Some(Ok(Retrieved { value, attempts })) => {
                    let size = value.len() as u64;
                    assembler.add_entry(normalize_display_name(&object.display_name)?, value)?;
                    tracker.record_success(object, size, attempts);
                }
                Some(Err(RetryError::Exhausted { attempts, last_error })) => {
                    tracker.record_failure(object, last_error.to_string(), attempts);
                }
                Some(Err(RetryError::Cancelled { .. })) | None => {
                    if !cancelled {
                        // Queued fetches must not start once the signal is seen
                        limiter.close();
                        cancelled = true;
                    }
                }
            }
        }

        Ok(cancelled)
    }

    fn cancel_run(&self, limiter: &ConcurrencyLimiter, tracker: &RunTracker) -> RetrievalError {
        limiter.close();
        self.metrics.record_run_cancelled();
        warn!(completed = tracker.completed(), total = tracker.total(), "Archived retrieval cancelled");
        tracker.cancelled()
    }
}
