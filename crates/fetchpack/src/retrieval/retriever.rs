//! Main entry point for retrieval runs
//!
//! The call chain flows as follows:
//!
//! User Code
//! ↓
//! Retriever (this file)
//! ↓
//! BulkOrchestrator (archived.rs) or SequentialOrchestrator (progressive.rs)
//! ↓
//! ConcurrencyLimiter / RetryPolicy / ThroughputEstimator / ArchiveAssembler
//! ↓
//! ByteFetcher and FileSink collaborators (core/*)

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::retrieval::archived::{ArchivedRun, BulkOrchestrator};
use crate::retrieval::config::RetrievalConfig;
use crate::retrieval::core::{
    ByteFetcher, FailedObject, FileSink, ProgressCallback, Result, RetrievableObject, RetrievalError,
};
use crate::retrieval::metrics::{RetrievalMetrics, RetrievalMetricsSnapshot};
use crate::retrieval::progressive::{ProgressiveRun, SequentialOrchestrator};

/// How a run delivers what it retrieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalStrategy {
    /// Fetch concurrently and assemble one stored archive
    Archived,
    /// Fetch one object at a time and save each as its own file
    Progressive,
}

impl fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalStrategy::Archived => write!(f, "archived"),
            RetrievalStrategy::Progressive => write!(f, "progressive"),
        }
    }
}

/// Result of a completed run, by strategy
#[derive(Debug, Clone)]
pub enum RetrievalReport {
    Archived(ArchivedRun),
    Saved(ProgressiveRun),
}

impl RetrievalReport {
    pub fn strategy(&self) -> RetrievalStrategy {
        match self {
            RetrievalReport::Archived(_) => RetrievalStrategy::Archived,
            RetrievalReport::Saved(_) => RetrievalStrategy::Progressive,
        }
    }

    pub fn failed(&self) -> &[FailedObject] {
        match self {
            RetrievalReport::Archived(run) => &run.failed,
            RetrievalReport::Saved(run) => &run.failed,
        }
    }

    pub fn succeeded_count(&self) -> usize {
        match self {
            RetrievalReport::Archived(run) => run.archive.entry_count(),
            RetrievalReport::Saved(run) => run.saved.len(),
        }
    }
}

/// Retrieve-and-assemble entry point
///
/// Holds the collaborators and configuration; every call to
/// [`retrieve`](Self::retrieve) builds fresh per-run state, so one
/// retriever can serve independent runs. Metrics accumulate across runs.
pub struct Retriever {
    fetcher: Arc<dyn ByteFetcher>,
    sink: Option<Arc<dyn FileSink>>,
    config: RetrievalConfig,
    metrics: Arc<RetrievalMetrics>,
}

impl Retriever {
    pub fn new<F: ByteFetcher + 'static>(fetcher: F, config: RetrievalConfig) -> Self {
        Self::with_shared_fetcher(Arc::new(fetcher), config)
    }

    pub fn with_shared_fetcher(fetcher: Arc<dyn ByteFetcher>, config: RetrievalConfig) -> Self {
        Self {
            fetcher,
            sink: None,
            config,
            metrics: Arc::new(RetrievalMetrics::default()),
        }
    }

    /// Set the persistence collaborator used by progressive runs
    pub fn with_sink<S: FileSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Get a snapshot of the counters accumulated over every run
    pub fn metrics(&self) -> RetrievalMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Retrieve `objects` with the given strategy
    ///
    /// `progress` is called after every settled object. Cancelling `cancel`
    /// stops the run at the next check point and yields
    /// [`RetrievalError::Cancelled`].
    pub async fn retrieve(
        &self,
        objects: &[RetrievableObject],
        strategy: RetrievalStrategy,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<RetrievalReport> {
        info!(%strategy, objects = objects.len(), "Retrieval requested");

        match strategy {
            RetrievalStrategy::Archived => {
                let orchestrator = BulkOrchestrator::new(self.fetcher.clone(), self.config.clone())
                    .with_metrics(self.metrics.clone());
                let run = orchestrator.run(objects, progress, cancel).await?;
                Ok(RetrievalReport::Archived(run))
            }
            RetrievalStrategy::Progressive => {
                let sink = self.sink.clone().ok_or_else(|| {
                    RetrievalError::configuration("sink", "progressive retrieval needs a file sink")
                })?;
                let orchestrator = SequentialOrchestrator::new(self.fetcher.clone(), sink, self.config.clone())
                    .with_metrics(self.metrics.clone());
                let run = orchestrator.run(objects, progress, cancel).await?;
                Ok(RetrievalReport::Saved(run))
            }
        }
    }
}
