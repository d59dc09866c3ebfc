//! Progressive mode: fetch and save one object at a time
//!
//! Never holds more than one object's bytes in memory. Every attempt runs
//! under a hard timeout so an unresponsive object cannot stall the run, and
//! each success is handed to the [`FileSink`] before the next object starts.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::retrieval::RetrievalStrategy;
use crate::retrieval::config::RetrievalConfig;
use crate::retrieval::core::{
    validate_objects, ByteFetcher, FailedObject, FileSink, ProgressCallback, Result, RetrievableObject,
    RetrievalError,
};
use crate::retrieval::metrics::RetrievalMetrics;
use crate::retrieval::retry::{RetryError, RetryPolicy, Retrieved};
use crate::retrieval::tracker::{courtesy_pause, RunTracker};

/// An object saved as a standalone file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedObject {
    pub display_name: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Outcome of a progressive run
///
/// A run where nothing succeeded is still a completed run: every failure is
/// listed and nothing was written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressiveRun {
    /// Saved objects in processing order
    pub saved: Vec<SavedObject>,
    pub failed: Vec<FailedObject>,
}

impl ProgressiveRun {
    pub fn succeeded_names(&self) -> Vec<String> {
        self.saved.iter().map(|s| s.display_name.clone()).collect()
    }

    pub fn failed_object_names(&self) -> Vec<String> {
        self.failed.iter().map(|f| f.display_name.clone()).collect()
    }
}

/// Sequential orchestrator for progressive mode
pub struct SequentialOrchestrator {
    fetcher: Arc<dyn ByteFetcher>,
    sink: Arc<dyn FileSink>,
    config: RetrievalConfig,
    metrics: Arc<RetrievalMetrics>,
}

impl SequentialOrchestrator {
    pub fn new(fetcher: Arc<dyn ByteFetcher>, sink: Arc<dyn FileSink>, config: RetrievalConfig) -> Self {
        Self {
            fetcher,
            sink,
            config,
            metrics: Arc::new(RetrievalMetrics::default()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<RetrievalMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve and save every object in order
    pub async fn run(
        &self,
        objects: &[RetrievableObject],
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<ProgressiveRun> {
        validate_objects(objects)?;
        self.config.validate()?;
        self.metrics.record_run_started();

        let retry = RetryPolicy::from_config(&self.config).with_attempt_timeout(self.config.object_timeout);
        let owner = self.config.owner_qualifier.as_deref();
        let mut tracker = RunTracker::new(
            RetrievalStrategy::Progressive,
            objects.len(),
            self.config.speed_sample_window,
            progress,
            self.metrics.clone(),
        );
        let mut saved = Vec::new();

        info!(objects = objects.len(), "Starting progressive retrieval");

        for (index, object) in objects.iter().enumerate() {
            if index > 0 && !courtesy_pause(self.config.inter_object_pause, cancel).await {
                return Err(self.cancel_run(&tracker));
            }

            let identifier = object.identifier.as_str();
            let fetched = retry
                .attempt(identifier, || self.fetcher.fetch(identifier, owner), cancel)
                .await;

            match fetched {
                Ok(Retrieved { value, attempts }) => {
                    let size = value.len() as u64;
                    match self.sink.save(&object.display_name, value).await {
                        Ok(path) => {
                            tracker.record_success(object, size, attempts);
                            saved.push(SavedObject {
                                display_name: object.display_name.clone(),
                                path,
                                size,
                            });
                        }
                        Err(e) => tracker.record_failure(object, e.to_string(), attempts),
                    }
                }
                Err(RetryError::Exhausted { attempts, last_error }) => {
                    tracker.record_failure(object, last_error.to_string(), attempts);
                }
                Err(RetryError::Cancelled { .. }) => return Err(self.cancel_run(&tracker)),
            }
        }

        let failed = tracker.into_failures();
        info!(saved = saved.len(), failed = failed.len(), "Progressive retrieval finished");
        Ok(ProgressiveRun { saved, failed })
    }

    fn cancel_run(&self, tracker: &RunTracker) -> RetrievalError {
        self.metrics.record_run_cancelled();
        warn!(completed = tracker.completed(), total = tracker.total(), "Progressive retrieval cancelled");
        tracker.cancelled()
    }
}
