//! Progress tracking and reporting for retrieval runs

use std::sync::Arc;

use serde::Serialize;

use crate::retrieval::RetrievalStrategy;

/// Progress callback for retrieval runs
///
/// Invoked synchronously after every settled outcome and never awaited,
/// so implementations must return quickly.
pub type ProgressCallback = Arc<dyn Fn(AggregateProgress) + Send + Sync>;

/// Aggregate state of one invocation, emitted after every settled outcome
///
/// Both strategies emit the same shape so one rendering path serves both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateProgress {
    pub strategy: RetrievalStrategy,
    /// Settled objects, successes and failures alike
    pub completed_count: usize,
    pub succeeded_count: usize,
    pub total_count: usize,
    /// Display name of the object whose outcome triggered this event
    pub current_object_name: String,
    pub speed_label: String,
    pub eta_label: String,
    pub bytes_transferred: u64,
    pub failed_object_names: Vec<String>,
}

impl AggregateProgress {
    pub fn fraction(&self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            self.completed_count as f64 / self.total_count as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed_count == self.total_count
    }
}

/// Trait for progress reporting with more granular control
pub trait ProgressReporter: Send + Sync {
    fn on_progress(&self, _progress: &AggregateProgress) {}
    fn on_object_failed(&self, _display_name: &str) {}
    fn on_finished(&self, _progress: &AggregateProgress) {}
}

/// Extension trait to convert ProgressReporter to ProgressCallback
pub trait IntoProgressCallback {
    fn into_callback(self) -> ProgressCallback;
}

impl<T: ProgressReporter + 'static> IntoProgressCallback for T {
    fn into_callback(self) -> ProgressCallback {
        Arc::new(move |progress: AggregateProgress| {
            let newly_failed = progress
                .failed_object_names
                .last()
                .filter(|name| **name == progress.current_object_name);
            if let Some(name) = newly_failed {
                self.on_object_failed(name);
            }
            self.on_progress(&progress);
            if progress.is_complete() {
                self.on_finished(&progress);
            }
        })
    }
}

/// Simple console progress reporter implementation
#[derive(Debug, Default)]
pub struct ConsoleProgressReporter {
    pub verbose: bool,
}

impl ConsoleProgressReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ConsoleProgressReporter {
    /// One status line for `progress`
    pub fn render(&self, progress: &AggregateProgress) -> String {
        let percent = progress.fraction() * 100.0;
        if self.verbose {
            format!(
                "[{}/{}] {:>5.1}% {} | {} | ETA {} | {} bytes",
                progress.completed_count,
                progress.total_count,
                percent,
                progress.current_object_name,
                progress.speed_label,
                progress.eta_label,
                progress.bytes_transferred,
            )
        } else {
            format!(
                "[{}/{}] {:>5.1}% {} ({}, ETA {})",
                progress.completed_count,
                progress.total_count,
                percent,
                progress.current_object_name,
                progress.speed_label,
                progress.eta_label,
            )
        }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn on_progress(&self, progress: &AggregateProgress) {
        println!("{}", self.render(progress));
    }

    fn on_object_failed(&self, display_name: &str) {
        eprintln!("Failed: {}", display_name);
    }

    fn on_finished(&self, progress: &AggregateProgress) {
        println!(
            "Done: {} succeeded, {} failed",
            progress.succeeded_count,
            progress.failed_object_names.len()
        );
    }
}

/// Null progress reporter that does nothing
#[derive(Debug, Default)]
pub struct NullProgressReporter;

impl ProgressReporter for NullProgressReporter {}
