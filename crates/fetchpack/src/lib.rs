//! Fetchpack Library
//!
//! This library retrieves large collections of remote objects (photos,
//! videos) and delivers them either as one uncompressed archive or as a
//! sequence of individually saved files. It bounds concurrency, retries
//! transient failures, tolerates partial failure and reports progress with
//! a smoothed speed and remaining-time estimate.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use fetchpack::{
//!     AggregateProgress, HttpFetcher, ProgressCallback, RetrievalConfig, RetrievalReport,
//!     RetrievalStrategy, RetrievableObject, Retriever,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> fetchpack::Result<()> {
//! let config = RetrievalConfig::default();
//! let fetcher = HttpFetcher::from_config("https://media.example.com/objects", &config)?;
//! let retriever = Retriever::new(fetcher, config);
//!
//! let objects = vec![
//!     RetrievableObject::new("f1a2", "2024/beach.jpg", 2_400_000),
//!     RetrievableObject::new("b7c9", "2024/waves.mp4", 48_000_000),
//! ];
//!
//! let progress: ProgressCallback = Arc::new(|p: AggregateProgress| {
//!     println!("{}/{} {} ETA {}", p.completed_count, p.total_count, p.speed_label, p.eta_label);
//! });
//!
//! let cancel = CancellationToken::new();
//! let report = retriever
//!     .retrieve(&objects, RetrievalStrategy::Archived, Some(progress), &cancel)
//!     .await?;
//!
//! if let RetrievalReport::Archived(run) = report {
//!     run.archive.save_to("photos.zip").await?;
//!     println!("Missing: {:?}", run.failed_object_names());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Bounded concurrency**: FIFO admission through a fixed number of permits
//! - **Retry logic**: Linear backoff per object with a fresh attempt counter
//! - **Partial success**: Failed objects are listed by name, never silently dropped
//! - **Stored archives**: Entries are written without compression
//! - **Progressive saving**: One object in memory at a time, saved as it arrives
//! - **Cancellation**: Cooperative, via a shared `CancellationToken`

pub mod retrieval;

// Re-export commonly used types for convenience
pub use retrieval::{
    parse_manifest, AggregateProgress, ArchiveBlob, ArchivedRun, ByteFetcher, ConsoleProgressReporter,
    DirectorySink, FailedObject, FileSink, HttpFetcher, IntoProgressCallback, NullProgressReporter,
    ProgressCallback, ProgressReporter, ProgressiveRun, Result, RetrievableObject, RetrievalConfig,
    RetrievalError, RetrievalReport, RetrievalStrategy, Retriever,
};
