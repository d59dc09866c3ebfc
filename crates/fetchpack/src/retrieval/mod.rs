//! Retrieval module
//!
//! This module contains the whole retrieval engine: core types and
//! collaborators, configuration, the limiter, retry and throughput
//! components, archive assembly and the two orchestration strategies.

pub mod archive;
pub mod archived;
pub mod config;
pub mod core;
pub mod limiter;
pub mod metrics;
pub mod progressive;
pub mod retriever;
pub mod retry;
pub mod throughput;
mod tracker;

// Re-export main types for convenience
pub use archive::{ArchiveAssembler, ArchiveBlob, ArchiveCompression, ArchiveEntry};
pub use archived::{ArchivedRun, ArchivedSummary, BulkOrchestrator};
pub use config::RetrievalConfig;
pub use core::{
    parse_manifest, AggregateProgress, ByteFetcher, ConsoleProgressReporter, DirectorySink, FailedObject,
    FetchOutcome, FileOperation, FileSink, HttpFetcher, IntoProgressCallback, NullProgressReporter,
    ProgressCallback, ProgressReporter, Result, RetrievableObject, RetrievalError,
};
pub use limiter::ConcurrencyLimiter;
pub use metrics::{RetrievalMetrics, RetrievalMetricsSnapshot};
pub use progressive::{ProgressiveRun, SavedObject, SequentialOrchestrator};
pub use retriever::{RetrievalReport, RetrievalStrategy, Retriever};
pub use retry::{RetryError, RetryPolicy, Retrieved};
pub use throughput::{RunStatistics, ThroughputEstimate, ThroughputEstimator};
