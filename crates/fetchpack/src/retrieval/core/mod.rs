//! Core types used throughout the retrieval engine
//!
//! This module contains the fundamental types that all other modules depend on:
//! the input descriptor, the per-object outcome, the error type, progress
//! reporting and the two collaborator seams (byte fetching and file saving).

pub mod error;
pub mod fetch;
pub mod files;
pub mod progress;
pub mod validation;

// Re-export main types for convenience
pub use error::{FileOperation, Result, RetrievalError};
pub use fetch::{ByteFetcher, HttpFetcher};
pub use files::{DirectorySink, FileSink};
pub use progress::{
    AggregateProgress, ConsoleProgressReporter, IntoProgressCallback, NullProgressReporter,
    ProgressCallback, ProgressReporter,
};
pub use validation::{check_display_name, normalize_display_name, validate_objects};

use serde::{Deserialize, Serialize};

/// Descriptor of one remote object to retrieve
///
/// Supplied by the caller, immutable for the duration of one invocation.
/// The identifier must be unique within the invocation and the display name
/// is used verbatim as the archive entry name or saved file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievableObject {
    pub identifier: String,
    pub display_name: String,
    #[serde(default)]
    pub byte_size_hint: u64,
}

impl RetrievableObject {
    pub fn new<I: Into<String>, N: Into<String>>(identifier: I, display_name: N, byte_size_hint: u64) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: display_name.into(),
            byte_size_hint,
        }
    }
}

/// Result of retrieving one object after internal retries are exhausted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success { bytes: Vec<u8> },
    Failure { reason: String },
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }
}

/// An object whose retrieval failed for good, with the last reason seen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedObject {
    pub display_name: String,
    pub identifier: String,
    pub reason: String,
    /// Fetch attempts made; a progressive-mode save failure keeps the attempt count of the fetch
    pub attempts: usize,
}

/// Parse a JSON array of descriptors
///
/// ```
/// let objects = fetchpack::parse_manifest(
///     r#"[{"identifier": "42", "display_name": "beach.jpg", "byte_size_hint": 1024}]"#,
/// ).unwrap();
/// assert_eq!(objects[0].display_name, "beach.jpg");
/// ```
pub fn parse_manifest(json: &str) -> Result<Vec<RetrievableObject>> {
    serde_json::from_str(json).map_err(|source| RetrievalError::Manifest { source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_size_hint_defaults_to_zero() {
        let objects = parse_manifest(r#"[{"identifier": "a1", "display_name": "a.mp4"}]"#).unwrap();
        assert_eq!(objects, vec![RetrievableObject::new("a1", "a.mp4", 0)]);
    }

    #[test]
    fn malformed_manifest_is_reported() {
        let err = parse_manifest(r#"{"identifier": "a1"}"#).unwrap_err();
        assert_eq!(err.category(), "manifest");
    }
}
