//! Error types for the retrieval engine with context for callers and logs

use std::path::PathBuf;
use thiserror::Error;

use super::FailedObject;

/// Error type shared by the collaborators, the components and the orchestrators
///
/// Per-object variants (`HttpRequest`, `HttpStatus`, `Timeout`, `Fetch`,
/// `FileSystem`) are recovered inside an orchestrator and end up as a
/// [`FailedObject`] reason. Invocation-level variants propagate to the caller.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Transport-level HTTP failure (connect, TLS, body read)
    #[error("HTTP request to '{url}' failed: {source}")]
    HttpRequest {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Origin answered with a non-success status
    #[error("HTTP {status} from '{url}'")]
    HttpStatus {
        url: String,
        status: u16,
    },

    /// A single attempt exceeded its hard timeout
    #[error("Fetching '{identifier}' timed out after {duration_ms}ms")]
    Timeout {
        identifier: String,
        duration_ms: u64,
    },

    /// Failure reported by a custom byte-fetch collaborator
    #[error("Fetching '{identifier}' failed: {reason}")]
    Fetch {
        identifier: String,
        reason: String,
    },

    /// File system I/O errors with file context
    #[error("File operation failed while {operation} '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        operation: FileOperation,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Display name cannot be used as an archive path or file name
    #[error("Invalid display name '{name}': {reason}")]
    InvalidDisplayName {
        name: String,
        reason: String,
    },

    #[error("No objects to retrieve")]
    EmptyInput,

    #[error("Display name '{name}' is used by more than one object")]
    DuplicateDisplayName {
        name: String,
    },

    #[error("Identifier '{identifier}' appears more than once")]
    DuplicateIdentifier {
        identifier: String,
    },

    /// Configuration errors
    #[error("Invalid configuration: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    #[error("Manifest is not a valid descriptor list: {source}")]
    Manifest {
        #[source]
        source: serde_json::Error,
    },

    /// Zero objects succeeded, so no archive is produced
    #[error("All {total} objects failed to download")]
    AllFailed {
        total: usize,
        failures: Vec<FailedObject>,
    },

    /// The shared cancellation token was triggered
    #[error("Retrieval cancelled after {completed} of {total} objects")]
    Cancelled {
        completed: usize,
        total: usize,
    },

    #[error("Archive assembly failed: {source}")]
    Archive {
        #[from]
        source: zip::result::ZipError,
    },

    #[error("Background task failed: {source}")]
    TaskJoin {
        #[from]
        source: tokio::task::JoinError,
    },
}

/// Types of file operations for error context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Write,
    Create,
    Move,
    CreateDir,
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOperation::Write => write!(f, "writing"),
            FileOperation::Create => write!(f, "creating"),
            FileOperation::Move => write!(f, "moving"),
            FileOperation::CreateDir => write!(f, "creating directory"),
        }
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;

impl RetrievalError {
    /// Whether this error ends the whole invocation rather than one object
    pub fn is_invocation_level(&self) -> bool {
        matches!(
            self,
            RetrievalError::EmptyInput
                | RetrievalError::DuplicateDisplayName { .. }
                | RetrievalError::DuplicateIdentifier { .. }
                | RetrievalError::InvalidDisplayName { .. }
                | RetrievalError::Configuration { .. }
                | RetrievalError::AllFailed { .. }
                | RetrievalError::Cancelled { .. }
        )
    }

    /// Whether the caller broke the input contract (rejected before any network activity)
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            RetrievalError::EmptyInput
                | RetrievalError::DuplicateDisplayName { .. }
                | RetrievalError::DuplicateIdentifier { .. }
                | RetrievalError::InvalidDisplayName { .. }
        )
    }

    /// Get error category for metrics and log fields
    pub fn category(&self) -> &'static str {
        match self {
            RetrievalError::HttpRequest { .. } => "http",
            RetrievalError::HttpStatus { .. } => "http_status",
            RetrievalError::Timeout { .. } => "timeout",
            RetrievalError::Fetch { .. } => "fetch",
            RetrievalError::FileSystem { .. } => "io",
            RetrievalError::InvalidUrl { .. } => "url",
            RetrievalError::InvalidDisplayName { .. } => "display_name",
            RetrievalError::EmptyInput => "empty_input",
            RetrievalError::DuplicateDisplayName { .. } => "duplicate_name",
            RetrievalError::DuplicateIdentifier { .. } => "duplicate_identifier",
            RetrievalError::Configuration { .. } => "configuration",
            RetrievalError::Manifest { .. } => "manifest",
            RetrievalError::AllFailed { .. } => "all_failed",
            RetrievalError::Cancelled { .. } => "cancelled",
            RetrievalError::Archive { .. } => "archive",
            RetrievalError::TaskJoin { .. } => "task",
        }
    }

    pub(crate) fn configuration(field: &str, message: impl Into<String>) -> Self {
        RetrievalError::Configuration {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_carries_http_status_in_message() {
        let err = RetrievalError::HttpStatus {
            url: "https://cdn.example.com/photos/abc".to_string(),
            status: 404,
        };
        assert!(err.to_string().contains("HTTP 404"));
        assert_eq!(err.category(), "http_status");
        assert!(!err.is_invocation_level());
    }

    #[test]
    fn contract_violations_are_invocation_level() {
        let errors = [
            RetrievalError::EmptyInput,
            RetrievalError::DuplicateDisplayName { name: "a.jpg".to_string() },
            RetrievalError::DuplicateIdentifier { identifier: "1".to_string() },
        ];
        for err in errors {
            assert!(err.is_contract_violation(), "{err}");
            assert!(err.is_invocation_level(), "{err}");
        }
    }

    #[test]
    fn cancellation_is_distinct_from_total_failure() {
        let cancelled = RetrievalError::Cancelled { completed: 2, total: 5 };
        let failed = RetrievalError::AllFailed { total: 5, failures: Vec::new() };
        assert_ne!(cancelled.category(), failed.category());
        assert!(!cancelled.is_contract_violation());
    }
}
