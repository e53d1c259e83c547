//! Error types and result aliases for Trawl operations.
//!
//! Provides a unified error type that covers all error conditions across
//! the Trawl workspace with actionable error messages.

use thiserror::Error;

/// Unified error type for all Trawl operations
#[derive(Error, Debug)]
pub enum TrawlError {
    // Configuration errors
    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    #[error("Unknown repository type '{name}'")]
    UnknownRepositoryType { name: String },

    #[error("Digest algorithm '{name}' is not available")]
    DigestAlgorithmUnavailable { name: String },

    // Repository and transfer errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Transfer of '{url}' failed after {attempts} attempts: {reason}")]
    TransferFailed {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("Repository '{repository}' returned a malformed module for '{spec}': {reason}")]
    MalformedModule {
        repository: String,
        spec: String,
        reason: String,
    },

    // Installation errors
    #[error("Artifact file '{file}' is claimed by both '{first}' and '{second}'")]
    DuplicateArtifact {
        file: String,
        first: String,
        second: String,
    },

    #[error("State file '{path}' is corrupt: {reason}")]
    StateFileCorrupt { path: String, reason: String },

    // Run control
    #[error("Run was cancelled")]
    Cancelled,

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for Trawl operations
pub type TrawlResult<T> = Result<T, TrawlError>;

impl TrawlError {
    /// Create a network error from any error type
    pub fn network<E>(message: String, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Network {
            message,
            source: Some(Box::new(source)),
        }
    }

    /// Create an IO error from std::io::Error
    pub fn io(message: String, source: std::io::Error) -> Self {
        Self::Io { message, source }
    }

    /// Check if this error is worth retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TrawlError::Network { .. } | TrawlError::Io { .. })
    }
}
