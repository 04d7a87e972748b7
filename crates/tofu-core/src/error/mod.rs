//! Error types and result aliases for tofu-mirror operations.
//!
//! Provides a unified error type that covers the sync, store and serve paths.
//! Each variant is classified as either fatal for a sync run or recoverable
//! at the granularity it was raised at (address, version, platform, artifact).

use thiserror::Error;

/// Unified error type for all tofu-mirror operations
#[derive(Error, Debug)]
pub enum TofuError {
    // Pre-flight errors
    #[error("Configuration field '{field}' is invalid: {reason}")]
    Config { field: String, reason: String },

    #[error("Service discovery failed for {url}: {reason}")]
    Discovery { url: String, reason: String },

    // Per-address / per-version errors
    #[error("{what} not found in registry")]
    NotFound { what: String },

    #[error("No download location for {address}@{version}")]
    MissingLocation { address: String, version: String },

    // Artifact errors
    #[error("Failed to fetch {url}: {reason}")]
    Fetch {
        url: String,
        reason: String,
        /// HTTP status, when the remote answered at all
        status: Option<u16>,
    },

    #[error("Digest mismatch for {url}: expected {expected}, got {actual}")]
    DigestMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    // Usage errors
    #[error("Snapshot of repository '{repository}' is not committed")]
    IncompleteSnapshot { repository: String },

    #[error("Version ledger error: {reason}")]
    Ledger { reason: String },

    #[error("Sync was cancelled")]
    Cancelled,

    // Transport errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Failed to parse {message}")]
    Parse { message: String },

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for tofu-mirror operations
pub type TofuResult<T> = Result<T, TofuError>;

impl TofuError {
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

    /// Create a configuration error
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error aborts a whole sync run.
    ///
    /// Everything else is recorded against the address, version or artifact
    /// that raised it and the run carries on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TofuError::Config { .. }
                | TofuError::Discovery { .. }
                | TofuError::IncompleteSnapshot { .. }
                | TofuError::Ledger { .. }
                | TofuError::Cancelled
        )
    }

    /// Whether retrying the same request could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            TofuError::Network { .. } => true,
            TofuError::Fetch { status: None, .. } => true,
            TofuError::Fetch {
                status: Some(status),
                ..
            } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            TofuError::Config { .. } => {
                Some("Check the remote and repository sections of tofu-mirror.toml")
            }
            TofuError::Discovery { .. } => Some(
                "Point the remote url at the registry's /.well-known/terraform.json or directly at its API base",
            ),
            TofuError::NotFound { .. } => {
                Some("Check the address spelling in 'includes'; addresses must be fully qualified")
            }
            TofuError::DigestMismatch { .. } => {
                Some("The upstream artifact changed or was corrupted in transit; re-run the sync")
            }
            TofuError::IncompleteSnapshot { .. } => {
                Some("Publish a committed repository version, not a draft")
            }
            TofuError::Network { .. } => Some("Check your internet connection and try again"),
            _ => None,
        }
    }
}
