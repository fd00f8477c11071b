//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// An entity that disappeared upstream is not an error: sources report it
/// as `Ok(None)` and the cursor skips it.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Invalid or incomplete cursor settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A required cross reference could not be resolved.
    #[error("could not resolve store dependency for website id: {website_id}")]
    DependencyResolution {
        /// Website whose stores were looked up.
        website_id: i64,
    },

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Malformed response from the remote.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Window arithmetic left the representable date range.
    #[error("sync date out of range")]
    DateOutOfRange,

    /// Fixture data could not be loaded.
    #[error("fixture error: {0}")]
    Fixture(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the caller may retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            _ => false,
        }
    }
}
