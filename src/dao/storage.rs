use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend cannot be reached or failed mid-operation.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human-readable description of the failure.
        message: String,
        /// Underlying backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A write hit a uniqueness constraint: a concurrent caller already
    /// inserted rows for the same key.
    #[error("duplicate write on {constraint}")]
    Duplicate {
        /// Name of the violated constraint.
        constraint: &'static str,
    },
    /// A conditional update found the row in a different state than expected.
    #[error("conflicting update: {message}")]
    Conflict {
        /// Description of the expectation that no longer holds.
        message: String,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a duplicate-write error naming the violated constraint.
    pub fn duplicate(constraint: &'static str) -> Self {
        StorageError::Duplicate { constraint }
    }

    /// Construct a conflict error for a failed conditional update.
    pub fn conflict(message: impl Into<String>) -> Self {
        StorageError::Conflict {
            message: message.into(),
        }
    }

    /// Whether this error is a benign lost race on a unique insert.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StorageError::Duplicate { .. })
    }
}
