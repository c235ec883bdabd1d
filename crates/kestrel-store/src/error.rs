//! Error types for the store layer.

use thiserror::Error;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur talking to the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested key does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// A create targeted a key that already exists.
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// The request never got a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The store answered with a non-success status.
    #[error("store returned {code}: {message}")]
    Status {
        /// HTTP-style status code.
        code: u16,
        /// Response body or reason.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An object failed boundary validation.
    #[error("invalid object: {0}")]
    Invalid(#[from] kestrel_core::CoreError),

    /// The store declared a watch subscription invalid.
    #[error("watch subscription on {0} closed")]
    SubscriptionClosed(String),

    /// A retried operation failed on every attempt.
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// The operation that was retried.
        operation: String,
        /// How many attempts were made.
        attempts: u32,
        /// The error from the final attempt.
        last: Box<StoreError>,
    },

    /// Every node subnet in the cluster range has been handed out.
    #[error("node subnet range exhausted")]
    SubnetsExhausted,
}

impl StoreError {
    /// Check if this error is transient and the operation worth retrying.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::SubscriptionClosed(_) => true,
            Self::Status { code, .. } => *code >= 500,
            _ => false,
        }
    }

    /// Check if this error means the record is absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
