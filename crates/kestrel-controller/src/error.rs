//! Error types for the ReplicaSet controller.

use kestrel_core::CoreError;
use kestrel_store::StoreError;
use thiserror::Error;

/// A result type using `ControllerError`.
pub type Result<T> = std::result::Result<T, ControllerError>;

/// Errors that can occur while reconciling.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An object failed boundary validation.
    #[error("invalid object: {0}")]
    Invalid(#[from] CoreError),
}

impl ControllerError {
    /// Check if this error is transient and the operation worth retrying.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retriable(),
            Self::Invalid(_) => false,
        }
    }
}
