//! Error types for the node agent.

use kestrel_core::CoreError;
use kestrel_store::StoreError;
use thiserror::Error;

/// A result type using `AgentError`.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors that can occur in the node agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An object failed boundary validation.
    #[error("invalid object: {0}")]
    Invalid(#[from] CoreError),

    /// The container runtime could not materialize or tear down a pod.
    #[error("runtime error for pod {pod}: {message}")]
    Runtime {
        /// The pod being operated on.
        pod: String,
        /// What the runtime reported.
        message: String,
    },

    /// The pod is not in the local inventory.
    #[error("pod not found: {0}")]
    PodNotFound(String),

    /// The pod event queue has no consumer left.
    #[error("pod event queue closed")]
    QueueClosed,
}

impl AgentError {
    /// Build a runtime error for a pod.
    #[must_use]
    pub fn runtime(pod: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Runtime {
            pod: pod.into(),
            message: message.into(),
        }
    }

    /// Check if this error is transient and the operation worth retrying.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retriable(),
            _ => false,
        }
    }
}
