//! Common error types for kestrel.
//!
//! These errors cover violations detected at the object boundary, before an
//! object reaches any reconciliation logic.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the kestrel system.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An object was submitted without a name.
    #[error("{kind} has an empty name")]
    EmptyName {
        /// The kind of the rejected object.
        kind: &'static str,
    },

    /// An object lists more than one controlling owner.
    #[error("{name} has {count} controller owner references, at most one is allowed")]
    MultipleControllers {
        /// The name of the rejected object.
        name: String,
        /// How many controller references were found.
        count: usize,
    },

    /// An owner object has not been assigned a UID yet.
    #[error("{kind} {name} has no uid")]
    MissingUid {
        /// The kind of the owner.
        kind: &'static str,
        /// The name of the owner.
        name: String,
    },

    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),
}
