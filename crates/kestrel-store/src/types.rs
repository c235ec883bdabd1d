//! Raw records exchanged with the store.

use tokio::sync::mpsc;

use crate::error::Result;

/// The kind of change a watch notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    /// The key was created or overwritten.
    Put,
    /// The key was removed.
    Delete,
}

/// A single change notification delivered by a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// What happened to the key.
    pub change: ChangeType,
    /// The full key.
    pub key: String,
    /// The payload after a put; usually empty for a delete.
    pub value: Vec<u8>,
}

impl WatchEvent {
    /// Build a put notification.
    #[must_use]
    pub fn put(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            change: ChangeType::Put,
            key: key.into(),
            value,
        }
    }

    /// Build a delete notification.
    #[must_use]
    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            change: ChangeType::Delete,
            key: key.into(),
            value: Vec::new(),
        }
    }
}

/// A stored key and its raw payload, as returned by a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObject {
    /// The full key.
    pub key: String,
    /// The raw payload.
    pub value: Vec<u8>,
}

/// Identifies a watch registration with the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTicket {
    /// The prefix being watched.
    pub path: String,
    /// The store-assigned ticket for this registration.
    pub ticket: i64,
}

/// A live watch registration.
///
/// Events arrive in store order for the watched prefix. An `Err` item, or the
/// channel closing, means the store no longer considers the subscription
/// valid.
#[derive(Debug)]
pub struct WatchSubscription {
    /// The registration ticket.
    pub ticket: WatchTicket,
    /// The ordered event stream.
    pub events: mpsc::UnboundedReceiver<Result<WatchEvent>>,
}
