//! # kestrel-store
//!
//! Access to the cluster's key-value store for kestrel.
//!
//! This crate provides:
//! - The [`StoreClient`] trait: create, update, delete, get, list and watch
//!   registration against `/registry/...` keys
//! - [`HttpStoreClient`], talking to the API server over HTTP
//! - `MemoryStore`, an in-process store for tests (feature `test-utils`)
//! - [`EventRouter`], which keeps a watch alive and turns raw notifications
//!   into typed events
//! - [`RetryPolicy`], the bounded fixed-interval retry used by every component
//!
//! ## Watch routing
//!
//! ```text
//! ┌──────────────┐  register_watch   ┌─────────────┐  ObjectEvent<T>  ┌──────────┐
//! │ StoreClient  │ ◄──────────────── │ EventRouter │ ───────────────► │ consumer │
//! │              │ ──── events ────► │  (decode)   │   (bounded)      │          │
//! └──────────────┘                   └─────────────┘                  └──────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use kestrel_core::Pod;
//! use kestrel_store::{codec, MemoryStore, ResourceKind, StoreClient};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = Arc::new(MemoryStore::new());
//! let pod = Pod::new("web-1");
//! store
//!     .create(ResourceKind::Pod, "web-1", codec::encode(&pod).unwrap())
//!     .await
//!     .unwrap();
//!
//! let fetched: Option<Pod> = codec::get_object(store.as_ref(), ResourceKind::Pod, "web-1")
//!     .await
//!     .unwrap();
//! assert_eq!(fetched, Some(pod));
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod codec;
pub mod error;
pub mod http;
pub mod keys;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod retry;
pub mod router;
pub mod subnet;
pub mod types;

use async_trait::async_trait;

pub use error::{Result, StoreError};
pub use http::HttpStoreClient;
pub use keys::{name_from_key, ResourceKind};
#[cfg(any(test, feature = "test-utils"))]
pub use memory::{MemoryStore, Operation, StoreOp};
pub use retry::RetryPolicy;
pub use router::{EventRouter, ObjectEvent};
pub use subnet::{NodeSubnet, SubnetAllocator};
pub use types::{ChangeType, RawObject, WatchEvent, WatchSubscription, WatchTicket};

/// Access to the cluster store.
///
/// Objects are addressed by resource kind and name; the key layout is
/// described in [`keys`]. Payloads are opaque bytes here; use [`codec`] to
/// move between bytes and typed objects.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Create a new object.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the key is taken, or a transport error.
    async fn create(&self, kind: ResourceKind, name: &str, value: Vec<u8>) -> Result<()>;

    /// Replace an existing object.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the key does not exist, or a transport error.
    async fn update(&self, kind: ResourceKind, name: &str, value: Vec<u8>) -> Result<()>;

    /// Remove an object.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the key does not exist, or a transport error.
    async fn delete(&self, kind: ResourceKind, name: &str) -> Result<()>;

    /// Fetch an object, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn get(&self, kind: ResourceKind, name: &str) -> Result<Option<Vec<u8>>>;

    /// Fetch every object under a key prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn list(&self, prefix: &str) -> Result<Vec<RawObject>>;

    /// Register a watch on a key prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the store refuses or cannot be reached.
    async fn register_watch(&self, prefix: &str) -> Result<WatchSubscription>;
}
