//! # kestrel-controller
//!
//! The ReplicaSet controller keeps the number of live pods owned by each
//! replica set equal to its desired replica count.
//!
//! A pod belongs to a replica set when its controller owner reference has
//! kind `RS` and the set's UID. Pods whose phase is `Delete` are on their way
//! out and are not counted. Missing pods are stamped out of the set's
//! template; excess pods are marked for deletion (newest first) and left for
//! the node agent to tear down.
//!
//! Only one controller instance should run against a store at a time.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use kestrel_controller::{ControllerConfig, ReplicaSetController};
//! use kestrel_core::{ReplicaSet, Uid};
//! use kestrel_store::{MemoryStore, ResourceKind, StoreClient};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = Arc::new(MemoryStore::new());
//! let controller = ReplicaSetController::new(
//!     &ControllerConfig::default(),
//!     Arc::clone(&store) as Arc<dyn StoreClient>,
//! );
//!
//! let mut rs = ReplicaSet::new("web", 2);
//! rs.metadata.uid = Some(Uid::generate());
//! store.put_object(ResourceKind::ReplicaSet, "web", &rs).unwrap();
//!
//! let outcome = controller.reconcile(&rs).await.unwrap();
//! assert_eq!(outcome.created, 2);
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod replicaset;

pub use config::ControllerConfig;
pub use error::{ControllerError, Result};
pub use replicaset::{ReconcileOutcome, ReplicaSetController};
