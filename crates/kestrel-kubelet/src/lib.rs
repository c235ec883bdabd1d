//! # kestrel-kubelet
//!
//! The kestrel node agent. It watches the pod prefix of the store, decides
//! which pods concern this node, and drives a container runtime until the
//! local pod inventory matches what the control plane assigned.
//!
//! ## Deletion protocol
//!
//! Pods are never removed by deleting their key. The control plane sets the
//! pod's phase to `Delete`; the agent on the assigned node tears the
//! containers down and only then deletes the stored object.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use kestrel_core::Node;
//! use kestrel_kubelet::{AgentConfig, NodeAgent, NoopRuntime};
//! use kestrel_store::{MemoryStore, StoreClient};
//!
//! let store: Arc<dyn StoreClient> = Arc::new(MemoryStore::new());
//! let node = Node::new("node1", "192.168.0.10", "172.17.1.1/24");
//! let agent = NodeAgent::new(&node, &AgentConfig::default(), store, Arc::new(NoopRuntime));
//! assert_eq!(agent.node_name(), "node1");
//! assert!(agent.pods().is_empty());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod agent;
pub mod classify;
pub mod config;
pub mod error;
pub mod node;
pub mod pod_manager;
pub mod queue;
pub mod runtime;

pub use agent::{dispatch, run_sync_loop, NodeAgent, SyncHandler};
pub use classify::classify;
pub use config::AgentConfig;
pub use error::{AgentError, Result};
pub use node::register_node;
pub use pod_manager::{PodManager, PodRecord};
pub use queue::{pod_queue, PodOperation, PodQueueReceiver, PodQueueSender, PodUpdate};
pub use runtime::{ContainerRuntime, ContainerSetInfo, NoopRuntime, PodStats};

#[cfg(any(test, feature = "test-utils"))]
pub use runtime::mock::MockRuntime;
