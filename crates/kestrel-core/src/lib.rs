//! Core object model for kestrel.
//!
//! This crate provides the records that every kestrel component reads from and
//! writes to the shared store:
//!
//! - **Metadata**: [`ObjectMeta`] and [`OwnerReference`] back-pointers
//! - **Workloads**: [`Pod`] with its [`PodPhase`] lifecycle, [`ReplicaSet`]
//! - **Cluster**: [`Node`] registration records
//! - **Identifiers**: [`Uid`], the immutable identity of a stored object
//!
//! # Example
//!
//! ```
//! use kestrel_core::{Pod, PodPhase, ReplicaSet, Uid};
//!
//! let mut rs = ReplicaSet::new("web", 3);
//! rs.metadata.uid = Some(Uid::generate());
//!
//! let pod = Pod::from_replica_set(&rs, "web-1a2b3").unwrap();
//! assert_eq!(pod.status.phase, PodPhase::Pending);
//! assert!(pod.metadata.is_controlled_by(&rs.controller_ref().unwrap()));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod meta;
pub mod node;
pub mod pod;
pub mod replicaset;

pub use error::{CoreError, Result};
pub use ids::{IdError, Uid};
pub use meta::{ObjectMeta, OwnerReference, NAMESPACE};
pub use node::{Node, NodeSpec, NodeStatus, NODE_KIND};
pub use pod::{
    Container, EnvVar, Pod, PodPhase, PodSpec, PodStatus, PodTemplate, Port, ResourceLimits,
    Volume, VolumeMount, POD_KIND,
};
pub use replicaset::{ReplicaSet, ReplicaSetSpec, ReplicaSetStatus, REPLICA_SET_KIND};
