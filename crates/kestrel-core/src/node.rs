//! Node registration records.

use serde::{Deserialize, Serialize};

use crate::meta::ObjectMeta;

/// Kind string used for nodes.
pub const NODE_KIND: &str = "Node";

/// A worker node running a node agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Object metadata; the name is the node identity pods are assigned to.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Static configuration of the node.
    #[serde(default)]
    pub spec: NodeSpec,
    /// Observed state (currently empty).
    #[serde(default)]
    pub status: NodeStatus,
}

/// Static configuration of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    /// The node's physical address.
    #[serde(default)]
    pub physical_ip: String,
    /// The pod subnet assigned to this node, in CIDR notation.
    #[serde(default)]
    pub pod_cidr: String,
}

/// Observed state of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {}

impl Node {
    /// Create a node record.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        physical_ip: impl Into<String>,
        pod_cidr: impl Into<String>,
    ) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
            spec: NodeSpec {
                physical_ip: physical_ip.into(),
                pod_cidr: pod_cidr.into(),
            },
            status: NodeStatus {},
        }
    }

    /// Validate the node at the object boundary.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::EmptyName` if the node has no name.
    pub fn validate(&self) -> crate::Result<()> {
        self.metadata.validate(NODE_KIND)
    }
}
