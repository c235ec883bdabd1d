//! Replica sets: keep a number of identical pods alive.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::meta::{ObjectMeta, OwnerReference};
use crate::pod::PodTemplate;

/// Kind string used in owner references pointing at replica sets.
pub const REPLICA_SET_KIND: &str = "RS";

/// A replica set ensures that a specified number of pod replicas exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSet {
    /// Object metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Desired state.
    #[serde(default)]
    pub spec: ReplicaSetSpec,
    /// Last observed state.
    #[serde(default)]
    pub status: ReplicaSetStatus,
}

/// Desired state of a replica set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSetSpec {
    /// Number of pods that should exist.
    #[serde(default)]
    pub replicas: u32,
    /// Template for new pods.
    #[serde(default)]
    pub template: PodTemplate,
}

/// Observed state of a replica set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSetStatus {
    /// Number of owned pods not pending deletion at the last reconciliation.
    #[serde(default)]
    pub replicas: u32,
}

impl ReplicaSet {
    /// Create a replica set with an empty template.
    #[must_use]
    pub fn new(name: impl Into<String>, replicas: u32) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
            spec: ReplicaSetSpec {
                replicas,
                template: PodTemplate::default(),
            },
            status: ReplicaSetStatus::default(),
        }
    }

    /// The replica set's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Build the controller owner reference that pods of this set carry.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::MissingUid` if the replica set has no UID yet.
    pub fn controller_ref(&self) -> Result<OwnerReference> {
        let uid = self.metadata.uid.ok_or_else(|| CoreError::MissingUid {
            kind: REPLICA_SET_KIND,
            name: self.metadata.name.clone(),
        })?;

        Ok(OwnerReference {
            kind: REPLICA_SET_KIND.to_string(),
            name: self.metadata.name.clone(),
            uid,
            controller: true,
        })
    }

    /// Validate the replica set at the object boundary.
    ///
    /// # Errors
    ///
    /// See [`ObjectMeta::validate`].
    pub fn validate(&self) -> Result<()> {
        self.metadata.validate(REPLICA_SET_KIND)
    }
}
