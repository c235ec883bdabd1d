//! Pod records and their lifecycle phase.
//!
//! A pod is assigned to a node exactly once (by the scheduler) through
//! `spec.nodeName`. Deletion is a two-phase protocol: the control plane sets
//! the phase to [`PodPhase::Delete`], the owning node agent tears the
//! containers down, and only then is the record removed from the store.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::Uid;
use crate::meta::{null_as_default, ObjectMeta};
use crate::replicaset::ReplicaSet;

/// Kind string used for pods.
pub const POD_KIND: &str = "Pod";

/// A pod: one or more containers scheduled together on a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    /// Object metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Desired state.
    #[serde(default)]
    pub spec: PodSpec,
    /// Observed state.
    #[serde(default)]
    pub status: PodStatus,
}

impl Pod {
    /// Create an empty pending pod with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
            ..Default::default()
        }
    }

    /// Stamp out a new pod from a replica set's template.
    ///
    /// The pod receives a fresh UID, the template's labels and spec, and a
    /// controller owner reference pointing back at `rs`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::MissingUid` if the replica set has no UID and
    /// `CoreError::EmptyName` if `name` is empty.
    pub fn from_replica_set(rs: &ReplicaSet, name: impl Into<String>) -> Result<Self> {
        let owner = rs.controller_ref()?;
        let template = &rs.spec.template;

        let pod = Self {
            metadata: ObjectMeta {
                name: name.into(),
                labels: template.metadata.labels.clone(),
                uid: Some(Uid::generate()),
                owner_references: vec![owner],
                creation_timestamp: Some(Utc::now()),
            },
            spec: template.spec.clone(),
            status: PodStatus::default(),
        };
        pod.validate()?;
        Ok(pod)
    }

    /// The pod's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// The node this pod is assigned to, if the scheduler has placed it.
    #[must_use]
    pub fn node_name(&self) -> Option<&str> {
        Some(self.spec.node_name.as_str()).filter(|n| !n.is_empty())
    }

    /// Check whether the pod is assigned to `node`.
    #[must_use]
    pub fn is_assigned_to(&self, node: &str) -> bool {
        self.node_name() == Some(node)
    }

    /// Check whether the control plane has asked for this pod to be removed.
    #[must_use]
    pub fn is_pending_deletion(&self) -> bool {
        self.status.phase == PodPhase::Delete
    }

    /// Set the deletion sentinel on this pod.
    pub fn mark_for_deletion(&mut self) {
        self.status.phase = PodPhase::Delete;
    }

    /// Validate the pod at the object boundary.
    ///
    /// # Errors
    ///
    /// See [`ObjectMeta::validate`].
    pub fn validate(&self) -> Result<()> {
        self.metadata.validate(POD_KIND)
    }
}

/// Desired state of a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    /// Volumes available to the pod's containers.
    #[serde(default, deserialize_with = "null_as_default")]
    pub volumes: Vec<Volume>,
    /// The containers that make up the pod.
    #[serde(default, deserialize_with = "null_as_default")]
    pub containers: Vec<Container>,
    /// Node the pod is assigned to; empty until scheduled.
    #[serde(default)]
    pub node_name: String,
}

/// Observed state of a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodStatus {
    /// Lifecycle phase.
    #[serde(default)]
    pub phase: PodPhase,
    /// Address of the node hosting the pod.
    #[serde(default, rename = "hostIP")]
    pub host_ip: String,
    /// Address allocated to the pod.
    #[serde(default, rename = "podIP")]
    pub pod_ip: String,
    /// The last error reported for this pod.
    #[serde(default, rename = "lastError", alias = "Err")]
    pub last_error: String,
}

/// Lifecycle phase of a pod.
///
/// `Delete` is not a runtime state: it is the soft-delete marker the control
/// plane sets to request teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PodPhase {
    /// Accepted but not yet materialized on a node.
    #[default]
    Pending,
    /// At least one container is running.
    Running,
    /// All containers terminated successfully.
    Succeeded,
    /// At least one container failed.
    Failed,
    /// Phase cannot be determined.
    Unknown,
    /// The control plane wants this pod gone.
    Delete,
}

impl PodPhase {
    /// The stored string form of this phase.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
            Self::Delete => "Delete",
        }
    }

    /// Parse a stored phase string.
    ///
    /// An empty string is a pod nobody has reported on yet and maps to
    /// `Pending`; anything unrecognised maps to `Unknown`.
    #[must_use]
    pub fn parse(phase: &str) -> Self {
        match phase {
            "" | "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            "Delete" => Self::Delete,
            _ => Self::Unknown,
        }
    }

    /// Check if the pod has run to completion.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl From<String> for PodPhase {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<PodPhase> for String {
    fn from(phase: PodPhase) -> Self {
        phase.as_str().to_string()
    }
}

impl std::fmt::Display for PodPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A template from which pods are stamped out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodTemplate {
    /// Metadata copied onto each pod (labels only; names are generated).
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Spec copied onto each pod.
    #[serde(default)]
    pub spec: PodSpec,
}

/// A volume declared by a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Volume name referenced by mounts.
    pub name: String,
    /// Volume type (e.g. `hostPath`, `emptyDir`).
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Host path backing the volume, if any.
    #[serde(default)]
    pub path: String,
}

/// A single container within a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Container name, unique within the pod.
    pub name: String,
    /// Image reference.
    #[serde(default)]
    pub image: String,
    /// Entrypoint override.
    #[serde(default, deserialize_with = "null_as_default")]
    pub command: Vec<String>,
    /// Arguments to the entrypoint.
    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Vec<String>,
    /// Volumes mounted into the container.
    #[serde(default, deserialize_with = "null_as_default")]
    pub volume_mounts: Vec<VolumeMount>,
    /// Resource limits.
    #[serde(default)]
    pub limits: ResourceLimits,
    /// Exposed ports.
    #[serde(default, deserialize_with = "null_as_default")]
    pub ports: Vec<Port>,
    /// Environment variables.
    #[serde(default, deserialize_with = "null_as_default")]
    pub env: Vec<EnvVar>,
}

/// A volume mount inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    /// Name of the pod volume to mount.
    pub name: String,
    /// Path inside the container.
    pub mount_path: String,
}

/// Resource limits for a container, in the stored string notation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU limit (e.g. `500m`).
    #[serde(default)]
    pub cpu: String,
    /// Memory limit (e.g. `128Mi`).
    #[serde(default)]
    pub memory: String,
}

/// An exposed container port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    /// The port number inside the container.
    pub container_port: String,
}

/// An environment variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    /// Variable name.
    pub name: String,
    /// Variable value.
    #[serde(default)]
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    #[test]
    fn phase_parse() {
        assert_eq!(PodPhase::parse("Pending"), PodPhase::Pending);
        assert_eq!(PodPhase::parse(""), PodPhase::Pending);
        assert_eq!(PodPhase::parse("Running"), PodPhase::Running);
        assert_eq!(PodPhase::parse("Delete"), PodPhase::Delete);
        assert_eq!(PodPhase::parse("Bogus"), PodPhase::Unknown);
    }

    #[test]
    fn phase_terminal() {
        assert!(PodPhase::Succeeded.is_terminal());
        assert!(PodPhase::Failed.is_terminal());
        assert!(!PodPhase::Delete.is_terminal());
        assert!(!PodPhase::Running.is_terminal());
    }

    #[test]
    fn node_assignment() {
        let mut pod = Pod::new("web-1");
        assert_eq!(pod.node_name(), None);
        assert!(!pod.is_assigned_to("node1"));

        pod.spec.node_name = "node1".to_string();
        assert_eq!(pod.node_name(), Some("node1"));
        assert!(pod.is_assigned_to("node1"));
        assert!(!pod.is_assigned_to("node2"));
    }

    #[test]
    fn deletion_sentinel() {
        let mut pod = Pod::new("web-1");
        assert!(!pod.is_pending_deletion());
        pod.mark_for_deletion();
        assert!(pod.is_pending_deletion());
    }

    #[test]
    fn decode_stored_record() {
        let json = r#"{
            "metadata": {"name": "web-1", "labels": {"app": "web"}, "uid": "", "ownerReferences": null},
            "spec": {
                "volumes": null,
                "containers": [{
                    "name": "nginx",
                    "image": "nginx:1.25",
                    "command": null,
                    "args": null,
                    "volumeMounts": [{"name": "data", "mountPath": "/data"}],
                    "limits": {"cpu": "500m", "memory": "128Mi"},
                    "ports": [{"containerPort": "80"}],
                    "env": [{"name": "MODE", "value": "prod"}]
                }],
                "nodeName": "node1"
            },
            "status": {"phase": "Delete", "hostIP": "10.0.0.2", "podIP": "", "Err": "boom"}
        }"#;

        let pod: Pod = serde_json::from_str(json).unwrap();
        assert_eq!(pod.name(), "web-1");
        assert_eq!(pod.metadata.labels.get("app").map(String::as_str), Some("web"));
        assert_eq!(pod.spec.containers[0].volume_mounts[0].mount_path, "/data");
        assert_eq!(pod.spec.containers[0].limits.memory, "128Mi");
        assert!(pod.is_assigned_to("node1"));
        assert!(pod.is_pending_deletion());
        assert_eq!(pod.status.host_ip, "10.0.0.2");
        assert_eq!(pod.status.last_error, "boom");
    }

    #[test]
    fn encode_status_field_names() {
        let mut pod = Pod::new("web-1");
        pod.status.phase = PodPhase::Running;
        pod.status.pod_ip = "172.17.1.5".to_string();

        let value = serde_json::to_value(&pod).unwrap();
        assert_eq!(value["status"]["phase"], "Running");
        assert_eq!(value["status"]["podIP"], "172.17.1.5");
        assert!(value["spec"].get("nodeName").is_some());
    }

    #[test]
    fn from_replica_set_stamps_owner() {
        let mut rs = ReplicaSet::new("rs-a", 3);
        rs.metadata.uid = Some(Uid::generate());
        rs.spec
            .template
            .metadata
            .labels
            .insert("app".to_string(), "web".to_string());

        let pod = Pod::from_replica_set(&rs, "rs-a-abcde").unwrap();
        let owner = pod.metadata.controller_ref().unwrap();

        assert_eq!(owner.kind, "RS");
        assert_eq!(owner.name, "rs-a");
        assert_eq!(Some(owner.uid), rs.metadata.uid);
        assert!(owner.controller);
        assert!(pod.metadata.uid.is_some());
        assert!(pod.metadata.creation_timestamp.is_some());
        assert_eq!(pod.metadata.labels.get("app").map(String::as_str), Some("web"));
        assert_eq!(pod.status.phase, PodPhase::Pending);
    }

    #[test]
    fn from_replica_set_requires_uid_and_name() {
        let rs = ReplicaSet::new("rs-a", 1);
        assert!(matches!(
            Pod::from_replica_set(&rs, "rs-a-1"),
            Err(CoreError::MissingUid { .. })
        ));

        let mut rs = ReplicaSet::new("rs-a", 1);
        rs.metadata.uid = Some(Uid::generate());
        assert!(matches!(
            Pod::from_replica_set(&rs, ""),
            Err(CoreError::EmptyName { .. })
        ));
    }
}
