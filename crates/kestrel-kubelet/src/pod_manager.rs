//! Local pod inventory.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kestrel_core::Pod;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{AgentError, Result};
use crate::runtime::{ContainerRuntime, ContainerSetInfo};

/// A pod materialized on this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRecord {
    /// The pod as it was when materialized.
    pub pod: Pod,
    /// What the runtime reported.
    pub info: ContainerSetInfo,
    /// When the containers were started.
    pub started_at: DateTime<Utc>,
}

/// Maps pod names to runtime records and drives the runtime.
///
/// Only the sync loop mutates the inventory; other readers take a
/// [`snapshot`](Self::snapshot).
pub struct PodManager {
    runtime: Arc<dyn ContainerRuntime>,
    pods: RwLock<HashMap<String, PodRecord>>,
}

impl PodManager {
    /// Create an empty inventory over a runtime.
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            pods: RwLock::new(HashMap::new()),
        }
    }

    /// The runtime adapter in use.
    #[must_use]
    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Materialize `pod` and record it.
    ///
    /// The pod is only recorded if the runtime succeeds.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Invalid` for a pod without a name, or
    /// `AgentError::Runtime` if the runtime fails.
    pub async fn add_pod(&self, pod: &Pod) -> Result<PodRecord> {
        pod.validate()?;

        let info = self.runtime.create_container_set(pod).await?;
        let record = PodRecord {
            pod: pod.clone(),
            info,
            started_at: Utc::now(),
        };
        self.pods
            .write()
            .insert(pod.name().to_string(), record.clone());

        debug!(pod = %pod.name(), "Pod added to inventory");
        Ok(record)
    }

    /// Tear down the named pod and forget it.
    ///
    /// The record is kept if the runtime fails.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::PodNotFound` if the pod is not in the inventory,
    /// or `AgentError::Runtime` if teardown fails.
    pub async fn delete_pod(&self, name: &str) -> Result<PodRecord> {
        if !self.exists(name) {
            return Err(AgentError::PodNotFound(name.to_string()));
        }

        self.runtime.remove_container_set(name).await?;

        let record = self
            .pods
            .write()
            .remove(name)
            .ok_or_else(|| AgentError::PodNotFound(name.to_string()))?;

        debug!(pod = %name, "Pod removed from inventory");
        Ok(record)
    }

    /// Check whether the named pod is in the inventory.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.pods.read().contains_key(name)
    }

    /// Get a copy of one record.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<PodRecord> {
        self.pods.read().get(name).cloned()
    }

    /// A point-in-time copy of the whole inventory.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, PodRecord> {
        self.pods.read().clone()
    }

    /// Number of pods in the inventory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pods.read().len()
    }

    /// Check whether the inventory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pods.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::mock::MockRuntime;

    fn manager() -> (Arc<MockRuntime>, PodManager) {
        let runtime = Arc::new(MockRuntime::new());
        let manager = PodManager::new(Arc::clone(&runtime) as Arc<dyn ContainerRuntime>);
        (runtime, manager)
    }

    #[tokio::test]
    async fn add_records_pod() {
        let (runtime, manager) = manager();
        let record = manager.add_pod(&Pod::new("web-1")).await.unwrap();

        assert!(manager.exists("web-1"));
        assert!(runtime.is_running("web-1"));
        assert_eq!(record.info.pod_ip.as_deref(), Some("10.0.0.1"));
    }

    #[tokio::test]
    async fn failed_add_is_not_recorded() {
        let (runtime, manager) = manager();
        runtime.fail_create("web-1");

        let err = manager.add_pod(&Pod::new("web-1")).await.unwrap_err();
        assert!(matches!(err, AgentError::Runtime { .. }));
        assert!(!manager.exists("web-1"));
    }

    #[tokio::test]
    async fn add_rejects_empty_name() {
        let (runtime, manager) = manager();
        let err = manager.add_pod(&Pod::new("")).await.unwrap_err();

        assert!(matches!(err, AgentError::Invalid(_)));
        assert!(runtime.created().is_empty());
    }

    #[tokio::test]
    async fn delete_missing_pod_is_not_found() {
        let (_, manager) = manager();
        let err = manager.delete_pod("ghost").await.unwrap_err();
        assert!(matches!(err, AgentError::PodNotFound(_)));
    }

    #[tokio::test]
    async fn failed_delete_keeps_record() {
        let (runtime, manager) = manager();
        manager.add_pod(&Pod::new("web-1")).await.unwrap();
        runtime.fail_remove("web-1");

        assert!(manager.delete_pod("web-1").await.is_err());
        assert!(manager.exists("web-1"));

        runtime.clear_failures();
        manager.delete_pod("web-1").await.unwrap();
        assert!(!manager.exists("web-1"));
    }

    #[tokio::test]
    async fn snapshot_is_independent() {
        let (_, manager) = manager();
        manager.add_pod(&Pod::new("web-1")).await.unwrap();

        let mut snapshot = manager.snapshot();
        snapshot.clear();

        assert_eq!(manager.len(), 1);
        assert!(manager.get("web-1").is_some());
    }
}
