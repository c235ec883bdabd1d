//! Container runtime adapter.
//!
//! The agent never talks to a container engine directly; it goes through
//! [`ContainerRuntime`]. The binary wires in [`NoopRuntime`] until a real
//! engine adapter is configured, and tests use [`mock::MockRuntime`].

use async_trait::async_trait;
use kestrel_core::Pod;
use tracing::debug;

use crate::error::Result;

/// What the runtime reports after materializing a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSetInfo {
    /// Address assigned to the pod, if the runtime allocates one.
    pub pod_ip: Option<String>,
    /// Identifiers of the started containers.
    pub container_ids: Vec<String>,
}

/// A resource sample for one pod.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PodStats {
    /// CPU usage as a percentage of one core.
    pub cpu_percent: f64,
    /// Resident memory in bytes.
    pub memory_bytes: u64,
}

/// Creates, removes and inspects the containers backing a pod.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start every container of `pod`.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Runtime` if the pod cannot be materialized.
    async fn create_container_set(&self, pod: &Pod) -> Result<ContainerSetInfo>;

    /// Stop and remove every container of the named pod.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Runtime` if teardown fails.
    async fn remove_container_set(&self, name: &str) -> Result<()>;

    /// Sample resource usage for `pod`.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Runtime` if the pod cannot be inspected.
    async fn stat(&self, pod: &Pod) -> Result<PodStats>;
}

/// A runtime that accepts every pod without starting anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRuntime;

#[async_trait]
impl ContainerRuntime for NoopRuntime {
    async fn create_container_set(&self, pod: &Pod) -> Result<ContainerSetInfo> {
        debug!(pod = %pod.name(), containers = pod.spec.containers.len(), "Noop runtime create");
        Ok(ContainerSetInfo::default())
    }

    async fn remove_container_set(&self, name: &str) -> Result<()> {
        debug!(pod = %name, "Noop runtime remove");
        Ok(())
    }

    async fn stat(&self, _pod: &Pod) -> Result<PodStats> {
        Ok(PodStats::default())
    }
}

/// In-memory runtime for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use crate::error::AgentError;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::time::Duration;

    #[derive(Default)]
    struct State {
        running: HashSet<String>,
        created: Vec<String>,
        removed: Vec<String>,
        fail_create: HashSet<String>,
        fail_remove: HashSet<String>,
        create_delay: Duration,
        next_ip: u8,
    }

    /// A runtime that tracks pods in memory and can be told to fail.
    #[derive(Default)]
    pub struct MockRuntime {
        state: Mutex<State>,
    }

    impl MockRuntime {
        /// Create a new mock runtime.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make creates of the named pod fail until cleared.
        pub fn fail_create(&self, name: &str) {
            self.state.lock().fail_create.insert(name.to_string());
        }

        /// Make removals of the named pod fail until cleared.
        pub fn fail_remove(&self, name: &str) {
            self.state.lock().fail_remove.insert(name.to_string());
        }

        /// Make every create take at least `delay`.
        pub fn set_create_delay(&self, delay: Duration) {
            self.state.lock().create_delay = delay;
        }

        /// Clear all injected failures.
        pub fn clear_failures(&self) {
            let mut state = self.state.lock();
            state.fail_create.clear();
            state.fail_remove.clear();
        }

        /// Names passed to successful creates, in call order.
        #[must_use]
        pub fn created(&self) -> Vec<String> {
            self.state.lock().created.clone()
        }

        /// Names passed to successful removals, in call order.
        #[must_use]
        pub fn removed(&self) -> Vec<String> {
            self.state.lock().removed.clone()
        }

        /// Check whether the named pod currently has containers.
        #[must_use]
        pub fn is_running(&self, name: &str) -> bool {
            self.state.lock().running.contains(name)
        }
    }

    #[async_trait]
    impl ContainerRuntime for MockRuntime {
        async fn create_container_set(&self, pod: &Pod) -> Result<ContainerSetInfo> {
            let delay = self.state.lock().create_delay;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let mut state = self.state.lock();
            let name = pod.name().to_string();
            if state.fail_create.contains(&name) {
                return Err(AgentError::runtime(name, "image pull failed"));
            }
            state.next_ip = state.next_ip.wrapping_add(1);
            let pod_ip = format!("10.0.0.{}", state.next_ip);
            state.running.insert(name.clone());
            state.created.push(name.clone());
            Ok(ContainerSetInfo {
                pod_ip: Some(pod_ip),
                container_ids: pod
                    .spec
                    .containers
                    .iter()
                    .map(|c| format!("{name}-{}", c.name))
                    .collect(),
            })
        }

        async fn remove_container_set(&self, name: &str) -> Result<()> {
            let mut state = self.state.lock();
            if state.fail_remove.contains(name) {
                return Err(AgentError::runtime(name, "container stop timed out"));
            }
            state.running.remove(name);
            state.removed.push(name.to_string());
            Ok(())
        }

        async fn stat(&self, pod: &Pod) -> Result<PodStats> {
            if self.is_running(pod.name()) {
                Ok(PodStats {
                    cpu_percent: 1.5,
                    memory_bytes: 64 * 1024 * 1024,
                })
            } else {
                Err(AgentError::runtime(pod.name(), "no such container set"))
            }
        }
    }
}
