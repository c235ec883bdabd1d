//! The node agent.
//!
//! Four concurrent activities make up a running agent:
//!
//! ```text
//!  store ──watch──► classify ──PodUpdate──► sync loop ──► PodManager ──► runtime
//!                      ▲                        │
//!                 list baseline          status / purge ──► store
//!
//!  monitor ──snapshot──► PodManager ──stat──► runtime
//! ```
//!
//! Only the sync loop mutates the pod inventory. Every action is re-checked
//! against the inventory when it is dispatched, so stale classifications
//! collapse into the right operation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kestrel_core::{Node, Pod, PodPhase, PodStatus};
use kestrel_store::{codec, EventRouter, ObjectEvent, ResourceKind, RetryPolicy, StoreClient, StoreError};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::classify::classify;
use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::pod_manager::PodManager;
use crate::queue::{pod_queue, PodOperation, PodQueueReceiver, PodQueueSender, PodUpdate};
use crate::runtime::{ContainerRuntime, PodStats};

/// Handlers the sync loop dispatches queued updates to.
#[async_trait]
pub trait SyncHandler: Send + Sync {
    /// Materialize pods newly assigned to this node.
    async fn handle_pod_additions(&self, pods: Vec<Pod>);

    /// Apply changes to pods already present on this node.
    async fn handle_pod_updates(&self, pods: Vec<Pod>);

    /// Tear down pods that should no longer run on this node.
    async fn handle_pod_removals(&self, pods: Vec<Pod>);
}

/// Route one update to the matching handler.
pub async fn dispatch<H: SyncHandler + ?Sized>(handler: &H, update: PodUpdate) {
    match update.op {
        PodOperation::Add => handler.handle_pod_additions(update.pods).await,
        PodOperation::Update => handler.handle_pod_updates(update.pods).await,
        PodOperation::Delete => handler.handle_pod_removals(update.pods).await,
    }
}

/// Drain the queue one update at a time until cancelled or every producer
/// is gone. An update already being handled runs to completion.
pub async fn run_sync_loop<H: SyncHandler + ?Sized>(
    handler: &H,
    mut queue: PodQueueReceiver,
    cancel: CancellationToken,
) {
    loop {
        let update = tokio::select! {
            () = cancel.cancelled() => break,
            update = queue.pull() => update,
        };
        let Some(update) = update else {
            break;
        };
        dispatch(handler, update).await;
    }
    debug!("Sync loop stopped");
}

/// Drives local containers toward the pods assigned to one node.
pub struct NodeAgent {
    node_name: String,
    node_ip: String,
    store: Arc<dyn StoreClient>,
    router: EventRouter<dyn StoreClient>,
    pods: Arc<PodManager>,
    policy: RetryPolicy,
    monitor_interval: Duration,
    queue_capacity: usize,
    last_error: Mutex<Option<String>>,
}

impl NodeAgent {
    /// Create an agent for a registered node.
    #[must_use]
    pub fn new(
        node: &Node,
        config: &AgentConfig,
        store: Arc<dyn StoreClient>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        let policy = config.retry_policy();
        Self {
            node_name: node.metadata.name.clone(),
            node_ip: node.spec.physical_ip.clone(),
            router: EventRouter::new(Arc::clone(&store), policy),
            store,
            pods: Arc::new(PodManager::new(runtime)),
            policy,
            monitor_interval: config.monitor_interval().max(Duration::from_millis(1)),
            queue_capacity: config.queue_capacity.max(1),
            last_error: Mutex::new(None),
        }
    }

    /// The node this agent serves.
    #[must_use]
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// The local pod inventory.
    #[must_use]
    pub fn pods(&self) -> &Arc<PodManager> {
        &self.pods
    }

    /// The most recent failure, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    fn record_error(&self, err: &AgentError) {
        warn!(node = %self.node_name, error = %err, "Node agent operation failed");
        *self.last_error.lock() = Some(err.to_string());
    }

    /// Run the agent until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(node = %self.node_name, "Node agent starting");

        let (event_tx, event_rx) = mpsc::channel(self.queue_capacity);
        let (queue_tx, queue_rx) = pod_queue(self.queue_capacity);

        tokio::join!(
            self.watch_pods(event_tx, cancel.clone()),
            self.classify_events(event_rx, queue_tx, cancel.clone()),
            run_sync_loop(self, queue_rx, cancel.clone()),
            self.monitor_loop(cancel.clone()),
        );

        info!(node = %self.node_name, "Node agent stopped");
    }

    /// Keep the pod watch alive, re-establishing it after a terminal
    /// registration failure.
    async fn watch_pods(&self, sink: mpsc::Sender<ObjectEvent<Pod>>, cancel: CancellationToken) {
        let prefix = ResourceKind::Pod.prefix();
        loop {
            match self.router.watch(&prefix, sink.clone(), cancel.clone()).await {
                Ok(()) => return,
                Err(e) => {
                    error!(node = %self.node_name, error = %e, "Pod watch failed");
                    self.record_error(&e.into());
                }
            }

            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(self.policy.interval) => {}
            }
        }
    }

    async fn classify_events(
        &self,
        mut events: mpsc::Receiver<ObjectEvent<Pod>>,
        queue: PodQueueSender,
        cancel: CancellationToken,
    ) {
        let prefix = ResourceKind::Pod.prefix();
        let baseline = tokio::select! {
            () = cancel.cancelled() => return,
            listed = self.router.list::<Pod>(&prefix) => listed,
        };
        match baseline {
            Ok(pods) => {
                info!(node = %self.node_name, count = pods.len(), "Loaded pod baseline");
                for pod in pods {
                    if !self.enqueue(&queue, pod, &cancel).await {
                        return;
                    }
                }
            }
            Err(e) => self.record_error(&e.into()),
        }

        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => return,
                event = events.recv() => event,
            };
            match event {
                Some(ObjectEvent::Put { object, .. }) => {
                    if !self.enqueue(&queue, object, &cancel).await {
                        return;
                    }
                }
                // Deletion is signalled through the phase sentinel.
                Some(ObjectEvent::Delete { key }) => {
                    debug!(key = %key, "Ignoring pod key removal");
                }
                None => return,
            }
        }
    }

    /// Classify a pod and queue the resulting action. Returns `false` once
    /// the agent is shutting down.
    async fn enqueue(&self, queue: &PodQueueSender, pod: Pod, cancel: &CancellationToken) -> bool {
        let Some(op) = classify(&pod, &self.node_name, self.pods.exists(pod.name())) else {
            return true;
        };
        debug!(pod = %pod.name(), op = ?op, "Classified pod event");

        tokio::select! {
            () = cancel.cancelled() => false,
            pushed = queue.push(PodUpdate::single(op, pod)) => pushed.is_ok(),
        }
    }

    async fn monitor_loop(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.monitor_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.sample().await;
        }
    }

    /// Sample resource usage for every pod in the inventory.
    pub async fn sample(&self) -> Vec<(String, PodStats)> {
        let snapshot = self.pods.snapshot();
        let mut samples = Vec::with_capacity(snapshot.len());
        for (name, record) in snapshot {
            match self.pods.runtime().stat(&record.pod).await {
                Ok(stats) => {
                    debug!(
                        pod = %name,
                        cpu_percent = stats.cpu_percent,
                        memory_bytes = stats.memory_bytes,
                        "Pod resource sample"
                    );
                    samples.push((name, stats));
                }
                Err(e) => debug!(pod = %name, error = %e, "Pod resource sample failed"),
            }
        }
        samples
    }

    /// Re-classify a queued pod against the inventory as it is now and act
    /// on the result.
    async fn sync_pod(&self, pod: Pod) {
        match classify(&pod, &self.node_name, self.pods.exists(pod.name())) {
            Some(PodOperation::Add | PodOperation::Update) => self.apply_pod(pod).await,
            Some(PodOperation::Delete) => self.stop_pod(pod).await,
            None => debug!(pod = %pod.name(), "Nothing to do for pod"),
        }
    }

    /// Materialize a pod, or re-apply it if it is already present.
    async fn apply_pod(&self, pod: Pod) {
        if self.pods.exists(pod.name()) {
            self.restart_pod(pod).await;
        } else {
            self.start_pod(pod).await;
        }
    }

    async fn start_pod(&self, pod: Pod) {
        match self.pods.add_pod(&pod).await {
            Ok(record) => {
                info!(node = %self.node_name, pod = %pod.name(), "Pod started");
                let status = PodStatus {
                    phase: PodPhase::Running,
                    host_ip: self.node_ip.clone(),
                    pod_ip: record.info.pod_ip.unwrap_or_default(),
                    last_error: String::new(),
                };
                self.report_status(pod.name(), status).await;
            }
            Err(e @ AgentError::Invalid(_)) => self.record_error(&e),
            Err(e) => {
                self.record_error(&e);
                let status = PodStatus {
                    phase: PodPhase::Failed,
                    host_ip: self.node_ip.clone(),
                    pod_ip: String::new(),
                    last_error: e.to_string(),
                };
                self.report_status(pod.name(), status).await;
            }
        }
    }

    /// Delete-then-add, unless only the status changed.
    async fn restart_pod(&self, pod: Pod) {
        if let Some(record) = self.pods.get(pod.name()) {
            if record.pod.spec == pod.spec {
                debug!(pod = %pod.name(), "Pod spec unchanged, keeping containers");
                return;
            }
        }

        info!(node = %self.node_name, pod = %pod.name(), "Pod spec changed, restarting");
        if let Err(e) = self.pods.delete_pod(pod.name()).await {
            self.record_error(&e);
            return;
        }
        self.start_pod(pod).await;
    }

    /// Tear down a local pod. A pod of this node pending deletion is also
    /// removed from the store, whether or not it was running here.
    async fn stop_pod(&self, pod: Pod) {
        if self.pods.exists(pod.name()) {
            if let Err(e) = self.pods.delete_pod(pod.name()).await {
                self.record_error(&e);
                return;
            }
            info!(node = %self.node_name, pod = %pod.name(), "Pod stopped");
        } else {
            debug!(pod = %pod.name(), "Pod not running locally");
        }

        if pod.is_pending_deletion() && pod.is_assigned_to(&self.node_name) {
            self.purge_pod(pod.name()).await;
        }
    }

    /// Complete the two-phase delete by removing the stored object.
    async fn purge_pod(&self, name: &str) {
        let result = self
            .policy
            .run("delete pod", || self.store.delete(ResourceKind::Pod, name))
            .await;
        match result {
            Ok(()) => info!(pod = %name, "Pod removed from store"),
            Err(StoreError::NotFound(_)) => debug!(pod = %name, "Pod already removed from store"),
            Err(e) => self.record_error(&e.into()),
        }
    }

    async fn report_status(&self, name: &str, status: PodStatus) {
        if let Err(e) = self.write_status(name, status).await {
            warn!(pod = %name, error = %e, "Failed to report pod status");
        }
    }

    async fn write_status(&self, name: &str, status: PodStatus) -> Result<()> {
        let current: Option<Pod> = self
            .policy
            .run("get pod", || {
                codec::get_object(self.store.as_ref(), ResourceKind::Pod, name)
            })
            .await?;

        let Some(mut pod) = current else {
            debug!(pod = %name, "Pod no longer stored, skipping status report");
            return Ok(());
        };
        if pod.is_pending_deletion() {
            debug!(pod = %name, "Pod pending deletion, skipping status report");
            return Ok(());
        }
        if pod.status == status {
            return Ok(());
        }

        pod.status = status;
        let value = codec::encode(&pod)?;
        self.policy
            .run("update pod status", || {
                self.store.update(ResourceKind::Pod, name, value.clone())
            })
            .await?;

        debug!(pod = %name, phase = %pod.status.phase, "Reported pod status");
        Ok(())
    }
}

#[async_trait]
impl SyncHandler for NodeAgent {
    async fn handle_pod_additions(&self, pods: Vec<Pod>) {
        for pod in pods {
            self.sync_pod(pod).await;
        }
    }

    async fn handle_pod_updates(&self, pods: Vec<Pod>) {
        for pod in pods {
            self.sync_pod(pod).await;
        }
    }

    async fn handle_pod_removals(&self, pods: Vec<Pod>) {
        for pod in pods {
            self.sync_pod(pod).await;
        }
    }
}
