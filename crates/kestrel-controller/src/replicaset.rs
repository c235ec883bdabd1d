//! ReplicaSet reconciliation.
//!
//! The controller is level-triggered: any change to a replica set or to one
//! of its pods causes the set to be reconciled from a fresh listing of the
//! store, never from the triggering delta.

use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Duration;

use kestrel_core::{Pod, ReplicaSet, Uid, REPLICA_SET_KIND};
use kestrel_store::{
    codec, EventRouter, ObjectEvent, ResourceKind, RetryPolicy, StoreClient, StoreError,
};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::error::Result;

/// Capacity of the channels between the watches and the event loop.
const EVENT_BUFFER: usize = 64;

/// What a reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Owned pods not pending deletion when the pass started.
    pub observed: u32,
    /// Pods created by this pass.
    pub created: u32,
    /// Pods deleted or marked for deletion by this pass.
    pub deleted: u32,
}

/// Keeps each replica set's pod count at its desired value.
pub struct ReplicaSetController {
    store: Arc<dyn StoreClient>,
    router: EventRouter<dyn StoreClient>,
    policy: RetryPolicy,
    resync_interval: Duration,
}

impl ReplicaSetController {
    /// Create a controller over a store.
    #[must_use]
    pub fn new(config: &ControllerConfig, store: Arc<dyn StoreClient>) -> Self {
        let policy = config.retry_policy();
        Self {
            router: EventRouter::new(Arc::clone(&store), policy),
            store,
            policy,
            resync_interval: config.resync_interval().max(Duration::from_millis(1)),
        }
    }

    /// Run until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("ReplicaSet controller starting");

        let (rs_tx, rs_rx) = mpsc::channel(EVENT_BUFFER);
        let (pod_tx, pod_rx) = mpsc::channel(EVENT_BUFFER);

        tokio::join!(
            self.watch_prefix::<ReplicaSet>(ResourceKind::ReplicaSet.prefix(), rs_tx, cancel.clone()),
            self.watch_prefix::<Pod>(ResourceKind::Pod.prefix(), pod_tx, cancel.clone()),
            self.event_loop(rs_rx, pod_rx, cancel.clone()),
        );

        info!("ReplicaSet controller stopped");
    }

    /// Keep a watch alive, re-establishing it after a terminal failure.
    async fn watch_prefix<T>(
        &self,
        prefix: String,
        sink: mpsc::Sender<ObjectEvent<T>>,
        cancel: CancellationToken,
    ) where
        T: DeserializeOwned + Send,
    {
        loop {
            match self.router.watch(&prefix, sink.clone(), cancel.clone()).await {
                Ok(()) => return,
                Err(e) => error!(prefix = %prefix, error = %e, "Watch failed"),
            }

            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(self.policy.interval) => {}
            }
        }
    }

    async fn event_loop(
        &self,
        mut rs_events: mpsc::Receiver<ObjectEvent<ReplicaSet>>,
        mut pod_events: mpsc::Receiver<ObjectEvent<Pod>>,
        cancel: CancellationToken,
    ) {
        self.resync_all().await;

        let start = tokio::time::Instant::now() + self.resync_interval;
        let mut resync = tokio::time::interval_at(start, self.resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                Some(event) = rs_events.recv() => self.on_replica_set_event(event).await,
                Some(event) = pod_events.recv() => self.on_pod_event(event).await,
                _ = resync.tick() => self.resync_all().await,
            }
        }
    }

    async fn on_replica_set_event(&self, event: ObjectEvent<ReplicaSet>) {
        match event {
            ObjectEvent::Put { object, .. } => self.sync(object).await,
            ObjectEvent::Delete { key } => info!(key = %key, "ReplicaSet removed"),
        }
    }

    async fn on_pod_event(&self, event: ObjectEvent<Pod>) {
        match event {
            ObjectEvent::Put { object, .. } => {
                let Some(owner) = object
                    .metadata
                    .controller_ref()
                    .filter(|r| r.kind == REPLICA_SET_KIND)
                else {
                    return;
                };

                let fetched = self
                    .policy
                    .run("get replica set", || {
                        codec::get_object::<ReplicaSet, _>(
                            self.store.as_ref(),
                            ResourceKind::ReplicaSet,
                            &owner.name,
                        )
                    })
                    .await;
                match fetched {
                    Ok(Some(rs)) if rs.metadata.uid == Some(owner.uid) => self.sync(rs).await,
                    Ok(_) => debug!(pod = %object.name(), owner = %owner.name, "Pod owner no longer exists"),
                    Err(e) => warn!(rs = %owner.name, error = %e, "Failed to fetch pod owner"),
                }
            }
            // The payload is gone, so the owner is unknown.
            ObjectEvent::Delete { .. } => self.resync_all().await,
        }
    }

    /// Reconcile every stored replica set.
    pub async fn resync_all(&self) {
        match self
            .router
            .list::<ReplicaSet>(&ResourceKind::ReplicaSet.prefix())
            .await
        {
            Ok(sets) => {
                debug!(count = sets.len(), "Resyncing replica sets");
                for rs in sets {
                    self.sync(rs).await;
                }
            }
            Err(e) => warn!(error = %e, "Failed to list replica sets"),
        }
    }

    /// Reconcile one replica set, logging instead of failing.
    async fn sync(&self, mut rs: ReplicaSet) {
        if rs.metadata.uid.is_none() {
            let assigned = self.assign_uid(&mut rs).await;
            if let Err(e) = assigned {
                warn!(rs = %rs.name(), error = %e, "Failed to assign replica set UID");
                return;
            }
        }

        match self.reconcile(&rs).await {
            Ok(outcome) if outcome.created > 0 || outcome.deleted > 0 => info!(
                rs = %rs.name(),
                desired = rs.spec.replicas,
                observed = outcome.observed,
                created = outcome.created,
                deleted = outcome.deleted,
                "Reconciled replica set"
            ),
            Ok(outcome) => debug!(rs = %rs.name(), observed = outcome.observed, "Replica set in sync"),
            Err(e) => warn!(rs = %rs.name(), error = %e, "Reconciliation failed"),
        }
    }

    async fn assign_uid(&self, rs: &mut ReplicaSet) -> Result<()> {
        rs.metadata.uid = Some(Uid::generate());
        let value = codec::encode(&*rs)?;
        let name = rs.name();
        self.policy
            .run("assign replica set uid", || {
                self.store.update(ResourceKind::ReplicaSet, name, value.clone())
            })
            .await?;
        info!(rs = %name, "Assigned replica set UID");
        Ok(())
    }

    /// Run one reconciliation pass for `rs`.
    ///
    /// Creates or deletes pods until the owned, non-deleting pod count
    /// matches `spec.replicas`, then writes the observed count to
    /// `status.replicas`. Individual pod and status write failures are
    /// logged and left for the next pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the replica set is invalid or has no UID, or if
    /// its pods cannot be listed.
    pub async fn reconcile(&self, rs: &ReplicaSet) -> Result<ReconcileOutcome> {
        rs.validate()?;
        let owner = rs.controller_ref()?;

        let mut owned: Vec<Pod> = self
            .router
            .list::<Pod>(&ResourceKind::Pod.prefix())
            .await?
            .into_iter()
            .filter(|p| p.metadata.is_controlled_by(&owner) && !p.is_pending_deletion())
            .collect();

        let observed = u32::try_from(owned.len()).unwrap_or(u32::MAX);
        let desired = rs.spec.replicas;
        let mut outcome = ReconcileOutcome {
            observed,
            ..ReconcileOutcome::default()
        };

        if observed < desired {
            for _ in 0..desired - observed {
                match self.create_pod(rs).await {
                    Ok(name) => {
                        debug!(rs = %rs.name(), pod = %name, "Created pod");
                        outcome.created += 1;
                    }
                    Err(e) => warn!(rs = %rs.name(), error = %e, "Failed to create pod"),
                }
            }
        } else if observed > desired {
            sort_newest_first(&mut owned);
            let excess = usize::try_from(observed - desired).unwrap_or(usize::MAX);
            for pod in owned.into_iter().take(excess) {
                let name = pod.name().to_string();
                match self.delete_pod(pod).await {
                    Ok(()) => {
                        debug!(rs = %rs.name(), pod = %name, "Deleted pod");
                        outcome.deleted += 1;
                    }
                    Err(e) => warn!(rs = %rs.name(), pod = %name, error = %e, "Failed to delete pod"),
                }
            }
        }

        self.write_status(rs.name(), observed).await;
        Ok(outcome)
    }

    async fn create_pod(&self, rs: &ReplicaSet) -> Result<String> {
        let name = format!("{}-{}", rs.name(), Uid::generate().short());
        let pod = Pod::from_replica_set(rs, name.as_str())?;
        let value = codec::encode(&pod)?;
        self.policy
            .run("create pod", || {
                self.store.create(ResourceKind::Pod, &name, value.clone())
            })
            .await?;
        Ok(name)
    }

    /// Mark a scheduled pod for deletion, or remove an unscheduled one.
    async fn delete_pod(&self, mut pod: Pod) -> Result<()> {
        let name = pod.name().to_string();

        if pod.node_name().is_none() {
            let result = self
                .policy
                .run("delete pod", || self.store.delete(ResourceKind::Pod, &name))
                .await;
            return match result {
                Ok(()) | Err(StoreError::NotFound(_)) => Ok(()),
                Err(e) => Err(e.into()),
            };
        }

        pod.mark_for_deletion();
        let value = codec::encode(&pod)?;
        self.policy
            .run("mark pod for deletion", || {
                self.store.update(ResourceKind::Pod, &name, value.clone())
            })
            .await?;
        Ok(())
    }

    /// Write `status.replicas`. Failures are logged and left for the next pass.
    async fn write_status(&self, name: &str, observed: u32) {
        if let Err(e) = self.try_write_status(name, observed).await {
            warn!(rs = %name, error = %e, "Failed to write replica set status");
        }
    }

    async fn try_write_status(&self, name: &str, observed: u32) -> Result<()> {
        let current = self
            .policy
            .run("get replica set", || {
                codec::get_object::<ReplicaSet, _>(self.store.as_ref(), ResourceKind::ReplicaSet, name)
            })
            .await?;

        let Some(mut rs) = current else {
            debug!(rs = %name, "Replica set gone, skipping status write");
            return Ok(());
        };
        if rs.status.replicas == observed {
            return Ok(());
        }

        rs.status.replicas = observed;
        let value = codec::encode(&rs)?;
        self.policy
            .run("update replica set status", || {
                self.store.update(ResourceKind::ReplicaSet, name, value.clone())
            })
            .await?;
        debug!(rs = %name, replicas = observed, "Wrote replica set status");
        Ok(())
    }
}

/// Order pods newest first by creation time, then by name descending.
/// Pods without a timestamp count as oldest.
fn sort_newest_first(pods: &mut [Pod]) {
    pods.sort_by_key(|p| Reverse((p.metadata.creation_timestamp, p.name().to_string())));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn pod_at(name: &str, secs: Option<i64>) -> Pod {
        let mut pod = Pod::new(name);
        pod.metadata.creation_timestamp =
            secs.map(|s| Utc.timestamp_opt(s, 0).single().unwrap());
        pod
    }

    #[test]
    fn newest_first_with_name_tie_break() {
        let mut pods = vec![
            pod_at("a", Some(10)),
            pod_at("b", None),
            pod_at("c", Some(30)),
            pod_at("d", Some(30)),
            pod_at("e", Some(20)),
        ];
        sort_newest_first(&mut pods);

        let names: Vec<_> = pods.iter().map(Pod::name).collect();
        assert_eq!(names, vec!["d", "c", "e", "a", "b"]);
    }
}
