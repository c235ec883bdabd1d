//! ReplicaSet controller behavior against the in-memory store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use kestrel_controller::{ControllerConfig, ReplicaSetController};
use kestrel_core::{Pod, PodPhase, ReplicaSet, Uid, REPLICA_SET_KIND};
use kestrel_store::{codec, MemoryStore, Operation, ResourceKind, StoreClient};
use tokio_util::sync::CancellationToken;

// =============================================================================
// Helpers
// =============================================================================

fn setup() -> (Arc<MemoryStore>, ReplicaSetController) {
    let store = Arc::new(MemoryStore::new());
    let config = ControllerConfig {
        max_retry: 2,
        retry_interval_ms: 1,
        resync_interval_secs: 3600,
        ..ControllerConfig::default()
    };
    let controller =
        ReplicaSetController::new(&config, Arc::clone(&store) as Arc<dyn StoreClient>);
    (store, controller)
}

fn replica_set(store: &MemoryStore, name: &str, replicas: u32) -> ReplicaSet {
    let mut rs = ReplicaSet::new(name, replicas);
    rs.metadata.uid = Some(Uid::generate());
    rs.spec.template.spec.node_name = "node1".to_string();
    store
        .put_object(ResourceKind::ReplicaSet, name, &rs)
        .unwrap();
    rs
}

/// Store a pod owned by `rs`, created `age_secs` after the epoch.
fn owned_pod(store: &MemoryStore, rs: &ReplicaSet, name: &str, age_secs: i64) -> Pod {
    let mut pod = Pod::from_replica_set(rs, name).unwrap();
    pod.metadata.creation_timestamp = Utc.timestamp_opt(age_secs, 0).single();
    store.put_object(ResourceKind::Pod, name, &pod).unwrap();
    pod
}

fn pods(store: &MemoryStore) -> Vec<Pod> {
    store
        .keys()
        .iter()
        .filter(|k| k.starts_with(&ResourceKind::Pod.prefix()))
        .map(|k| codec::decode(&store.get_raw(k).unwrap()).unwrap())
        .collect()
}

fn stored_rs(store: &MemoryStore, name: &str) -> ReplicaSet {
    codec::decode(&store.get_raw(&ResourceKind::ReplicaSet.key(name)).unwrap()).unwrap()
}

fn live_owned(store: &MemoryStore, rs: &ReplicaSet) -> usize {
    let owner = rs.controller_ref().unwrap();
    pods(store)
        .iter()
        .filter(|p| p.metadata.is_controlled_by(&owner) && !p.is_pending_deletion())
        .count()
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// =============================================================================
// Scale up
// =============================================================================

#[tokio::test]
async fn creates_missing_pods_with_owner_reference() {
    let (store, controller) = setup();
    let rs = replica_set(&store, "rs-a", 3);
    owned_pod(&store, &rs, "rs-a-first", 1);
    store.clear_operations();

    let outcome = controller.reconcile(&rs).await.unwrap();

    assert_eq!(outcome.observed, 1);
    assert_eq!(outcome.created, 2);
    assert_eq!(store.count_ops(Operation::Create), 2);

    let all = pods(&store);
    assert_eq!(all.len(), 3);
    for pod in all.iter().filter(|p| p.name() != "rs-a-first") {
        let owner = pod.metadata.controller_ref().unwrap();
        assert_eq!(owner.kind, REPLICA_SET_KIND);
        assert_eq!(owner.name, "rs-a");
        assert_eq!(Some(owner.uid), rs.metadata.uid);
        assert!(owner.controller);
        assert!(pod.name().starts_with("rs-a-"));
        assert_eq!(pod.spec.node_name, "node1");
        assert!(pod.metadata.uid.is_some());
    }
}

#[tokio::test]
async fn issues_exactly_desired_creates_from_empty() {
    let (store, controller) = setup();
    let rs = replica_set(&store, "web", 4);
    store.clear_operations();

    let outcome = controller.reconcile(&rs).await.unwrap();

    assert_eq!(outcome.created, 4);
    assert_eq!(store.count_ops(Operation::Create), 4);
    assert_eq!(live_owned(&store, &rs), 4);
}

#[tokio::test]
async fn ignores_pods_of_other_owners_and_pending_deletion() {
    let (store, controller) = setup();
    let rs = replica_set(&store, "web", 2);
    let other = replica_set(&store, "other", 5);
    owned_pod(&store, &other, "other-1", 1);
    let mut leaving = owned_pod(&store, &rs, "web-leaving", 2);
    leaving.mark_for_deletion();
    store
        .put_object(ResourceKind::Pod, "web-leaving", &leaving)
        .unwrap();
    store.put_object(ResourceKind::Pod, "loose", &Pod::new("loose")).unwrap();

    let outcome = controller.reconcile(&rs).await.unwrap();

    assert_eq!(outcome.observed, 0);
    assert_eq!(outcome.created, 2);
}

// =============================================================================
// Scale down
// =============================================================================

#[tokio::test]
async fn marks_newest_excess_pods_for_deletion() {
    let (store, controller) = setup();
    let rs = replica_set(&store, "web", 2);
    for (i, name) in ["web-a", "web-b", "web-c", "web-d", "web-e"].iter().enumerate() {
        owned_pod(&store, &rs, name, i64::try_from(i).unwrap() * 10);
    }
    store.clear_operations();

    let outcome = controller.reconcile(&rs).await.unwrap();

    assert_eq!(outcome.observed, 5);
    assert_eq!(outcome.deleted, 3);
    assert_eq!(store.count_ops(Operation::Create), 0);

    let mut marked: Vec<_> = pods(&store)
        .into_iter()
        .filter(|p| p.status.phase == PodPhase::Delete)
        .map(|p| p.name().to_string())
        .collect();
    marked.sort();
    assert_eq!(marked, vec!["web-c", "web-d", "web-e"]);
    assert_eq!(live_owned(&store, &rs), 2);
}

#[tokio::test]
async fn unscheduled_excess_pods_are_removed_directly() {
    let (store, controller) = setup();
    let mut rs = replica_set(&store, "batch", 0);
    rs.spec.template.spec.node_name.clear();
    owned_pod(&store, &rs, "batch-1", 1);
    owned_pod(&store, &rs, "batch-2", 2);

    let outcome = controller.reconcile(&rs).await.unwrap();

    assert_eq!(outcome.deleted, 2);
    assert!(pods(&store).is_empty());
    assert_eq!(store.count_ops(Operation::Delete), 2);
}

// =============================================================================
// Status write-back
// =============================================================================

#[tokio::test]
async fn writes_observed_count_to_status() {
    let (store, controller) = setup();
    let rs = replica_set(&store, "web", 1);
    owned_pod(&store, &rs, "web-a", 1);
    owned_pod(&store, &rs, "web-b", 2);
    owned_pod(&store, &rs, "web-c", 3);

    let outcome = controller.reconcile(&rs).await.unwrap();

    assert_eq!(stored_rs(&store, "web").status.replicas, outcome.observed);
    assert_eq!(outcome.observed, 3);
}

#[tokio::test]
async fn status_write_failure_is_not_fatal() {
    let (store, controller) = setup();
    let rs = replica_set(&store, "web", 2);
    owned_pod(&store, &rs, "web-a", 1);
    store.clear_operations();
    store.fail_next(Operation::Update, 10);

    let outcome = controller.reconcile(&rs).await.unwrap();

    assert_eq!(outcome.observed, 1);
    assert_eq!(outcome.created, 1);
    assert_eq!(stored_rs(&store, "web").status.replicas, 0);
    assert_eq!(store.count_ops(Operation::Update), 2);
}

#[tokio::test]
async fn replica_set_without_uid_is_rejected_by_reconcile() {
    let (_store, controller) = setup();
    let rs = ReplicaSet::new("web", 1);
    assert!(controller.reconcile(&rs).await.is_err());
}

// =============================================================================
// Event-driven loop
// =============================================================================

#[tokio::test]
async fn run_converges_on_watch_events() {
    let (store, controller) = setup();
    let controller = Arc::new(controller);
    let cancel = CancellationToken::new();
    let handle = {
        let controller = Arc::clone(&controller);
        let cancel = cancel.clone();
        tokio::spawn(async move { controller.run(cancel).await })
    };
    store.wait_for_watchers(2).await;

    let mut rs = replica_set(&store, "web", 3);
    eventually("three pods", || live_owned(&store, &rs) == 3).await;
    eventually("status written", || stored_rs(&store, "web").status.replicas == 3).await;

    rs = stored_rs(&store, "web");
    rs.spec.replicas = 1;
    store
        .put_object(ResourceKind::ReplicaSet, "web", &rs)
        .unwrap();
    eventually("scaled down", || live_owned(&store, &rs) == 1).await;

    let removed = pods(&store)
        .into_iter()
        .find(|p| p.is_pending_deletion())
        .unwrap();
    store.delete(ResourceKind::Pod, removed.name()).await.unwrap();
    eventually("still one pod", || live_owned(&store, &rs) == 1).await;

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("controller did not stop")
        .unwrap();
}

#[tokio::test]
async fn run_assigns_missing_uid() {
    let (store, controller) = setup();
    let controller = Arc::new(controller);
    let cancel = CancellationToken::new();
    let handle = {
        let controller = Arc::clone(&controller);
        let cancel = cancel.clone();
        tokio::spawn(async move { controller.run(cancel).await })
    };
    store.wait_for_watchers(2).await;

    store
        .put_object(ResourceKind::ReplicaSet, "web", &ReplicaSet::new("web", 2))
        .unwrap();
    eventually("uid assigned", || stored_rs(&store, "web").metadata.uid.is_some()).await;
    let rs = stored_rs(&store, "web");
    eventually("two pods", || live_owned(&store, &rs) == 2).await;

    cancel.cancel();
    handle.await.unwrap();
}
