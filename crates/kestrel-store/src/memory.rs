//! In-process store.
//!
//! `MemoryStore` implements [`StoreClient`] over a sorted map and fans out
//! watch notifications to every registered prefix. It records every call and
//! can be told to fail upcoming calls, which makes it the store of choice for
//! exercising agents and controllers in tests.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::codec;
use crate::error::{Result, StoreError};
use crate::keys::ResourceKind;
use crate::types::{RawObject, WatchEvent, WatchSubscription, WatchTicket};
use crate::StoreClient;

/// The operations a store client performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `create`
    Create,
    /// `update`
    Update,
    /// `delete`
    Delete,
    /// `get`
    Get,
    /// `list`
    List,
    /// `register_watch`
    RegisterWatch,
}

/// One recorded call against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOp {
    /// Which operation was called.
    pub operation: Operation,
    /// The key (or prefix) it addressed.
    pub key: String,
}

struct Watcher {
    prefix: String,
    tx: mpsc::UnboundedSender<Result<WatchEvent>>,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<String, Vec<u8>>,
    watchers: Vec<Watcher>,
    next_ticket: i64,
    ops: Vec<StoreOp>,
    faults: HashMap<Operation, u32>,
}

impl Inner {
    fn record(&mut self, operation: Operation, key: &str) -> Result<()> {
        self.ops.push(StoreOp {
            operation,
            key: key.to_string(),
        });
        match self.faults.get_mut(&operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(StoreError::Transport(format!(
                    "injected {operation:?} failure on {key}"
                )))
            }
            _ => Ok(()),
        }
    }

    fn notify(&mut self, event: &WatchEvent) {
        self.watchers.retain(|w| {
            if !event.key.starts_with(&w.prefix) {
                return !w.tx.is_closed();
            }
            w.tx.send(Ok(event.clone())).is_ok()
        });
    }
}

/// An in-memory [`StoreClient`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write raw bytes at `key`, creating or replacing it, and notify watchers.
    pub fn put_raw(&self, key: impl Into<String>, value: Vec<u8>) {
        let key = key.into();
        let mut inner = self.inner.lock();
        inner.objects.insert(key.clone(), value.clone());
        inner.notify(&WatchEvent::put(key, value));
    }

    /// Encode and write an object, creating or replacing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be encoded.
    pub fn put_object<T: Serialize>(&self, kind: ResourceKind, name: &str, object: &T) -> Result<()> {
        self.put_raw(kind.key(name), codec::encode(object)?);
        Ok(())
    }

    /// Read the raw bytes at `key` without recording an operation.
    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().objects.get(key).cloned()
    }

    /// All keys currently stored, in order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().objects.keys().cloned().collect()
    }

    /// Make the next `times` calls of `operation` fail with a transport error.
    pub fn fail_next(&self, operation: Operation, times: u32) {
        self.inner.lock().faults.insert(operation, times);
    }

    /// Every call made so far.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.inner.lock().ops.clone()
    }

    /// Number of calls made of one operation.
    #[must_use]
    pub fn count_ops(&self, operation: Operation) -> usize {
        self.inner
            .lock()
            .ops
            .iter()
            .filter(|op| op.operation == operation)
            .count()
    }

    /// Forget recorded calls.
    pub fn clear_operations(&self) {
        self.inner.lock().ops.clear();
    }

    /// Invalidate every live subscription.
    pub fn close_watches(&self) {
        self.inner.lock().watchers.clear();
    }

    /// Number of subscriptions whose receiver is still alive.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.watchers.retain(|w| !w.tx.is_closed());
        inner.watchers.len()
    }

    /// Wait until at least `count` subscriptions are live.
    pub async fn wait_for_watchers(&self, count: usize) {
        while self.watcher_count() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn create(&self, kind: ResourceKind, name: &str, value: Vec<u8>) -> Result<()> {
        let key = kind.key(name);
        let mut inner = self.inner.lock();
        inner.record(Operation::Create, &key)?;
        if inner.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key));
        }
        inner.objects.insert(key.clone(), value.clone());
        inner.notify(&WatchEvent::put(key, value));
        Ok(())
    }

    async fn update(&self, kind: ResourceKind, name: &str, value: Vec<u8>) -> Result<()> {
        let key = kind.key(name);
        let mut inner = self.inner.lock();
        inner.record(Operation::Update, &key)?;
        match inner.objects.get_mut(&key) {
            Some(slot) => *slot = value.clone(),
            None => return Err(StoreError::NotFound(key)),
        }
        inner.notify(&WatchEvent::put(key, value));
        Ok(())
    }

    async fn delete(&self, kind: ResourceKind, name: &str) -> Result<()> {
        let key = kind.key(name);
        let mut inner = self.inner.lock();
        inner.record(Operation::Delete, &key)?;
        if inner.objects.remove(&key).is_none() {
            return Err(StoreError::NotFound(key));
        }
        inner.notify(&WatchEvent::delete(key));
        Ok(())
    }

    async fn get(&self, kind: ResourceKind, name: &str) -> Result<Option<Vec<u8>>> {
        let key = kind.key(name);
        let mut inner = self.inner.lock();
        inner.record(Operation::Get, &key)?;
        Ok(inner.objects.get(&key).cloned())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<RawObject>> {
        let mut inner = self.inner.lock();
        inner.record(Operation::List, prefix)?;
        Ok(inner
            .objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| RawObject {
                key: key.clone(),
                value: value.clone(),
            })
            .collect())
    }

    async fn register_watch(&self, prefix: &str) -> Result<WatchSubscription> {
        let mut inner = self.inner.lock();
        inner.record(Operation::RegisterWatch, prefix)?;
        inner.next_ticket += 1;
        let ticket = inner.next_ticket;
        let (tx, rx) = mpsc::unbounded_channel();
        inner.watchers.push(Watcher {
            prefix: prefix.to_string(),
            tx,
        });
        Ok(WatchSubscription {
            ticket: WatchTicket {
                path: prefix.to_string(),
                ticket,
            },
            events: rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChangeType;

    #[tokio::test]
    async fn create_rejects_existing_key() {
        let store = MemoryStore::new();
        store.create(ResourceKind::Pod, "a", b"{}".to_vec()).await.unwrap();
        let err = store
            .create(ResourceKind::Pod, "a", b"{}".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn update_and_delete_require_existing_key() {
        let store = MemoryStore::new();
        assert!(store
            .update(ResourceKind::Pod, "a", b"{}".to_vec())
            .await
            .unwrap_err()
            .is_not_found());
        assert!(store
            .delete(ResourceKind::Pod, "a")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn list_is_scoped_to_prefix() {
        let store = MemoryStore::new();
        store.put_raw(ResourceKind::Pod.key("a"), b"1".to_vec());
        store.put_raw(ResourceKind::ReplicaSet.key("a"), b"2".to_vec());
        store.put_raw(ResourceKind::Pod.key("b"), b"3".to_vec());

        let pods = store.list(&ResourceKind::Pod.prefix()).await.unwrap();
        let keys: Vec<_> = pods.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["/registry/pod/default/a", "/registry/pod/default/b"]
        );
    }

    #[tokio::test]
    async fn watch_only_sees_its_prefix() {
        let store = MemoryStore::new();
        let mut sub = store
            .register_watch(&ResourceKind::Pod.prefix())
            .await
            .unwrap();

        store.put_raw(ResourceKind::ReplicaSet.key("rs"), b"x".to_vec());
        store.put_raw(ResourceKind::Pod.key("p"), b"y".to_vec());
        store.delete(ResourceKind::Pod, "p").await.unwrap();

        let first = sub.events.recv().await.unwrap().unwrap();
        assert_eq!(first.change, ChangeType::Put);
        assert_eq!(first.key, "/registry/pod/default/p");
        let second = sub.events.recv().await.unwrap().unwrap();
        assert_eq!(second.change, ChangeType::Delete);
    }

    #[tokio::test]
    async fn injected_faults_are_consumed() {
        let store = MemoryStore::new();
        store.fail_next(Operation::Get, 1);

        assert!(store.get(ResourceKind::Pod, "a").await.is_err());
        assert!(store.get(ResourceKind::Pod, "a").await.unwrap().is_none());
        assert_eq!(store.count_ops(Operation::Get), 2);
    }

    #[tokio::test]
    async fn close_watches_ends_subscriptions() {
        let store = MemoryStore::new();
        let mut sub = store.register_watch("/registry").await.unwrap();
        assert_eq!(sub.ticket.ticket, 1);

        store.close_watches();
        assert!(sub.events.recv().await.is_none());
    }
}
