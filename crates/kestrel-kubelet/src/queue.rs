//! The pod event queue.
//!
//! A bounded FIFO between event classification and the sync loop. `push`
//! waits for room, so a slow sync loop throttles classification instead of
//! letting updates pile up.

use kestrel_core::Pod;
use tokio::sync::mpsc;

use crate::error::{AgentError, Result};

/// What the sync loop should do with a batch of pods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PodOperation {
    /// Materialize pods that are not present locally.
    Add,
    /// Re-materialize pods already present locally.
    Update,
    /// Tear down local pods.
    Delete,
}

/// A batch of pods sharing one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodUpdate {
    /// The operation to apply.
    pub op: PodOperation,
    /// The pods, in the order they were classified.
    pub pods: Vec<Pod>,
}

impl PodUpdate {
    /// A batch holding a single pod.
    #[must_use]
    pub fn single(op: PodOperation, pod: Pod) -> Self {
        Self {
            op,
            pods: vec![pod],
        }
    }
}

/// Producer side of the queue.
#[derive(Debug, Clone)]
pub struct PodQueueSender {
    tx: mpsc::Sender<PodUpdate>,
}

/// Consumer side of the queue.
#[derive(Debug)]
pub struct PodQueueReceiver {
    rx: mpsc::Receiver<PodUpdate>,
}

/// Create a queue holding at most `capacity` pending updates (minimum 1).
#[must_use]
pub fn pod_queue(capacity: usize) -> (PodQueueSender, PodQueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (PodQueueSender { tx }, PodQueueReceiver { rx })
}

impl PodQueueSender {
    /// Enqueue an update, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::QueueClosed` if the receiver is gone.
    pub async fn push(&self, update: PodUpdate) -> Result<()> {
        self.tx
            .send(update)
            .await
            .map_err(|_| AgentError::QueueClosed)
    }
}

impl PodQueueReceiver {
    /// Take the next update, or `None` once every sender is dropped.
    pub async fn pull(&mut self) -> Option<PodUpdate> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn preserves_push_order() {
        let (tx, mut rx) = pod_queue(4);
        tx.push(PodUpdate::single(PodOperation::Add, Pod::new("a")))
            .await
            .unwrap();
        tx.push(PodUpdate::single(PodOperation::Update, Pod::new("a")))
            .await
            .unwrap();
        tx.push(PodUpdate::single(PodOperation::Delete, Pod::new("a")))
            .await
            .unwrap();
        drop(tx);

        let mut ops = Vec::new();
        while let Some(update) = rx.pull().await {
            ops.push(update.op);
        }
        assert_eq!(
            ops,
            vec![PodOperation::Add, PodOperation::Update, PodOperation::Delete]
        );
    }

    #[tokio::test]
    async fn push_blocks_until_drained() {
        let (tx, mut rx) = pod_queue(1);
        tx.push(PodUpdate::single(PodOperation::Add, Pod::new("a")))
            .await
            .unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            tx.push(PodUpdate::single(PodOperation::Add, Pod::new("b"))),
        )
        .await;
        assert!(blocked.is_err(), "push should wait for the consumer");

        assert_eq!(rx.pull().await.unwrap().pods[0].name(), "a");
        tx.push(PodUpdate::single(PodOperation::Add, Pod::new("b")))
            .await
            .unwrap();
        assert_eq!(rx.pull().await.unwrap().pods[0].name(), "b");
    }

    #[tokio::test]
    async fn push_fails_without_consumer() {
        let (tx, rx) = pod_queue(0);
        drop(rx);
        let err = tx
            .push(PodUpdate::single(PodOperation::Add, Pod::new("a")))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::QueueClosed));
    }
}
