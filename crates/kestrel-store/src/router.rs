//! Typed watch routing.
//!
//! An [`EventRouter`] owns the lifecycle of a watch: it registers with
//! bounded retry, decodes each notification, forwards it to a bounded
//! consumer channel, and re-registers whenever the store invalidates the
//! subscription. Notifications whose payload cannot be decoded are logged
//! and dropped.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec;
use crate::error::Result;
use crate::keys::name_from_key;
use crate::retry::RetryPolicy;
use crate::types::{ChangeType, WatchEvent, WatchSubscription};
use crate::StoreClient;

/// A decoded change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectEvent<T> {
    /// The object at `key` was created or replaced.
    Put {
        /// Full store key.
        key: String,
        /// The decoded object.
        object: T,
    },
    /// The object at `key` was removed.
    Delete {
        /// Full store key.
        key: String,
    },
}

impl<T> ObjectEvent<T> {
    /// The full key this event refers to.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }

    /// The object name this event refers to.
    #[must_use]
    pub fn name(&self) -> &str {
        name_from_key(self.key())
    }
}

/// Why a subscription stopped being drained.
enum DrainExit {
    Cancelled,
    ConsumerGone,
    Invalidated,
}

/// Keeps watches alive and delivers typed events.
pub struct EventRouter<C: ?Sized> {
    client: Arc<C>,
    policy: RetryPolicy,
}

impl<C: ?Sized> Clone for EventRouter<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            policy: self.policy,
        }
    }
}

impl<C> EventRouter<C>
where
    C: StoreClient + ?Sized + 'static,
{
    /// Create a router over a store client.
    #[must_use]
    pub fn new(client: Arc<C>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// The retry policy used for registration.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// List and decode every object under `prefix`.
    ///
    /// Entries that fail to decode are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the list request fails after retries.
    pub async fn list<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        let raw = self
            .policy
            .run("list", || self.client.list(prefix))
            .await?;

        Ok(raw
            .into_iter()
            .filter_map(|obj| match codec::decode(&obj.value) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = %obj.key, error = %e, "Skipping undecodable record");
                    None
                }
            })
            .collect())
    }

    /// Watch `prefix` until cancelled, forwarding decoded events to `sink`.
    ///
    /// Returns `Ok(())` when cancelled or when the consumer hangs up.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::RetriesExhausted` if the watch cannot be
    /// (re-)registered within the retry budget.
    pub async fn watch<T: DeserializeOwned>(
        &self,
        prefix: &str,
        sink: mpsc::Sender<ObjectEvent<T>>,
        cancel: CancellationToken,
    ) -> Result<()> {
        loop {
            let subscription = tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                result = self.register(prefix) => result?,
            };

            match Self::drain(subscription, &sink, &cancel).await {
                DrainExit::Cancelled => return Ok(()),
                DrainExit::ConsumerGone => {
                    debug!(prefix, "Watch consumer dropped, stopping");
                    return Ok(());
                }
                DrainExit::Invalidated => {
                    warn!(prefix, "Watch subscription invalidated, re-registering");
                }
            }
        }
    }

    /// Spawn [`watch`](Self::watch) on the runtime.
    pub fn spawn_watch<T>(
        &self,
        prefix: impl Into<String>,
        sink: mpsc::Sender<ObjectEvent<T>>,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<()>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let router = self.clone();
        let prefix = prefix.into();
        tokio::spawn(async move {
            let result = router.watch(&prefix, sink, cancel).await;
            if let Err(e) = &result {
                tracing::error!(prefix = %prefix, error = %e, "Watch terminated");
            }
            result
        })
    }

    async fn register(&self, prefix: &str) -> Result<WatchSubscription> {
        let subscription = self
            .policy
            .run("register watch", || self.client.register_watch(prefix))
            .await?;
        info!(
            prefix,
            ticket = subscription.ticket.ticket,
            "Registered watch"
        );
        Ok(subscription)
    }

    async fn drain<T: DeserializeOwned>(
        mut subscription: WatchSubscription,
        sink: &mpsc::Sender<ObjectEvent<T>>,
        cancel: &CancellationToken,
    ) -> DrainExit {
        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => return DrainExit::Cancelled,
                next = subscription.events.recv() => next,
            };

            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    warn!(prefix = %subscription.ticket.path, error = %e, "Watch stream error");
                    return DrainExit::Invalidated;
                }
                None => return DrainExit::Invalidated,
            };

            let Some(decoded) = decode_event(event) else {
                continue;
            };

            tokio::select! {
                () = cancel.cancelled() => return DrainExit::Cancelled,
                sent = sink.send(decoded) => {
                    if sent.is_err() {
                        return DrainExit::ConsumerGone;
                    }
                }
            }
        }
    }
}

fn decode_event<T: DeserializeOwned>(event: WatchEvent) -> Option<ObjectEvent<T>> {
    match event.change {
        ChangeType::Delete => Some(ObjectEvent::Delete { key: event.key }),
        ChangeType::Put => match codec::decode(&event.value) {
            Ok(object) => Some(ObjectEvent::Put {
                key: event.key,
                object,
            }),
            Err(e) => {
                warn!(key = %event.key, error = %e, "Dropping undecodable watch event");
                None
            }
        },
    }
}
