//! HTTP client for the API server's store endpoints.
//!
//! Objects are read and written at `{base}{key}`. Lists use
//! `GET {base}/list{prefix}`. A watch is registered with
//! `PUT {base}/watch{prefix}`, which returns a ticket; the ticket is then
//! long-polled at `GET {base}/watch/{ticket}` for batches of events. A `410
//! Gone` on the poll means the store has dropped the subscription.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::keys::ResourceKind;
use crate::types::{ChangeType, RawObject, WatchEvent, WatchSubscription, WatchTicket};
use crate::StoreClient;

/// Delay before polling again after an empty batch.
const EMPTY_POLL_BACKOFF: Duration = Duration::from_millis(200);

/// Store client speaking to the API server over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStoreClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStoreClient {
    /// Create a client for the store at `base_url` (e.g. `http://127.0.0.1:9100`).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Transport` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| StoreError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(client, base_url))
    }

    /// Create a client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Get the base URL of the store.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: reqwest::RequestBuilder, key: &str) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("store request failed: {e}")))?;
        check_status(response, key).await
    }
}

/// Map a non-success response onto a `StoreError`.
async fn check_status(response: reqwest::Response, key: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::NOT_FOUND => Err(StoreError::NotFound(key.to_string())),
        StatusCode::CONFLICT => Err(StoreError::AlreadyExists(key.to_string())),
        StatusCode::GONE => Err(StoreError::SubscriptionClosed(key.to_string())),
        _ => {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| status.to_string());
            Err(StoreError::Status {
                code: status.as_u16(),
                message,
            })
        }
    }
}

#[derive(Debug, Deserialize)]
struct TicketResponse {
    ticket: i64,
}

#[derive(Debug, Deserialize)]
struct WireObject {
    key: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    key: String,
    #[serde(default)]
    value: String,
}

impl WireEvent {
    fn into_event(self) -> Option<WatchEvent> {
        let change = match self.kind.as_str() {
            "PUT" => ChangeType::Put,
            "DELETE" => ChangeType::Delete,
            other => {
                warn!(key = %self.key, kind = other, "Ignoring watch event of unknown type");
                return None;
            }
        };
        match BASE64.decode(self.value.as_bytes()) {
            Ok(value) => Some(WatchEvent {
                change,
                key: self.key,
                value,
            }),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Dropping watch event with bad encoding");
                None
            }
        }
    }
}

#[async_trait]
impl StoreClient for HttpStoreClient {
    async fn create(&self, kind: ResourceKind, name: &str, value: Vec<u8>) -> Result<()> {
        let key = kind.key(name);
        self.send(self.client.post(self.url(&key)).body(value), &key)
            .await?;
        debug!(key = %key, "Created record");
        Ok(())
    }

    async fn update(&self, kind: ResourceKind, name: &str, value: Vec<u8>) -> Result<()> {
        let key = kind.key(name);
        self.send(self.client.put(self.url(&key)).body(value), &key)
            .await?;
        debug!(key = %key, "Updated record");
        Ok(())
    }

    async fn delete(&self, kind: ResourceKind, name: &str) -> Result<()> {
        let key = kind.key(name);
        self.send(self.client.delete(self.url(&key)), &key).await?;
        debug!(key = %key, "Deleted record");
        Ok(())
    }

    async fn get(&self, kind: ResourceKind, name: &str) -> Result<Option<Vec<u8>>> {
        let key = kind.key(name);
        match self.send(self.client.get(self.url(&key)), &key).await {
            Ok(response) => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| StoreError::Transport(e.to_string()))?;
                Ok(Some(body.to_vec()))
            }
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<RawObject>> {
        let response = self
            .send(self.client.get(self.url(&format!("/list{prefix}"))), prefix)
            .await?;
        let objects: Vec<WireObject> = response
            .json()
            .await
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        objects
            .into_iter()
            .map(|obj| {
                let value = BASE64
                    .decode(obj.value.as_bytes())
                    .map_err(|e| StoreError::Serialization(format!("{}: {e}", obj.key)))?;
                Ok(RawObject {
                    key: obj.key,
                    value,
                })
            })
            .collect()
    }

    async fn register_watch(&self, prefix: &str) -> Result<WatchSubscription> {
        let response = self
            .send(self.client.put(self.url(&format!("/watch{prefix}"))), prefix)
            .await?;
        let TicketResponse { ticket } = response
            .json()
            .await
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(poll_watch(
            self.client.clone(),
            self.url(&format!("/watch/{ticket}")),
            prefix.to_string(),
            tx,
        ));

        debug!(prefix, ticket, "Watch registered with store");
        Ok(WatchSubscription {
            ticket: WatchTicket {
                path: prefix.to_string(),
                ticket,
            },
            events: rx,
        })
    }
}

/// Long-poll a watch ticket, forwarding events until the subscription ends,
/// the receiver is dropped, or a request fails.
async fn poll_watch(
    client: reqwest::Client,
    url: String,
    prefix: String,
    tx: mpsc::UnboundedSender<Result<WatchEvent>>,
) {
    while !tx.is_closed() {
        let response = match client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                let _ = tx.send(Err(StoreError::Transport(format!("watch poll failed: {e}"))));
                return;
            }
        };

        let response = match check_status(response, &prefix).await {
            Ok(response) => response,
            Err(StoreError::SubscriptionClosed(_)) => {
                debug!(prefix = %prefix, "Watch ticket expired");
                return;
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        };

        let batch: Vec<WireEvent> = match response.json().await {
            Ok(batch) => batch,
            Err(e) => {
                let _ = tx.send(Err(StoreError::Serialization(e.to_string())));
                return;
            }
        };

        if batch.is_empty() {
            tokio::time::sleep(EMPTY_POLL_BACKOFF).await;
            continue;
        }

        for event in batch.into_iter().filter_map(WireEvent::into_event) {
            if tx.send(Ok(event)).is_err() {
                return;
            }
        }
    }
}
