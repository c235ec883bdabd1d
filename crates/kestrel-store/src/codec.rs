//! JSON encoding of stored objects.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::keys::ResourceKind;
use crate::StoreClient;

/// Serialize an object into its stored form.
///
/// # Errors
///
/// Returns `StoreError::Serialization` if the value cannot be encoded.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Deserialize an object from its stored form.
///
/// # Errors
///
/// Returns `StoreError::Serialization` if the payload is not a valid record.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Fetch and decode a single object.
///
/// # Errors
///
/// Returns an error if the request fails or the payload cannot be decoded.
pub async fn get_object<T, C>(client: &C, kind: ResourceKind, name: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
    C: StoreClient + ?Sized,
{
    client
        .get(kind, name)
        .await?
        .map(|data| decode(&data))
        .transpose()
}
