//! Object metadata and ownership back-references.
//!
//! Every stored object carries an [`ObjectMeta`]. The name is the key
//! component under which the object is stored; the UID is assigned once and
//! is immutable afterwards.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CoreError, Result};
use crate::ids::Uid;

/// The single namespace every object lives in.
pub const NAMESPACE: &str = "default";

/// Metadata shared by all stored objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Unique name within the object's resource type.
    #[serde(default)]
    pub name: String,
    /// Free-form labels.
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: BTreeMap<String, String>,
    /// Stable identity, absent until assigned.
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub uid: Option<Uid>,
    /// Back-references to the objects responsible for this one.
    #[serde(default, deserialize_with = "null_as_default")]
    pub owner_references: Vec<OwnerReference>,
    /// When the object was first created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    /// Create metadata with only a name set.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Return the owner reference marked as the managing controller, if any.
    #[must_use]
    pub fn controller_ref(&self) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|r| r.controller)
    }

    /// Check whether `owner` is the managing controller of this object.
    ///
    /// Kind and UID must both match; names are not compared since they can be
    /// reused by a later object.
    #[must_use]
    pub fn is_controlled_by(&self, owner: &OwnerReference) -> bool {
        self.controller_ref()
            .is_some_and(|r| r.kind == owner.kind && r.uid == owner.uid)
    }

    /// Validate the invariants every stored object must hold.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::EmptyName` for an unnamed object and
    /// `CoreError::MultipleControllers` if more than one owner reference is a
    /// controller.
    pub fn validate(&self, kind: &'static str) -> Result<()> {
        if self.name.is_empty() {
            return Err(CoreError::EmptyName { kind });
        }

        let count = self.owner_references.iter().filter(|r| r.controller).count();
        if count > 1 {
            return Err(CoreError::MultipleControllers {
                name: self.name.clone(),
                count,
            });
        }

        Ok(())
    }
}

/// A non-owning pointer from an object to the object responsible for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    /// Kind of the owner (e.g. `RS`).
    pub kind: String,
    /// Name of the owner.
    pub name: String,
    /// UID of the owner.
    pub uid: Uid,
    /// Whether the owner is the managing controller.
    #[serde(default)]
    pub controller: bool,
}

/// Treat a JSON `null` the same as an absent field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Read a missing, null or empty `uid` as `None`.
fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<Uid>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
