//! Key layout in the store.
//!
//! Every object lives at `/registry/{resource}/{namespace}/{name}`. Watches
//! and lists operate on the `/registry/{resource}/{namespace}` prefix.

use std::fmt;

use kestrel_core::NAMESPACE;

/// The resource types kept in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Pods.
    Pod,
    /// Replica sets.
    ReplicaSet,
    /// Nodes.
    Node,
}

impl ResourceKind {
    /// The path segment for this resource.
    #[must_use]
    pub const fn segment(&self) -> &'static str {
        match self {
            Self::Pod => "pod",
            Self::ReplicaSet => "rs",
            Self::Node => "node",
        }
    }

    /// The prefix under which all objects of this kind are stored.
    #[must_use]
    pub fn prefix(&self) -> String {
        format!("/registry/{}/{NAMESPACE}", self.segment())
    }

    /// The full key for the named object.
    #[must_use]
    pub fn key(&self, name: &str) -> String {
        format!("{}/{name}", self.prefix())
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// Extract the object name (last path segment) from a key.
#[must_use]
pub fn name_from_key(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes() {
        assert_eq!(ResourceKind::Pod.prefix(), "/registry/pod/default");
        assert_eq!(ResourceKind::ReplicaSet.prefix(), "/registry/rs/default");
        assert_eq!(ResourceKind::Node.prefix(), "/registry/node/default");
    }

    #[test]
    fn key_roundtrip() {
        let key = ResourceKind::Pod.key("web-1");
        assert_eq!(key, "/registry/pod/default/web-1");
        assert!(key.starts_with(&ResourceKind::Pod.prefix()));
        assert_eq!(name_from_key(&key), "web-1");
    }

    #[test]
    fn name_from_bare_key() {
        assert_eq!(name_from_key("web-1"), "web-1");
    }
}
