//! Node registration.

use kestrel_core::Node;
use kestrel_store::{
    codec, NodeSubnet, ResourceKind, RetryPolicy, StoreClient, StoreError, SubnetAllocator,
};
use tracing::{debug, info};

use crate::config::AgentConfig;
use crate::error::Result;

/// Write this node's record to the store.
///
/// A configured name is registered as-is and replaces an existing record of
/// the same name, keeping its subnet unless one is configured. Without a
/// configured name the node takes the first `node{n}` identity whose name and
/// subnet are not used by any stored node; losing a race for a name moves on
/// to the next one.
///
/// # Errors
///
/// Returns an error if the allocator is exhausted, the record is invalid, or
/// a store request fails after retries.
pub async fn register_node(
    store: &dyn StoreClient,
    config: &AgentConfig,
    allocator: &SubnetAllocator,
) -> Result<Node> {
    let policy = config.retry_policy();
    let prefix = ResourceKind::Node.prefix();
    let mut taken: Vec<Node> = policy
        .run("list nodes", || store.list(&prefix))
        .await?
        .into_iter()
        .filter_map(|raw| codec::decode(&raw.value).ok())
        .collect();

    if let Some(name) = &config.node_name {
        let previous = taken
            .iter()
            .find(|n| n.metadata.name == *name)
            .map(|n| n.spec.pod_cidr.clone())
            .filter(|cidr| !cidr.is_empty());
        let pod_cidr = match (&config.pod_cidr, previous) {
            (Some(cidr), _) => cidr.clone(),
            (None, Some(cidr)) => cidr,
            (None, None) => next_free(allocator, &taken)?.pod_cidr,
        };

        let node = Node::new(name.clone(), config.node_ip.clone(), pod_cidr);
        node.validate()?;
        match create_node(store, &policy, &node).await {
            Ok(()) => info!(node = %name, pod_cidr = %node.spec.pod_cidr, "Registered node"),
            Err(StoreError::AlreadyExists(_)) => {
                let value = codec::encode(&node)?;
                policy
                    .run("update node", || {
                        store.update(ResourceKind::Node, name, value.clone())
                    })
                    .await?;
                info!(node = %name, pod_cidr = %node.spec.pod_cidr, "Re-registered node");
            }
            Err(e) => return Err(e.into()),
        }
        return Ok(node);
    }

    loop {
        let subnet = next_free(allocator, &taken)?;
        let pod_cidr = config
            .pod_cidr
            .clone()
            .unwrap_or_else(|| subnet.pod_cidr.clone());
        let node = Node::new(subnet.node_name.clone(), config.node_ip.clone(), pod_cidr);
        node.validate()?;

        match create_node(store, &policy, &node).await {
            Ok(()) => {
                info!(node = %node.metadata.name, pod_cidr = %node.spec.pod_cidr, "Registered node");
                return Ok(node);
            }
            Err(StoreError::AlreadyExists(_)) => {
                debug!(node = %subnet.node_name, "Node name taken, trying the next one");
                taken.push(Node::new(subnet.node_name, String::new(), subnet.pod_cidr));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Draw allocations until one clashes with no known node.
fn next_free(allocator: &SubnetAllocator, taken: &[Node]) -> Result<NodeSubnet> {
    loop {
        let subnet = allocator.allocate()?;
        let clash = taken
            .iter()
            .any(|n| n.metadata.name == subnet.node_name || n.spec.pod_cidr == subnet.pod_cidr);
        if !clash {
            return Ok(subnet);
        }
    }
}

async fn create_node(
    store: &dyn StoreClient,
    policy: &RetryPolicy,
    node: &Node,
) -> std::result::Result<(), StoreError> {
    let value = codec::encode(node)?;
    let name = node.metadata.name.as_str();
    policy
        .run("register node", || {
            store.create(ResourceKind::Node, name, value.clone())
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_store::MemoryStore;

    fn config(node_name: Option<&str>) -> AgentConfig {
        AgentConfig {
            node_name: node_name.map(str::to_string),
            node_ip: "192.168.0.10".to_string(),
            retry_interval_ms: 1,
            ..AgentConfig::default()
        }
    }

    fn stored(store: &MemoryStore, name: &str) -> Node {
        codec::decode(&store.get_raw(&ResourceKind::Node.key(name)).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn allocates_identity_when_unnamed() {
        let store = MemoryStore::new();
        let node = register_node(&store, &config(None), &SubnetAllocator::new())
            .await
            .unwrap();

        assert_eq!(node.metadata.name, "node1");
        assert_eq!(node.spec.pod_cidr, "172.17.1.1/24");
        assert_eq!(node.spec.physical_ip, "192.168.0.10");
        assert_eq!(stored(&store, "node1"), node);
    }

    #[tokio::test]
    async fn keeps_configured_name() {
        let store = MemoryStore::new();
        let node = register_node(&store, &config(Some("edge-a")), &SubnetAllocator::new())
            .await
            .unwrap();

        assert_eq!(node.metadata.name, "edge-a");
        assert_eq!(node.spec.pod_cidr, "172.17.1.1/24");
    }

    #[tokio::test]
    async fn re_registration_keeps_subnet() {
        let store = MemoryStore::new();
        register_node(&store, &config(Some("edge-a")), &SubnetAllocator::new())
            .await
            .unwrap();

        let mut moved = config(Some("edge-a"));
        moved.node_ip = "192.168.0.99".to_string();
        let node = register_node(&store, &moved, &SubnetAllocator::new())
            .await
            .unwrap();

        assert_eq!(stored(&store, "edge-a"), node);
        assert_eq!(node.spec.pod_cidr, "172.17.1.1/24");
        assert_eq!(node.spec.physical_ip, "192.168.0.99");
    }

    #[tokio::test]
    async fn unnamed_agents_get_distinct_identities() {
        let store = MemoryStore::new();

        // Separate processes never share an allocator.
        let first = register_node(&store, &config(None), &SubnetAllocator::new())
            .await
            .unwrap();
        let second = register_node(&store, &config(None), &SubnetAllocator::new())
            .await
            .unwrap();

        assert_eq!(first.metadata.name, "node1");
        assert_eq!(second.metadata.name, "node2");
        assert_eq!(second.spec.pod_cidr, "172.17.2.1/24");
        assert_eq!(stored(&store, "node1"), first);
        assert_eq!(stored(&store, "node2"), second);
    }

    #[tokio::test]
    async fn unnamed_agent_skips_subnets_in_use() {
        let store = MemoryStore::new();
        register_node(&store, &config(Some("edge-a")), &SubnetAllocator::new())
            .await
            .unwrap();

        let node = register_node(&store, &config(None), &SubnetAllocator::new())
            .await
            .unwrap();

        assert_eq!(node.metadata.name, "node2");
        assert_eq!(node.spec.pod_cidr, "172.17.2.1/24");
    }

    #[tokio::test]
    async fn name_lost_to_a_concurrent_registration_moves_on() {
        let store = MemoryStore::new();
        // Present under the name but not decodable, so the listing misses it.
        store.put_raw(ResourceKind::Node.key("node1"), b"{broken".to_vec());

        let node = register_node(&store, &config(None), &SubnetAllocator::new())
            .await
            .unwrap();

        assert_eq!(node.metadata.name, "node2");
        assert_eq!(store.get_raw(&ResourceKind::Node.key("node1")).unwrap(), b"{broken".to_vec());
    }
}
