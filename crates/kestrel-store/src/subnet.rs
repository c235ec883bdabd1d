//! Node name and pod subnet allocation.
//!
//! Each node joining without an explicit name gets `node{n}` and the subnet
//! `172.17.{n}.1/24`, with `n` counting up from 1 per allocator.

use parking_lot::Mutex;

use crate::error::{Result, StoreError};

/// A node identity handed out by the allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSubnet {
    /// The generated node name.
    pub node_name: String,
    /// The node's pod subnet in CIDR form.
    pub pod_cidr: String,
}

/// Hands out unique node names and pod subnets.
#[derive(Debug)]
pub struct SubnetAllocator {
    next: Mutex<u16>,
}

impl Default for SubnetAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SubnetAllocator {
    /// Highest third octet that can be handed out.
    const LAST: u16 = 255;

    /// Create an allocator starting at subnet 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: Mutex::new(1),
        }
    }

    /// Allocate the next node identity.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::SubnetsExhausted` once all 255 subnets are used.
    pub fn allocate(&self) -> Result<NodeSubnet> {
        let mut next = self.next.lock();
        let n = *next;
        if n > Self::LAST {
            return Err(StoreError::SubnetsExhausted);
        }
        *next += 1;

        Ok(NodeSubnet {
            node_name: format!("node{n}"),
            pod_cidr: format!("172.17.{n}.1/24"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn allocates_sequentially() {
        let alloc = SubnetAllocator::new();
        let first = alloc.allocate().unwrap();
        let second = alloc.allocate().unwrap();

        assert_eq!(first.node_name, "node1");
        assert_eq!(first.pod_cidr, "172.17.1.1/24");
        assert_eq!(second.node_name, "node2");
        assert_eq!(second.pod_cidr, "172.17.2.1/24");
    }

    #[test]
    fn exhausts_after_last_subnet() {
        let alloc = SubnetAllocator::new();
        for _ in 0..255 {
            alloc.allocate().unwrap();
        }
        assert!(matches!(
            alloc.allocate(),
            Err(StoreError::SubnetsExhausted)
        ));
    }

    #[test]
    fn concurrent_allocations_are_unique() {
        let alloc = Arc::new(SubnetAllocator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let alloc = Arc::clone(&alloc);
                std::thread::spawn(move || {
                    (0..10)
                        .map(|_| alloc.allocate().unwrap().node_name)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let names: HashSet<_> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(names.len(), 80);
    }
}
