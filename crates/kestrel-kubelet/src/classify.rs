//! Watch event classification.

use kestrel_core::Pod;

use crate::queue::PodOperation;

/// Decide what a pod notification means for this node.
///
/// `exists_locally` is whether the pod is in the local inventory. Pods with
/// no node assigned are never acted on. A pod of this node pending deletion
/// is a removal even when it is not running here, so its stored object can
/// still be cleaned up.
#[must_use]
pub fn classify(pod: &Pod, local_node: &str, exists_locally: bool) -> Option<PodOperation> {
    pod.node_name()?;

    let assigned_here = pod.is_assigned_to(local_node);
    let deleting = pod.is_pending_deletion();

    match (exists_locally, assigned_here, deleting) {
        (false, true, false) => Some(PodOperation::Add),
        (false, false, _) => None,
        (_, true, true) | (true, false, _) => Some(PodOperation::Delete),
        (true, true, false) => Some(PodOperation::Update),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::PodPhase;

    fn pod(node: Option<&str>, phase: PodPhase) -> Pod {
        let mut pod = Pod::new("web-1");
        pod.spec.node_name = node.unwrap_or_default().to_string();
        pod.status.phase = phase;
        pod
    }

    #[test]
    fn classification_table() {
        use PodOperation::{Add, Delete, Update};
        let cases = [
            // exists, node, phase, expected
            (false, "node2", PodPhase::Pending, None),
            (false, "node2", PodPhase::Delete, None),
            (false, "node1", PodPhase::Pending, Some(Add)),
            (false, "node1", PodPhase::Delete, Some(Delete)),
            (true, "node1", PodPhase::Delete, Some(Delete)),
            (true, "node1", PodPhase::Running, Some(Update)),
            (true, "node2", PodPhase::Running, Some(Delete)),
            (true, "node2", PodPhase::Delete, Some(Delete)),
        ];

        for (exists, node, phase, expected) in cases {
            assert_eq!(
                classify(&pod(Some(node), phase), "node1", exists),
                expected,
                "exists={exists} node={node} phase={phase}"
            );
        }
    }

    #[test]
    fn unassigned_pods_are_ignored() {
        assert_eq!(classify(&pod(None, PodPhase::Pending), "node1", false), None);
        assert_eq!(classify(&pod(None, PodPhase::Pending), "node1", true), None);
        assert_eq!(classify(&pod(Some(""), PodPhase::Pending), "node1", false), None);
    }
}
