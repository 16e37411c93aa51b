//! Capacity balancer - picks the node that should receive the next peer
//!
//! Selection is least-loaded-first over eligible nodes. The balancer only
//! reads the registry; it reserves nothing. Two concurrent callers can land on
//! the same node, and the node's agent stays the authority on whether one
//! more peer fits.

use std::sync::Arc;

use tracing::{debug, trace};

use super::error::FleetError;
use super::node::Node;
use crate::store::NodeStore;

pub struct Balancer {
    nodes: Arc<dyn NodeStore>,
}

impl Balancer {
    pub fn new(nodes: Arc<dyn NodeStore>) -> Self {
        Self { nodes }
    }

    /// Select the least-loaded eligible node with a free slot
    pub async fn select_node(&self) -> Result<Node, FleetError> {
        let candidates = self.nodes.list_eligible_nodes().await?;
        trace!("Balancer considering {} eligible nodes", candidates.len());

        let node = pick_least_loaded(candidates)?;
        debug!(
            "Selected node {} ({}) with {}/{} peers",
            node.id, node.name, node.current_peers, node.max_peers
        );
        Ok(node)
    }
}

/// Pure selection over a node listing
///
/// Nodes that are not eligible are ignored. Ties on `current_peers` are broken
/// by node id.
pub fn pick_least_loaded(nodes: Vec<Node>) -> Result<Node, FleetError> {
    let mut candidates: Vec<Node> = nodes.into_iter().filter(Node::is_eligible).collect();
    if candidates.is_empty() {
        return Err(FleetError::NoNodesAvailable);
    }

    candidates.sort_by_key(|n| (n.current_peers, n.id));
    candidates
        .into_iter()
        .find(Node::has_capacity)
        .ok_or(FleetError::FleetAtCapacity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn node(id: i64, current: u32, max: u32) -> Node {
        Node::new(id, format!("node-{}", id), format!("10.0.0.{}:7443", id), max).with_peers(current)
    }

    #[test]
    fn test_picks_least_loaded() {
        let picked = pick_least_loaded(vec![node(1, 5, 10), node(2, 2, 10), node(3, 7, 10)]).unwrap();
        assert_eq!(picked.id.0, 2);
    }

    #[test]
    fn test_skips_saturated_nodes() {
        // Least loaded by count but full
        let picked = pick_least_loaded(vec![node(1, 3, 3), node(2, 8, 10)]).unwrap();
        assert_eq!(picked.id.0, 2);
    }

    #[test]
    fn test_tie_broken_by_id() {
        let picked = pick_least_loaded(vec![node(9, 1, 10), node(4, 1, 10), node(6, 1, 10)]).unwrap();
        assert_eq!(picked.id.0, 4);
    }

    #[test]
    fn test_empty_set() {
        assert!(matches!(pick_least_loaded(vec![]), Err(FleetError::NoNodesAvailable)));
    }

    #[test]
    fn test_only_ineligible_nodes() {
        let mut archived = node(1, 0, 10);
        archived.archived = true;
        let mut disabled = node(2, 0, 10);
        disabled.enabled = false;

        assert!(matches!(
            pick_least_loaded(vec![archived, disabled]),
            Err(FleetError::NoNodesAvailable)
        ));
    }

    #[test]
    fn test_all_saturated() {
        let result = pick_least_loaded(vec![node(1, 10, 10), node(2, 12, 10)]);
        assert!(matches!(result, Err(FleetError::FleetAtCapacity)));
    }

    #[tokio::test]
    async fn test_select_node_reads_store() {
        let mut archived = node(1, 0, 10);
        archived.archived = true;
        let store = Arc::new(MemoryStore::with_nodes(vec![archived, node(2, 4, 10), node(3, 1, 10)]));
        let balancer = Balancer::new(store);

        let picked = balancer.select_node().await.unwrap();
        assert_eq!(picked.id.0, 3);
    }

    #[tokio::test]
    async fn test_select_node_empty_registry() {
        let balancer = Balancer::new(Arc::new(MemoryStore::new()));
        let result = balancer.select_node().await;
        assert!(matches!(result, Err(FleetError::NoNodesAvailable)));
    }
}
