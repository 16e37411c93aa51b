//! Repairs counter drift by recounting peers on each node's agent

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use super::Job;
use crate::fleet::{FleetService, NodeId};
use crate::store::{NodeStore, StoreError};

pub struct PeerCountJob {
    nodes: Arc<dyn NodeStore>,
    fleet: Arc<FleetService>,
}

impl PeerCountJob {
    pub fn new(nodes: Arc<dyn NodeStore>, fleet: Arc<FleetService>) -> Self {
        Self { nodes, fleet }
    }

    /// Recount every eligible node; returns the nodes that were synced
    pub async fn run_once(&self) -> Result<Vec<(NodeId, u32)>, StoreError> {
        let nodes = self.nodes.list_eligible_nodes().await?;
        let mut synced = Vec::with_capacity(nodes.len());

        for node in &nodes {
            match self.fleet.sync_peer_count(node).await {
                Ok(count) => {
                    debug!("Node {} has {} peer(s)", node.id, count);
                    synced.push((node.id, count));
                }
                Err(e) => warn!("Could not recount peers on node {}: {}", node.id, e),
            }
        }

        Ok(synced)
    }
}

#[async_trait]
impl Job for PeerCountJob {
    fn name(&self) -> &'static str {
        "peer-count"
    }

    async fn run(&self) {
        if let Err(e) = self.run_once().await {
            error!("Peer count pass could not list nodes: {}", e);
        }
    }
}
