//! Node client pool
//!
//! One agent client per node id, created on first use and shared by every
//! caller after that. The cache sits behind a read/write lock: lookups take
//! the read side, construction takes the write side and re-checks the cache
//! so a node never gets two clients. The lock covers construction only;
//! calls on a client run outside it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::node::{Node, NodeId};
use crate::agent::{AgentConnector, AgentError, PeerAgent};

pub struct ClientPool {
    connector: Arc<dyn AgentConnector>,
    clients: RwLock<HashMap<NodeId, Arc<dyn PeerAgent>>>,
}

impl ClientPool {
    pub fn new(connector: Arc<dyn AgentConnector>) -> Self {
        Self {
            connector,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached client for `node`, building it on first use
    ///
    /// Construction failures are returned and nothing is cached.
    pub async fn get_or_create(&self, node: &Node) -> Result<Arc<dyn PeerAgent>, AgentError> {
        {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(&node.id) {
                return Ok(Arc::clone(client));
            }
        }

        let mut clients = self.clients.write().await;
        if let Some(client) = clients.get(&node.id) {
            return Ok(Arc::clone(client));
        }

        debug!("Creating agent client for node {} ({})", node.id, node.rpc_address);
        let client = self.connector.connect(node).await?;
        clients.insert(node.id, Arc::clone(&client));
        info!("Agent client for node {} ready", node.id);
        Ok(client)
    }

    /// Drop and close a cached client so the next call rebuilds it
    pub async fn evict(&self, node_id: NodeId) -> bool {
        let removed = self.clients.write().await.remove(&node_id);
        match removed {
            Some(client) => {
                if let Err(e) = client.close().await {
                    warn!("Failed to close agent client for node {}: {}", node_id, e);
                }
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Close every cached client and empty the cache
    ///
    /// Per-client close errors are logged and do not stop the sweep.
    pub async fn close(&self) {
        let drained: Vec<(NodeId, Arc<dyn PeerAgent>)> =
            self.clients.write().await.drain().collect();

        for (node_id, client) in drained {
            match client.close().await {
                Ok(()) => debug!("Closed agent client for node {}", node_id),
                Err(e) => warn!("Failed to close agent client for node {}: {}", node_id, e),
            }
        }
    }
}
