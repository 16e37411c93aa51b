//! Fleet service - subscription-level peer lifecycle
//!
//! Combines the balancer, the client pool and the agent clients:
//!
//! ```text
//! create_client:  select node -> pool client -> create-peer -> counter += 1
//! delete_client:  binding -> node -> pool client -> delete-peer -> clear binding -> counter -= 1
//! enable/disable: binding -> node -> pool client -> enable/disable-peer
//! ```
//!
//! The remote call and the counter update are not atomic. A counter write
//! that fails after a successful remote call is logged and the call still
//! succeeds; the peer-count worker repairs drift from the agents' peer lists.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::balancer::Balancer;
use super::error::FleetError;
use super::node::Node;
use super::pool::ClientPool;
use super::subscription::{ConnectionArtifact, FleetBinding, Subscription, UserId};
use crate::agent::{AgentConnector, Operation, PeerAgent};
use crate::store::{NodeStore, SubscriptionStore};

pub struct FleetService {
    nodes: Arc<dyn NodeStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    balancer: Balancer,
    pool: ClientPool,
}

impl FleetService {
    pub fn new(
        nodes: Arc<dyn NodeStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        connector: Arc<dyn AgentConnector>,
    ) -> Self {
        Self {
            balancer: Balancer::new(Arc::clone(&nodes)),
            pool: ClientPool::new(connector),
            nodes,
            subscriptions,
        }
    }

    pub fn pool(&self) -> &ClientPool {
        &self.pool
    }

    /// Provision a peer for a subscriber on the least-loaded node
    pub async fn create_client(&self, subscriber: UserId) -> Result<FleetBinding, FleetError> {
        let node = self.balancer.select_node().await?;
        let client = self.client_for(&node).await?;

        let peer_name = peer_name(subscriber);
        let created = client
            .create_peer(&node.interface, &peer_name)
            .await
            .map_err(|source| FleetError::RemoteCall {
                node: node.id,
                operation: Operation::CreatePeer,
                source,
            })?;

        if let Err(e) = self.nodes.increment_peers(node.id).await {
            error!(
                "Peer {} created on node {} for user {} but the peer counter was not incremented: {}",
                created.peer_id, node.id, subscriber, e
            );
        }

        info!(
            "Provisioned peer {} on node {} for user {}",
            created.peer_id, node.id, subscriber
        );

        Ok(FleetBinding {
            node_id: node.id,
            peer_id: created.peer_id,
            artifact: ConnectionArtifact {
                config: created.config,
                qr_code: created.qr_code,
                client_ip: created.client_ip,
            },
        })
    }

    /// Suspend a subscription's peer; it keeps its slot on the node
    pub async fn disable_client(&self, subscription: &Subscription) -> Result<(), FleetError> {
        let (binding, node, client) = self.resolve(subscription).await?;
        client
            .disable_peer(&node.interface, &binding.peer_id)
            .await
            .map_err(|source| FleetError::RemoteCall {
                node: node.id,
                operation: Operation::DisablePeer,
                source,
            })?;
        info!(
            "Disabled peer {} on node {} (subscription {})",
            binding.peer_id, node.id, subscription.id
        );
        Ok(())
    }

    pub async fn enable_client(&self, subscription: &Subscription) -> Result<(), FleetError> {
        let (binding, node, client) = self.resolve(subscription).await?;
        client
            .enable_peer(&node.interface, &binding.peer_id)
            .await
            .map_err(|source| FleetError::RemoteCall {
                node: node.id,
                operation: Operation::EnablePeer,
                source,
            })?;
        info!(
            "Enabled peer {} on node {} (subscription {})",
            binding.peer_id, node.id, subscription.id
        );
        Ok(())
    }

    /// Remove the peer, clear the binding and free its slot
    ///
    /// A peer the agent no longer knows is treated as already deleted. The
    /// slot is released only by the call that clears the binding, so
    /// duplicate or concurrent deletes decrement once.
    pub async fn delete_client(&self, subscription: &Subscription) -> Result<(), FleetError> {
        let (binding, node, client) = self.resolve(subscription).await?;

        remove_peer(client.as_ref(), &node, &binding.peer_id).await?;

        let cleared = self
            .subscriptions
            .clear_binding_if(subscription.id, &binding.peer_id)
            .await?;
        if !cleared {
            debug!(
                "Binding of subscription {} to peer {} was already released",
                subscription.id, binding.peer_id
            );
            return Ok(());
        }

        if let Err(e) = self.nodes.decrement_peers(node.id).await {
            error!(
                "Peer {} deleted on node {} but the peer counter was not decremented: {}",
                binding.peer_id, node.id, e
            );
        }

        info!(
            "Deleted peer {} on node {} (subscription {})",
            binding.peer_id, node.id, subscription.id
        );
        Ok(())
    }

    /// Undo a `create_client` whose binding was never stored
    ///
    /// Removes the peer and frees its slot. Nothing in the subscription store
    /// is touched.
    pub async fn discard_binding(&self, binding: &FleetBinding) -> Result<(), FleetError> {
        let node = self
            .nodes
            .get_node(binding.node_id)
            .await?
            .ok_or(FleetError::NodeMissing {
                node: binding.node_id,
            })?;
        let client = self.client_for(&node).await?;
        remove_peer(client.as_ref(), &node, &binding.peer_id).await?;

        if let Err(e) = self.nodes.decrement_peers(node.id).await {
            error!(
                "Peer {} discarded on node {} but the peer counter was not decremented: {}",
                binding.peer_id, node.id, e
            );
        }
        info!("Discarded unbound peer {} on node {}", binding.peer_id, node.id);
        Ok(())
    }

    /// Overwrite a node's counter with the agent's own peer count
    pub async fn sync_peer_count(&self, node: &Node) -> Result<u32, FleetError> {
        let client = self.client_for(node).await?;
        let peers = client
            .list_peers(&node.interface)
            .await
            .map_err(|source| FleetError::RemoteCall {
                node: node.id,
                operation: Operation::ListPeers,
                source,
            })?;

        let count = u32::try_from(peers.len()).unwrap_or(u32::MAX);
        if count != node.current_peers {
            warn!(
                "Node {} counter drifted: registry={} agent={}",
                node.id, node.current_peers, count
            );
        }
        self.nodes.set_peer_count(node.id, count).await?;
        Ok(count)
    }

    /// Tear down every cached agent client
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn client_for(&self, node: &Node) -> Result<Arc<dyn PeerAgent>, FleetError> {
        self.pool
            .get_or_create(node)
            .await
            .map_err(|source| FleetError::ClientConstruction {
                node: node.id,
                source,
            })
    }

    /// Binding, node and client for a subscription
    ///
    /// The stored record wins over the caller's copy so a repeated call sees
    /// a binding that an earlier call already cleared.
    async fn resolve(
        &self,
        subscription: &Subscription,
    ) -> Result<(FleetBinding, Node, Arc<dyn PeerAgent>), FleetError> {
        let binding = match self.subscriptions.get_subscription(subscription.id).await? {
            Some(stored) => stored.binding,
            None => subscription.binding.clone(),
        }
        .ok_or(FleetError::BindingMissing {
            subscription: subscription.id,
        })?;

        let node = self
            .nodes
            .get_node(binding.node_id)
            .await?
            .ok_or(FleetError::NodeMissing {
                node: binding.node_id,
            })?;

        debug!(
            "Subscription {} bound to peer {} on node {}",
            subscription.id, binding.peer_id, node.id
        );

        let client = self.client_for(&node).await?;
        Ok((binding, node, client))
    }
}

/// Delete a peer remotely; an unknown peer counts as deleted
async fn remove_peer(client: &dyn PeerAgent, node: &Node, peer_id: &str) -> Result<(), FleetError> {
    match client.delete_peer(&node.interface, peer_id).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => {
            warn!("Peer {} already absent on node {}", peer_id, node.id);
            Ok(())
        }
        Err(source) => Err(FleetError::RemoteCall {
            node: node.id,
            operation: Operation::DeletePeer,
            source,
        }),
    }
}

/// Peer label sent to the agent; unique per attempt
fn peer_name(subscriber: UserId) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("user-{}-{}", subscriber, &suffix[..8])
}
