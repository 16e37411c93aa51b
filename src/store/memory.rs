//! In-memory store backed by DashMap
//!
//! Listing order is ascending by id so callers see a stable order.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{NodeStore, StoreError, SubscriptionStore};
use crate::fleet::{FleetBinding, Node, NodeId, Subscription, SubscriptionId, SubscriptionStatus};

#[derive(Clone, Default)]
pub struct MemoryStore {
    nodes: Arc<DashMap<NodeId, Node>>,
    subscriptions: Arc<DashMap<SubscriptionId, Subscription>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with nodes
    pub fn with_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let store = Self::new();
        for node in nodes {
            store.upsert_node(node);
        }
        store
    }

    pub fn upsert_node(&self, node: Node) {
        self.nodes.insert(node.id, node);
    }

    pub fn upsert_subscription(&self, subscription: Subscription) {
        self.subscriptions.insert(subscription.id, subscription);
    }

    pub fn node(&self, id: NodeId) -> Option<Node> {
        self.nodes.get(&id).map(|r| r.clone())
    }

    pub fn subscription(&self, id: SubscriptionId) -> Option<Subscription> {
        self.subscriptions.get(&id).map(|r| r.clone())
    }

    pub fn list_nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.nodes.iter().map(|r| r.clone()).collect();
        nodes.sort_by_key(|n| n.id);
        nodes
    }

    fn filter_subscriptions(&self, pred: impl Fn(&Subscription) -> bool) -> Vec<Subscription> {
        let mut subs: Vec<Subscription> = self
            .subscriptions
            .iter()
            .filter(|r| pred(r.value()))
            .map(|r| r.clone())
            .collect();
        subs.sort_by_key(|s| s.id);
        subs
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn list_eligible_nodes(&self) -> Result<Vec<Node>, StoreError> {
        Ok(self
            .list_nodes()
            .into_iter()
            .filter(|n| n.is_eligible())
            .collect())
    }

    async fn get_node(&self, id: NodeId) -> Result<Option<Node>, StoreError> {
        Ok(self.node(id))
    }

    async fn increment_peers(&self, id: NodeId) -> Result<(), StoreError> {
        let mut node = self.nodes.get_mut(&id).ok_or(StoreError::NodeNotFound(id))?;
        node.current_peers = node.current_peers.saturating_add(1);
        Ok(())
    }

    async fn decrement_peers(&self, id: NodeId) -> Result<(), StoreError> {
        let mut node = self.nodes.get_mut(&id).ok_or(StoreError::NodeNotFound(id))?;
        node.current_peers = node.current_peers.saturating_sub(1);
        Ok(())
    }

    async fn set_peer_count(&self, id: NodeId, count: u32) -> Result<(), StoreError> {
        let mut node = self.nodes.get_mut(&id).ok_or(StoreError::NodeNotFound(id))?;
        node.current_peers = count;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn get_subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>, StoreError> {
        Ok(self.subscription(id))
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>, StoreError> {
        Ok(self.filter_subscriptions(|s| s.is_active() && s.is_expired_at(now)))
    }

    async fn list_expiring(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Subscription>, StoreError> {
        Ok(self.filter_subscriptions(|s| {
            s.is_active() && s.expires_at >= from && s.expires_at < to
        }))
    }

    async fn list_unprovisioned(&self) -> Result<Vec<Subscription>, StoreError> {
        Ok(self.filter_subscriptions(|s| s.needs_provisioning()))
    }

    async fn update_status(
        &self,
        id: SubscriptionId,
        status: SubscriptionStatus,
    ) -> Result<(), StoreError> {
        let mut sub = self
            .subscriptions
            .get_mut(&id)
            .ok_or(StoreError::SubscriptionNotFound(id))?;
        sub.status = status;
        Ok(())
    }

    async fn set_binding(
        &self,
        id: SubscriptionId,
        binding: Option<FleetBinding>,
    ) -> Result<(), StoreError> {
        let mut sub = self
            .subscriptions
            .get_mut(&id)
            .ok_or(StoreError::SubscriptionNotFound(id))?;
        sub.binding = binding;
        Ok(())
    }

    async fn clear_binding_if(
        &self,
        id: SubscriptionId,
        peer_id: &str,
    ) -> Result<bool, StoreError> {
        let mut sub = self
            .subscriptions
            .get_mut(&id)
            .ok_or(StoreError::SubscriptionNotFound(id))?;
        let holds_peer = sub
            .binding
            .as_ref()
            .map(|b| b.peer_id == peer_id)
            .unwrap_or(false);
        if holds_peer {
            sub.binding = None;
        }
        Ok(holds_peer)
    }
}
