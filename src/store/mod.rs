//! Storage boundary for nodes and subscriptions
//!
//! The core never talks to a database directly. It consumes the two traits
//! below, which expose exactly the operations the fleet service and the
//! reconciliation workers need. `MemoryStore` implements both and backs the
//! tests and standalone runs.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::fleet::{FleetBinding, Node, NodeId, Subscription, SubscriptionId, SubscriptionStatus};

pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Subscription {0} not found")]
    SubscriptionNotFound(SubscriptionId),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Nodes with `enabled && !archived`, in stable listing order
    async fn list_eligible_nodes(&self) -> Result<Vec<Node>, StoreError>;

    async fn get_node(&self, id: NodeId) -> Result<Option<Node>, StoreError>;

    async fn increment_peers(&self, id: NodeId) -> Result<(), StoreError>;

    /// Decrement floored at zero
    async fn decrement_peers(&self, id: NodeId) -> Result<(), StoreError>;

    /// Overwrite the counter with an authoritative value
    async fn set_peer_count(&self, id: NodeId, count: u32) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn get_subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>, StoreError>;

    /// Active subscriptions with `expires_at <= now`
    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>, StoreError>;

    /// Active subscriptions with `from <= expires_at < to`
    async fn list_expiring(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Subscription>, StoreError>;

    /// Active subscriptions without a fleet binding
    async fn list_unprovisioned(&self) -> Result<Vec<Subscription>, StoreError>;

    async fn update_status(
        &self,
        id: SubscriptionId,
        status: SubscriptionStatus,
    ) -> Result<(), StoreError>;

    async fn set_binding(
        &self,
        id: SubscriptionId,
        binding: Option<FleetBinding>,
    ) -> Result<(), StoreError>;

    /// Clear the binding only if it still points at `peer_id`
    ///
    /// Returns whether this call cleared it. Exactly one of several concurrent
    /// callers for the same peer sees `true`.
    async fn clear_binding_if(
        &self,
        id: SubscriptionId,
        peer_id: &str,
    ) -> Result<bool, StoreError>;
}
