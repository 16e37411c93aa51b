use thiserror::Error;

use super::node::NodeId;
use super::subscription::SubscriptionId;
use crate::agent::{AgentError, Operation};
use crate::store::StoreError;

/// Generic text for conversation-facing callers
pub const TRY_AGAIN_LATER: &str =
    "Something went wrong while setting up your VPN access. Please try again later.";

/// Errors returned by the fleet service
#[derive(Error, Debug)]
pub enum FleetError {
    #[error("No nodes available")]
    NoNodesAvailable,

    #[error("All nodes are at capacity")]
    FleetAtCapacity,

    #[error("Subscription {subscription} has no fleet binding")]
    BindingMissing { subscription: SubscriptionId },

    #[error("Node {node} not found in registry")]
    NodeMissing { node: NodeId },

    #[error("Failed to build agent client for node {node}: {source}")]
    ClientConstruction {
        node: NodeId,
        #[source]
        source: AgentError,
    },

    #[error("{operation} on node {node} failed: {source}")]
    RemoteCall {
        node: NodeId,
        operation: Operation,
        #[source]
        source: AgentError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl FleetError {
    /// No node can take a new peer right now
    pub fn is_capacity(&self) -> bool {
        matches!(self, FleetError::NoNodesAvailable | FleetError::FleetAtCapacity)
    }

    /// Failure that may clear up on its own (network, agent restarts)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FleetError::RemoteCall { .. } | FleetError::Store(_)
        ) || self.is_capacity()
    }

    /// The bound peer no longer exists anywhere it could be reached
    ///
    /// Covers a missing binding, a node gone from the registry and an agent
    /// that reports the peer as unknown. None of these clear up on retry.
    pub fn is_peer_gone(&self) -> bool {
        match self {
            FleetError::BindingMissing { .. } | FleetError::NodeMissing { .. } => true,
            FleetError::RemoteCall { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Text safe to show a subscriber
    pub fn user_message(&self) -> &'static str {
        TRY_AGAIN_LATER
    }
}
