//! Node agent clients
//!
//! Every node runs an agent that owns its WireGuard interface. This module
//! holds the client side of that channel: the `PeerAgent` trait with one
//! method per peer lifecycle verb, the `AgentConnector` that builds a client
//! for a node, and the HTTP implementation of both.

pub mod client;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fleet::Node;

pub use client::{AgentClient, AgentClientConfig, HttpConnector};

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePeerRequest {
    pub name: String,
}

/// Returned by the agent after a peer has been added to the interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedPeer {
    pub peer_id: String,
    pub config: String,
    #[serde(default)]
    pub qr_code: String,
    pub client_ip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub peer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub enabled: bool,
    #[serde(default)]
    pub allowed_ips: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_handshake: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rx_bytes: u64,
    #[serde(default)]
    pub tx_bytes: u64,
}

/// Peer lifecycle verbs, used to tag errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreatePeer,
    EnablePeer,
    DisablePeer,
    DeletePeer,
    GetPeer,
    ListPeers,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::CreatePeer => "create-peer",
            Operation::EnablePeer => "enable-peer",
            Operation::DisablePeer => "disable-peer",
            Operation::DeletePeer => "delete-peer",
            Operation::GetPeer => "get-peer",
            Operation::ListPeers => "list-peers",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Invalid agent address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to read {}: {source}", .path.display())]
    CertificateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TLS material in {}: {reason}", .path.display())]
    CertificateInvalid { path: PathBuf, reason: String },

    #[error("Invalid agent client configuration: {0}")]
    Config(String),

    #[error("{operation} failed: {message}")]
    Transport { operation: Operation, message: String },

    #[error("{operation} rejected by agent (HTTP {status}): {message}")]
    Status {
        operation: Operation,
        status: u16,
        message: String,
    },

    #[error("{operation} returned a malformed response: {message}")]
    Decode { operation: Operation, message: String },

    #[error("{0} attempted on a closed client")]
    Closed(Operation),
}

impl AgentError {
    /// The lifecycle verb that failed, if the error came from a call
    pub fn operation(&self) -> Option<Operation> {
        match self {
            AgentError::Transport { operation, .. }
            | AgentError::Status { operation, .. }
            | AgentError::Decode { operation, .. } => Some(*operation),
            AgentError::Closed(operation) => Some(*operation),
            _ => None,
        }
    }

    /// The agent reported the peer does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, AgentError::Status { status: 404, .. })
    }
}

// ============================================================================
// SBIO: Traits for abstraction (allows mocking in tests)
// ============================================================================

/// Client for one node's agent. Implementations must be safe for concurrent use.
#[async_trait]
pub trait PeerAgent: Send + Sync {
    async fn create_peer(&self, interface: &str, name: &str) -> Result<CreatedPeer, AgentError>;

    async fn enable_peer(&self, interface: &str, peer_id: &str) -> Result<(), AgentError>;

    async fn disable_peer(&self, interface: &str, peer_id: &str) -> Result<(), AgentError>;

    async fn delete_peer(&self, interface: &str, peer_id: &str) -> Result<(), AgentError>;

    async fn get_peer(&self, interface: &str, peer_id: &str) -> Result<PeerInfo, AgentError>;

    async fn list_peers(&self, interface: &str) -> Result<Vec<PeerInfo>, AgentError>;

    /// Release the channel; later calls fail with `AgentError::Closed`
    async fn close(&self) -> Result<(), AgentError>;
}

/// Builds a client for a node from its address and TLS settings
#[async_trait]
pub trait AgentConnector: Send + Sync {
    async fn connect(&self, node: &Node) -> Result<Arc<dyn PeerAgent>, AgentError>;
}

// ============================================================================
// SBIO: Mock implementations for testing (no I/O)
// ============================================================================
