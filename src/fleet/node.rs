//! Node resource - a remote machine running WireGuard and a peer agent
//!
//! A Node is registered by an operator and carries:
//! - Where clients connect (`endpoint`) and where the agent listens (`rpc_address`)
//! - Capacity (`max_peers`) and the locally tracked load (`current_peers`)
//! - Transport security settings for the agent channel
//! - An optional health URL (health checks are opt-in per node)

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identifier of a node in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub i64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A WireGuard node in the fleet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,

    /// Display name shown to admins
    pub name: String,

    /// Client-facing WireGuard endpoint (e.g., "vpn-1.example.com:51820")
    pub endpoint: String,

    /// Control-plane address of the peer agent (e.g., "10.0.0.5:7443")
    pub rpc_address: String,

    /// WireGuard interface managed on the node
    #[serde(default = "default_interface")]
    pub interface: String,

    /// DNS servers advertised in issued configs
    #[serde(default)]
    pub dns: Vec<String>,

    pub max_peers: u32,

    /// Locally tracked peer count; an estimate, corrected by reconciliation
    #[serde(default)]
    pub current_peers: u32,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub archived: bool,

    #[serde(default)]
    pub tls: TlsSettings,

    /// Bearer token presented to the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Health endpoint probed by the health-check worker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_url: Option<String>,
}

/// Transport security for the agent channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TlsSettings {
    #[serde(default)]
    pub enabled: bool,

    /// CA bundle used to verify the agent (system roots if absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    /// Client certificate for mutual TLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert: Option<PathBuf>,

    /// Client private key for mutual TLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<PathBuf>,

    /// Expected certificate hostname, when it differs from the RPC address host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
}

/// How the agent channel is secured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Plain,
    Tls,
    MutualTls,
}

impl TlsSettings {
    pub fn mode(&self) -> TransportMode {
        if !self.enabled {
            TransportMode::Plain
        } else if self.client_cert.is_some() && self.client_key.is_some() {
            TransportMode::MutualTls
        } else {
            TransportMode::Tls
        }
    }
}

fn default_interface() -> String {
    "wg0".to_string()
}

fn default_true() -> bool {
    true
}

impl Node {
    /// Create an enabled node with no load and a plain agent channel
    pub fn new(id: i64, name: impl Into<String>, rpc_address: impl Into<String>, max_peers: u32) -> Self {
        let rpc_address = rpc_address.into();
        Self {
            id: NodeId(id),
            name: name.into(),
            endpoint: rpc_address.clone(),
            rpc_address,
            interface: default_interface(),
            dns: Vec::new(),
            max_peers,
            current_peers: 0,
            enabled: true,
            archived: false,
            tls: TlsSettings::default(),
            auth_token: None,
            health_url: None,
        }
    }

    pub fn with_peers(mut self, current_peers: u32) -> Self {
        self.current_peers = current_peers;
        self
    }

    pub fn with_health_url(mut self, url: impl Into<String>) -> Self {
        self.health_url = Some(url.into());
        self
    }

    pub fn with_tls(mut self, tls: TlsSettings) -> Self {
        self.tls = tls;
        self
    }

    /// Enabled and not archived
    pub fn is_eligible(&self) -> bool {
        self.enabled && !self.archived
    }

    pub fn has_capacity(&self) -> bool {
        self.current_peers < self.max_peers
    }

    pub fn free_slots(&self) -> u32 {
        self.max_peers.saturating_sub(self.current_peers)
    }
}
