//! Subscription records and their fleet binding

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::node::NodeId;

/// Identifier of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub i64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a subscriber; doubles as their chat id for messaging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// Created, payment not yet confirmed
    Pending,
    Active,
    Expired,
    Disabled,
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// What the subscriber needs to connect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionArtifact {
    /// wg-quick config text
    pub config: String,
    /// Machine-decodable rendering of the config (e.g., a QR code payload)
    pub qr_code: String,
    pub client_ip: String,
}

/// Links a subscription to the peer provisioned for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetBinding {
    pub node_id: NodeId,
    /// Peer identifier on the node (the WireGuard public key)
    pub peer_id: String,
    pub artifact: ConnectionArtifact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub tariff: String,
    pub status: SubscriptionStatus,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<FleetBinding>,
}

impl Subscription {
    pub fn new(id: i64, user_id: i64, tariff: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: SubscriptionId(id),
            user_id: UserId(user_id),
            tariff: tariff.into(),
            status: SubscriptionStatus::Active,
            expires_at,
            binding: None,
        }
    }

    pub fn with_status(mut self, status: SubscriptionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_binding(mut self, binding: FleetBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Paid for but never received a peer
    pub fn needs_provisioning(&self) -> bool {
        self.is_active() && self.binding.is_none()
    }
}
