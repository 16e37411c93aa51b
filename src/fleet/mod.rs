//! # Fleet orchestration
//!
//! Provisioning and reclaiming WireGuard peers across the node fleet.
//!
//! ```text
//!   handlers / workers
//!          │
//!          ▼
//!   ┌──────────────┐     ┌──────────┐     ┌──────────────┐
//!   │ FleetService │────▶│ Balancer │────▶│  NodeStore   │
//!   └──────────────┘     └──────────┘     └──────────────┘
//!          │
//!          ▼
//!   ┌──────────────┐     ┌──────────────────────────────┐
//!   │  ClientPool  │────▶│ PeerAgent (one per node id)  │──▶ node agent
//!   └──────────────┘     └──────────────────────────────┘
//! ```
//!
//! The registry's `current_peers` counter is an estimate maintained by the
//! service. It is allowed to drift when a remote call succeeds and the counter
//! write fails; the peer-count worker repairs it.

pub mod balancer;
pub mod error;
pub mod node;
pub mod pool;
pub mod service;
pub mod subscription;

pub use balancer::{pick_least_loaded, Balancer};
pub use error::{FleetError, TRY_AGAIN_LATER};
pub use node::{Node, NodeId, TlsSettings, TransportMode};
pub use pool::ClientPool;
pub use service::FleetService;
pub use subscription::{
    ConnectionArtifact, FleetBinding, Subscription, SubscriptionId, SubscriptionStatus, UserId,
};
