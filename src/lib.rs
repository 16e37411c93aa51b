//! # wgfleet
//!
//! Provisions WireGuard peers for subscribers across a fleet of VPN nodes
//! and keeps the fleet reconciled with the subscription store.
//!
//! - [`fleet`] - balancer, agent client pool and the peer lifecycle service
//! - [`agent`] - RPC boundary to the per-node WireGuard agents
//! - [`store`] - node and subscription storage boundary
//! - [`messaging`] - outbound user and admin notifications
//! - [`worker`] - scheduled reconciliation loops and their manager
//! - [`server`] - read-only status API

pub mod agent;
pub mod cli;
pub mod config;
pub mod fleet;
pub mod messaging;
pub mod server;
pub mod store;
pub mod worker;
