//! Node health monitoring
//!
//! Probes the health endpoint of every eligible node that has one and keeps
//! a per-node state machine:
//!
//! ```text
//! unknown --ok--> up                   (silent)
//! unknown --fail--> down, up --fail--> down   send "down" to every admin
//! down --fail--> down                  edit the admin's message with the count
//! down --ok--> up                      send "recovered" with the downtime
//! ```
//!
//! The state map sits behind its own lock. Only the probing pass writes it;
//! the status API reads whole-record copies through `snapshot`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use super::Job;
use crate::fleet::{Node, NodeId};
use crate::messaging::{ChatId, MessageId, Messenger};
use crate::store::{NodeStore, StoreError};

/// Result of a single health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub healthy: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn healthy(latency_ms: u64) -> Self {
        Self {
            healthy: true,
            latency_ms,
            error: None,
        }
    }

    pub fn unhealthy(latency_ms: u64, error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            latency_ms,
            error: Some(error.into()),
        }
    }
}

// ============================================================================
// SBIO: Trait for abstraction (allows mocking in tests)
// ============================================================================

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeResult;
}

/// Plain GET with a bounded timeout; only `200 OK` is healthy
#[derive(Clone)]
pub struct HttpProbe {
    client: Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, url: &str) -> ProbeResult {
        let start = Instant::now();
        let result = timeout(self.timeout, self.client.get(url).send()).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(response)) if response.status() == StatusCode::OK => ProbeResult::healthy(latency_ms),
            Ok(Ok(response)) => {
                ProbeResult::unhealthy(latency_ms, format!("HTTP {}", response.status().as_u16()))
            }
            Ok(Err(e)) => ProbeResult::unhealthy(latency_ms, e.to_string()),
            Err(_) => ProbeResult::unhealthy(self.timeout.as_millis() as u64, "Timeout"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Unknown,
    Up,
    Down,
}

/// What a single observation did to a node's state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    CameUp,
    StayedUp,
    WentDown,
    StayedDown { failures: u32 },
    Recovered { downtime: Duration },
}

/// Health record for one node
#[derive(Debug, Clone, Serialize)]
pub struct NodeHealth {
    pub node_id: NodeId,
    pub node_name: String,
    pub state: NodeState,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub down_since: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_probe: Option<ProbeResult>,
    /// Admin messages reporting the current outage
    #[serde(skip)]
    pub reports: HashMap<ChatId, MessageId>,
}

impl NodeHealth {
    fn new(node: &Node) -> Self {
        Self {
            node_id: node.id,
            node_name: node.name.clone(),
            state: NodeState::Unknown,
            consecutive_failures: 0,
            down_since: None,
            last_checked: None,
            last_probe: None,
            reports: HashMap::new(),
        }
    }

    fn apply(&mut self, healthy: bool, at: DateTime<Utc>) -> Transition {
        self.last_checked = Some(at);

        match (self.state, healthy) {
            (NodeState::Up, true) => Transition::StayedUp,
            (NodeState::Unknown, true) => {
                self.state = NodeState::Up;
                Transition::CameUp
            }
            (NodeState::Down, true) => {
                let downtime = self
                    .down_since
                    .and_then(|since| (at - since).to_std().ok())
                    .unwrap_or(Duration::ZERO);
                self.state = NodeState::Up;
                self.consecutive_failures = 0;
                self.down_since = None;
                self.reports.clear();
                Transition::Recovered { downtime }
            }
            (NodeState::Unknown | NodeState::Up, false) => {
                self.state = NodeState::Down;
                self.consecutive_failures = 1;
                self.down_since = Some(at);
                Transition::WentDown
            }
            (NodeState::Down, false) => {
                self.consecutive_failures += 1;
                Transition::StayedDown {
                    failures: self.consecutive_failures,
                }
            }
        }
    }

    /// Current downtime if the node is down
    pub fn downtime(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.down_since
            .map(|since| (now - since).to_std().unwrap_or(Duration::ZERO))
    }
}

/// Copy of every node's health record
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub nodes: Vec<NodeHealth>,
}

impl HealthSnapshot {
    pub fn count(&self, state: NodeState) -> usize {
        self.nodes.iter().filter(|n| n.state == state).count()
    }

    /// Overall fleet health status
    pub fn status(&self) -> &'static str {
        if self.nodes.is_empty() {
            "Empty"
        } else if self.count(NodeState::Down) > 0 {
            "Degraded"
        } else if self.count(NodeState::Unknown) > 0 {
            "Unknown"
        } else {
            "Healthy"
        }
    }
}

/// Format a duration as human-readable string
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d{}h", secs / 86400, (secs % 86400) / 3600)
    }
}

fn down_text(node: &Node, failures: u32, probe: &ProbeResult) -> String {
    format!(
        "Node {} (#{}) is DOWN\nFailed checks: {}\nLast error: {}",
        node.name,
        node.id,
        failures,
        probe.error.as_deref().unwrap_or("unhealthy")
    )
}

fn recovered_text(node: &Node, downtime: Duration) -> String {
    format!(
        "Node {} (#{}) recovered after {} of downtime",
        node.name,
        node.id,
        format_duration(downtime)
    )
}

pub struct HealthMonitor {
    nodes: Arc<dyn NodeStore>,
    probe: Arc<dyn HealthProbe>,
    messenger: Arc<dyn Messenger>,
    admins: Vec<ChatId>,
    states: RwLock<HashMap<NodeId, NodeHealth>>,
}

impl HealthMonitor {
    pub fn new(
        nodes: Arc<dyn NodeStore>,
        probe: Arc<dyn HealthProbe>,
        messenger: Arc<dyn Messenger>,
        admins: Vec<ChatId>,
    ) -> Self {
        Self {
            nodes,
            probe,
            messenger,
            admins,
            states: RwLock::new(HashMap::new()),
        }
    }

    pub async fn snapshot(&self) -> HealthSnapshot {
        let mut nodes: Vec<NodeHealth> = self.states.read().await.values().cloned().collect();
        nodes.sort_by_key(|n| n.node_id);
        HealthSnapshot { nodes }
    }

    pub async fn node_health(&self, id: NodeId) -> Option<NodeHealth> {
        self.states.read().await.get(&id).cloned()
    }

    /// Probe every eligible node with a health endpoint, concurrently
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let nodes: Vec<Node> = self
            .nodes
            .list_eligible_nodes()
            .await?
            .into_iter()
            .filter(|n| n.health_url.is_some())
            .collect();

        if nodes.is_empty() {
            trace!("No nodes with a health endpoint");
        }

        let probes = nodes.iter().map(|node| async move {
            let url = node.health_url.as_deref().unwrap_or_default();
            (node, self.probe.probe(url).await)
        });
        let results = futures::future::join_all(probes).await;

        for (node, result) in &results {
            if !result.healthy {
                debug!(
                    "Health probe failed for node {}: {:?}",
                    node.id, result.error
                );
            }
            self.observe(node, result, now).await;
        }

        // Forget nodes that were removed, disabled or lost their endpoint
        let probed: HashSet<NodeId> = nodes.iter().map(|n| n.id).collect();
        self.states.write().await.retain(|id, _| probed.contains(id));

        Ok(results.len())
    }

    /// Feed one probe outcome into a node's state machine and notify admins
    pub async fn observe(&self, node: &Node, probe: &ProbeResult, at: DateTime<Utc>) -> Transition {
        let (transition, failures, reports) = {
            let mut states = self.states.write().await;
            let health = states
                .entry(node.id)
                .or_insert_with(|| NodeHealth::new(node));
            health.node_name = node.name.clone();
            health.last_probe = Some(probe.clone());
            let transition = health.apply(probe.healthy, at);
            (transition, health.consecutive_failures, health.reports.clone())
        };

        match transition {
            Transition::CameUp => info!("Node {} ({}) is up", node.id, node.name),
            Transition::StayedUp => {}
            Transition::WentDown => {
                warn!("Node {} ({}) is down: {:?}", node.id, node.name, probe.error);
                let reports = self
                    .report(&HashMap::new(), &down_text(node, failures, probe))
                    .await;
                self.remember_reports(node.id, reports).await;
            }
            Transition::StayedDown { failures } => {
                debug!("Node {} still down after {} checks", node.id, failures);
                let reports = self.report(&reports, &down_text(node, failures, probe)).await;
                self.remember_reports(node.id, reports).await;
            }
            Transition::Recovered { downtime } => {
                info!(
                    "Node {} ({}) recovered after {}",
                    node.id,
                    node.name,
                    format_duration(downtime)
                );
                let text = recovered_text(node, downtime);
                for &admin in &self.admins {
                    if let Err(e) = self.messenger.send_message(admin, &text).await {
                        error!("Failed to notify admin {} of node {} recovery: {}", admin, node.id, e);
                    }
                }
            }
        }

        transition
    }

    /// Edit each admin's existing report, or send one if there is none yet
    async fn report(
        &self,
        existing: &HashMap<ChatId, MessageId>,
        text: &str,
    ) -> HashMap<ChatId, MessageId> {
        let mut reports = HashMap::new();

        for &admin in &self.admins {
            match existing.get(&admin) {
                Some(&message_id) => {
                    if let Err(e) = self.messenger.edit_message(admin, message_id, text).await {
                        warn!("Failed to update outage report for admin {}: {}", admin, e);
                    }
                    reports.insert(admin, message_id);
                }
                None => match self.messenger.send_message(admin, text).await {
                    Ok(message_id) => {
                        reports.insert(admin, message_id);
                    }
                    Err(e) => error!("Failed to send outage report to admin {}: {}", admin, e),
                },
            }
        }

        reports
    }

    async fn remember_reports(&self, node: NodeId, reports: HashMap<ChatId, MessageId>) {
        if let Some(health) = self.states.write().await.get_mut(&node) {
            if health.state == NodeState::Down {
                health.reports = reports;
            }
        }
    }
}

#[async_trait]
impl Job for HealthMonitor {
    fn name(&self) -> &'static str {
        "health-check"
    }

    async fn run(&self) {
        match self.run_at(Utc::now()).await {
            Ok(probed) => trace!("Health pass probed {} node(s)", probed),
            Err(e) => error!("Health pass could not list nodes: {}", e),
        }
    }
}

// ============================================================================
// SBIO: Mock implementation for testing (no I/O)
// ============================================================================


#[cfg(test)]
mod tests {
    use super::mock::ScriptedProbe;
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};

    use crate::messaging::mock::RecordingMessenger;
    use crate::store::MemoryStore;

    fn monitor(
        nodes: Vec<Node>,
        admins: &[i64],
    ) -> (Arc<ScriptedProbe>, Arc<RecordingMessenger>, HealthMonitor) {
        let store = Arc::new(MemoryStore::with_nodes(nodes));
        let probe = Arc::new(ScriptedProbe::new());
        let messenger = Arc::new(RecordingMessenger::new());
        let monitor = HealthMonitor::new(
            store,
            probe.clone(),
            messenger.clone(),
            admins.iter().map(|&id| ChatId(id)).collect(),
        );
        (probe, messenger, monitor)
    }

    fn node() -> Node {
        Node::new(1, "fra-1", "10.0.0.1:7443", 100).with_health_url("http://10.0.0.1:8080/health")
    }

    fn outcome(healthy: bool) -> ProbeResult {
        if healthy {
            ProbeResult::healthy(3)
        } else {
            ProbeResult::unhealthy(3, "connection refused")
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(150)), "2m30s");
        assert_eq!(format_duration(Duration::from_secs(7260)), "2h1m");
        assert_eq!(format_duration(Duration::from_secs(2 * 86400 + 3600)), "2d1h");
    }

    #[tokio::test]
    async fn test_up_down_down_down_up_sequence() {
        let (_, messenger, monitor) = monitor(vec![], &[900]);
        let node = node();
        let sequence = [true, false, false, false, true];

        let mut transitions = Vec::new();
        for (i, healthy) in sequence.into_iter().enumerate() {
            let at = t0() + ChronoDuration::seconds(30 * i as i64);
            transitions.push(monitor.observe(&node, &outcome(healthy), at).await);
        }

        assert_eq!(transitions[0], Transition::CameUp);
        assert_eq!(transitions[1], Transition::WentDown);
        assert_eq!(transitions[3], Transition::StayedDown { failures: 3 });
        assert_eq!(
            transitions[4],
            Transition::Recovered {
                downtime: Duration::from_secs(90)
            }
        );

        let messages = messenger.messages();
        let edits = messenger.edits();
        assert_eq!(messages.len(), 2, "one down report and one recovery");
        assert!(messages[0].1.contains("is DOWN"));
        assert!(messages[1].1.contains("recovered after 1m30s"));

        assert_eq!(edits.len(), 2);
        assert!(edits[0].2.contains("Failed checks: 2"));
        assert!(edits[1].2.contains("Failed checks: 3"));

        let health = monitor.node_health(NodeId(1)).await.unwrap();
        assert_eq!(health.state, NodeState::Up);
        assert_eq!(health.consecutive_failures, 0);
        assert!(health.reports.is_empty());
        assert!(health.down_since.is_none());
    }

    #[tokio::test]
    async fn test_first_observation_down_alerts() {
        let (_, messenger, monitor) = monitor(vec![], &[900, 901]);

        let t = monitor.observe(&node(), &outcome(false), t0()).await;

        assert_eq!(t, Transition::WentDown);
        let recipients: Vec<_> = messenger.messages().into_iter().map(|(c, _)| c).collect();
        assert_eq!(recipients, vec![ChatId(900), ChatId(901)]);
        assert_eq!(monitor.node_health(NodeId(1)).await.unwrap().reports.len(), 2);
    }

    #[tokio::test]
    async fn test_edits_target_the_original_message() {
        let (_, messenger, monitor) = monitor(vec![], &[900]);
        let node = node();

        monitor.observe(&node, &outcome(false), t0()).await;
        monitor
            .observe(&node, &outcome(false), t0() + ChronoDuration::seconds(30))
            .await;

        let (_, original) = messenger
            .log()
            .into_iter()
            .find_map(|s| match s {
                crate::messaging::mock::Sent::Message { to, id, .. } => Some((to, id)),
                _ => None,
            })
            .unwrap();
        assert_eq!(messenger.edits()[0].1, original);
    }

    #[tokio::test]
    async fn test_admin_without_report_gets_fresh_send() {
        let (_, messenger, monitor) = monitor(vec![], &[900, 901]);
        let node = node();
        messenger.fail_for(ChatId(901));

        monitor.observe(&node, &outcome(false), t0()).await;
        assert_eq!(monitor.node_health(NodeId(1)).await.unwrap().reports.len(), 1);

        messenger.allow(ChatId(901));
        monitor
            .observe(&node, &outcome(false), t0() + ChronoDuration::seconds(30))
            .await;

        // 900 got an edit, 901 a first report
        assert_eq!(messenger.edits().len(), 1);
        assert_eq!(messenger.edits()[0].0, ChatId(900));
        assert_eq!(messenger.messages().len(), 2);
        assert_eq!(messenger.messages()[1].0, ChatId(901));
        assert_eq!(monitor.node_health(NodeId(1)).await.unwrap().reports.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_to_up_is_silent() {
        let (_, messenger, monitor) = monitor(vec![], &[900]);
        monitor.observe(&node(), &outcome(true), t0()).await;
        monitor
            .observe(&node(), &outcome(true), t0() + ChronoDuration::seconds(30))
            .await;
        assert!(messenger.log().is_empty());
    }

    #[tokio::test]
    async fn test_run_skips_nodes_without_endpoint() {
        let with_url = node();
        let without_url = Node::new(2, "ams-1", "10.0.0.2:7443", 100);
        let mut disabled = Node::new(3, "waw-1", "10.0.0.3:7443", 100)
            .with_health_url("http://10.0.0.3:8080/health");
        disabled.enabled = false;

        let (probe, _, monitor) = monitor(vec![with_url, without_url, disabled], &[900]);

        let probed = monitor.run_at(t0()).await.unwrap();

        assert_eq!(probed, 1);
        assert_eq!(probe.probed(), vec!["http://10.0.0.1:8080/health".to_string()]);
        let snapshot = monitor.snapshot().await;
        assert_eq!(snapshot.nodes.len(), 1);
        assert_eq!(snapshot.status(), "Healthy");
    }

    #[tokio::test]
    async fn test_run_drives_state_machine() {
        let (probe, messenger, monitor) = monitor(vec![node()], &[900]);
        probe.script("http://10.0.0.1:8080/health", &[false, false, true]);

        monitor.run_at(t0()).await.unwrap();
        assert_eq!(monitor.snapshot().await.status(), "Degraded");
        monitor.run_at(t0() + ChronoDuration::seconds(30)).await.unwrap();
        monitor.run_at(t0() + ChronoDuration::seconds(60)).await.unwrap();

        assert_eq!(messenger.messages().len(), 2);
        assert_eq!(messenger.edits().len(), 1);
        assert_eq!(monitor.snapshot().await.count(NodeState::Up), 1);
    }

    #[test]
    fn test_snapshot_status() {
        let mut health = NodeHealth::new(&node());
        let snapshot = HealthSnapshot {
            nodes: vec![health.clone()],
        };
        assert_eq!(snapshot.status(), "Unknown");

        health.apply(true, t0());
        let snapshot = HealthSnapshot { nodes: vec![health] };
        assert_eq!(snapshot.status(), "Healthy");

        assert_eq!(HealthSnapshot { nodes: vec![] }.status(), "Empty");
    }
}
