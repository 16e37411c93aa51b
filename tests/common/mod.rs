//! Shared helpers for integration tests: a fake node agent served by axum

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::time::sleep;

use wgfleet::agent::PeerInfo;

/// Find an available port for testing
pub fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to address")
        .local_addr()
        .expect("Failed to get local address")
        .port()
}

#[derive(Clone, Default)]
pub struct FakeAgent {
    pub peers: Arc<Mutex<BTreeMap<String, PeerInfo>>>,
    /// "METHOD iface peer auth" per request
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl FakeAgent {
    fn record(&self, method: &str, iface: &str, peer: &str, headers: &HeaderMap) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        self.requests
            .lock()
            .unwrap()
            .push(format!("{} {} {} {}", method, iface, peer, auth));
    }

    pub fn insert(&self, peer_id: &str) {
        self.peers.lock().unwrap().insert(
            peer_id.to_string(),
            PeerInfo {
                peer_id: peer_id.to_string(),
                name: None,
                enabled: true,
                allowed_ips: vec!["10.8.0.9/32".to_string()],
                latest_handshake: None,
                rx_bytes: 0,
                tx_bytes: 0,
            },
        );
    }
}

async fn create_peer(
    State(agent): State<FakeAgent>,
    Path(iface): Path<String>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    agent.record("POST", &iface, "-", &headers);
    let count = agent.peers.lock().unwrap().len();
    let peer_id = format!("pk{}=", count + 1);
    agent.insert(&peer_id);
    Json(json!({
        "peer_id": peer_id,
        "config": format!("[Interface]\n# {}\n", body["name"].as_str().unwrap_or_default()),
        "qr_code": "qr",
        "client_ip": format!("10.8.0.{}", count + 2),
    }))
}

async fn list_peers(
    State(agent): State<FakeAgent>,
    Path(iface): Path<String>,
    headers: HeaderMap,
) -> Json<Vec<PeerInfo>> {
    agent.record("LIST", &iface, "-", &headers);
    Json(agent.peers.lock().unwrap().values().cloned().collect())
}

async fn get_peer(
    State(agent): State<FakeAgent>,
    Path((iface, peer_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<PeerInfo>, (StatusCode, String)> {
    agent.record("GET", &iface, &peer_id, &headers);
    agent
        .peers
        .lock()
        .unwrap()
        .get(&peer_id)
        .cloned()
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "peer not found".to_string()))
}

async fn delete_peer(
    State(agent): State<FakeAgent>,
    Path((iface, peer_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, (StatusCode, String)> {
    agent.record("DELETE", &iface, &peer_id, &headers);
    match agent.peers.lock().unwrap().remove(&peer_id) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err((StatusCode::NOT_FOUND, "peer not found".to_string())),
    }
}

fn set_enabled(
    agent: &FakeAgent,
    peer_id: &str,
    enabled: bool,
) -> Result<StatusCode, (StatusCode, String)> {
    match agent.peers.lock().unwrap().get_mut(peer_id) {
        Some(peer) => {
            peer.enabled = enabled;
            Ok(StatusCode::OK)
        }
        None => Err((StatusCode::NOT_FOUND, "peer not found".to_string())),
    }
}

async fn enable_peer(
    State(agent): State<FakeAgent>,
    Path((iface, peer_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, (StatusCode, String)> {
    agent.record("ENABLE", &iface, &peer_id, &headers);
    set_enabled(&agent, &peer_id, true)
}

async fn disable_peer(
    State(agent): State<FakeAgent>,
    Path((iface, peer_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, (StatusCode, String)> {
    agent.record("DISABLE", &iface, &peer_id, &headers);
    set_enabled(&agent, &peer_id, false)
}

/// Serve a fake agent and return it with its address
pub async fn spawn_agent() -> (FakeAgent, String) {
    let agent = FakeAgent::default();
    let app = Router::new()
        .route("/v1/interfaces/{iface}/peers", post(create_peer).get(list_peers))
        .route(
            "/v1/interfaces/{iface}/peers/{peer_id}",
            get(get_peer).delete(delete_peer),
        )
        .route("/v1/interfaces/{iface}/peers/{peer_id}/enable", post(enable_peer))
        .route("/v1/interfaces/{iface}/peers/{peer_id}/disable", post(disable_peer))
        .with_state(agent.clone());

    let port = find_available_port();
    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind fake agent");
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give server time to start
    sleep(Duration::from_millis(50)).await;
    (agent, addr)
}
