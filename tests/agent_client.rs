//! Integration tests for the HTTP agent client
//!
//! A fake agent is served by axum on a localhost port and the real
//! `AgentClient` talks to it over the wire.

mod common;

use std::time::Duration;

use common::{find_available_port, spawn_agent};
use wgfleet::agent::{AgentClient, AgentClientConfig, AgentError, PeerAgent};
use wgfleet::fleet::Node;

async fn connect(node: &Node) -> AgentClient {
    let config = AgentClientConfig {
        request_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(2),
    };
    AgentClient::connect(node, &config).await.unwrap()
}

#[tokio::test]
async fn test_peer_lifecycle_over_http() {
    let (agent, addr) = spawn_agent().await;
    let client = connect(&Node::new(1, "fra-1", addr, 10)).await;

    let created = client.create_peer("wg0", "user-42-abcd").await.unwrap();
    assert_eq!(created.peer_id, "pk1=");
    assert_eq!(created.client_ip, "10.8.0.2");
    assert!(created.config.contains("user-42-abcd"));

    client.disable_peer("wg0", &created.peer_id).await.unwrap();
    let peer = client.get_peer("wg0", &created.peer_id).await.unwrap();
    assert!(!peer.enabled);

    client.enable_peer("wg0", &created.peer_id).await.unwrap();
    let peers = client.list_peers("wg0").await.unwrap();
    assert_eq!(peers.len(), 1);
    assert!(peers[0].enabled);

    client.delete_peer("wg0", &created.peer_id).await.unwrap();
    assert!(client.list_peers("wg0").await.unwrap().is_empty());

    let requests = agent.requests.lock().unwrap().clone();
    let methods: Vec<&str> = requests.iter().map(|r| r.split(' ').next().unwrap()).collect();
    assert_eq!(
        methods,
        vec!["POST", "DISABLE", "GET", "ENABLE", "LIST", "DELETE", "LIST"]
    );
}

#[tokio::test]
async fn test_missing_peer_maps_to_not_found() {
    let (_agent, addr) = spawn_agent().await;
    let client = connect(&Node::new(1, "fra-1", addr, 10)).await;

    let err = client.delete_peer("wg0", "nope=").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(err, AgentError::Status { status: 404, ref message, .. } if message == "peer not found"));

    let err = client.disable_peer("wg0", "nope=").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let (agent, addr) = spawn_agent().await;
    let mut node = Node::new(1, "fra-1", addr, 10);
    node.auth_token = Some("s3cret".to_string());
    let client = connect(&node).await;

    client.list_peers("wg0").await.unwrap();

    let requests = agent.requests.lock().unwrap().clone();
    assert_eq!(requests, vec!["LIST wg0 - Bearer s3cret".to_string()]);
}

#[tokio::test]
async fn test_peer_id_with_slash_reaches_agent_intact() {
    let (agent, addr) = spawn_agent().await;
    agent.insert("ab/c+d=");
    let client = connect(&Node::new(1, "fra-1", addr, 10)).await;

    client.disable_peer("wg0", "ab/c+d=").await.unwrap();

    let requests = agent.requests.lock().unwrap().clone();
    assert_eq!(requests, vec!["DISABLE wg0 ab/c+d= -".to_string()]);
    assert!(!agent.peers.lock().unwrap()["ab/c+d="].enabled);
}

#[tokio::test]
async fn test_unreachable_agent_is_transport_error() {
    let port = find_available_port();
    let client = connect(&Node::new(1, "fra-1", format!("127.0.0.1:{}", port), 10)).await;

    let err = client.list_peers("wg0").await.unwrap_err();
    assert!(matches!(err, AgentError::Transport { .. }));
    assert!(!err.is_not_found());
}

#[tokio::test]
async fn test_closed_client_rejects_calls() {
    let (agent, addr) = spawn_agent().await;
    let client = connect(&Node::new(1, "fra-1", addr, 10)).await;

    client.close().await.unwrap();
    let err = client.list_peers("wg0").await.unwrap_err();

    assert!(matches!(err, AgentError::Closed(_)));
    assert!(agent.requests.lock().unwrap().is_empty());
}
