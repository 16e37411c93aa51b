//! HTTP client for the node agent
//!
//! Talks JSON over HTTP to the agent at the node's RPC address. The channel is
//! plain, TLS or mutual TLS depending on the node's `TlsSettings`. All TLS
//! material is read and parsed when the client is built, so a bad certificate
//! fails construction rather than the first call.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Certificate, Client, Identity, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{
    AgentConnector, AgentError, CreatePeerRequest, CreatedPeer, Operation, PeerAgent, PeerInfo,
};
use crate::fleet::{Node, NodeId, TlsSettings, TransportMode};

/// Settings shared by every agent client
#[derive(Debug, Clone)]
pub struct AgentClientConfig {
    /// Upper bound for a single agent call
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for AgentClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

pub struct AgentClient {
    node_id: NodeId,
    client: Client,
    base_url: Url,
    closed: AtomicBool,
}

impl AgentClient {
    /// Build a client for `node`, loading TLS material as configured
    pub async fn connect(node: &Node, config: &AgentClientConfig) -> Result<Self, AgentError> {
        let mode = node.tls.mode();
        let mut base_url = parse_rpc_address(&node.rpc_address, mode != TransportMode::Plain)?;

        let mut builder = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout);

        if let Some(ref token) = node.auth_token {
            let mut headers = HeaderMap::new();
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| AgentError::Config(format!("auth token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }

        if mode != TransportMode::Plain {
            builder = apply_tls(builder.use_rustls_tls(), &node.tls).await?;

            if let Some(ref server_name) = node.tls.server_name {
                let host = base_url.host_str().unwrap_or_default().to_string();
                if !server_name.eq_ignore_ascii_case(&host) {
                    // Verify against the server name while dialing the configured address
                    let port = base_url.port_or_known_default().unwrap_or(443);
                    let addr = tokio::net::lookup_host((host.as_str(), port))
                        .await
                        .map_err(|e| AgentError::InvalidAddress {
                            address: node.rpc_address.clone(),
                            reason: e.to_string(),
                        })?
                        .next()
                        .ok_or_else(|| AgentError::InvalidAddress {
                            address: node.rpc_address.clone(),
                            reason: "host did not resolve".to_string(),
                        })?;
                    base_url
                        .set_host(Some(server_name))
                        .map_err(|e| AgentError::Config(format!("server name '{}': {}", server_name, e)))?;
                    builder = builder.resolve(server_name, addr);
                }
            }
        }

        let client = builder
            .build()
            .map_err(|e| AgentError::Config(e.to_string()))?;

        debug!(
            "Built agent client for node {} at {} ({:?})",
            node.id, base_url, mode
        );

        Ok(Self {
            node_id: node.id,
            client,
            base_url,
            closed: AtomicBool::new(false),
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `/v1/interfaces/{iface}/peers[/{tail}...]` with each segment percent-encoded
    pub fn peers_url(&self, interface: &str, tail: &[&str]) -> Result<Url, AgentError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| AgentError::Config(format!("cannot-be-a-base URL {}", self.base_url)))?;
            segments.pop_if_empty();
            segments.extend(["v1", "interfaces", interface, "peers"]);
            segments.extend(tail);
        }
        Ok(url)
    }

    async fn send(&self, operation: Operation, request: RequestBuilder) -> Result<Response, AgentError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AgentError::Closed(operation));
        }

        let response = request.send().await.map_err(|e| AgentError::Transport {
            operation,
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AgentError::Status {
                operation,
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: Operation,
        request: RequestBuilder,
    ) -> Result<T, AgentError> {
        let response = self.send(operation, request).await?;
        response.json::<T>().await.map_err(|e| AgentError::Decode {
            operation,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl PeerAgent for AgentClient {
    async fn create_peer(&self, interface: &str, name: &str) -> Result<CreatedPeer, AgentError> {
        let url = self.peers_url(interface, &[])?;
        let body = CreatePeerRequest {
            name: name.to_string(),
        };
        self.send_json(Operation::CreatePeer, self.client.post(url).json(&body))
            .await
    }

    async fn enable_peer(&self, interface: &str, peer_id: &str) -> Result<(), AgentError> {
        let url = self.peers_url(interface, &[peer_id, "enable"])?;
        self.send(Operation::EnablePeer, self.client.post(url)).await?;
        Ok(())
    }

    async fn disable_peer(&self, interface: &str, peer_id: &str) -> Result<(), AgentError> {
        let url = self.peers_url(interface, &[peer_id, "disable"])?;
        self.send(Operation::DisablePeer, self.client.post(url)).await?;
        Ok(())
    }

    async fn delete_peer(&self, interface: &str, peer_id: &str) -> Result<(), AgentError> {
        let url = self.peers_url(interface, &[peer_id])?;
        self.send(Operation::DeletePeer, self.client.delete(url)).await?;
        Ok(())
    }

    async fn get_peer(&self, interface: &str, peer_id: &str) -> Result<PeerInfo, AgentError> {
        let url = self.peers_url(interface, &[peer_id])?;
        self.send_json(Operation::GetPeer, self.client.get(url)).await
    }

    async fn list_peers(&self, interface: &str) -> Result<Vec<PeerInfo>, AgentError> {
        let url = self.peers_url(interface, &[])?;
        self.send_json(Operation::ListPeers, self.client.get(url)).await
    }

    async fn close(&self) -> Result<(), AgentError> {
        self.closed.store(true, Ordering::Release);
        debug!("Closed agent client for node {}", self.node_id);
        Ok(())
    }
}

/// Connector producing `AgentClient`s
#[derive(Debug, Clone, Default)]
pub struct HttpConnector {
    config: AgentClientConfig,
}

impl HttpConnector {
    pub fn new(config: AgentClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AgentConnector for HttpConnector {
    async fn connect(&self, node: &Node) -> Result<Arc<dyn PeerAgent>, AgentError> {
        let client = AgentClient::connect(node, &self.config).await?;
        Ok(Arc::new(client))
    }
}

// ============================================================================
// Pure helpers
// ============================================================================

/// Turn "host:port" (or a full URL) into the agent base URL
pub fn parse_rpc_address(address: &str, tls: bool) -> Result<Url, AgentError> {
    let invalid = |reason: &str| AgentError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty address"));
    }

    let without_scheme = match trimmed.split_once("://") {
        Some((scheme, rest)) if scheme == "http" || scheme == "https" => rest,
        Some((scheme, _)) => return Err(invalid(&format!("unsupported scheme '{}'", scheme))),
        None => trimmed,
    };

    let scheme = if tls { "https" } else { "http" };
    let url = Url::parse(&format!("{}://{}", scheme, without_scheme))
        .map_err(|e| invalid(&e.to_string()))?;

    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(invalid("missing host"));
    }
    let has_port = without_scheme
        .trim_end_matches('/')
        .rsplit_once(':')
        .map(|(_, port)| port.parse::<u16>().is_ok())
        .unwrap_or(false);
    if !has_port {
        return Err(invalid("missing port"));
    }

    Ok(url)
}

async fn read_file(path: &Path) -> Result<Vec<u8>, AgentError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| AgentError::CertificateRead {
            path: path.to_path_buf(),
            source,
        })
}

async fn apply_tls(
    mut builder: reqwest::ClientBuilder,
    tls: &TlsSettings,
) -> Result<reqwest::ClientBuilder, AgentError> {
    if let Some(ref ca_path) = tls.ca_cert {
        let pem = read_file(ca_path).await?;
        let certs = Certificate::from_pem_bundle(&pem).map_err(|e| AgentError::CertificateInvalid {
            path: ca_path.clone(),
            reason: e.to_string(),
        })?;
        if certs.is_empty() {
            return Err(AgentError::CertificateInvalid {
                path: ca_path.clone(),
                reason: "no certificates found".to_string(),
            });
        }
        builder = builder.tls_built_in_root_certs(false);
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
    }

    match (&tls.client_cert, &tls.client_key) {
        (Some(cert_path), Some(key_path)) => {
            let mut pem = read_file(key_path).await?;
            pem.push(b'\n');
            pem.extend(read_file(cert_path).await?);
            let identity = Identity::from_pem(&pem).map_err(|e| AgentError::CertificateInvalid {
                path: cert_path.clone(),
                reason: e.to_string(),
            })?;
            builder = builder.identity(identity);
        }
        (None, None) => {}
        _ => {
            return Err(AgentError::Config(
                "client certificate and key must be configured together".to_string(),
            ))
        }
    }

    Ok(builder)
}
