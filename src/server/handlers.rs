use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::fleet::Node;
use crate::server::state::AppState;
use crate::worker::{HealthSnapshot, WorkerStatus};

/// Liveness endpoint
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

#[derive(Debug, Serialize)]
pub struct NodeHealthResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub snapshot: HealthSnapshot,
}

/// Per-node health as seen by the health-check worker
pub async fn node_health(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = match &state.health {
        Some(monitor) => monitor.snapshot().await,
        None => HealthSnapshot { nodes: Vec::new() },
    };
    Json(NodeHealthResponse {
        status: snapshot.status(),
        snapshot,
    })
}

/// Eligible nodes with their local peer counters
pub async fn list_nodes(State(state): State<AppState>) -> Result<Json<Vec<Node>>, StatusCode> {
    state.nodes.list_eligible_nodes().await.map(Json).map_err(|e| {
        error!("Status API could not list nodes: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

pub async fn list_workers(State(state): State<AppState>) -> Json<Vec<WorkerStatus>> {
    Json(state.workers.statuses())
}

/// Create the Axum router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/nodes", get(list_nodes))
        .route("/v1/nodes/health", get(node_health))
        .route("/v1/workers", get(list_workers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use chrono::Utc;
    use tower::ServiceExt;

    use crate::messaging::mock::RecordingMessenger;
    use crate::messaging::ChatId;
    use crate::store::MemoryStore;
    use crate::worker::health::mock::ScriptedProbe;
    use crate::worker::scheduled::test_jobs::CountingJob;
    use crate::worker::{HealthMonitor, ProbeResult, Schedule, ScheduledWorker, WorkerManager};

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_nodes(vec![
            Node::new(1, "fra-1", "10.0.0.1:7443", 10)
                .with_peers(4)
                .with_health_url("http://10.0.0.1/health"),
            Node::new(2, "ams-1", "10.0.0.2:7443", 10),
        ]))
    }

    fn create_test_app(health: Option<Arc<HealthMonitor>>) -> Router {
        let mut manager = WorkerManager::new();
        manager.add(Arc::new(ScheduledWorker::new(
            CountingJob::default(),
            Schedule::every(Duration::from_secs(60)),
        )));
        let mut state = AppState::new(store(), Arc::new(manager));
        if let Some(monitor) = health {
            state = state.with_health(monitor);
        }
        create_router(state)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (status, _) = get_json(create_test_app(None), "/health").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_nodes_endpoint() {
        let (status, json) = get_json(create_test_app(None), "/v1/nodes").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[0]["current_peers"], 4);
    }

    #[tokio::test]
    async fn test_workers_endpoint() {
        let (_, json) = get_json(create_test_app(None), "/v1/workers").await;
        assert_eq!(json[0]["name"], "counting");
        assert_eq!(json[0]["schedule"], "every 60s");
        assert_eq!(json[0]["completed_runs"], 0);
        assert_eq!(json[0]["panicked_runs"], 0);
    }

    #[tokio::test]
    async fn test_node_health_without_monitor() {
        let (status, json) = get_json(create_test_app(None), "/v1/nodes/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "Empty");
        assert!(json["nodes"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_node_health_reports_down_node() {
        let monitor = Arc::new(HealthMonitor::new(
            store(),
            Arc::new(ScriptedProbe::new()),
            Arc::new(RecordingMessenger::new()),
            vec![ChatId(1)],
        ));
        let node = Node::new(1, "fra-1", "10.0.0.1:7443", 10);
        monitor
            .observe(&node, &ProbeResult::unhealthy(5, "Timeout"), Utc::now())
            .await;

        let (_, json) = get_json(create_test_app(Some(monitor)), "/v1/nodes/health").await;

        assert_eq!(json["status"], "Degraded");
        assert_eq!(json["nodes"][0]["state"], "down");
        assert_eq!(json["nodes"][0]["consecutive_failures"], 1);
        assert_eq!(json["nodes"][0]["last_probe"]["error"], "Timeout");
    }
}
