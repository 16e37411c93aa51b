//! Integration tests for the HTTP health probe

mod common;

use std::time::Duration;

use axum::{http::StatusCode, routing::get, Router};
use tokio::time::sleep;

use common::find_available_port;
use wgfleet::worker::{HealthProbe, HttpProbe};

async fn spawn_health_server() -> String {
    let app = Router::new()
        .route("/ok", get(|| async { StatusCode::OK }))
        .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route("/empty", get(|| async { StatusCode::NO_CONTENT }))
        .route(
            "/slow",
            get(|| async {
                sleep(Duration::from_secs(2)).await;
                StatusCode::OK
            }),
        );

    let port = find_available_port();
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .expect("Failed to bind health server");
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    sleep(Duration::from_millis(50)).await;
    format!("http://127.0.0.1:{}", port)
}

#[tokio::test]
async fn test_success_status_is_healthy() {
    let base = spawn_health_server().await;
    let probe = HttpProbe::new(Duration::from_secs(1)).unwrap();

    let result = probe.probe(&format!("{}/ok", base)).await;
    assert!(result.healthy);
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_error_status_is_unhealthy() {
    let base = spawn_health_server().await;
    let probe = HttpProbe::new(Duration::from_secs(1)).unwrap();

    let result = probe.probe(&format!("{}/broken", base)).await;
    assert!(!result.healthy);
    assert_eq!(result.error.as_deref(), Some("HTTP 500"));
}

#[tokio::test]
async fn test_other_success_codes_are_unhealthy() {
    let base = spawn_health_server().await;
    let probe = HttpProbe::new(Duration::from_secs(1)).unwrap();

    let result = probe.probe(&format!("{}/empty", base)).await;
    assert!(!result.healthy);
    assert_eq!(result.error.as_deref(), Some("HTTP 204"));
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let base = spawn_health_server().await;
    let probe = HttpProbe::new(Duration::from_millis(200)).unwrap();

    let started = std::time::Instant::now();
    let result = probe.probe(&format!("{}/slow", base)).await;

    assert!(!result.healthy);
    assert!(result.error.is_some());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_connection_refused_is_unhealthy() {
    let port = find_available_port();
    let probe = HttpProbe::new(Duration::from_secs(1)).unwrap();

    let result = probe.probe(&format!("http://127.0.0.1:{}/health", port)).await;
    assert!(!result.healthy);
    assert!(result.error.is_some());
}
