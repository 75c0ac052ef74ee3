use super::*;
use crate::Config;
use crate::extractor::test_helpers::ScriptedBackend;
use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use tower::ServiceExt;


fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.download.output_dir = dir.path().join("downloads");
    config.download.playlist_subdir = false;
    config.formatter.source_root = dir.path().join("versions");
    config.formatter.target_root = dir.path().join("serialized");
    config.jobs.idle_timeout = Duration::from_millis(200);
    config
}

/// Router backed by a scripted extraction backend
async fn create_test_router(dir: &TempDir, backend: ScriptedBackend) -> (Router, JobManager) {
    create_router_with_config(test_config(dir), backend).await
}

async fn create_router_with_config(config: Config, backend: ScriptedBackend) -> (Router, JobManager) {
    let manager = JobManager::with_backend(config, Arc::new(backend))
        .await
        .unwrap();
    (create_router(manager.clone()), manager)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_api_server_spawns() {
    let dir = tempdir().unwrap();
    let mut config = test_config(&dir);
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap(); // Port 0 = OS assigns a free port
    let manager = JobManager::with_backend(config, Arc::new(ScriptedBackend::new(&[])))
        .await
        .unwrap();

    let api_handle = tokio::spawn({
        let manager = manager.clone();
        async move { start_api_server(manager).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.shutdown().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), api_handle)
        .await
        .expect("server did not stop after shutdown")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_cors_enabled() {
    let dir = tempdir().unwrap();
    let mut config = test_config(&dir);
    config.server.api.cors_enabled = true;
    config.server.api.cors_origins = vec!["*".to_string()];
    let (app, _manager) = create_router_with_config(config, ScriptedBackend::new(&[])).await;

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let dir = tempdir().unwrap();
    let mut config = test_config(&dir);
    config.server.api.cors_enabled = false;
    let (app, _manager) = create_router_with_config(config, ScriptedBackend::new(&[])).await;

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_swagger_ui_toggle() {
    let dir = tempdir().unwrap();
    let (app, _manager) = create_test_router(&dir, ScriptedBackend::new(&[])).await;
    let response = app
        .oneshot(get_request("/api-docs/openapi.json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut config = test_config(&dir);
    config.server.api.swagger_ui = false;
    let (app, _manager) = create_router_with_config(config, ScriptedBackend::new(&[])).await;
    let response = app
        .oneshot(get_request("/api-docs/openapi.json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
