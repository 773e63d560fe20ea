use super::*;
use crate::delivery::ChannelSet;
use crate::extractor::MediaExtractor;
use crate::test_helpers::{ScriptStep, ScriptedExtractor, wait_for_terminal};
use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::Response;
use std::time::Duration;
use tempfile::tempdir;
use tower::ServiceExt;


/// Relay over a scripted extractor, wrapped for the router
async fn create_test_relay(
    steps: Vec<ScriptStep>,
    channels: ChannelSet,
) -> (Arc<MediaRelay>, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = Config::default();
    config.storage.downloads_dir = temp_dir.path().to_path_buf();
    config.telegram.public_base_url = "http://relay.test".into();
    let extractor: Arc<dyn MediaExtractor> = Arc::new(ScriptedExtractor::new(steps));
    let relay = MediaRelay::with_components(config, extractor, channels)
        .await
        .unwrap();
    (Arc::new(relay), temp_dir)
}

/// Script that completes with a small file
fn finishes() -> Vec<ScriptStep> {
    vec![
        ScriptStep::Progress(5, 10),
        ScriptStep::Progress(10, 10),
        ScriptStep::Finish,
        ScriptStep::Write(b"0123456789".to_vec()),
    ]
}

fn app_for(relay: &Arc<MediaRelay>) -> Router {
    create_router(relay.clone(), Arc::new(relay.config().clone()))
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Submit through the API and wait for the job to finish
async fn submit_and_wait(relay: &Arc<MediaRelay>) -> String {
    let response = app_for(relay)
        .oneshot(json_request(
            "POST",
            "/api/download",
            serde_json::json!({"url": "https://example.com/watch?v=1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let id = body["file_id"].as_str().unwrap().to_string();
    wait_for_terminal(
        relay.store().as_ref(),
        &crate::types::JobId::parse(&id).unwrap(),
    )
    .await;
    id
}

#[tokio::test]
async fn api_server_spawns_and_stops_on_cancel() {
    let (relay, _temp_dir) = create_test_relay(finishes(), ChannelSet::none()).await;

    let mut config = relay.config().clone();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let shutdown = CancellationToken::new();

    let api_handle = tokio::spawn({
        let relay = relay.clone();
        let shutdown = shutdown.clone();
        async move { start_api_server(relay, Arc::new(config), shutdown).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), api_handle)
        .await
        .expect("server did not stop after cancellation")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn cors_headers_present_for_any_origin() {
    let (relay, _temp_dir) = create_test_relay(finishes(), ChannelSet::none()).await;

    let mut config = relay.config().clone();
    config.api.cors_enabled = true;
    config.api.cors_origins = vec!["*".to_string()];
    let app = create_router(relay, Arc::new(config));

    let request = Request::builder()
        .uri("/api/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn cors_disabled_adds_no_headers() {
    let (relay, _temp_dir) = create_test_relay(finishes(), ChannelSet::none()).await;

    let mut config = relay.config().clone();
    config.api.cors_enabled = false;
    let app = create_router(relay, Arc::new(config));

    let request = Request::builder()
        .uri("/api/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(
        response
            .headers()
            .get("access-control-allow-origin")
            .is_none()
    );
}

#[tokio::test]
async fn swagger_ui_can_be_disabled() {
    let (relay, _temp_dir) = create_test_relay(finishes(), ChannelSet::none()).await;

    let mut config = relay.config().clone();
    config.api.swagger_ui = false;
    let app = create_router(relay, Arc::new(config));

    let response = app.oneshot(get_request("/swagger-ui/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
