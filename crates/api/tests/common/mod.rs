#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::Message;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use thermogate_api::config::{ConcurrentPolicy, ServerConfig};
use thermogate_api::router::build_app_router;
use thermogate_api::state::AppState;
use thermogate_core::measurement::Measurement;
use thermogate_core::polling::PollInterval;
use thermogate_db::MemoryTelemetryStore;
use tokio::sync::mpsc;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 60,
        database_url: None,
        subscriber_queue_capacity: 16,
        polling_interval: PollInterval::from_millis(5_000).unwrap(),
        staleness_check_secs: 5,
        staleness_grace_ms: 10_000,
        retrieval_timeout_secs: 30,
        retrieval_policy: ConcurrentPolicy::Join,
        heartbeat_interval_secs: 30,
        max_bundle_bytes: 1024 * 1024,
    }
}

/// Application state backed by the in-memory store.
pub fn test_state() -> AppState {
    AppState::new(test_config(), Arc::new(MemoryTelemetryStore::new()))
}

/// Build the full application router with the production middleware stack.
pub fn build_test_app(state: AppState) -> Router {
    build_app_router(state, &test_config())
}

/// Eight-channel reading with the given values.
pub fn measurement(values: &[f64]) -> Measurement {
    let channels = (1..=values.len()).map(|i| format!("T{i}")).collect();
    let raw = values.iter().map(|v| (v * 10.0).round() as u16).collect();
    Measurement::new("radix-umx201", 1759155793.19, channels, values.to_vec(), raw).unwrap()
}

pub fn scenario_measurement() -> Measurement {
    Measurement::new(
        "radix-umx201",
        1759155793.19,
        (1..=8).map(|i| format!("T{i}")).collect(),
        vec![33.6, 33.5, 33.1, 33.2, 33.9, 32.8, 33.9, 33.6],
        vec![336, 335, 331, 332, 339, 328, 339, 336],
    )
    .unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Next queued text frame, decoded as JSON. `None` if the queue is empty.
pub fn try_next_json(rx: &mut mpsc::Receiver<Message>) -> Option<serde_json::Value> {
    loop {
        match rx.try_recv().ok()? {
            Message::Text(text) => return Some(serde_json::from_str(text.as_str()).unwrap()),
            _ => continue,
        }
    }
}
