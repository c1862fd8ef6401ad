pub mod config;
pub mod health;
pub mod measurements;
pub mod retrieval;

use axum::routing::{get, post};
use axum::Router;

use crate::config::ServerConfig;
use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws/producer                                     WebSocket (pollers)
/// /ws/frontend                                     WebSocket (live stream)
///
/// /data                                            ingest one measurement (POST)
///
/// /measurements                                    list, delete
/// /measurements/count                              total stored
///
/// /config/thresholds                               list, upsert (PUT)
/// /config/polling                                  get, set (PUT)
///
/// /retrieval                                       trigger (POST), in-flight (GET)
/// /retrieval/{request_id}/bundle                   producer upload (POST)
/// ```
pub fn api_routes(config: &ServerConfig) -> Router<AppState> {
    Router::new()
        // WebSocket endpoints.
        .route("/ws/producer", get(ws::producer_ws_handler))
        .route("/ws/frontend", get(ws::frontend_ws_handler))
        // Ingestion over plain HTTP.
        .route("/data", post(handlers::ingest::ingest_measurement))
        .nest("/measurements", measurements::router())
        .nest("/config", config::router())
        .nest("/retrieval", retrieval::router(config.max_bundle_bytes))
}
