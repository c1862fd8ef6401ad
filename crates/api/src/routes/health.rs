use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use thermogate_core::staleness::WatchdogState;
use thermogate_core::types::Timestamp;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    pub connected_producers: usize,
    pub connected_consumers: usize,
    pub last_measurement_at: Option<Timestamp>,
    pub watchdog: WatchdogState,
    /// Whether the measurement store is reachable.
    pub store_healthy: bool,
}

/// GET /health -- returns pipeline and store health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_healthy = state.store.health_check().await.is_ok();
    let snapshot = state.health_snapshot().await;

    let status = if store_healthy && snapshot.watchdog == WatchdogState::Healthy {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        connected_producers: snapshot.connected_producers,
        connected_consumers: snapshot.connected_consumers,
        last_measurement_at: snapshot.last_measurement_at,
        watchdog: snapshot.watchdog,
        store_healthy,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
