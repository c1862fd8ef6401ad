//! Handlers for the measurement history pass-through.

use axum::extract::{Query, State};
use axum::Json;
use serde::Serialize;
use thermogate_db::models::measurement::{DeleteMeasurements, MeasurementFilter, StoredMeasurement};

use crate::error::{AppError, AppResult};
use crate::response::{data, DataResponse};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: u64,
}

/// GET /api/v1/measurements
///
/// Newest first. `limit` is clamped to `1..=200000` (default 100).
pub async fn list_measurements(
    State(state): State<AppState>,
    Query(filter): Query<MeasurementFilter>,
) -> AppResult<Json<DataResponse<Vec<StoredMeasurement>>>> {
    let rows = state.store.list_measurements(&filter).await?;
    Ok(data(rows))
}

/// GET /api/v1/measurements/count
pub async fn count_measurements(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<CountResponse>>> {
    let count = state.store.count_measurements().await?;
    Ok(data(CountResponse { count }))
}

/// DELETE /api/v1/measurements
///
/// Either the oldest `count` rows or everything received in `[start, end]`.
pub async fn delete_measurements(
    State(state): State<AppState>,
    Json(input): Json<DeleteMeasurements>,
) -> AppResult<Json<DataResponse<DeleteResponse>>> {
    let scope = input.scope().ok_or_else(|| {
        AppError::BadRequest(
            "Provide a positive count, or both start and end with start <= end".to_string(),
        )
    })?;
    let deleted = state.store.delete_measurements(scope).await?;
    tracing::info!(deleted, ?scope, "Measurements deleted");
    Ok(data(DeleteResponse { deleted }))
}
