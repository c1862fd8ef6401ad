//! Single-request measurement ingestion.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use thermogate_core::error::CoreError;
use thermogate_core::measurement::Measurement;
use thermogate_core::types::Timestamp;

use crate::error::{AppError, AppResult};
use crate::response::{data, DataResponse};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct IngestReceipt {
    pub device_id: String,
    pub channels: usize,
    pub received_at: Timestamp,
}

/// POST /api/v1/data
///
/// Accept one measurement and publish it exactly like a streamed one.
/// The body is decoded by hand so that shape errors and length mismatches
/// both come back as validation failures.
pub async fn ingest_measurement(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> AppResult<(StatusCode, Json<DataResponse<IngestReceipt>>)> {
    let measurement: Measurement = serde_json::from_value(body).map_err(|e| {
        AppError::Core(CoreError::Validation(format!("Invalid measurement: {e}")))
    })?;

    let device_id = measurement.device_id().to_string();
    let channels = measurement.len();
    let received_at = state.hub.publish_measurement(measurement).await;

    Ok((
        StatusCode::ACCEPTED,
        data(IngestReceipt {
            device_id,
            channels,
            received_at,
        }),
    ))
}
