//! Handlers for on-demand file-bundle retrieval.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use thermogate_core::error::CoreError;
use thermogate_core::protocol::BUNDLE_FILE_NAME;
use thermogate_core::types::RequestId;

use crate::error::{AppError, AppResult};
use crate::response::{data, DataResponse};
use crate::retrieval::RetrievalSnapshot;
use crate::state::AppState;

/// Response header carrying the fulfilled request's id.
pub const RETRIEVAL_ID_HEADER: HeaderName = HeaderName::from_static("x-retrieval-request-id");

/// POST /api/v1/retrieval
///
/// Ask the longest-connected producer for its files and wait for the
/// bundle. The zip is relayed byte for byte.
pub async fn trigger_retrieval(State(state): State<AppState>) -> AppResult<Response> {
    let bundle = state.retrieval.trigger().await?;
    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{BUNDLE_FILE_NAME}\""),
        ),
        (RETRIEVAL_ID_HEADER, bundle.request_id.to_string()),
    ];
    Ok((headers, bundle.bytes).into_response())
}

/// GET /api/v1/retrieval
pub async fn list_retrievals(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<RetrievalSnapshot>>>> {
    Ok(data(state.retrieval.snapshot()))
}

/// POST /api/v1/retrieval/{request_id}/bundle
///
/// Upload path for producers. Uploads for requests that already resolved
/// (or never existed) are discarded with 404.
pub async fn upload_bundle(
    State(state): State<AppState>,
    Path(request_id): Path<RequestId>,
    body: Bytes,
) -> AppResult<StatusCode> {
    if state.retrieval.complete(request_id, body) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::Core(CoreError::NotFound {
            entity: "retrieval request",
            key: request_id.to_string(),
        }))
    }
}
