use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thermogate_core::error::CoreError;
use thermogate_db::StoreError;

use crate::retrieval::RetrievalError;

/// Errors returned by HTTP handlers, rendered as `{"error", "code"}` JSON.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A bulk retrieval that did not produce a bundle.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

pub type AppResult<T> = Result<T, AppError>;

const INTERNAL: (StatusCode, &str) = (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR");

impl AppError {
    /// HTTP status and stable machine-readable code.
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Core(CoreError::NotFound { .. }) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Core(CoreError::Validation(_) | CoreError::Invariant(_)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
            }
            Self::Store(StoreError::UnknownChannel(_)) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Store(_) => INTERNAL,
            Self::Retrieval(err) => (retrieval_status(err), err.code()),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        }
    }

    /// Client-facing message. Server-side failures are logged in full and
    /// reported generically.
    fn public_message(&self, status: StatusCode) -> String {
        if status != StatusCode::INTERNAL_SERVER_ERROR {
            return match self {
                Self::Core(CoreError::NotFound { entity, key }) => format!("{entity} '{key}' not found"),
                Self::Core(CoreError::Validation(msg) | CoreError::Invariant(msg)) => msg.clone(),
                Self::Store(StoreError::UnknownChannel(channel)) => {
                    format!("channel '{channel}' not found")
                }
                Self::BadRequest(msg) => msg.clone(),
                other => other.to_string(),
            };
        }
        tracing::error!(error = %self, "Request failed with an internal error");
        "An internal error occurred".to_string()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();
        let message = self.public_message(status);
        (status, axum::Json(json!({ "error": message, "code": code }))).into_response()
    }
}

/// Timeouts and producer-side failures get distinct statuses so callers can
/// tell "try again later" from "try something else".
fn retrieval_status(err: &RetrievalError) -> StatusCode {
    match err {
        RetrievalError::NoProducerConnected => StatusCode::SERVICE_UNAVAILABLE,
        RetrievalError::RetrievalInProgress => StatusCode::CONFLICT,
        RetrievalError::RequestTimeout => StatusCode::GATEWAY_TIMEOUT,
        RetrievalError::ProducerFailed(_)
        | RetrievalError::ProducerDisconnected
        | RetrievalError::DispatchFailed => StatusCode::BAD_GATEWAY,
    }
}
