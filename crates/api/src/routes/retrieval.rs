use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;

use crate::handlers::retrieval;
use crate::state::AppState;

/// Routes mounted at `/retrieval`.
///
/// ```text
/// POST /                       -> trigger_retrieval
/// GET  /                       -> list_retrievals
/// POST /{request_id}/bundle    -> upload_bundle (body capped at max_bundle_bytes)
/// ```
pub fn router(max_bundle_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(retrieval::trigger_retrieval).get(retrieval::list_retrievals),
        )
        .route(
            "/{request_id}/bundle",
            post(retrieval::upload_bundle).layer(DefaultBodyLimit::max(max_bundle_bytes)),
        )
}
