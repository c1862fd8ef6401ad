use axum::routing::get;
use axum::Router;

use crate::handlers::config;
use crate::state::AppState;

/// Routes mounted at `/config`.
///
/// ```text
/// GET /thresholds     -> list_thresholds
/// PUT /thresholds     -> upsert_threshold
/// GET /polling        -> get_polling
/// PUT /polling        -> set_polling
/// GET /email          -> get_email
/// PUT /email          -> put_email
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/thresholds",
            get(config::list_thresholds).put(config::upsert_threshold),
        )
        .route("/polling", get(config::get_polling).put(config::set_polling))
        .route("/email", get(config::get_email).put(config::put_email))
}
