use axum::routing::get;
use axum::Router;

use crate::handlers::measurements;
use crate::state::AppState;

/// Routes mounted at `/measurements`.
///
/// ```text
/// GET    /          -> list_measurements
/// DELETE /          -> delete_measurements
/// GET    /count     -> count_measurements
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(measurements::list_measurements).delete(measurements::delete_measurements),
        )
        .route("/count", get(measurements::count_measurements))
}
