use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Job routes.
///
/// ```text
/// POST   /process                  -> process
/// GET    /status/{request_id}      -> status
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/process", post(jobs::process))
        .route("/status/{request_id}", get(jobs::status))
}
