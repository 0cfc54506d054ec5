pub mod jobs;
pub mod service;

use axum::Router;

use crate::state::AppState;

/// Build the short-lived service routes.
///
/// ```text
/// GET    /health                            health
/// POST   /process                           submit an image
/// GET    /status/{request_id}               poll a job
/// ```
///
/// `POST /initialize` lives in [`initialize_routes`].
///
/// Artifacts under `/output/{request_id}/{filename}` are served by a static
/// file service mounted in [`crate::router::build_app_router`].
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(service::router())
        .merge(jobs::router())
}

/// Routes whose requests wait on model loading.
pub fn initialize_routes() -> Router<AppState> {
    service::initialize_router()
}
