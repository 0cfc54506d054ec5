use axum::routing::{get, post};
use axum::Router;

use crate::handlers::service;
use crate::state::AppState;

/// Health route.
///
/// ```text
/// GET    /health        -> health
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(service::health))
}

/// Pipeline initialization route. Kept apart from [`router`] because a
/// request may block for as long as the model takes to load.
///
/// ```text
/// POST   /initialize    -> initialize
/// ```
pub fn initialize_router() -> Router<AppState> {
    Router::new().route("/initialize", post(service::initialize))
}
