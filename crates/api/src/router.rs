//! HTTP router assembly.
//!
//! [`build_app_router`] is used by the server binary and by the integration
//! tests, so both exercise one middleware stack.

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::routes;
use crate::state::AppState;

/// Slack on top of the pipeline init timeout before `/initialize` gives up.
const INITIALIZE_GRACE: Duration = Duration::from_secs(30);

/// Routes, artifact file service and middleware, wired to `state`.
///
/// Outermost to innermost:
///
/// 1. CORS
/// 2. `x-request-id` assignment
/// 3. request/response trace spans
/// 4. `x-request-id` echoed on the response
/// 5. panic to 500
/// 6. upload size limit
///
/// Request timeouts are per route group: `REQUEST_TIMEOUT_SECS` for the
/// regular routes, the pipeline init timeout plus a grace period for
/// `/initialize`.
pub fn build_app_router(state: AppState) -> Router {
    let config = state.config.clone();
    let cors = build_cors_layer(&config.cors_origins);
    let request_id_header = HeaderName::from_static("x-request-id");
    let init_timeout = config.pipeline.init_timeout + INITIALIZE_GRACE;

    Router::new()
        .merge(routes::api_routes().layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        )))
        .merge(
            routes::initialize_routes().layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                init_timeout,
            )),
        )
        // Produced artifacts: /output/{request_id}/{filename}.
        .nest_service("/output", ServeDir::new(&config.output_dir))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(CatchPanicLayer::new())
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

/// CORS for the configured browser origins. Panics on an unparsable origin.
pub fn build_cors_layer(cors_origins: &[String]) -> CorsLayer {
    let origins: Vec<_> = cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}
