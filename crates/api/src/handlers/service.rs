//! Service lifecycle handlers: pipeline initialization and health.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::engine::{GateStatus, InitOutcome};
use crate::error::AppResult;
use crate::state::AppState;

/// Response payload for `POST /initialize`.
#[derive(Debug, Serialize)]
pub struct InitializeResponse {
    pub status: &'static str,
    pub request_id: Uuid,
    pub initialized: bool,
    pub message: &'static str,
}

/// POST /initialize
///
/// Load the pipeline if it is not loaded yet. Idempotent: repeated calls
/// report `already initialized`, and calls made while another is loading
/// wait for that same attempt.
pub async fn initialize(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let request_id = Uuid::new_v4();
    tracing::info!(%request_id, "Starting initialization process");

    let outcome = state.gate.ensure_initialized().await?;
    let message = match outcome {
        InitOutcome::Initialized => "initialized",
        InitOutcome::AlreadyInitialized => "already initialized",
    };
    tracing::info!(%request_id, message, attempts = state.gate.attempts(), "Initialization complete");

    Ok(Json(InitializeResponse {
        status: "success",
        request_id,
        initialized: true,
        message,
    }))
}

/// Health check response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy`, or `unhealthy` once the pipeline failed unrecoverably.
    pub status: &'static str,
    /// Whether the pipeline is ready to accept jobs.
    pub initialized: bool,
    /// Number of tracked jobs, finished or not.
    pub active_jobs: usize,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let (status_code, status) = match state.gate.status().await {
        GateStatus::Poisoned(_) => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
        _ => (StatusCode::OK, "healthy"),
    };

    let counts = state.jobs.count_by_status().await;
    tracing::debug!(
        pending = counts.pending,
        processing = counts.processing,
        completed = counts.completed,
        failed = counts.failed,
        "Job counts",
    );

    let body = HealthResponse {
        status,
        initialized: state.gate.is_ready(),
        active_jobs: counts.total(),
        version: env!("CARGO_PKG_VERSION"),
    };

    (status_code, Json(body))
}
