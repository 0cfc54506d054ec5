//! Tests for `AppError` → HTTP response mapping.
//!
//! These call `IntoResponse` directly on `AppError` values; no server needed.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use trellis_api::engine::{GateError, RunnerError};
use trellis_api::error::AppError;
use trellis_core::error::CoreError;
use trellis_core::job::JobStatus;

/// Convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn not_found_error_returns_404() {
    let err = AppError::Core(CoreError::NotFound {
        entity: "Job",
        id: "abc".into(),
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Job with id abc not found");
}

#[tokio::test]
async fn not_initialized_returns_400() {
    let (status, json) = error_to_response(CoreError::NotInitialized.into()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "NOT_INITIALIZED");
    assert!(json["error"].as_str().unwrap().contains("not initialized"));
}

#[tokio::test]
async fn validation_error_returns_400() {
    let err = AppError::Core(CoreError::Validation("bad input".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "bad input");
}

#[tokio::test]
async fn bad_request_error_returns_400() {
    let (status, json) = error_to_response(AppError::BadRequest("No image provided".into())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["error"], "No image provided");
}

#[tokio::test]
async fn initialization_failure_returns_500_with_reason() {
    let err = AppError::Initialization(GateError::Failed("weights missing".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INITIALIZATION_FAILED");
    assert_eq!(json["error"], "Initialization failed: weights missing");
}

#[tokio::test]
async fn poisoned_gate_returns_500() {
    let err = AppError::Initialization(GateError::Poisoned("out of memory".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "PIPELINE_UNUSABLE");
}

#[tokio::test]
async fn full_queue_returns_503() {
    let err = AppError::Runner(RunnerError::QueueFull { capacity: 4 });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn internal_errors_are_sanitized() {
    let cases = [
        AppError::InternalError("disk on fire".into()),
        AppError::Core(CoreError::InvalidTransition {
            from: JobStatus::Completed,
            to: JobStatus::Processing,
        }),
    ];

    for err in cases {
        let (status, json) = error_to_response(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["code"], "INTERNAL_ERROR");
        assert_eq!(json["error"], "An internal error occurred");
    }
}
