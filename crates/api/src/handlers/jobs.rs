//! Handlers for job submission and status polling.

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use trellis_core::error::CoreError;
use trellis_core::job::{Job, JobStatus};
use trellis_core::types::{JobId, OutputFiles, Timestamp};

use crate::engine::{JobTicket, QueueSlot};
use crate::error::{AppError, AppResult};
use crate::input::{self, CheckedInput};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// Response payload for an accepted submission.
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
    pub request_id: JobId,
}

/// POST /process
///
/// Accept an image and queue a job for it. Returns 202 with the job id
/// right away; the result is fetched later from `/status/{request_id}`.
pub async fn process(
    State(state): State<AppState>,
    request: Request,
) -> AppResult<impl IntoResponse> {
    // Checked before the body is read so uninitialized calls stay cheap.
    if !state.gate.is_ready() {
        return Err(CoreError::NotInitialized.into());
    }

    let raw = input::extract(request, &state).await?;
    let checked = CheckedInput::check(raw).await?;
    let info = checked.info();

    let slot = state.runner.reserve()?;

    // Job creation, staging and submission run on their own task so a
    // dropped request (client gone, request timeout) cannot strand a job
    // between `create` and `submit`.
    let job_id = tokio::spawn(accept(state, slot, checked))
        .await
        .map_err(|e| AppError::InternalError(format!("Job acceptance task failed: {e}")))??;

    tracing::info!(
        job_id = %job_id,
        width = info.width,
        height = info.height,
        "Job accepted",
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "accepted",
            request_id: job_id,
        }),
    ))
}

/// Create the job, stage its input and hand it to the runner.
///
/// If staging fails the record is removed again, so no job exists that the
/// client was never told about.
async fn accept(state: AppState, slot: QueueSlot, checked: CheckedInput) -> AppResult<JobId> {
    let job = state.jobs.create().await;

    let ticket = match stage(&state, job.id, checked).await {
        Ok(ticket) => ticket,
        Err(e) => {
            tracing::error!(job_id = %job.id, error = %e, "Failed to stage input");
            state.jobs.remove(job.id).await;
            let output_dir = state.config.output_dir.join(job.id.to_string());
            if let Err(cleanup) = tokio::fs::remove_dir_all(&output_dir).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(job_id = %job.id, error = %cleanup, "Failed to remove output directory");
                }
            }
            return Err(e);
        }
    };

    slot.submit(ticket);
    tracing::debug!(job_id = %job.id, queued = state.runner.queued(), "Job submitted");
    Ok(job.id)
}

/// Create the job's output directory and place its input.
async fn stage(state: &AppState, job_id: JobId, checked: CheckedInput) -> AppResult<JobTicket> {
    let output_dir = state.config.output_dir.join(job_id.to_string());
    tokio::fs::create_dir_all(&output_dir).await?;
    tracing::debug!(%job_id, output_dir = %output_dir.display(), "Created output directory");

    let input = checked.stage(&state.config.input_dir, job_id).await?;
    Ok(JobTicket {
        job_id,
        input,
        output_dir,
    })
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Response payload for `GET /status/{request_id}`.
///
/// `result` is present only for completed jobs and `error` only for failed
/// ones.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub request_id: JobId,
    pub status: JobStatus,
    pub submitted_at: Timestamp,
    /// Seconds since submission, frozen once the job finishes.
    pub processing_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<OutputFiles>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Job> for StatusResponse {
    fn from(job: Job) -> Self {
        let processing_time = job.processing_time();
        Self {
            request_id: job.id,
            status: job.status,
            submitted_at: job.submitted_at,
            processing_time,
            result: job.result,
            error: job.error,
        }
    }
}

/// GET /status/{request_id}
pub async fn status(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> AppResult<Json<StatusResponse>> {
    // A malformed id cannot name any job.
    let job_id: JobId = request_id.parse().map_err(|_| {
        AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: request_id.clone(),
        })
    })?;

    let job = state.jobs.get(job_id).await?;
    Ok(Json(job.into()))
}
