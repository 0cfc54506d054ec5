//! Job lifecycle record and its transition rules.
//!
//! A job moves strictly forward:
//!
//! ```text
//! Pending -> Processing -> Completed
//!                       \-> Failed
//! Pending -> Failed            (dispatch failed before execution)
//! ```
//!
//! Terminal jobs are never mutated again. The terminal payload travels in
//! the [`JobUpdate`] variant itself, so a job carries a `result` only when
//! completed and an `error` only when failed.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{JobId, OutputFiles, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and failed jobs are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a job in this status may move to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

/// A state change applied to a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    /// Execution is about to start.
    Processing,
    /// Execution succeeded; artifact name to public location.
    Completed(OutputFiles),
    /// Execution (or its dispatch) failed with a human-readable reason.
    Failed(String),
}

impl JobUpdate {
    /// Status the job ends up in after this update.
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Processing => JobStatus::Processing,
            Self::Completed(_) => JobStatus::Completed,
            Self::Failed(_) => JobStatus::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One accepted unit of work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub submitted_at: Timestamp,
    /// Set when the job reaches a terminal status.
    pub finished_at: Option<Timestamp>,
    pub result: Option<OutputFiles>,
    pub error: Option<String>,
}

impl Job {
    /// A fresh pending job with a random id, submitted now.
    pub fn new() -> Self {
        Self {
            id: JobId::new_v4(),
            status: JobStatus::Pending,
            submitted_at: Utc::now(),
            finished_at: None,
            result: None,
            error: None,
        }
    }

    /// Apply `update`, rejecting any transition that is not strictly forward.
    pub fn apply(&mut self, update: JobUpdate) -> Result<(), CoreError> {
        let next = update.status();
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        match update {
            JobUpdate::Processing => {}
            JobUpdate::Completed(outputs) => {
                self.result = Some(outputs);
                self.finished_at = Some(Utc::now());
            }
            JobUpdate::Failed(reason) => {
                self.error = Some(reason);
                self.finished_at = Some(Utc::now());
            }
        }
        self.status = next;
        Ok(())
    }

    /// Seconds elapsed since submission, frozen once the job is terminal.
    pub fn processing_time(&self) -> f64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        let elapsed = end - self.submitted_at;
        elapsed.num_milliseconds().max(0) as f64 / 1000.0
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
