//! In-memory job registry.
//!
//! Every operation takes the registry lock, so a `get` issued after an
//! `update` returns always observes it. Records live until process exit
//! unless the expiry sweeper evicts them.

use std::collections::HashMap;

use tokio::sync::RwLock;
use trellis_core::error::CoreError;
use trellis_core::job::{Job, JobStatus, JobUpdate};
use trellis_core::types::{JobId, Timestamp};

#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

/// Number of tracked jobs per status.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending job under a fresh id.
    pub async fn create(&self) -> Job {
        let mut jobs = self.jobs.write().await;
        let mut job = Job::new();
        while jobs.contains_key(&job.id) {
            job = Job::new();
        }
        jobs.insert(job.id, job.clone());
        job
    }

    /// Snapshot of the job with `id`.
    pub async fn get(&self, id: JobId) -> Result<Job, CoreError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    /// Apply `update` to job `id` and return the new snapshot.
    ///
    /// Fails with `NotFound` for unknown ids and `InvalidTransition` for any
    /// update that would move the job backwards or touch a terminal job; in
    /// both cases nothing changes.
    pub async fn update(&self, id: JobId, update: JobUpdate) -> Result<Job, CoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| not_found(id))?;
        job.apply(update)?;
        Ok(job.clone())
    }

    /// Forget job `id`. Only used for a job whose creation is rolled back
    /// before the client learned its id.
    pub async fn remove(&self, id: JobId) -> Option<Job> {
        self.jobs.write().await.remove(&id)
    }

    /// Number of tracked jobs, terminal or not.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    pub async fn count_by_status(&self) -> StatusCounts {
        let jobs = self.jobs.read().await;
        let mut counts = StatusCounts::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Drop terminal jobs that finished before `cutoff`. Returns how many
    /// were removed. Pending and processing jobs are never evicted.
    pub async fn evict_terminal_older_than(&self, cutoff: Timestamp) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| match job.finished_at {
            Some(finished) if job.status.is_terminal() => finished >= cutoff,
            _ => true,
        });
        before - jobs.len()
    }
}

fn not_found(id: JobId) -> CoreError {
    CoreError::NotFound {
        entity: "Job",
        id: id.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
