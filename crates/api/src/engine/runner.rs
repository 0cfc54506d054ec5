//! Bounded worker pool that executes accepted jobs.
//!
//! Handlers reserve a [`QueueSlot`] before creating a job, then submit a
//! [`JobTicket`] and return immediately. A fixed number of workers drain the
//! queue, so at most `max_concurrent_executions` pipeline runs are in flight
//! no matter how many jobs are accepted.
//!
//! Per ticket a worker:
//!
//! 1. marks the job `processing` (before the pipeline is touched),
//! 2. runs the pipeline on a child task so a panic becomes a job failure,
//! 3. records `completed` with public artifact URLs, or `failed`,
//! 4. removes a temporary uploaded input on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use trellis_core::artifacts::public_url;
use trellis_core::job::JobUpdate;
use trellis_core::types::{JobId, OutputFiles};
use trellis_pipeline::{ExecuteRequest, Pipeline};

use super::store::JobStore;

// ---------------------------------------------------------------------------
// Tickets
// ---------------------------------------------------------------------------

/// Where a job's input image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobInput {
    /// Staged from an upload; owned by the job and removed when it ends.
    Uploaded(PathBuf),
    /// An existing server-local file named by the client; never removed.
    Referenced(PathBuf),
}

impl JobInput {
    pub fn path(&self) -> &Path {
        match self {
            Self::Uploaded(path) | Self::Referenced(path) => path,
        }
    }
}

/// Everything a worker needs to run one job.
#[derive(Debug, Clone)]
pub struct JobTicket {
    pub job_id: JobId,
    pub input: JobInput,
    pub output_dir: PathBuf,
}

/// Removes a temporary input file when dropped.
struct InputCleanup<'a> {
    job_id: JobId,
    input: &'a JobInput,
}

impl Drop for InputCleanup<'_> {
    fn drop(&mut self) {
        let JobInput::Uploaded(path) = self.input else {
            return;
        };
        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::info!(job_id = %self.job_id, path = %path.display(), "Cleaned up input file");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(job_id = %self.job_id, path = %path.display(), error = %e, "Failed to remove input file");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Job queue is full ({capacity} jobs waiting)")]
    QueueFull { capacity: usize },

    #[error("Job runner is shutting down")]
    ShuttingDown,
}

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Number of workers, i.e. the bound on concurrent pipeline runs.
    pub max_concurrent_executions: usize,
    pub queue_capacity: usize,
    /// Prefix for artifact URLs, e.g. `http://host:5000`.
    pub public_base_url: String,
}

/// A reserved place in the job queue.
///
/// Holding a slot guarantees the following [`QueueSlot::submit`] cannot
/// fail, so no job is ever created that the runner will not pick up.
pub struct QueueSlot {
    permit: mpsc::OwnedPermit<JobTicket>,
}

impl QueueSlot {
    pub fn submit(self, ticket: JobTicket) {
        tracing::debug!(job_id = %ticket.job_id, "Job queued");
        self.permit.send(ticket);
    }
}

/// Shared by every worker.
struct WorkerContext {
    pipeline: Arc<dyn Pipeline>,
    store: Arc<JobStore>,
    public_base_url: String,
}

pub struct JobRunner {
    sender: mpsc::Sender<JobTicket>,
    receiver: Arc<Mutex<mpsc::Receiver<JobTicket>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    store: Arc<JobStore>,
    queue_capacity: usize,
}

impl JobRunner {
    /// Spawn the worker pool.
    pub fn start(
        pipeline: Arc<dyn Pipeline>,
        store: Arc<JobStore>,
        settings: RunnerSettings,
    ) -> Arc<Self> {
        let worker_count = settings.max_concurrent_executions.max(1);
        let queue_capacity = settings.queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let cancel = CancellationToken::new();

        let ctx = Arc::new(WorkerContext {
            pipeline,
            store: Arc::clone(&store),
            public_base_url: settings.public_base_url,
        });

        let workers = (0..worker_count)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&ctx),
                    Arc::clone(&receiver),
                    cancel.clone(),
                ))
            })
            .collect();

        tracing::info!(workers = worker_count, queue_capacity, "Job runner started");

        Arc::new(Self {
            sender,
            receiver,
            workers: Mutex::new(workers),
            cancel,
            store,
            queue_capacity,
        })
    }

    /// Reserve a queue slot without waiting.
    pub fn reserve(&self) -> Result<QueueSlot, RunnerError> {
        if self.cancel.is_cancelled() {
            return Err(RunnerError::ShuttingDown);
        }
        match self.sender.clone().try_reserve_owned() {
            Ok(permit) => Ok(QueueSlot { permit }),
            Err(TrySendError::Full(_)) => Err(RunnerError::QueueFull {
                capacity: self.queue_capacity,
            }),
            Err(TrySendError::Closed(_)) => Err(RunnerError::ShuttingDown),
        }
    }

    /// Jobs accepted but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.queue_capacity - self.sender.capacity()
    }

    /// Stop taking work and wait up to `timeout` for running jobs.
    ///
    /// Jobs still queued are failed and their temporary inputs removed.
    pub async fn shutdown(&self, timeout: Duration) {
        self.cancel.cancel();

        let workers = std::mem::take(&mut *self.workers.lock().await);
        if tokio::time::timeout(timeout, futures::future::join_all(workers))
            .await
            .is_err()
        {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "Jobs still running at shutdown timeout",
            );
        }

        let mut receiver = self.receiver.lock().await;
        receiver.close();
        while let Ok(ticket) = receiver.try_recv() {
            let _cleanup = InputCleanup {
                job_id: ticket.job_id,
                input: &ticket.input,
            };
            let update = JobUpdate::Failed("Service shut down before the job started".into());
            if let Err(e) = self.store.update(ticket.job_id, update).await {
                tracing::warn!(job_id = %ticket.job_id, error = %e, "Failed to mark queued job as failed");
            }
        }

        tracing::info!("Job runner stopped");
    }
}

async fn worker_loop(
    worker: usize,
    ctx: Arc<WorkerContext>,
    receiver: Arc<Mutex<mpsc::Receiver<JobTicket>>>,
    cancel: CancellationToken,
) {
    tracing::debug!(worker, "Worker started");
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            ticket = async { receiver.lock().await.recv().await } => ticket,
        };
        let Some(ticket) = next else {
            break;
        };
        ctx.run(worker, ticket).await;
    }
    tracing::debug!(worker, "Worker stopped");
}

impl WorkerContext {
    async fn run(&self, worker: usize, ticket: JobTicket) {
        let job_id = ticket.job_id;
        let _cleanup = InputCleanup {
            job_id,
            input: &ticket.input,
        };

        if let Err(e) = self.store.update(job_id, JobUpdate::Processing).await {
            tracing::warn!(%job_id, error = %e, "Skipping job that cannot start");
            return;
        }
        tracing::info!(%job_id, worker, input = %ticket.input.path().display(), "Job processing");

        let start = Instant::now();
        let request = ExecuteRequest {
            input: ticket.input.path().to_path_buf(),
            output_dir: ticket.output_dir.clone(),
        };
        let pipeline = Arc::clone(&self.pipeline);
        let execution = tokio::spawn(async move { pipeline.execute(&request).await }).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let update = match execution {
            Ok(Ok(files)) => {
                tracing::info!(%job_id, elapsed_ms, artifacts = files.len(), "Job completed");
                JobUpdate::Completed(self.publish(job_id, files))
            }
            Ok(Err(e)) => {
                tracing::error!(%job_id, elapsed_ms, error = %e, "Job failed");
                JobUpdate::Failed(e.to_string())
            }
            Err(e) => {
                tracing::error!(%job_id, elapsed_ms, error = %e, "Pipeline task aborted");
                JobUpdate::Failed(format!("Pipeline task aborted: {e}"))
            }
        };

        if let Err(e) = self.store.update(job_id, update).await {
            tracing::error!(%job_id, error = %e, "Failed to record job outcome");
        }
    }

    /// Map artifact file names to their public URLs.
    fn publish(&self, job_id: JobId, files: OutputFiles) -> OutputFiles {
        let job_id = job_id.to_string();
        files
            .into_iter()
            .map(|(name, file)| {
                let url = public_url(&self.public_base_url, &job_id, &file);
                (name, url)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
