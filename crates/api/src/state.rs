use std::sync::Arc;
use std::time::Duration;

use trellis_pipeline::Pipeline;

use crate::config::ServerConfig;
use crate::engine::{InitializationGate, JobRunner, JobStore, RunnerSettings};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (everything is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Registry of every accepted job.
    pub jobs: Arc<JobStore>,
    /// One-time pipeline setup.
    pub gate: Arc<InitializationGate>,
    /// Bounded executor for accepted jobs.
    pub runner: Arc<JobRunner>,
}

impl AppState {
    /// Wire the engine around `pipeline` and start the worker pool.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ServerConfig, pipeline: Arc<dyn Pipeline>) -> Self {
        let jobs = Arc::new(JobStore::new());
        let gate = InitializationGate::new(Arc::clone(&pipeline));
        let runner = JobRunner::start(
            pipeline,
            Arc::clone(&jobs),
            RunnerSettings {
                max_concurrent_executions: config.max_concurrent_executions,
                queue_capacity: config.queue_capacity,
                public_base_url: config.public_base_url.clone(),
            },
        );

        Self {
            config: Arc::new(config),
            jobs,
            gate,
            runner,
        }
    }

    /// Stop the worker pool, waiting for running jobs up to the configured
    /// shutdown timeout.
    pub async fn shutdown(&self) {
        self.runner
            .shutdown(Duration::from_secs(self.config.shutdown_timeout_secs))
            .await;
    }
}
