//! One-time initialization of the shared pipeline.
//!
//! [`InitializationGate`] owns the pipeline's setup state. At most one
//! setup attempt runs at a time; callers arriving while it runs join it and
//! receive the same outcome. A failed attempt re-opens the gate for a fresh
//! attempt, except for unrecoverable failures (resource exhaustion), which
//! leave the gate poisoned for the rest of the process lifetime.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use trellis_pipeline::Pipeline;

/// A setup attempt that any number of callers can await.
type SharedAttempt = Shared<BoxFuture<'static, Result<(), GateError>>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// Setup failed; a later call may try again.
    #[error("Initialization failed: {0}")]
    Failed(String),

    /// Setup failed in a way retrying cannot fix.
    #[error("Pipeline is unusable: {0}")]
    Poisoned(String),
}

/// What an [`InitializationGate::ensure_initialized`] call observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// This call ran, or joined, the attempt that succeeded.
    Initialized,
    /// The pipeline was already ready; no work was done.
    AlreadyInitialized,
}

/// Externally visible gate state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateStatus {
    Uninitialized,
    Initializing,
    Ready,
    Poisoned(String),
}

enum GateState {
    Uninitialized,
    InFlight(SharedAttempt),
    Ready,
    Poisoned(String),
}

pub struct InitializationGate {
    pipeline: Arc<dyn Pipeline>,
    state: Mutex<GateState>,
    ready: AtomicBool,
    attempts: AtomicU64,
}

impl InitializationGate {
    pub fn new(pipeline: Arc<dyn Pipeline>) -> Arc<Self> {
        Arc::new(Self {
            pipeline,
            state: Mutex::new(GateState::Uninitialized),
            ready: AtomicBool::new(false),
            attempts: AtomicU64::new(0),
        })
    }

    /// Whether setup has completed successfully. Lock-free.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Number of setup attempts started so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub async fn status(&self) -> GateStatus {
        match &*self.state.lock().await {
            GateState::Uninitialized => GateStatus::Uninitialized,
            GateState::InFlight(_) => GateStatus::Initializing,
            GateState::Ready => GateStatus::Ready,
            GateState::Poisoned(reason) => GateStatus::Poisoned(reason.clone()),
        }
    }

    /// Make sure the pipeline is initialized, running setup if needed.
    ///
    /// Returns immediately when already initialized. Otherwise starts a
    /// setup attempt, or joins the one in progress, and waits for it.
    pub async fn ensure_initialized(self: &Arc<Self>) -> Result<InitOutcome, GateError> {
        let attempt = {
            let mut state = self.state.lock().await;
            match &*state {
                GateState::Ready => return Ok(InitOutcome::AlreadyInitialized),
                GateState::Poisoned(reason) => return Err(GateError::Poisoned(reason.clone())),
                GateState::InFlight(attempt) => attempt.clone(),
                GateState::Uninitialized => {
                    let attempt = self.spawn_attempt();
                    *state = GateState::InFlight(attempt.clone());
                    attempt
                }
            }
        };

        attempt.await.map(|()| InitOutcome::Initialized)
    }

    /// Start a setup attempt on its own task.
    ///
    /// The task records the result in the gate before resolving, so it
    /// completes even if every waiting caller goes away.
    fn spawn_attempt(self: &Arc<Self>) -> SharedAttempt {
        let attempt_no = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        let gate = Arc::clone(self);

        let handle = tokio::spawn(async move {
            tracing::info!(attempt = attempt_no, "Starting pipeline initialization");
            let start = Instant::now();
            let result = AssertUnwindSafe(gate.pipeline.initialize())
                .catch_unwind()
                .await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            let mut state = gate.state.lock().await;
            match result {
                Ok(Ok(())) => {
                    gate.ready.store(true, Ordering::Release);
                    *state = GateState::Ready;
                    tracing::info!(attempt = attempt_no, elapsed_ms, "Pipeline initialized");
                    Ok(())
                }
                Ok(Err(e)) if e.is_unrecoverable() => {
                    tracing::error!(attempt = attempt_no, elapsed_ms, error = %e, "Pipeline initialization failed permanently");
                    *state = GateState::Poisoned(e.to_string());
                    Err(GateError::Poisoned(e.to_string()))
                }
                Ok(Err(e)) => {
                    tracing::error!(attempt = attempt_no, elapsed_ms, error = %e, "Pipeline initialization failed");
                    *state = GateState::Uninitialized;
                    Err(GateError::Failed(e.to_string()))
                }
                Err(_panic) => {
                    tracing::error!(attempt = attempt_no, elapsed_ms, "Pipeline initialization panicked");
                    *state = GateState::Uninitialized;
                    Err(GateError::Failed("initialization panicked".to_string()))
                }
            }
        });

        async move {
            handle.await.unwrap_or_else(|e| {
                Err(GateError::Failed(format!("initialization task aborted: {e}")))
            })
        }
        .boxed()
        .shared()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
