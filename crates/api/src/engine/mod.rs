//! Job lifecycle engine.
//!
//! Contains the in-memory job registry, the one-time pipeline
//! initialization gate, the bounded worker pool that executes jobs, and the
//! optional expiry sweeper for finished jobs.

pub mod gate;
pub mod runner;
pub mod store;
pub mod sweeper;

pub use gate::{GateError, GateStatus, InitOutcome, InitializationGate};
pub use runner::{JobInput, JobRunner, JobTicket, QueueSlot, RunnerError, RunnerSettings};
pub use store::JobStore;
