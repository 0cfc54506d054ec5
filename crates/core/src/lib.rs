//! Trellis service domain types.
//!
//! Pure data and rules shared by the pipeline adapter and the HTTP service:
//! job lifecycle records, status transitions, declared output artifacts,
//! and the domain error type. No I/O lives here.

pub mod artifacts;
pub mod error;
pub mod job;
pub mod types;
