//! HTTP client for the TRELLIS job service.

pub mod api;

pub use api::{AcceptedResponse, JobStatusResponse, TrellisApi, TrellisApiError};
