//! HTTP request handlers.

pub mod jobs;
pub mod service;
