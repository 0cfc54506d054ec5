//! Image-to-3D pipeline adapter.
//!
//! The generation routine itself is an external program: it loads large
//! model weights once and then turns one input image into a set of preview
//! videos and a GLB mesh, taking minutes per run. This crate defines the
//! [`Pipeline`] seam the service drives and a subprocess-backed
//! implementation, [`ScriptPipeline`].

pub mod error;
pub mod script;
pub mod subprocess;

use std::path::PathBuf;

use async_trait::async_trait;
use trellis_core::types::OutputFiles;

pub use error::PipelineError;
pub use script::{ScriptPipeline, ScriptPipelineConfig};

/// Input for one pipeline run.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    /// Image to convert.
    pub input: PathBuf,
    /// Directory the artifacts are written to. Created if missing.
    pub output_dir: PathBuf,
}

/// The external generation routine.
///
/// Implementations are not required to be reentrant: callers must not run
/// `execute` concurrently with itself beyond the limit they were configured
/// for, and must call `initialize` successfully before the first `execute`.
#[async_trait]
pub trait Pipeline: Send + Sync + 'static {
    /// Load models and other expensive shared resources.
    async fn initialize(&self) -> Result<(), PipelineError>;

    /// Run one conversion.
    ///
    /// Returns artifact name mapped to a file name relative to
    /// `request.output_dir`.
    async fn execute(&self, request: &ExecuteRequest) -> Result<OutputFiles, PipelineError>;
}
