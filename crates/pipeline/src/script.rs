//! Subprocess-backed [`Pipeline`].
//!
//! Two external commands implement the pipeline:
//!
//! - the init command warms the model cache and must exit 0;
//! - the process command is invoked as `<process command> <input> <output_dir>`
//!   and writes the declared artifacts into `output_dir`.
//!
//! The process command may print a JSON object of artifact name to file name
//! as its last stdout line. Without one, the declared artifact file names
//! are assumed. Either way every declared artifact must exist on disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use trellis_core::artifacts::{declared_outputs, missing_artifacts};
use trellis_core::types::OutputFiles;

use crate::error::PipelineError;
use crate::subprocess::{command_from_line, run_command, CommandOutput};
use crate::{ExecuteRequest, Pipeline};

/// Commands and limits for a [`ScriptPipeline`].
#[derive(Debug, Clone)]
pub struct ScriptPipelineConfig {
    /// Whitespace-separated init command line.
    pub init_command: String,
    /// Whitespace-separated process command line.
    pub process_command: String,
    pub init_timeout: Duration,
    pub process_timeout: Duration,
    /// Working directory for both commands (current dir if `None`).
    pub working_directory: Option<PathBuf>,
}

/// Runs the pipeline as external processes.
pub struct ScriptPipeline {
    config: ScriptPipelineConfig,
}

impl ScriptPipeline {
    pub fn new(config: ScriptPipelineConfig) -> Self {
        Self { config }
    }

    async fn run(
        &self,
        line: &str,
        args: &[&Path],
        timeout: Duration,
    ) -> Result<CommandOutput, PipelineError> {
        let mut cmd = command_from_line(line)?;
        cmd.args(args);
        // The sparse convolution backend picks a GPU-only algorithm by default.
        cmd.env("SPCONV_ALGO", "native");
        if let Some(dir) = &self.config.working_directory {
            cmd.current_dir(dir);
        }

        let output = run_command(&mut cmd, timeout).await?;
        if !output.success() {
            return Err(PipelineError::from_exit(output.exit_code, &output.stderr));
        }
        Ok(output)
    }
}

#[async_trait]
impl Pipeline for ScriptPipeline {
    async fn initialize(&self) -> Result<(), PipelineError> {
        tracing::info!(command = %self.config.init_command, "Initializing pipeline");
        let output = self
            .run(&self.config.init_command, &[], self.config.init_timeout)
            .await?;
        tracing::info!(duration_ms = output.duration_ms, "Pipeline loaded successfully");
        Ok(())
    }

    async fn execute(&self, request: &ExecuteRequest) -> Result<OutputFiles, PipelineError> {
        tokio::fs::create_dir_all(&request.output_dir).await?;

        tracing::info!(
            input = %request.input.display(),
            output_dir = %request.output_dir.display(),
            "Running pipeline (this may take several minutes)",
        );
        let output = self
            .run(
                &self.config.process_command,
                &[request.input.as_path(), request.output_dir.as_path()],
                self.config.process_timeout,
            )
            .await?;
        tracing::info!(duration_ms = output.duration_ms, "Pipeline run completed");

        let outputs = reported_outputs(&output.stdout).unwrap_or_else(declared_outputs);
        verify_outputs(&outputs, &request.output_dir).await?;
        Ok(outputs)
    }
}

/// Parse the artifact map from the last non-empty stdout line, if present.
fn reported_outputs(stdout: &str) -> Option<OutputFiles> {
    let line = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
    serde_json::from_str(line.trim()).ok()
}

/// Every declared artifact must be reported and present in `output_dir`.
async fn verify_outputs(outputs: &OutputFiles, output_dir: &Path) -> Result<(), PipelineError> {
    let mut missing = missing_artifacts(outputs);
    for (name, file) in outputs {
        if !tokio::fs::try_exists(output_dir.join(file)).await? {
            missing.push(name.clone());
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        missing.sort();
        Err(PipelineError::MissingOutputs(missing))
    }
}
