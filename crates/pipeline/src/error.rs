/// Failures reported by a [`Pipeline`](crate::Pipeline).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The command could not be spawned or its I/O failed.
    #[error("Failed to run pipeline command: {0}")]
    Spawn(#[from] std::io::Error),

    /// The command exceeded its configured timeout and was killed.
    #[error("Pipeline timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// The command exited unsuccessfully.
    #[error("Pipeline failed with exit code {exit_code}: {stderr}")]
    Failed { exit_code: i32, stderr: String },

    /// The command succeeded but some declared artifacts were not produced.
    #[error("Pipeline did not produce: {}", .0.join(", "))]
    MissingOutputs(Vec<String>),

    /// The host ran out of memory (system or GPU).
    #[error("Pipeline ran out of resources: {0}")]
    ResourceExhausted(String),
}

impl PipelineError {
    /// Retrying cannot help; the process should report itself unhealthy.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::ResourceExhausted(_))
    }

    /// Classify a non-zero exit from its stderr.
    pub fn from_exit(exit_code: i32, stderr: &str) -> Self {
        let stderr = stderr.trim();
        if stderr.to_lowercase().contains("out of memory") {
            return Self::ResourceExhausted(last_line(stderr).to_string());
        }
        Self::Failed {
            exit_code,
            stderr: stderr.to_string(),
        }
    }
}

fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or(text)
}
