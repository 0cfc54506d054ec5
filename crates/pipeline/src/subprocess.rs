//! Subprocess execution with timeout and bounded output capture.
//!
//! [`run_command`] spawns a prepared [`Command`], drains stdout and stderr
//! concurrently, and kills the child if it outlives its timeout.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::error::PipelineError;

/// Maximum stdout or stderr size captured per stream (10 MiB).
///
/// Output beyond this limit is dropped so a chatty pipeline cannot exhaust
/// memory.
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Captured result of a finished process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Build a [`Command`] from a whitespace-separated command line.
pub fn command_from_line(line: &str) -> Result<Command, PipelineError> {
    let mut parts = line.split_whitespace();
    let program = parts.next().ok_or_else(|| {
        PipelineError::Spawn(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "empty pipeline command",
        ))
    })?;
    let mut cmd = Command::new(program);
    cmd.args(parts);
    Ok(cmd)
}

/// Run `cmd` to completion, or kill it once `timeout` elapses.
pub async fn run_command(
    cmd: &mut Command,
    timeout: Duration,
) -> Result<CommandOutput, PipelineError> {
    // `kill_on_drop(true)` kills the child when it is dropped on timeout.
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn()?;

    // Read the pipes on their own tasks so `child.wait()` can borrow `child`.
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();
    let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
    let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            let stdout_bytes = stdout_task.await.unwrap_or_default();
            let stderr_bytes = stderr_task.await.unwrap_or_default();
            Ok(CommandOutput {
                stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
                stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
                exit_code: status.code().unwrap_or(-1),
                duration_ms: start.elapsed().as_millis() as u64,
            })
        }
        Ok(Err(e)) => Err(PipelineError::Spawn(e)),
        Err(_elapsed) => Err(PipelineError::Timeout {
            elapsed_ms: start.elapsed().as_millis() as u64,
        }),
    }
}

/// Read an entire stream into a buffer, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let mut cmd = command_from_line("sh -c").unwrap();
        cmd.arg("echo hello; echo oops >&2; exit 3");
        let out = run_command(&mut cmd, Duration::from_secs(5)).await.unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert_eq!(out.exit_code, 3);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn kills_on_timeout() {
        let mut cmd = command_from_line("sleep 30").unwrap();
        let result = run_command(&mut cmd, Duration::from_millis(200)).await;
        assert_matches!(result, Err(PipelineError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let mut cmd = command_from_line("definitely-not-a-real-binary-xyz").unwrap();
        let result = run_command(&mut cmd, Duration::from_secs(5)).await;
        assert_matches!(result, Err(PipelineError::Spawn(_)));
    }

    #[test]
    fn empty_command_line_is_rejected() {
        assert_matches!(command_from_line("   "), Err(PipelineError::Spawn(_)));
    }
}
