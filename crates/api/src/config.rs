use std::path::PathBuf;
use std::time::Duration;

use trellis_pipeline::ScriptPipelineConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development. In production,
/// override via environment variables (or a `.env` file).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `5000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for in-flight jobs, in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Largest accepted request body in bytes (default: 32 MiB).
    pub max_upload_bytes: usize,
    /// Where uploaded images are staged until their job finishes.
    pub input_dir: PathBuf,
    /// Root of per-job artifact directories, served under `/output`.
    pub output_dir: PathBuf,
    /// Externally reachable base URL used to build artifact links.
    pub public_base_url: String,
    /// Upper bound on concurrent pipeline executions (at least 1).
    pub max_concurrent_executions: usize,
    /// Jobs that may wait for a free executor before submissions are refused.
    pub queue_capacity: usize,
    /// Terminal jobs older than this are evicted; `0` keeps them forever.
    pub job_ttl_secs: u64,
    /// How often the eviction sweep runs, in seconds.
    pub job_sweep_interval_secs: u64,
    /// External pipeline commands and their timeouts.
    pub pipeline: ScriptPipelineConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                    |
    /// |------------------------------|----------------------------|
    /// | `HOST`                       | `0.0.0.0`                  |
    /// | `PORT`                       | `5000`                     |
    /// | `CORS_ORIGINS`               | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`       | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`      | `30`                       |
    /// | `MAX_UPLOAD_BYTES`           | `33554432`                 |
    /// | `INPUT_DIR`                  | `./data/input`             |
    /// | `OUTPUT_DIR`                 | `./data/output`            |
    /// | `PUBLIC_BASE_URL`            | `http://localhost:{PORT}`  |
    /// | `MAX_CONCURRENT_EXECUTIONS`  | `1`                        |
    /// | `QUEUE_CAPACITY`             | `64`                       |
    /// | `JOB_TTL_SECS`               | `0`                        |
    /// | `JOB_SWEEP_INTERVAL_SECS`    | `300`                      |
    /// | `PIPELINE_INIT_CMD`          | `python3 initialize.py`    |
    /// | `PIPELINE_PROCESS_CMD`       | `python3 process.py`       |
    /// | `PIPELINE_INIT_TIMEOUT_SECS` | `1800`                     |
    /// | `PIPELINE_TIMEOUT_SECS`      | `3600`                     |
    /// | `PIPELINE_WORKDIR`           | unset (current directory)  |
    pub fn from_env() -> Self {
        let host = env_or("HOST", "0.0.0.0");
        let port: u16 = parse_env("PORT", 5000);

        let cors_origins: Vec<String> = env_or("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"));

        let pipeline = ScriptPipelineConfig {
            init_command: env_or("PIPELINE_INIT_CMD", "python3 initialize.py"),
            process_command: env_or("PIPELINE_PROCESS_CMD", "python3 process.py"),
            init_timeout: Duration::from_secs(parse_env("PIPELINE_INIT_TIMEOUT_SECS", 1800)),
            process_timeout: Duration::from_secs(parse_env("PIPELINE_TIMEOUT_SECS", 3600)),
            working_directory: std::env::var("PIPELINE_WORKDIR").ok().map(PathBuf::from),
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: parse_env("SHUTDOWN_TIMEOUT_SECS", 30),
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", 32 * 1024 * 1024),
            input_dir: PathBuf::from(env_or("INPUT_DIR", "./data/input")),
            output_dir: PathBuf::from(env_or("OUTPUT_DIR", "./data/output")),
            public_base_url,
            max_concurrent_executions: parse_env::<usize>("MAX_CONCURRENT_EXECUTIONS", 1).max(1),
            queue_capacity: parse_env::<usize>("QUEUE_CAPACITY", 64).max(1),
            job_ttl_secs: parse_env("JOB_TTL_SECS", 0),
            job_sweep_interval_secs: parse_env::<u64>("JOB_SWEEP_INTERVAL_SECS", 300).max(1),
            pipeline,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse `key` if set, panicking on malformed values so misconfiguration
/// fails fast at startup.
fn parse_env<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a valid number, got '{raw}': {e}")),
        Err(_) => default,
    }
}
