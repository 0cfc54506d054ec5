#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;
use trellis_api::config::ServerConfig;
use trellis_api::router::build_app_router;
use trellis_api::state::AppState;
use trellis_core::artifacts::{declared_outputs, DECLARED_ARTIFACTS};
use trellis_core::types::OutputFiles;
use trellis_pipeline::{ExecuteRequest, Pipeline, PipelineError, ScriptPipelineConfig};

pub const BASE_URL: &str = "http://trellis.test:5000";

// ---------------------------------------------------------------------------
// Fake pipeline
// ---------------------------------------------------------------------------

/// In-memory stand-in for the generation routine.
///
/// `initialize` fails the first `init_failures` times (or always, with an
/// unrecoverable error, when `init_exhausted` is set); `execute` writes the
/// declared artifacts after `delay`, or fails when `fail_execute` is set.
pub struct FakePipeline {
    pub init_calls: AtomicUsize,
    pub exec_calls: AtomicUsize,
    init_failures: usize,
    init_exhausted: bool,
    init_delay: Duration,
    delay: Duration,
    fail_execute: bool,
}

impl FakePipeline {
    pub fn new() -> Self {
        Self {
            init_calls: AtomicUsize::new(0),
            exec_calls: AtomicUsize::new(0),
            init_failures: 0,
            init_exhausted: false,
            init_delay: Duration::ZERO,
            delay: Duration::from_millis(20),
            fail_execute: false,
        }
    }

    pub fn failing_init(mut self, times: usize) -> Self {
        self.init_failures = times;
        self
    }

    /// `initialize` reports the GPU out of memory, which cannot be retried.
    pub fn exhausted_init(mut self) -> Self {
        self.init_exhausted = true;
        self
    }

    pub fn slow_init(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    pub fn execute_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_execute(mut self) -> Self {
        self.fail_execute = true;
        self
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Pipeline for FakePipeline {
    async fn initialize(&self) -> Result<(), PipelineError> {
        let call = self.init_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.init_delay).await;
        if self.init_exhausted {
            return Err(PipelineError::ResourceExhausted(
                "CUDA out of memory. Tried to allocate 2.00 GiB".into(),
            ));
        }
        if call < self.init_failures {
            return Err(PipelineError::Failed {
                exit_code: 1,
                stderr: "model weights unavailable".into(),
            });
        }
        Ok(())
    }

    async fn execute(&self, request: &ExecuteRequest) -> Result<OutputFiles, PipelineError> {
        self.exec_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail_execute {
            return Err(PipelineError::Failed {
                exit_code: 1,
                stderr: "cannot identify image file".into(),
            });
        }
        tokio::fs::create_dir_all(&request.output_dir).await?;
        for (_, file) in DECLARED_ARTIFACTS {
            tokio::fs::write(request.output_dir.join(file), b"artifact").await?;
        }
        Ok(declared_outputs())
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// A running test app backed by temporary input/output directories.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub pipeline: Arc<FakePipeline>,
    dir: TempDir,
}

impl TestApp {
    pub fn input_dir(&self) -> PathBuf {
        self.dir.path().join("input")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("output")
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub async fn get(&self, uri: &str) -> Response {
        send(&self.router, Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post_empty(&self, uri: &str) -> Response {
        send(
            &self.router,
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// POST /initialize and assert success.
    pub async fn initialize(&self) {
        let response = self.post_empty("/initialize").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    pub async fn upload(&self, file_name: &str, data: &[u8]) -> Response {
        let (content_type, body) = multipart_file("image", file_name, data);
        self.post_body("/process", &content_type, body).await
    }

    pub async fn post_body(&self, uri: &str, content_type: &str, body: Vec<u8>) -> Response {
        send(
            &self.router,
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    /// Poll `/status/{id}` until the job is terminal.
    pub async fn wait_terminal(&self, id: &str) -> serde_json::Value {
        for _ in 0..300 {
            let json = body_json(self.get(&format!("/status/{id}")).await).await;
            let status = json["status"].as_str().unwrap_or_default().to_string();
            if status == "completed" || status == "failed" {
                return json;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} did not reach a terminal state");
    }
}

/// A POST /process request uploading `data` as `file_name`.
pub fn upload_request(file_name: &str, data: &[u8]) -> Request<Body> {
    let (content_type, body) = multipart_file("image", file_name, data);
    Request::builder()
        .method(Method::POST)
        .uri("/process")
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap()
}

/// Build a test `ServerConfig` rooted at `root`.
pub fn test_config(root: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        max_upload_bytes: 1024 * 1024,
        input_dir: root.join("input"),
        output_dir: root.join("output"),
        public_base_url: BASE_URL.to_string(),
        max_concurrent_executions: 1,
        queue_capacity: 8,
        job_ttl_secs: 0,
        job_sweep_interval_secs: 300,
        pipeline: ScriptPipelineConfig {
            init_command: "true".to_string(),
            process_command: "true".to_string(),
            init_timeout: Duration::from_secs(5),
            process_timeout: Duration::from_secs(5),
            working_directory: None,
        },
    }
}

pub fn build_test_app(pipeline: FakePipeline) -> TestApp {
    build_test_app_with(pipeline, |_| {})
}

/// Like [`build_test_app`], letting the caller adjust the config first.
pub fn build_test_app_with(
    pipeline: FakePipeline,
    customize: impl FnOnce(&mut ServerConfig),
) -> TestApp {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = test_config(dir.path());
    customize(&mut config);
    std::fs::create_dir_all(&config.input_dir).unwrap();
    std::fs::create_dir_all(&config.output_dir).unwrap();

    let pipeline = Arc::new(pipeline);
    let state = AppState::new(config, pipeline.clone());
    let router = build_app_router(state.clone());

    TestApp {
        router,
        state,
        pipeline,
        dir,
    }
}

// ---------------------------------------------------------------------------
// Request / response helpers
// ---------------------------------------------------------------------------

pub async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

const BOUNDARY: &str = "trellis-test-boundary";

/// A multipart body with one file field.
pub fn multipart_file(field: &str, file_name: &str, data: &[u8]) -> (String, Vec<u8>) {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    (multipart_content_type(), body)
}

/// A multipart body with one text field.
pub fn multipart_text(field: &str, value: &str) -> (String, Vec<u8>) {
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n{value}\r\n--{BOUNDARY}--\r\n"
    )
    .into_bytes();
    (multipart_content_type(), body)
}

fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// A small valid PNG.
pub fn png_bytes() -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image::RgbImage::new(4, 4)
        .write_to(&mut buf, image::ImageFormat::Png)
        .expect("encode png");
    buf.into_inner()
}
