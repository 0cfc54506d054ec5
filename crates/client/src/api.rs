//! REST client for the job service endpoints.
//!
//! Wraps `/initialize`, `/process`, `/status/{id}` and `/health` using
//! [`reqwest`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

/// HTTP client for a single service instance.
pub struct TrellisApi {
    client: reqwest::Client,
    base_url: String,
}

/// Response of `POST /process`.
#[derive(Debug, Deserialize)]
pub struct AcceptedResponse {
    pub status: String,
    pub request_id: String,
}

/// Response of `GET /status/{request_id}`.
#[derive(Debug, Deserialize)]
pub struct JobStatusResponse {
    pub request_id: String,
    pub status: String,
    #[serde(default)]
    pub processing_time: f64,
    #[serde(default)]
    pub result: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobStatusResponse {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "completed" | "failed")
    }
}

/// Errors from the client layer.
#[derive(Debug, thiserror::Error)]
pub enum TrellisApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The input file could not be read.
    #[error("Failed to read {path}: {source}")]
    Input {
        path: String,
        source: std::io::Error,
    },

    /// The service returned a non-2xx status code.
    #[error("Service error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl TrellisApi {
    /// * `base_url` - e.g. `http://localhost:5000`.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /initialize`. Blocks until the model is ready.
    pub async fn initialize(&self) -> Result<serde_json::Value, TrellisApiError> {
        let response = self.client.post(self.url("/initialize")).send().await?;
        Self::parse_response(response).await
    }

    /// `POST /process` with the file uploaded as multipart field `image`.
    pub async fn submit(&self, image: &Path) -> Result<AcceptedResponse, TrellisApiError> {
        let data = tokio::fs::read(image)
            .await
            .map_err(|source| TrellisApiError::Input {
                path: image.display().to_string(),
                source,
            })?;
        let file_name = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let part = reqwest::multipart::Part::bytes(data).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("image", part);

        let response = self
            .client
            .post(self.url("/process"))
            .multipart(form)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// `GET /status/{request_id}`.
    pub async fn status(&self, request_id: &str) -> Result<JobStatusResponse, TrellisApiError> {
        let response = self
            .client
            .get(self.url(&format!("/status/{request_id}")))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// `GET /health`.
    pub async fn health(&self) -> Result<serde_json::Value, TrellisApiError> {
        let response = self.client.get(self.url("/health")).send().await?;
        Self::parse_response(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    // ---- private helpers ----

    /// Decode a successful JSON body, or turn the service's
    /// `{"error": ...}` payload into [`TrellisApiError::Api`].
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TrellisApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrellisApiError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(response.json::<T>().await?)
    }
}

/// Pull `error` out of a JSON error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}
