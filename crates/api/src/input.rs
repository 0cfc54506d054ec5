//! Input intake for `POST /process`.
//!
//! Accepts either an uploaded image (multipart field `image` with a file
//! name) or a server-local path (multipart text field `image`, or an
//! urlencoded form field `image`). Both are checked to be decodable
//! PNG/JPEG/WebP images before a job is created; only the header is read.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::Form;
use image::{ImageFormat, ImageReader};
use serde::Deserialize;
use trellis_core::error::CoreError;
use trellis_core::types::JobId;

use crate::engine::JobInput;
use crate::error::{AppError, AppResult};

/// Name of the form field carrying the image.
pub const IMAGE_FIELD: &str = "image";

/// Extension used when an upload's format cannot be named.
const FALLBACK_EXTENSION: &str = "webp";

/// The image a client asked us to process.
#[derive(Debug)]
pub enum ProcessInput {
    Upload { file_name: String, data: Bytes },
    Path(PathBuf),
}

/// Header-level facts about a validated image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: Option<ImageFormat>,
    pub width: u32,
    pub height: u32,
}

impl ImageInfo {
    /// File extension to stage an upload of this format under.
    pub fn extension(&self) -> &'static str {
        self.format
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or(FALLBACK_EXTENSION)
    }
}

#[derive(Debug, Deserialize)]
struct PathForm {
    image: Option<String>,
}

/// Pull the image out of a multipart or urlencoded request body.
pub async fn extract<S>(request: Request, state: &S) -> AppResult<ProcessInput>
where
    S: Send + Sync,
{
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        from_multipart(multipart).await
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(form) = Form::<PathForm>::from_request(request, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        path_input(form.image.as_deref().unwrap_or(""))
    } else {
        Err(no_image())
    }
}

async fn from_multipart(mut multipart: Multipart) -> AppResult<ProcessInput> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue; // ignore unknown fields
        }

        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                if file_name.trim().is_empty() {
                    return Err(AppError::BadRequest("No selected file".into()));
                }
                let data = field.bytes().await?;
                if data.is_empty() {
                    return Err(AppError::BadRequest("Uploaded file is empty".into()));
                }
                return Ok(ProcessInput::Upload { file_name, data });
            }
            None => {
                let text = field.text().await?;
                return path_input(&text);
            }
        }
    }

    Err(no_image())
}

fn path_input(raw: &str) -> AppResult<ProcessInput> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(no_image());
    }
    Ok(ProcessInput::Path(PathBuf::from(raw)))
}

fn no_image() -> AppError {
    AppError::BadRequest("No image provided".into())
}

/// Validate uploaded bytes as an image.
pub fn inspect_bytes(data: &[u8]) -> AppResult<ImageInfo> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    let format = reader.format();
    let (width, height) = reader.into_dimensions().map_err(|_| unsupported_image())?;
    Ok(ImageInfo {
        format,
        width,
        height,
    })
}

/// Validate an existing server-local file as an image.
pub async fn inspect_path(path: &Path) -> AppResult<ImageInfo> {
    let metadata = tokio::fs::metadata(path).await.map_err(|_| {
        invalid(format!("Image path not accessible: {}", path.display()))
    })?;
    if !metadata.is_file() {
        return Err(invalid(format!(
            "Image path is not a file: {}",
            path.display()
        )));
    }

    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> AppResult<ImageInfo> {
        let reader = ImageReader::open(&owned)?.with_guessed_format()?;
        let format = reader.format();
        let (width, height) = reader.into_dimensions().map_err(|_| unsupported_image())?;
        Ok(ImageInfo {
            format,
            width,
            height,
        })
    })
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?
}

fn unsupported_image() -> AppError {
    invalid("Input is not a supported image (PNG, JPEG or WebP)".into())
}

fn invalid(msg: String) -> AppError {
    CoreError::Validation(msg).into()
}

/// Validated input, ready to be staged for a job.
#[derive(Debug)]
pub struct CheckedInput {
    input: ProcessInput,
    info: ImageInfo,
}

impl CheckedInput {
    pub async fn check(input: ProcessInput) -> AppResult<Self> {
        let info = match &input {
            ProcessInput::Upload { data, .. } => inspect_bytes(data)?,
            ProcessInput::Path(path) => inspect_path(path).await?,
        };
        Ok(Self { input, info })
    }

    pub fn info(&self) -> ImageInfo {
        self.info
    }

    /// Place the input where job `job_id` will read it.
    ///
    /// Uploads are written to `{input_dir}/{job_id}.{ext}` and become
    /// temporary inputs; paths are referenced in place.
    pub async fn stage(self, input_dir: &Path, job_id: JobId) -> AppResult<JobInput> {
        match self.input {
            ProcessInput::Upload { file_name, data } => {
                let path = input_dir.join(format!("{job_id}.{}", self.info.extension()));
                tracing::info!(%job_id, file_name = %file_name, path = %path.display(), "Saving upload");
                if let Err(e) = tokio::fs::write(&path, &data).await {
                    // Drop whatever part of the file was written.
                    let _ = tokio::fs::remove_file(&path).await;
                    return Err(e.into());
                }
                Ok(JobInput::Uploaded(path))
            }
            ProcessInput::Path(path) => Ok(JobInput::Referenced(path)),
        }
    }
}
