use std::io;
use std::path::Path;

use anyhow::Context;
use bytes::Bytes;
use reqwest::header::CONNECTION;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, StatusCode};
use tokio::io::AsyncReadExt;
use tracing::{error, info, warn};

use super::task::{scan, AttemptState, UploadTask};

/// Multipart field name the collector expects.
const UPLOAD_FIELD_NAME: &str = "fileToUpload";

/// Upper bound on bytes read (and forwarded) per chunk of the request body.
const UPLOAD_CHUNK_BYTES: usize = 1024 * 1024;

/// Errors local to a single upload task. The source file is retained on any
/// of these; a later pass may retry it.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("source file does not exist: {0}")]
    Missing(std::path::PathBuf),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server responded with HTTP {0}")]
    HttpStatus(u16),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Outcome counts of one scan-and-upload pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    pub scanned: usize,
    pub uploaded: usize,
    pub failed: usize,
}

/// Pushes completed recordings to the collector endpoint.
///
/// Each file goes out as a single-part `multipart/form-data` POST; HTTP 200
/// confirms receipt and is the only response that deletes the local copy.
/// There is no retry or backoff here - re-invoking the pass is the caller's
/// responsibility.
pub struct Uploader {
    client: reqwest::Client,
    endpoint_url: String,
}

impl Uploader {
    pub fn new(endpoint_url: impl Into<String>) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            endpoint_url: endpoint_url.into(),
        })
    }

    /// Upload one file and delete it on confirmed receipt.
    ///
    /// A missing source fails cleanly with [`UploadError::Missing`], so a
    /// second call for an already-uploaded file is harmless.
    pub async fn upload(&self, task: &mut UploadTask) -> Result<(), UploadError> {
        if !task.source.is_file() {
            task.attempt = AttemptState::Failed;
            return Err(UploadError::Missing(task.source.clone()));
        }

        task.attempt = AttemptState::InFlight;
        let result = self.send_file(&task.source).await;

        match &result {
            Ok(()) => {
                tokio::fs::remove_file(&task.source).await?;
                info!("uploaded and removed {}", task.source.display());
                task.attempt = AttemptState::Succeeded;
            }
            Err(e) => {
                warn!("upload of {} failed: {}", task.source.display(), e);
                task.attempt = AttemptState::Failed;
            }
        }

        result
    }

    /// POST the file as multipart/form-data, streaming its bytes in bounded
    /// chunks. Only HTTP 200 counts as success.
    async fn send_file(&self, source: &Path) -> Result<(), UploadError> {
        let file = tokio::fs::File::open(source).await?;
        let length = file.metadata().await?.len();

        // The Content-Disposition filename carries the original absolute path.
        let file_name = source
            .canonicalize()
            .unwrap_or_else(|_| source.to_path_buf())
            .display()
            .to_string();

        let chunks = futures::stream::unfold(file, |mut file| async move {
            let mut buf = vec![0u8; UPLOAD_CHUNK_BYTES];
            match file.read(&mut buf).await {
                Ok(0) => None,
                Ok(n) => {
                    buf.truncate(n);
                    Some((Ok::<_, io::Error>(Bytes::from(buf)), file))
                }
                Err(e) => Some((Err(e), file)),
            }
        });

        let part = Part::stream_with_length(Body::wrap_stream(chunks), length)
            .file_name(file_name)
            .mime_str("application/octet-stream")?;
        let form = Form::new().part(UPLOAD_FIELD_NAME, part);

        let response = self
            .client
            .post(&self.endpoint_url)
            .header(CONNECTION, "Keep-Alive")
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        info!("server response for {}: {}", source.display(), status);

        if status != StatusCode::OK {
            return Err(UploadError::HttpStatus(status.as_u16()));
        }

        Ok(())
    }

    /// One sequential pass over every file in `dir`. Per-file failures are
    /// logged and never abort the rest of the pass.
    pub async fn run_pass(&self, dir: &Path) -> anyhow::Result<UploadReport> {
        let mut tasks = scan(dir)
            .with_context(|| format!("failed to scan {}", dir.display()))?;

        let mut report = UploadReport {
            scanned: tasks.len(),
            ..Default::default()
        };

        for task in &mut tasks {
            match self.upload(task).await {
                Ok(()) => report.uploaded += 1,
                Err(e) => {
                    error!("leaving {} for a later pass: {}", task.source.display(), e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "upload pass complete: {} scanned, {} uploaded, {} failed",
            report.scanned, report.uploaded, report.failed
        );

        Ok(report)
    }
}
