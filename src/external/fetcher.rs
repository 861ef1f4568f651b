//! Resolves a Job's `source_ref` (a URL or an uploaded-file reference) to
//! a local media file — the external fetcher named in spec.md §4.6 step 1.
//! Downloading is wrapped by the circuit breaker/rate limiter in
//! [`crate::external::resilience`] at the call site, mirroring how the
//! original system throttled its source-provider calls.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use url::Url;

#[derive(Debug, Clone)]
pub enum SourceRef {
    Url(String),
    UploadedFile(PathBuf),
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Materialize `source_ref` as a local file under `dest_dir`, returning
    /// its path. Uploaded files are already local and are returned as-is.
    async fn fetch(&self, source_ref: &SourceRef, dest_dir: &Path) -> Result<PathBuf>;
}

pub struct HttpSourceFetcher {
    client: reqwest::Client,
}

impl Default for HttpSourceFetcher {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SourceFetcher for HttpSourceFetcher {
    async fn fetch(&self, source_ref: &SourceRef, dest_dir: &Path) -> Result<PathBuf> {
        match source_ref {
            SourceRef::UploadedFile(path) => {
                if !path.exists() {
                    return Err(AppError::validation(
                        "UPLOAD_NOT_FOUND",
                        format!("uploaded file {path:?} does not exist"),
                    ));
                }
                Ok(path.clone())
            }
            SourceRef::Url(raw_url) => {
                let url = Url::parse(raw_url)
                    .map_err(|e| AppError::validation("INVALID_URL", e.to_string()))?;

                let response = self.client.get(url.clone()).send().await?;
                if !response.status().is_success() {
                    return Err(AppError::fetch(format!(
                        "source returned HTTP {}",
                        response.status()
                    )));
                }

                fs::create_dir_all(dest_dir).await?;
                let dest_path = dest_dir.join("source_media");
                let mut file = fs::File::create(&dest_path).await?;
                let bytes = response.bytes().await?;
                file.write_all(&bytes).await?;
                Ok(dest_path)
            }
        }
    }
}
