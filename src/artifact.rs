//! Generated artifact downloads
//!
//! Artifacts are produced asynchronously by the backend, so a download requested right
//! after a job completes may be answered with a 500 while files are still being written.
//! [`ArtifactFetcher`] retries those transient statuses with linear backoff (see
//! [`crate::retry`]) and treats everything else as terminal.

use crate::client::{ApiClient, endpoints, json_error_message};
use crate::config::RetryConfig;
use crate::error::{DownloadError, Error, Result};
use crate::retry::{Attempt, download_with_retry_observed};
use crate::types::{FileKind, JobId};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Message used when the error body carries nothing readable
fn still_processing_message(status: u16) -> String {
    format!(
        "Server error ({}). Files may still be processing. Please try again in a few moments or check the History page.",
        status
    )
}

/// A downloaded artifact with the filename it should be saved under
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    /// Sanitized filename
    pub filename: String,
    /// Artifact contents, never empty
    pub bytes: Bytes,
}

/// Destination for downloaded artifacts
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Persist `artifact`; the error text is reported as [`Error::SaveFailed`]
    async fn save(&self, artifact: &Artifact) -> std::result::Result<(), String>;
}

/// [`ArtifactSink`] writing files into one directory
#[derive(Clone, Debug)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Save artifacts under `dir`, creating it on first use
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ArtifactSink for DirectorySink {
    async fn save(&self, artifact: &Artifact) -> std::result::Result<(), String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| e.to_string())?;
        let path = self.dir.join(&artifact.filename);
        tokio::fs::write(&path, &artifact.bytes)
            .await
            .map_err(|e| e.to_string())?;
        info!(path = %path.display(), bytes = artifact.bytes.len(), "Saved artifact");
        Ok(())
    }
}

/// Filename for a job's zip bundle: whitespace runs become `_`
///
/// ```
/// assert_eq!(bookgen_client::artifact::zip_filename("My  Great Book"), "My_Great_Book_bonuses.zip");
/// ```
pub fn zip_filename(book_title: &str) -> String {
    let mut name = String::with_capacity(book_title.len() + 12);
    let mut in_whitespace = false;
    for c in book_title.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                name.push('_');
            }
            in_whitespace = true;
        } else {
            name.push(c);
            in_whitespace = false;
        }
    }
    name.push_str("_bonuses.zip");
    name
}

/// Filename for a single generated file: every non-alphanumeric character becomes `_`
///
/// ```
/// use bookgen_client::artifact::file_filename;
/// use bookgen_client::FileKind;
///
/// assert_eq!(file_filename("Quick-Start Guide!", FileKind::Pdf), "quick_start_guide_.pdf");
/// ```
pub fn file_filename(item_title: &str, kind: FileKind) -> String {
    let stem: String = item_title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.{}", stem, kind.as_str())
}

/// Downloads job artifacts with bounded retry
#[derive(Clone, Debug)]
pub struct ArtifactFetcher {
    api: ApiClient,
    retry: RetryConfig,
}

impl ArtifactFetcher {
    /// Create a fetcher using `retry` for transient failures
    ///
    /// # Errors
    /// [`Error::Config`] when the retry policy is invalid, see [`RetryConfig::validate`].
    pub fn new(api: ApiClient, retry: RetryConfig) -> Result<Self> {
        retry.validate()?;
        Ok(Self { api, retry })
    }

    /// Retry policy in use
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Download the zip bundle of every file generated for `job_id`
    pub async fn fetch_zip_bundle(&self, job_id: &JobId, book_title: &str) -> Result<Artifact> {
        self.fetch_zip_bundle_observed(job_id, book_title, |_| {}).await
    }

    /// [`fetch_zip_bundle`](Self::fetch_zip_bundle), reporting each attempt to `observer`
    pub async fn fetch_zip_bundle_observed<O>(
        &self,
        job_id: &JobId,
        book_title: &str,
        observer: O,
    ) -> Result<Artifact>
    where
        O: FnMut(&Attempt),
    {
        let query = [("book_title", book_title), ("job_id", job_id.as_str())];
        let bytes = self
            .fetch(endpoints::DOWNLOAD, &query, "application/zip", observer)
            .await?;
        Ok(Artifact {
            filename: zip_filename(book_title),
            bytes,
        })
    }

    /// Download one generated file
    pub async fn fetch_single_file(
        &self,
        job_id: &JobId,
        book_title: &str,
        item_title: &str,
        kind: FileKind,
    ) -> Result<Artifact> {
        let query = [
            ("book_title", book_title),
            ("bonus_title", item_title),
            ("file_type", kind.as_str()),
            ("job_id", job_id.as_str()),
        ];
        let bytes = self
            .fetch(endpoints::DOWNLOAD_FILE, &query, "*/*", |_| {})
            .await?;
        Ok(Artifact {
            filename: file_filename(item_title, kind),
            bytes,
        })
    }

    /// Download the zip bundle and hand it to `sink`; returns the saved filename
    pub async fn download_zip_bundle(
        &self,
        job_id: &JobId,
        book_title: &str,
        sink: &dyn ArtifactSink,
    ) -> Result<String> {
        let artifact = self.fetch_zip_bundle(job_id, book_title).await?;
        save(sink, artifact).await
    }

    /// Download one file and hand it to `sink`; returns the saved filename
    pub async fn download_single_file(
        &self,
        job_id: &JobId,
        book_title: &str,
        item_title: &str,
        kind: FileKind,
        sink: &dyn ArtifactSink,
    ) -> Result<String> {
        let artifact = self
            .fetch_single_file(job_id, book_title, item_title, kind)
            .await?;
        save(sink, artifact).await
    }

    async fn fetch<O>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        accept: &str,
        observer: O,
    ) -> Result<Bytes>
    where
        O: FnMut(&Attempt),
    {
        download_with_retry_observed(&self.retry, || self.attempt(path, query, accept), observer).await
    }

    async fn attempt(&self, path: &str, query: &[(&str, &str)], accept: &str) -> Result<Bytes> {
        let response = self.api.get_raw(path, query, accept).await?;
        let status = response.status();

        if !status.is_success() {
            let code = status.as_u16();
            let message = match response.text().await {
                Ok(body) => json_error_message(&body)
                    .or_else(|| Some(body.trim().to_string()).filter(|text| !text.is_empty()))
                    .unwrap_or_else(|| still_processing_message(code)),
                Err(_) => still_processing_message(code),
            };
            let error = if self.retry.is_transient_status(code) {
                DownloadError::TransientStatus {
                    status: code,
                    message,
                }
            } else {
                DownloadError::Status {
                    status: code,
                    message,
                }
            };
            return Err(error.into());
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(DownloadError::EmptyArtifact.into());
        }
        debug!(path, bytes = bytes.len(), "Artifact downloaded");
        Ok(bytes)
    }
}

async fn save(sink: &dyn ArtifactSink, artifact: Artifact) -> Result<String> {
    sink.save(&artifact)
        .await
        .map_err(|reason| Error::SaveFailed {
            filename: artifact.filename.clone(),
            reason,
        })?;
    Ok(artifact.filename)
}
