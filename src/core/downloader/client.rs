use std::path::{Path, PathBuf};

use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::config::LauncherConfig;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::{is_transient, send_with_retry, RetryPolicy};

use super::hash::{hash_file, ContentHash};
use super::progress::ByteCounter;

/// A downloadable file with integrity metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Human-readable identity used in logs and errors.
    pub id: String,
    /// `None` for files synthesized locally (nothing to download).
    pub url: Option<String>,
    pub hash: ContentHash,
    pub size: Option<u64>,
    /// Location relative to the store the artifact belongs to.
    pub path: PathBuf,
}

/// One unit of a batch: an artifact and where it lands.
#[derive(Debug, Clone)]
pub struct FetchJob {
    pub artifact: Artifact,
    pub dest: PathBuf,
}

impl FetchJob {
    pub fn new(artifact: Artifact, dest: PathBuf) -> Self {
        Self { artifact, dest }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The file already on disk was accepted.
    Cached,
    Downloaded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub downloaded: usize,
    pub cached: usize,
}

/// Concurrent, hash-validated downloader.
#[derive(Clone)]
pub struct ArtifactFetcher {
    client: Client,
    /// Maximum number of parallel downloads per batch.
    concurrency: usize,
    validate: bool,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl ArtifactFetcher {
    pub fn new(client: Client, config: &LauncherConfig) -> Self {
        Self {
            client,
            concurrency: config.effective_concurrency(),
            validate: config.validate_downloads,
            retry: RetryPolicy::new(config.download_retries, config.retry_backoff_ms),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn validation_enabled(&self) -> bool {
        self.validate
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    fn ensure_not_cancelled(&self) -> LauncherResult<()> {
        if self.cancel.is_cancelled() {
            Err(LauncherError::Cancelled)
        } else {
            Ok(())
        }
    }

    // ── Single artifact ─────────────────────────────────

    /// Make sure `dest` holds `artifact`, downloading it if needed.
    ///
    /// With validation disabled an existing file is trusted as-is. With it
    /// enabled an existing file is re-hashed and replaced when it does not
    /// match. Fresh transfers are always hashed before they become visible
    /// at `dest`.
    pub async fn fetch(
        &self,
        artifact: &Artifact,
        dest: &Path,
        progress: &ByteCounter,
    ) -> LauncherResult<FetchOutcome> {
        self.ensure_not_cancelled()?;

        if tokio::fs::try_exists(dest).await.unwrap_or(false) {
            if !self.validate {
                debug!("Trusting existing file for {}", artifact.id);
                count_cached(artifact, dest, progress).await;
                return Ok(FetchOutcome::Cached);
            }

            let actual = hash_file(dest, artifact.hash.algorithm).await?;
            if artifact.hash.matches(&actual) {
                count_cached(artifact, dest, progress).await;
                return Ok(FetchOutcome::Cached);
            }
            warn!(
                "Existing file for {} has hash {}, expected {}; re-downloading",
                artifact.id, actual, artifact.hash
            );
        }

        self.fetch_forced(artifact, dest, progress).await?;
        Ok(FetchOutcome::Downloaded)
    }

    /// Download regardless of what is on disk.
    ///
    /// This is the only retry layer for artifacts: connection failures,
    /// 429/5xx responses and broken bodies are retried with backoff. A hash
    /// mismatch is retried once with a fresh transfer before it is reported.
    pub async fn fetch_forced(
        &self,
        artifact: &Artifact,
        dest: &Path,
        progress: &ByteCounter,
    ) -> LauncherResult<()> {
        let url = artifact.url.as_deref().ok_or_else(|| LauncherError::Download {
            url: String::new(),
            cause: format!("{} has no remote source and is missing locally", artifact.id),
        })?;

        let total = match artifact.size {
            Some(size) => size,
            None => self.probe_size(url).await.unwrap_or(0),
        };
        progress.add_total(total);

        let mut integrity_retry_used = false;
        let mut attempt = 0;
        loop {
            self.ensure_not_cancelled()?;
            match self.transfer(artifact, url, dest, progress).await {
                Ok(()) => return Ok(()),
                Err(TransferError::Transient(err)) if attempt < self.retry.retries => {
                    debug!("Transfer of {} failed ({}), retrying", artifact.id, err);
                    tokio::time::sleep(self.retry.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(TransferError::Fatal(err @ LauncherError::Integrity { .. }))
                    if !integrity_retry_used =>
                {
                    warn!("{}; retrying transfer once", err);
                    integrity_retry_used = true;
                }
                Err(TransferError::Transient(err)) | Err(TransferError::Fatal(err)) => {
                    return Err(err)
                }
            }
        }
    }

    /// Byte length advertised by a `HEAD` request.
    pub async fn probe_size(&self, url: &str) -> Option<u64> {
        let response = self.client.head(url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)?
            .to_str()
            .ok()?
            .parse()
            .ok()
    }

    /// One streaming transfer into a temp file beside `dest`, hashed on the
    /// fly and renamed into place only when the digest matches. A single
    /// request; retrying is up to the caller.
    async fn transfer(
        &self,
        artifact: &Artifact,
        url: &str,
        dest: &Path,
        progress: &ByteCounter,
    ) -> Result<(), TransferError> {
        let download_error = |cause: String| LauncherError::Download {
            url: url.to_string(),
            cause: format!("{}: {}", artifact.id, cause),
        };

        let parent = dest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| LauncherError::io(&parent, e))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransferError::Transient(download_error(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let err = download_error(format!("HTTP {}", status.as_u16()));
            return Err(if is_transient(status) {
                TransferError::Transient(err)
            } else {
                TransferError::Fatal(err)
            });
        }

        let temp = tempfile::NamedTempFile::new_in(&parent)
            .map_err(|e| LauncherError::io(&parent, e))?;
        let (std_file, temp_path) = temp.into_parts();
        let mut file = tokio::fs::File::from_std(std_file);

        let mut hasher = artifact.hash.hasher();
        let mut written = 0_u64;
        let mut stream = response.bytes_stream();

        let outcome: Result<(), TransferError> = async {
            loop {
                let next = tokio::select! {
                    _ = self.cancel.cancelled() => return Err(LauncherError::Cancelled.into()),
                    next = stream.next() => next,
                };
                let Some(chunk) = next else { break };
                let chunk =
                    chunk.map_err(|e| TransferError::Transient(download_error(e.to_string())))?;

                hasher.update(&chunk);
                file.write_all(&chunk)
                    .await
                    .map_err(|e| LauncherError::io(&*temp_path, e))?;
                written += chunk.len() as u64;
                progress.add_transferred(chunk.len() as u64);
            }
            file.flush()
                .await
                .map_err(|e| LauncherError::io(&*temp_path, e))?;
            Ok(())
        }
        .await;

        // Release the handle before renaming; Windows refuses to move open files.
        drop(file);

        if let Err(err) = outcome {
            progress.sub_transferred(written);
            return Err(err);
        }

        let actual = hasher.finalize_hex();
        if !artifact.hash.matches(&actual) {
            progress.sub_transferred(written);
            return Err(TransferError::Fatal(LauncherError::Integrity {
                artifact: artifact.id.clone(),
                expected: artifact.hash.hex.clone(),
                actual,
            }));
        }

        temp_path
            .persist(dest)
            .map_err(|e| LauncherError::io(dest, e.error))?;

        debug!("Downloaded: {} -> {:?} ({} bytes)", url, dest, written);
        Ok(())
    }

    // ── Batch concurrent downloads ──────────────────────

    /// Fetch every job with at most `concurrency` transfers in flight.
    ///
    /// The first failure aborts the batch: remaining transfers are dropped and
    /// their temp files removed, and the error names the offending artifact.
    pub async fn fetch_batch(
        &self,
        jobs: Vec<FetchJob>,
        progress: &ByteCounter,
    ) -> LauncherResult<BatchReport> {
        info!(
            "Starting batch download: {} files, concurrency={}",
            jobs.len(),
            self.concurrency
        );

        let mut results = stream::iter(jobs)
            .map(|job| async move { self.fetch(&job.artifact, &job.dest, progress).await })
            .buffer_unordered(self.concurrency);

        let mut report = BatchReport::default();
        while let Some(result) = results.next().await {
            match result? {
                FetchOutcome::Downloaded => report.downloaded += 1,
                FetchOutcome::Cached => report.cached += 1,
            }
        }

        info!(
            "Batch complete: {} downloaded, {} already valid",
            report.downloaded, report.cached
        );
        Ok(report)
    }

    /// Fetch a small text resource (descriptor, index, checksum sidecar).
    pub async fn fetch_text(&self, url: &str) -> LauncherResult<String> {
        self.ensure_not_cancelled()?;
        let response = send_with_retry(self.retry, || self.client.get(url))
            .await
            .map_err(|e| LauncherError::Download {
                url: url.to_string(),
                cause: e.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::Download {
                url: url.to_string(),
                cause: format!("HTTP {}", status.as_u16()),
            });
        }
        Ok(response.text().await?)
    }
}

async fn count_cached(artifact: &Artifact, dest: &Path, progress: &ByteCounter) {
    let size = match artifact.size {
        Some(size) => size,
        None => tokio::fs::metadata(dest)
            .await
            .map(|m| m.len())
            .unwrap_or_default(),
    };
    progress.add_total(size);
    progress.add_transferred(size);
}

/// Why one transfer attempt failed.
enum TransferError {
    /// Worth another attempt.
    Transient(LauncherError),
    Fatal(LauncherError),
}

impl From<LauncherError> for TransferError {
    fn from(err: LauncherError) -> Self {
        TransferError::Fatal(err)
    }
}

/// Write `contents` to `dest` through a sibling temp file and rename.
pub async fn write_atomic(dest: &Path, contents: Vec<u8>) -> LauncherResult<()> {
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || {
        use std::io::Write;

        let parent = dest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&parent).map_err(|e| LauncherError::io(&parent, e))?;

        let mut temp =
            tempfile::NamedTempFile::new_in(&parent).map_err(|e| LauncherError::io(&parent, e))?;
        temp.write_all(&contents)
            .map_err(|e| LauncherError::io(temp.path(), e))?;
        temp.persist(&dest)
            .map_err(|e| LauncherError::io(&dest, e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| LauncherError::Other(format!("Task join error: {e}")))?
}
