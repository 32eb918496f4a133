use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use serde::de::DeserializeOwned;
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};

/// Attempt budget and backoff for every fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait after the first failed attempt; doubles after each further one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `failed_attempt` (1-based) before the next one.
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

/// A single file to fetch, with optional SHA-1 for validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub dest: PathBuf,
    pub sha1: Option<String>,
    pub size: Option<u64>,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            dest: dest.into(),
            sha1: None,
            size: None,
        }
    }

    pub fn with_sha1(mut self, sha1: Option<String>) -> Self {
        self.sha1 = sha1.filter(|s| !s.trim().is_empty());
        self
    }
}

/// What a task fetch ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded,
    AlreadyPresent,
}

/// Retrying HTTP fetcher. Cheap to clone; clones share the request counter
/// and the cancellation token.
#[derive(Clone)]
pub struct Downloader {
    client: Client,
    policy: RetryPolicy,
    cancel: CancellationToken,
    requests: Arc<AtomicU64>,
}

impl Downloader {
    pub fn new(client: Client, policy: RetryPolicy) -> Self {
        Self {
            client,
            policy,
            cancel: CancellationToken::new(),
            requests: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn http_client(&self) -> &Client {
        &self.client
    }

    /// Number of HTTP requests issued so far by this downloader and its clones.
    pub fn requests_issued(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn check_cancelled(&self) -> LauncherResult<()> {
        if self.cancel.is_cancelled() {
            return Err(LauncherError::Cancelled);
        }
        Ok(())
    }

    // ── Binary fetch ────────────────────────────────────

    /// Stream `url` to `dest`, retrying with backoff.
    ///
    /// The partial file is removed after every failed attempt. The result
    /// must be non-empty.
    pub async fn fetch(&self, url: &str, dest: &Path) -> LauncherResult<u64> {
        self.fetch_verified(url, dest, None).await
    }

    /// Like [`fetch`](Self::fetch), also checking the SHA-1 when given.
    pub async fn fetch_verified(
        &self,
        url: &str,
        dest: &Path,
        sha1: Option<&str>,
    ) -> LauncherResult<u64> {
        self.with_retry(url, || async move {
            let result = self.fetch_once(url, dest, sha1).await;
            if result.is_err() {
                remove_partial(dest).await;
            }
            result
        })
        .await
    }

    /// Fetch a task unless its destination is already present and valid.
    pub async fn fetch_task(&self, task: &DownloadTask) -> LauncherResult<FetchOutcome> {
        if is_present(&task.dest, task.sha1.as_deref()).await {
            return Ok(FetchOutcome::AlreadyPresent);
        }
        self.fetch_verified(&task.url, &task.dest, task.sha1.as_deref())
            .await?;
        Ok(FetchOutcome::Downloaded)
    }

    async fn fetch_once(&self, url: &str, dest: &Path, sha1: Option<&str>) -> LauncherResult<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut hasher = Sha1::new();
        let mut written = 0_u64;
        {
            let mut file = tokio::fs::File::create(dest)
                .await
                .map_err(|e| LauncherError::io(dest, e))?;
            let mut stream = response.bytes_stream();
            loop {
                let chunk = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(LauncherError::Cancelled),
                    chunk = stream.next() => chunk,
                };
                let Some(chunk) = chunk else { break };
                let chunk = chunk?;
                hasher.update(&chunk);
                file.write_all(&chunk)
                    .await
                    .map_err(|e| LauncherError::io(dest, e))?;
                written += chunk.len() as u64;
            }
            file.flush().await.map_err(|e| LauncherError::io(dest, e))?;
            // handle dropped here so the file can be removed or renamed on Windows
        }

        if written == 0 {
            return Err(LauncherError::CorruptArtifact {
                origin: url.to_string(),
                reason: "empty response body".into(),
            });
        }

        if let Some(expected) = sha1 {
            let actual = hex::encode(hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(LauncherError::Sha1Mismatch {
                    path: dest.to_path_buf(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        debug!("Downloaded {} bytes: {} -> {:?}", written, url, dest);
        Ok(written)
    }

    // ── JSON fetch ──────────────────────────────────────

    /// Fetch a JSON document, persist the validated bytes to `dest` and
    /// return it parsed.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        dest: &Path,
    ) -> LauncherResult<T> {
        self.with_retry(url, || async move {
            let result = self.fetch_json_once(url, Some(dest)).await;
            if result.is_err() {
                remove_partial(dest).await;
            }
            result
        })
        .await
    }

    /// Fetch and validate a JSON document without persisting it.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> LauncherResult<T> {
        self.with_retry(url, || self.fetch_json_once(url, None)).await
    }

    async fn fetch_json_once<T: DeserializeOwned>(
        &self,
        url: &str,
        dest: Option<&Path>,
    ) -> LauncherResult<T> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(LauncherError::Cancelled),
            body = response.bytes() => body?,
        };
        let cleaned = validate_json_payload(url, &body)?;
        let parsed: T =
            serde_json::from_slice(cleaned).map_err(|e| LauncherError::CorruptArtifact {
                origin: url.to_string(),
                reason: format!("malformed JSON: {e}"),
            })?;

        if let Some(dest) = dest {
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| LauncherError::io(parent, e))?;
            }
            tokio::fs::write(dest, cleaned)
                .await
                .map_err(|e| LauncherError::io(dest, e))?;
        }

        Ok(parsed)
    }

    // ── Retry loop ──────────────────────────────────────

    async fn with_retry<T, F, Fut>(&self, url: &str, mut attempt_fn: F) -> LauncherResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LauncherResult<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.check_cancelled()?;
            self.requests.fetch_add(1, Ordering::Relaxed);

            let err = match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(LauncherError::Cancelled) => return Err(LauncherError::Cancelled),
                Err(err) => err,
            };

            if attempt >= max_attempts || !err.is_retryable() {
                return Err(LauncherError::Network {
                    url: url.to_string(),
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let delay = self.policy.delay_after(attempt);
            warn!(
                "Attempt {}/{} for {} failed: {}. Retrying in {:?}",
                attempt, max_attempts, url, err, delay
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(LauncherError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    // ── Validation helpers ──────────────────────────────

    /// Validate an existing file's SHA-1.
    pub async fn validate_sha1(path: &Path, expected: &str) -> LauncherResult<bool> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| LauncherError::io(path, e))?;
        let mut hasher = Sha1::new();
        hasher.update(&bytes);
        let actual = hex::encode(hasher.finalize());
        Ok(actual.eq_ignore_ascii_case(expected))
    }
}

/// Whether `path` already holds a usable copy: non-empty, and matching
/// `sha1` when one is known.
pub async fn is_present(path: &Path, sha1: Option<&str>) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => {}
        _ => return false,
    }
    match sha1 {
        Some(expected) => Downloader::validate_sha1(path, expected)
            .await
            .unwrap_or(false),
        None => true,
    }
}

/// Strip a UTF-8 BOM and surrounding whitespace, then reject HTML error
/// pages served in place of JSON.
fn validate_json_payload<'a>(url: &str, body: &'a [u8]) -> LauncherResult<&'a [u8]> {
    let body = body.strip_prefix("\u{feff}".as_bytes()).unwrap_or(body);
    let body = body.trim_ascii();

    if body.is_empty() {
        return Err(LauncherError::CorruptArtifact {
            origin: url.to_string(),
            reason: "empty JSON document".into(),
        });
    }

    let head = String::from_utf8_lossy(&body[..body.len().min(256)]).to_ascii_lowercase();
    if head.starts_with("<!doctype") || head.starts_with("<html") {
        return Err(LauncherError::CorruptArtifact {
            origin: url.to_string(),
            reason: "server returned an HTML page instead of JSON".into(),
        });
    }

    Ok(body)
}

async fn remove_partial(dest: &Path) {
    match tokio::fs::remove_file(dest).await {
        Ok(()) => debug!("Removed partial file {:?}", dest),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove partial file {:?}: {}", dest, e),
    }
}
