//! Raw register payload storage + HTTP fetch utilities for ARI.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "ari-storage";

/// A raw payload persisted under its content hash.
#[derive(Debug, Clone)]
pub struct StoredPayload {
    pub sha256: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub bytes: usize,
    pub already_present: bool,
}

/// Write-once store for downloaded register files.
///
/// Layout: `<root>/<source_id>/<yyyymmdd>/<sha256>.<ext>`. Identical payloads
/// fetched on the same day resolve to the same file.
#[derive(Debug, Clone)]
pub struct PayloadStore {
    root: PathBuf,
}

impl PayloadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub fn relative_path_for(
        &self,
        fetched_at: DateTime<Utc>,
        source_id: &str,
        sha256: &str,
        extension: &str,
    ) -> PathBuf {
        let ext = match extension.trim().trim_start_matches('.') {
            "" => "bin",
            ext => ext,
        };
        PathBuf::from(source_id)
            .join(fetched_at.format("%Y%m%d").to_string())
            .join(format!("{sha256}.{ext}"))
    }

    /// Persist bytes via temp file + rename so readers never see a partial payload.
    pub async fn put(
        &self,
        fetched_at: DateTime<Utc>,
        source_id: &str,
        extension: &str,
        bytes: &[u8],
    ) -> anyhow::Result<StoredPayload> {
        let sha256 = Self::sha256_hex(bytes);
        let relative_path = self.relative_path_for(fetched_at, source_id, &sha256, extension);
        let absolute_path = self.root.join(&relative_path);
        let stored = |already_present| StoredPayload {
            sha256: sha256.clone(),
            relative_path: relative_path.clone(),
            absolute_path: absolute_path.clone(),
            bytes: bytes.len(),
            already_present,
        };

        let Some(dir) = absolute_path.parent() else {
            anyhow::bail!("payload path {} has no parent", absolute_path.display());
        };
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating payload directory {}", dir.display()))?;

        if fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("checking payload path {}", absolute_path.display()))?
        {
            debug!(path = %absolute_path.display(), "payload already stored");
            return Ok(stored(true));
        }

        let temp_path = dir.join(format!(".{}.partial", Uuid::new_v4()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening {}", temp_path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("writing {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &absolute_path).await {
            let _ = fs::remove_file(&temp_path).await;
            if err.kind() == std::io::ErrorKind::AlreadyExists {
                return Ok(stored(true));
            }
            return Err(err).with_context(|| {
                format!(
                    "renaming {} -> {}",
                    temp_path.display(),
                    absolute_path.display()
                )
            });
        }
        Ok(stored(false))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub global_concurrency: usize,
    pub per_source_concurrency: usize,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            // register exports run to tens of megabytes
            timeout: Duration::from_secs(120),
            user_agent: None,
            global_concurrency: 4,
            per_source_concurrency: 1,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Shared HTTP client with bounded concurrency and retry on transient failures.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    global_limit: Arc<Semaphore>,
    per_source_limit: usize,
    per_source: Mutex<HashMap<String, Arc<Semaphore>>>,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building reqwest client")?;

        Ok(Self {
            client,
            global_limit: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
            per_source_limit: config.per_source_concurrency.max(1),
            per_source: Mutex::new(HashMap::new()),
            backoff: config.backoff,
        })
    }

    async fn source_semaphore(&self, source_id: &str) -> Arc<Semaphore> {
        let mut map = self.per_source.lock().await;
        map.entry(source_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_source_limit)))
            .clone()
    }

    pub async fn fetch_bytes(
        &self,
        run_id: Uuid,
        source_id: &str,
        url: &str,
    ) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", %run_id, source_id, url);
        self.fetch_with_retry(source_id, url).instrument(span).await
    }

    async fn fetch_with_retry(&self, source_id: &str, url: &str) -> Result<FetchedResponse, FetchError> {
        let per_source = self.source_semaphore(source_id).await;
        // Semaphores are never closed, so acquire only fails on a bug.
        let _global = self.global_limit.acquire().await.ok();
        let _source = per_source.acquire().await.ok();

        let mut attempt = 0usize;
        loop {
            let retry = match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();
                    if status.is_success() {
                        let body = resp.bytes().await?.to_vec();
                        debug!(bytes = body.len(), "fetched");
                        return Ok(FetchedResponse {
                            status,
                            final_url,
                            body,
                            fetched_at: Utc::now(),
                        });
                    }
                    let err = FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    };
                    (classify_status(status) == RetryDisposition::Retryable, err)
                }
                Err(err) => (
                    classify_reqwest_error(&err) == RetryDisposition::Retryable,
                    FetchError::Request(err),
                ),
            };

            match retry {
                (true, err) if attempt < self.backoff.max_retries => {
                    let delay = self.backoff.delay_for_attempt(attempt);
                    warn!(attempt, ?delay, error = %err, "retrying fetch");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                (_, err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fetched_at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-18T02:00:00Z")
            .expect("ts")
            .with_timezone(&Utc)
    }

    #[test]
    fn payload_hash_is_sha256_hex() {
        assert_eq!(
            PayloadStore::sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn payload_paths_group_by_source_and_day() {
        let store = PayloadStore::new("/tmp/raw");
        let path = store.relative_path_for(fetched_at(), "credit-licensees", "abc", ".tsv");
        assert_eq!(path, PathBuf::from("credit-licensees/20261018/abc.tsv"));
        let path = store.relative_path_for(fetched_at(), "credit-licensees", "abc", "");
        assert_eq!(path, PathBuf::from("credit-licensees/20261018/abc.bin"));
    }

    #[tokio::test]
    async fn identical_payloads_are_written_once() {
        let dir = tempdir().expect("tempdir");
        let store = PayloadStore::new(dir.path());

        let first = store
            .put(fetched_at(), "credit-representatives", "tsv", b"A\tB\n1\t2\n")
            .await
            .expect("first put");
        let second = store
            .put(fetched_at(), "credit-representatives", "tsv", b"A\tB\n1\t2\n")
            .await
            .expect("second put");

        assert!(!first.already_present);
        assert!(second.already_present);
        assert_eq!(first.absolute_path, second.absolute_path);
        assert_eq!(
            std::fs::read(&first.absolute_path).expect("read back"),
            b"A\tB\n1\t2\n"
        );
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(350));
    }

    #[test]
    fn throttling_and_server_errors_are_retryable() {
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), RetryDisposition::Retryable);
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), RetryDisposition::Retryable);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), RetryDisposition::NonRetryable);
    }
}
