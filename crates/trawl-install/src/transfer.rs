//! Content transfer with digest-while-copying.
//!
//! Sources are `file://` or `http(s)://` URLs. Content streams into a
//! `.part` sibling of the destination while the configured digest is
//! computed, then the temp file is renamed into place. Transient failures
//! retry with exponential backoff.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use futures_util::StreamExt;
use reqwest::{Client, ClientBuilder};
use tokio::io::AsyncWriteExt;

use trawl_core::{Artifact, DigestAlgorithm, Notifier, TrawlError, TrawlResult};

const USER_AGENT: &str = concat!("trawl/", env!("CARGO_PKG_VERSION"));

/// Retry and timeout knobs for artifact transfers
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Attempts beyond the first
    pub max_retries: u32,
    /// Initial backoff delay, doubled per retry
    pub backoff_base: Duration,
    /// Time limit for a single download
    pub timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(250),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Copies artifact content from source URLs onto disk
pub struct Transfer {
    client: Client,
    config: TransferConfig,
    algorithm: DigestAlgorithm,
}

impl Transfer {
    pub fn new(algorithm: DigestAlgorithm, config: TransferConfig) -> TrawlResult<Self> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(30))
            .gzip(true)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TrawlError::network("Failed to create HTTP client".to_string(), e))?;
        Ok(Self {
            client,
            config,
            algorithm,
        })
    }

    /// Fetch the artifact's content into place, overwriting any existing
    /// file, and return the lowercase hex digest of what was written.
    /// Retries recoverable failures; honors `cancel` between chunks.
    pub async fn fetch(
        &self,
        artifact: &Artifact,
        notifier: &dyn Notifier,
        cancel: &AtomicBool,
    ) -> TrawlResult<String> {
        let attempts = self.config.max_retries + 1;
        let mut delay = self.config.backoff_base;
        let mut last_reason = String::new();
        for attempt in 1..=attempts {
            let outcome = tokio::time::timeout(
                self.config.timeout,
                self.fetch_once(artifact, notifier, cancel),
            )
            .await
            .unwrap_or_else(|_| {
                Err(TrawlError::Network {
                    message: format!("Transfer timed out after {:?}", self.config.timeout),
                    source: None,
                })
            });
            match outcome {
                Ok(digest) => return Ok(digest),
                Err(TrawlError::Cancelled) => return Err(TrawlError::Cancelled),
                Err(error) if error.is_recoverable() && attempt < attempts => {
                    tracing::debug!(
                        url = %artifact.source_url,
                        attempt,
                        "transfer failed, retrying: {}",
                        error
                    );
                    last_reason = error.to_string();
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(error) if attempt < attempts && !error.is_recoverable() => {
                    return Err(error);
                }
                Err(error) => {
                    last_reason = error.to_string();
                    break;
                }
            }
        }
        Err(TrawlError::TransferFailed {
            url: artifact.source_url.to_string(),
            attempts,
            reason: last_reason,
        })
    }

    async fn fetch_once(
        &self,
        artifact: &Artifact,
        notifier: &dyn Notifier,
        cancel: &AtomicBool,
    ) -> TrawlResult<String> {
        if let Some(parent) = artifact.file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TrawlError::io(format!("Failed to create {}", parent), e))?;
        }
        let temp_path = part_path(&artifact.file);
        let result = self
            .stream_to(artifact, &temp_path, notifier, cancel)
            .await;
        match result {
            Ok(digest) => {
                tokio::fs::rename(&temp_path, &artifact.file)
                    .await
                    .map_err(|e| {
                        TrawlError::io(format!("Failed to move {} into place", temp_path), e)
                    })?;
                Ok(digest)
            }
            Err(error) => {
                // Leave no partial content behind
                let _ = tokio::fs::remove_file(&temp_path).await;
                Err(error)
            }
        }
    }

    async fn stream_to(
        &self,
        artifact: &Artifact,
        temp_path: &Utf8Path,
        notifier: &dyn Notifier,
        cancel: &AtomicBool,
    ) -> TrawlResult<String> {
        let mut output = tokio::fs::File::create(temp_path)
            .await
            .map_err(|e| TrawlError::io(format!("Failed to create {}", temp_path), e))?;
        let mut hasher = self.algorithm.hasher();
        let mut done: u64 = 0;

        match artifact.source_url.scheme() {
            "file" => {
                let source = artifact.source_url.to_file_path().map_err(|_| {
                    TrawlError::ConfigValidation {
                        field: "source_url".to_string(),
                        reason: format!("'{}' is not a local path", artifact.source_url),
                    }
                })?;
                let total = tokio::fs::metadata(&source).await.ok().map(|m| m.len());
                let mut input = tokio::fs::File::open(&source).await.map_err(|e| {
                    TrawlError::io(format!("Failed to open {}", source.display()), e)
                })?;
                let mut chunk = [0u8; 8192];
                loop {
                    if cancel.load(Ordering::Relaxed) {
                        return Err(TrawlError::Cancelled);
                    }
                    let read = tokio::io::AsyncReadExt::read(&mut input, &mut chunk)
                        .await
                        .map_err(|e| {
                            TrawlError::io(format!("Failed to read {}", source.display()), e)
                        })?;
                    if read == 0 {
                        break;
                    }
                    hasher.update(&chunk[..read]);
                    output.write_all(&chunk[..read]).await.map_err(|e| {
                        TrawlError::io(format!("Failed to write {}", temp_path), e)
                    })?;
                    done += read as u64;
                    notifier.progress(artifact, done, total);
                }
            }
            "http" | "https" => {
                let response = self
                    .client
                    .get(artifact.source_url.clone())
                    .send()
                    .await
                    .and_then(|response| response.error_for_status())
                    .map_err(|e| {
                        TrawlError::network(
                            format!("Failed to fetch {}", artifact.source_url),
                            e,
                        )
                    })?;
                let total = response.content_length();
                let mut stream = response.bytes_stream();
                while let Some(chunk) = stream.next().await {
                    if cancel.load(Ordering::Relaxed) {
                        return Err(TrawlError::Cancelled);
                    }
                    let chunk = chunk.map_err(|e| {
                        TrawlError::network(
                            format!("Failed to read {}", artifact.source_url),
                            e,
                        )
                    })?;
                    hasher.update(&chunk);
                    output
                        .write_all(&chunk)
                        .await
                        .map_err(|e| TrawlError::io(format!("Failed to write {}", temp_path), e))?;
                    done += chunk.len() as u64;
                    notifier.progress(artifact, done, total);
                }
            }
            scheme => {
                return Err(TrawlError::ConfigValidation {
                    field: "source_url".to_string(),
                    reason: format!("unsupported scheme '{}'", scheme),
                })
            }
        }

        output
            .flush()
            .await
            .map_err(|e| TrawlError::io(format!("Failed to flush {}", temp_path), e))?;
        Ok(hasher.finalize_hex())
    }
}

fn part_path(file: &Utf8Path) -> Utf8PathBuf {
    let mut name = file.file_name().unwrap_or("artifact").to_string();
    name.push_str(".part");
    file.with_file_name(name)
}
