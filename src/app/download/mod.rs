//! Bounded-concurrency file fetcher
//!
//! Every requested URL yields exactly one [`DownloadResult`]. Files are
//! streamed to a `.part` sibling and renamed into place only once the body
//! is known to be a non-empty binary payload, so a failed fetch never leaves
//! a file behind.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, Response};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::app::client::ClientConfig;
use crate::app::models::DownloadResult;
use crate::app::retry::RetryPolicy;
use crate::constants::{download, dry_run};
use crate::errors::{ConfigError, ConfigResult, DownloadError, TransportError};

pub mod filename;

pub use filename::resolve_filename;

/// Fetches band and metadata files into a scene's scratch directory
#[derive(Debug, Clone)]
pub struct DownloadManager {
    client: Client,
    retry: RetryPolicy,
    dry_run: bool,
}

impl DownloadManager {
    /// Creates a download manager sharing the API client's retry policy
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the HTTP client cannot be built
    pub fn new(config: &ClientConfig, transfer_timeout: Duration, dry_run: bool) -> ConfigResult<Self> {
        let client = config
            .build_http_client_with_timeout(transfer_timeout)
            .map_err(|e| ConfigError::InvalidValue {
                field: "download.timeout".to_string(),
                value: format!("{:?}", transfer_timeout),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            retry: config.retry.clone(),
            dry_run,
        })
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Fetch one URL into `dest_dir`
    ///
    /// Never fails: errors are reported in the returned result.
    pub async fn fetch(&self, url: &str, dest_dir: &Path, entity_id: &str) -> DownloadResult {
        let start = Instant::now();

        if self.dry_run {
            let path = dest_dir.join(resolve_filename(None, url, entity_id));
            info!("DRY-RUN: would download {} to {}", url, path.display());
            return DownloadResult::succeeded(
                entity_id,
                url,
                path,
                dry_run::FILE_SIZE,
                Duration::from_millis(dry_run::FETCH_DURATION_MS),
            );
        }

        let outcome = self
            .retry
            .run(
                url,
                |_| self.fetch_once(url, dest_dir, entity_id),
                DownloadError::is_retryable,
            )
            .await;

        match outcome {
            Ok((path, size)) => {
                info!(
                    entity_id = %entity_id,
                    "Downloaded {} ({} bytes)",
                    path.display(),
                    size
                );
                DownloadResult::succeeded(entity_id, url, path, size, start.elapsed())
            }
            Err(e) => {
                warn!(entity_id = %entity_id, "Download of {} failed: {}", url, e);
                DownloadResult::failed(entity_id, url, e.to_string(), start.elapsed())
            }
        }
    }

    /// Fetch every URL with at most `concurrency_limit` transfers in flight
    ///
    /// One result per input URL, in completion order. A fetch that panics is
    /// reported as a failed result without affecting the others.
    pub async fn fetch_all(
        &self,
        urls: &[String],
        dest_dir: &Path,
        entity_id: &str,
        concurrency_limit: usize,
    ) -> Vec<DownloadResult> {
        let limit = concurrency_limit.max(1);
        debug!(
            "Fetching {} files for {} with concurrency {}",
            urls.len(),
            entity_id,
            limit
        );

        let tasks = urls.iter().cloned().map(|url| {
            let manager = self.clone();
            let dest_dir = dest_dir.to_path_buf();
            let entity_id = entity_id.to_string();
            async move {
                let task_url = url.clone();
                let task_entity = entity_id.clone();
                let handle = tokio::spawn(async move {
                    manager.fetch(&task_url, &dest_dir, &task_entity).await
                });

                match handle.await {
                    Ok(result) => result,
                    Err(join_error) => {
                        let error = DownloadError::TaskAborted {
                            reason: join_error.to_string(),
                        };
                        warn!(entity_id = %entity_id, "Download of {} aborted: {}", url, error);
                        DownloadResult::failed(entity_id, url, error.to_string(), Duration::ZERO)
                    }
                }
            }
        });

        stream::iter(tasks).buffer_unordered(limit).collect().await
    }

    /// One attempt: request, validate and stream the body to disk
    async fn fetch_once(
        &self,
        url: &str,
        dest_dir: &Path,
        entity_id: &str,
    ) -> Result<(PathBuf, u64), DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(TransportError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }
            .into());
        }

        let content_type = header_value(&response, CONTENT_TYPE.as_str()).unwrap_or_default();
        if content_type
            .to_ascii_lowercase()
            .contains(download::JSON_CONTENT_TYPE)
        {
            let body = response.text().await.unwrap_or_default();
            return Err(DownloadError::DisguisedError {
                content_type,
                excerpt: body.chars().take(download::ERROR_EXCERPT_LEN).collect(),
            });
        }

        let disposition = header_value(&response, CONTENT_DISPOSITION.as_str());
        let name = resolve_filename(disposition.as_deref(), response.url().as_str(), entity_id);

        fs::create_dir_all(dest_dir).await?;
        let final_path = dest_dir.join(&name);
        let temp_path = dest_dir.join(format!("{}{}", name, download::TEMP_FILE_SUFFIX));

        let written = match stream_to_file(response, &temp_path).await {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(e);
            }
        };

        if written == 0 {
            let _ = fs::remove_file(&temp_path).await;
            return Err(DownloadError::EmptyBody { path: final_path });
        }

        if let Err(e) = fs::rename(&temp_path, &final_path).await {
            debug!("Rename of {} failed: {}", temp_path.display(), e);
            let _ = fs::remove_file(&temp_path).await;
            return Err(DownloadError::AtomicOperationFailed {
                temp_path,
                final_path,
            });
        }

        Ok((final_path, written))
    }
}

fn header_value(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn stream_to_file(mut response: Response, path: &Path) -> Result<u64, DownloadError> {
    let mut file = File::create(path).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = response.chunk().await.map_err(TransportError::Http)? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}
