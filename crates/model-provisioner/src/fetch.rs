//! HTTP model fetch with bounded retries

use crate::ProvisioningError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Retry configuration for the model download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt in milliseconds; doubles afterwards
    pub backoff_ms: u64,
    /// Upper bound for a single delay in milliseconds
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 500,
            backoff_max_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let delay = self.backoff_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.backoff_max_ms))
    }
}

/// Downloads a model into a local file
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    stall_timeout: Duration,
    retry: RetryPolicy,
}

impl HttpFetcher {
    /// Create a fetcher.
    ///
    /// `timeout` caps a whole attempt. `stall_timeout` caps the wait for
    /// the response headers and for each body chunk.
    pub fn new(
        timeout: Duration,
        stall_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ProvisioningError> {
        let client = reqwest::Client::builder()
            .connect_timeout(stall_timeout.min(timeout))
            .build()
            .map_err(|e| ProvisioningError::Fetch(e.to_string()))?;

        Ok(Self {
            client,
            timeout,
            stall_timeout,
            retry,
        })
    }

    /// Download `url` into `dest`, returning the number of bytes written.
    ///
    /// Each attempt truncates `dest` first, so a failed partial transfer
    /// never leaks into the next attempt.
    pub async fn fetch_into(&self, url: &str, dest: &Path) -> Result<u64, ProvisioningError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!("Fetching model from {} (attempt {}/{})", url, attempt, max_attempts);

            let result = match tokio::time::timeout(self.timeout, self.fetch_once(url, dest)).await {
                Ok(result) => result,
                Err(_) => Err(ProvisioningError::Timeout(self.timeout.as_millis() as u64)),
            };

            match result {
                Ok(bytes) => {
                    info!("Fetched model: {} bytes from {}", bytes, url);
                    return Ok(bytes);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        "Model fetch attempt {}/{} failed: {}; retrying in {}ms",
                        attempt,
                        max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &str, dest: &Path) -> Result<u64, ProvisioningError> {
        let mut response = self.unless_stalled(self.client.get(url).send()).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProvisioningError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        // Drive answers large files with an HTML confirmation page
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if content_type.starts_with("text/html") {
            return Err(ProvisioningError::UnexpectedContent {
                content_type,
                url: url.to_string(),
            });
        }

        let mut file = File::create(dest).await?;
        let mut written = 0u64;

        while let Some(chunk) = self.unless_stalled(response.chunk()).await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;

        if written == 0 {
            return Err(ProvisioningError::EmptyDownload);
        }

        Ok(written)
    }

    async fn unless_stalled<T>(
        &self,
        step: impl Future<Output = Result<T, reqwest::Error>>,
    ) -> Result<T, ProvisioningError> {
        match tokio::time::timeout(self.stall_timeout, step).await {
            Ok(result) => result.map_err(|e| ProvisioningError::Fetch(e.to_string())),
            Err(_) => Err(ProvisioningError::Stalled(self.stall_timeout.as_millis() as u64)),
        }
    }
}
