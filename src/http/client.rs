//! HTTP client with built-in retry and resume support.

use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};
use std::io::Write;
use std::time::Duration;

use super::retry::{MAX_RETRIES, NonRetryableError, RETRY_DELAY_MS, check_retryable};

/// How a download attempt opens its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Start over from the first byte.
    Truncate,
    /// Continue after the bytes already on disk.
    Append,
}

/// HTTP client with built-in retry logic for network operations.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    retry_delay: Duration,
}

impl HttpClient {
    /// Creates a new HTTP client wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        }
    }

    /// Client whose requests give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("prebuilts/", env!("PREBUILTS_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::new(client))
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Downloads `url`, resuming after `existing_len()` bytes when non-zero.
    ///
    /// `existing_len` is consulted before every attempt, so a retry resumes
    /// from wherever the failed attempt stopped. Returns the number of bytes
    /// written by the successful attempt.
    #[tracing::instrument(skip(self, existing_len, open_writer))]
    pub async fn download_file<W, L, F>(
        &self,
        url: &str,
        existing_len: L,
        open_writer: F,
    ) -> Result<u64>
    where
        W: Write,
        L: Fn() -> u64,
        F: Fn(WriteMode) -> Result<W>,
    {
        debug!("Downloading file from {}...", url);

        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match self
                .download_file_once(url, existing_len(), &open_writer)
                .await
            {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    if e.downcast_ref::<NonRetryableError>().is_some() {
                        return Err(e);
                    }

                    if attempt < MAX_RETRIES {
                        warn!(
                            "Download attempt {}/{} failed ({:#}), retrying...",
                            attempt, MAX_RETRIES, e
                        );
                        tokio::time::sleep(self.retry_delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("Download failed after {} attempts", MAX_RETRIES)))
    }

    /// Single download attempt without retry.
    async fn download_file_once<W, F>(&self, url: &str, offset: u64, open_writer: &F) -> Result<u64>
    where
        W: Write,
        F: Fn(WriteMode) -> Result<W>,
    {
        let mut request = self.client.get(url);
        if offset > 0 {
            debug!("Resuming download at byte {}", offset);
            request = request.header(RANGE, format!("bytes={}-", offset));
        }

        let response = request
            .send()
            .await
            .context("Failed to start download request")?;

        if offset > 0 && response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            debug!("Server reports the partial file is already complete");
            return Ok(0);
        }

        let mut response = response.error_for_status().map_err(check_retryable)?;

        let mode = if offset > 0 && response.status() == StatusCode::PARTIAL_CONTENT {
            WriteMode::Append
        } else {
            WriteMode::Truncate
        };
        let mut writer = open_writer(mode)?;
        let mut downloaded_bytes: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read chunk from download stream")?
        {
            writer
                .write_all(&chunk)
                .context("Failed to write chunk to file")?;
            downloaded_bytes += chunk.len() as u64;
        }
        writer.flush().context("Failed to flush downloaded file")?;

        debug!(
            "Downloaded {:.2} MB",
            downloaded_bytes as f64 / (1024.0 * 1024.0)
        );

        Ok(downloaded_bytes)
    }
}
