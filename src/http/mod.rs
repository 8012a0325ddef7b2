//! HTTP client module with retry, resume, and error classification.

mod client;
mod retry;

pub use client::{HttpClient, WriteMode};
pub use retry::{MAX_RETRIES, NonRetryableError, RETRY_DELAY_MS, check_retryable, classify_error};
