//! Retry policy for package downloads.

use reqwest::StatusCode;
use thiserror::Error;

/// Attempts per download, counting the first.
pub const MAX_RETRIES: usize = 3;

pub const RETRY_DELAY_MS: u64 = 1000;

/// Responses no amount of retrying will fix.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NonRetryableError {
    #[error("no such package version on the server (HTTP 404)")]
    NotFound,

    /// Private packages answer 401/403 on the public prefix.
    #[error("access denied (HTTP {0}); the package may only be reachable through cipd")]
    Forbidden(u16),

    #[error("rate limited by the server (HTTP 429), try again later")]
    TooManyRequests,

    #[error("request rejected (HTTP {0})")]
    ClientError(u16),
}

/// `Err` for 4xx statuses; 5xx, timeouts and connection failures are retried.
pub fn classify_error(error: &reqwest::Error) -> Result<(), NonRetryableError> {
    match error.status() {
        Some(status) => classify_status(status),
        None => Ok(()),
    }
}

fn classify_status(status: StatusCode) -> Result<(), NonRetryableError> {
    match status {
        StatusCode::NOT_FOUND => Err(NonRetryableError::NotFound),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(NonRetryableError::Forbidden(status.as_u16()))
        }
        StatusCode::TOO_MANY_REQUESTS => Err(NonRetryableError::TooManyRequests),
        s if s.is_client_error() => Err(NonRetryableError::ClientError(s.as_u16())),
        _ => Ok(()),
    }
}

/// Wraps an `error_for_status()` failure so the retry loop can tell the
/// two kinds apart with `downcast_ref::<NonRetryableError>()`.
pub fn check_retryable(error: reqwest::Error) -> anyhow::Error {
    match classify_error(&error) {
        Ok(()) => error.into(),
        Err(non_retryable) => non_retryable.into(),
    }
}
