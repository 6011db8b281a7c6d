//! Timeout + exponential backoff around outbound HTTP calls
//!
//! Every attempt is bounded by `timeout`. Rate-limit responses (429) and
//! transport failures are retried up to `retries` times; any other status is
//! handed back untouched for the caller to interpret. Cancellation through the
//! caller's token is never retried.

use reqwest::{header::RETRY_AFTER, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request aborted by caller")]
    Aborted,

    #[error("Invalid request: {0}")]
    Request(String),
}

/// Retry policy for [`fetch_with_retry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOptions {
    /// Retries after the first attempt
    pub retries: u32,
    /// Base delay, doubled on each attempt
    pub retry_delay: Duration,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Retry on 429 instead of returning the response
    pub rate_limited_retry: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_delay: Duration::from_millis(1000),
            timeout: Duration::from_millis(8000),
            rate_limited_retry: true,
        }
    }
}

impl RetryOptions {
    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Send `request`, retrying per `options`
///
/// The request must be cloneable (no streaming body). The final 429, when
/// the budget is spent, is returned as a response rather than an error.
pub async fn fetch_with_retry(
    request: RequestBuilder,
    options: RetryOptions,
    cancel: Option<&CancellationToken>,
) -> Result<Response, FetchError> {
    let mut attempt: u32 = 0;

    loop {
        let attempt_request = request
            .try_clone()
            .ok_or_else(|| FetchError::Request("request body cannot be cloned".to_string()))?;

        match send_once(attempt_request, options.timeout, cancel).await {
            Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                if !options.rate_limited_retry || attempt >= options.retries {
                    return Ok(response);
                }
                let delay = retry_after(&response).unwrap_or_else(|| options.backoff(attempt));
                tracing::warn!(
                    url = %response.url(),
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited upstream, backing off"
                );
                sleep_or_abort(delay, cancel).await?;
            }
            Ok(response) => return Ok(response),
            Err(FetchError::Aborted) => return Err(FetchError::Aborted),
            Err(err) => {
                if attempt >= options.retries {
                    tracing::warn!(error = %err, attempts = attempt + 1, "Giving up on request");
                    return Err(err);
                }
                let delay = options.backoff(attempt);
                tracing::debug!(
                    error = %err,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Request failed, retrying"
                );
                sleep_or_abort(delay, cancel).await?;
            }
        }

        attempt += 1;
    }
}

async fn send_once(
    request: RequestBuilder,
    timeout: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<Response, FetchError> {
    let send = async {
        match tokio::time::timeout(timeout, request.send()).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) if e.is_timeout() => Err(FetchError::Timeout(timeout)),
            Ok(Err(e)) if e.is_builder() => Err(FetchError::Request(e.to_string())),
            Ok(Err(e)) => Err(FetchError::Network(e.to_string())),
            Err(_) => Err(FetchError::Timeout(timeout)),
        }
    };

    match cancel {
        Some(token) => tokio::select! {
            _ = token.cancelled() => Err(FetchError::Aborted),
            result = send => result,
        },
        None => send.await,
    }
}

async fn sleep_or_abort(delay: Duration, cancel: Option<&CancellationToken>) -> Result<(), FetchError> {
    match cancel {
        Some(token) => tokio::select! {
            _ = token.cancelled() => Err(FetchError::Aborted),
            _ = tokio::time::sleep(delay) => Ok(()),
        },
        None => {
            tokio::time::sleep(delay).await;
            Ok(())
        }
    }
}

/// `Retry-After` in whole seconds (HTTP-date form is ignored)
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let options = RetryOptions {
            retry_delay: Duration::from_millis(100),
            ..RetryOptions::default()
        };
        assert_eq!(options.backoff(0), Duration::from_millis(100));
        assert_eq!(options.backoff(1), Duration::from_millis(200));
        assert_eq!(options.backoff(3), Duration::from_millis(800));
    }

    #[test]
    fn test_defaults() {
        let options = RetryOptions::default();
        assert_eq!(options.retries, 3);
        assert_eq!(options.timeout, Duration::from_secs(8));
        assert!(options.rate_limited_retry);
    }
}
