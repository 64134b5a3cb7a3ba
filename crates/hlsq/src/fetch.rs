use std::time::Duration;

use reqwest::Response;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    error::{HlsqError, HlsqResult},
    util::http::HttpClient,
};

/// Attempt budget and timing of [`get_with_retry`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of requests, including the first one.
    pub attempts: u32,
    /// Timeout of a single request.
    pub timeout: Duration,
    /// Backoff before attempt `i` is `backoff_unit * floor(2^(i-1))`.
    pub backoff_unit: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_backoff_unit(mut self, backoff_unit: Duration) -> Self {
        self.backoff_unit = backoff_unit;
        self
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(0) >> 1;
        self.backoff_unit.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            timeout: Duration::from_secs(30),
            backoff_unit: Duration::from_secs(1),
        }
    }
}

/// Sends `GET url` until a response with a status below 400 arrives or the
/// attempt budget runs out.
///
/// Once the budget is exhausted the last outcome is returned as is, so the
/// caller may still receive a response carrying an error status. The token is
/// checked before every attempt and aborts both the backoff sleep and a request
/// in flight.
pub async fn get_with_retry(
    client: &HttpClient,
    url: &Url,
    policy: &RetryPolicy,
    token: &CancellationToken,
) -> HlsqResult<Response> {
    let mut last: Option<Result<Response, reqwest::Error>> = None;

    for attempt in 0..policy.attempts.max(1) {
        if token.is_cancelled() {
            return Err(HlsqError::Cancelled);
        }

        // release the body of a rejected response before trying again
        drop(last.take());

        let delay = policy.delay_for_attempt(attempt);
        if !delay.is_zero() {
            tokio::select! {
                _ = token.cancelled() => return Err(HlsqError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let request = client.get(url.clone()).timeout(policy.timeout).send();
        let outcome = tokio::select! {
            _ = token.cancelled() => return Err(HlsqError::Cancelled),
            outcome = request => outcome,
        };
        match outcome {
            Ok(response) if response.status().as_u16() <= 399 => return Ok(response),
            Ok(response) => {
                log::warn!(
                    "GET {url} responded with {} (attempt {}/{})",
                    response.status(),
                    attempt + 1,
                    policy.attempts
                );
                last = Some(Ok(response));
            }
            Err(e) => {
                log::warn!(
                    "GET {url} failed (attempt {}/{}): {e}",
                    attempt + 1,
                    policy.attempts
                );
                last = Some(Err(e));
            }
        }
    }

    match last {
        Some(Ok(response)) => Ok(response),
        Some(Err(e)) => Err(e.into()),
        None => Err(HlsqError::Cancelled),
    }
}

/// Fetches `url` with [`get_with_retry`] and reads the whole body, turning a
/// final error status into [`HlsqError::HttpError`].
pub async fn get_bytes_with_retry(
    client: &HttpClient,
    url: &Url,
    policy: &RetryPolicy,
    token: &CancellationToken,
) -> HlsqResult<bytes::Bytes> {
    let response = get_with_retry(client, url, policy, token).await?;
    let status = response.status();
    if status.as_u16() > 399 {
        return Err(HlsqError::HttpError(status));
    }
    tokio::select! {
        _ = token.cancelled() => Err(HlsqError::Cancelled),
        body = response.bytes() => Ok(body?),
    }
}
