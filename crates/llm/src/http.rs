//! Shared HTTP plumbing: client construction and error classification.

use consilium_common::ConsiliumError;
use std::time::Duration;

/// Build a `reqwest::Client` with a request timeout.
pub fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Classify a transport-level failure.
pub fn send_error(provider: &str, err: reqwest::Error) -> ConsiliumError {
    if err.is_timeout() {
        ConsiliumError::Timeout(format!("{provider} request timed out: {err}"))
    } else {
        ConsiliumError::Backend {
            status: None,
            message: format!("{provider} request failed: {err}"),
        }
    }
}

/// Turn a non-success response into a typed error, honoring `Retry-After`.
pub async fn status_error(provider: &str, response: reqwest::Response) -> ConsiliumError {
    let status = response.status().as_u16();
    let retry_after_ms = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = response.text().await.unwrap_or_default();
    ConsiliumError::from_status(status, format!("{provider} API error: {body}"), retry_after_ms)
}

/// Parse a `Retry-After` value given in seconds.
pub fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok().map(|secs| secs * 1000)
}
