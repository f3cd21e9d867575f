use async_trait::async_trait;
use consilium_common::{ConsiliumError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::warn;

use crate::client::{Embedder, LlmClient, LlmRequest, LlmResponse};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Wraps an [`LlmClient`] or [`Embedder`] and retries transient failures
/// (rate limits, timeouts, 5xx) with exponential backoff.
pub struct RetryingClient<T> {
    inner: T,
    config: RetryConfig,
}

impl<T> RetryingClient<T> {
    pub fn new(inner: T, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    fn compute_delay(&self, attempt: u32) -> u64 {
        let base = self.config.initial_delay_ms as f64
            * self.config.backoff_multiplier.powi(attempt as i32);
        let jitter = (base * 0.1 * rand_jitter(attempt)) as u64;
        let delay = (base as u64).saturating_add(jitter);
        delay.min(self.config.max_delay_ms)
    }

    fn delay_for(&self, error: &ConsiliumError, attempt: u32) -> u64 {
        match error {
            ConsiliumError::RateLimited {
                retry_after_ms: Some(ms),
                ..
            } => (*ms).min(self.config.max_delay_ms),
            _ => self.compute_delay(attempt),
        }
    }

    async fn run<F, Fut, R>(&self, what: &'static str, mut call: F) -> Result<R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt >= self.config.max_retries || !e.is_transient() {
                        return Err(e);
                    }

                    let delay = self.delay_for(&e, attempt);
                    warn!(
                        call = what,
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay,
                        error = %e,
                        "Retrying backend request"
                    );

                    tokio::time::sleep(tokio::time::Duration::from_millis(delay)).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Deterministic jitter based on attempt number.
fn rand_jitter(attempt: u32) -> f64 {
    let x = attempt.wrapping_mul(2654435761);
    (x % 100) as f64 / 100.0
}

#[async_trait]
impl<T: LlmClient> LlmClient for RetryingClient<T> {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        self.run("complete", || self.inner.complete(request.clone()))
            .await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[async_trait]
impl<T: Embedder> Embedder for RetryingClient<T> {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.run("embed", || self.inner.embed(texts)).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
        }
    }

    /// Fails with the given error until `failures` calls have been made.
    struct FlakyClient {
        calls: AtomicU32,
        failures: u32,
        error: fn() -> ConsiliumError,
    }

    #[async_trait]
    impl LlmClient for FlakyClient {
        async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err((self.error)());
            }
            Ok(LlmResponse {
                content: "ok".to_string(),
                model: "flaky".to_string(),
                usage: None,
                finish_reason: None,
            })
        }
        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    #[async_trait]
    impl Embedder for FlakyClient {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err((self.error)());
            }
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    #[test]
    fn default_retry_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay_ms, 500);
        assert_eq!(config.max_delay_ms, 30_000);
        assert!((config.backoff_multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn compute_delay_respects_max() {
        let client = RetryingClient::new(
            (),
            RetryConfig {
                max_retries: 5,
                initial_delay_ms: 500,
                max_delay_ms: 2000,
                backoff_multiplier: 10.0,
            },
        );
        assert!(client.compute_delay(5) <= 2000);
    }

    #[test]
    fn retry_after_overrides_backoff() {
        let client = RetryingClient::new((), RetryConfig::default());
        let err = ConsiliumError::RateLimited {
            message: "slow down".into(),
            retry_after_ms: Some(5000),
        };
        assert_eq!(client.delay_for(&err, 0), 5000);
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let client = RetryingClient::new(
            FlakyClient {
                calls: AtomicU32::new(0),
                failures: 2,
                error: || ConsiliumError::from_status(503, "unavailable", None),
            },
            fast_config(3),
        );

        let response = client.complete(LlmRequest::default()).await.unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_auth_errors() {
        let client = RetryingClient::new(
            FlakyClient {
                calls: AtomicU32::new(0),
                failures: 10,
                error: || ConsiliumError::Auth("401".into()),
            },
            fast_config(3),
        );

        let err = client.complete(LlmRequest::default()).await.unwrap_err();
        assert!(matches!(err, ConsiliumError::Auth(_)));
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let client = RetryingClient::new(
            FlakyClient {
                calls: AtomicU32::new(0),
                failures: 10,
                error: || ConsiliumError::Timeout("read".into()),
            },
            fast_config(2),
        );

        let texts = vec!["a".to_string()];
        let err = Embedder::embed(&client, &texts).await.unwrap_err();
        assert!(matches!(err, ConsiliumError::Timeout(_)));
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 3);
    }
}
