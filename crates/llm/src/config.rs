use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use consilium_common::{ConsiliumError, Result};
use serde::{Deserialize, Serialize};

use crate::anthropic::AnthropicClient;
use crate::client::{Embedder, LlmClient, LlmRequest, LlmResponse};
use crate::openai::{OpenAiClient, OpenAiEmbedder};
use crate::retry::{RetryConfig, RetryingClient};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "llama3".to_string(),
            api_key: None,
            api_url: None,
            temperature: None,
            max_tokens: None,
            max_concurrent_requests: default_max_concurrent(),
            timeout_ms: default_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }
}

impl LlmConfig {
    /// The configured key, or the provider's environment variable.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| api_key_from_env(&self.provider))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// `openai` (any compatible server) or `local` (fastembed).
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "nomic-embed-text".to_string(),
            api_key: None,
            api_url: None,
            max_concurrent_requests: default_max_concurrent(),
            timeout_ms: default_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }
}

impl EmbeddingConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| api_key_from_env(&self.provider))
    }
}

fn default_max_concurrent() -> usize {
    4
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn api_key_from_env(provider: &str) -> Option<String> {
    let var = match provider {
        "openai" => "OPENAI_API_KEY",
        "anthropic" => "ANTHROPIC_API_KEY",
        _ => return None,
    };
    std::env::var(var).ok().filter(|k| !k.is_empty())
}

/// Caps the number of in-flight calls to the wrapped client.
pub struct SemaphoredClient<T> {
    inner: T,
    semaphore: Arc<tokio::sync::Semaphore>,
}

impl<T> SemaphoredClient<T> {
    pub fn new(inner: T, max_concurrent: usize) -> Self {
        Self {
            inner,
            semaphore: Arc::new(tokio::sync::Semaphore::new(max_concurrent.max(1))),
        }
    }

    async fn permit(&self) -> Result<tokio::sync::SemaphorePermit<'_>> {
        self.semaphore
            .acquire()
            .await
            .map_err(|e| ConsiliumError::Backend {
                status: None,
                message: format!("Semaphore acquire failed: {e}"),
            })
    }
}

#[async_trait]
impl<T: LlmClient> LlmClient for SemaphoredClient<T> {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let _permit = self.permit().await?;
        self.inner.complete(request).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[async_trait]
impl<T: Embedder> Embedder for SemaphoredClient<T> {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let _permit = self.permit().await?;
        self.inner.embed(texts).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

pub fn build_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let timeout = Duration::from_millis(config.timeout_ms);
    let base_client: Box<dyn LlmClient> = match config.provider.as_str() {
        "openai" => Box::new(OpenAiClient::with_timeout(
            config.api_url.clone(),
            config.model.clone(),
            config.resolved_api_key(),
            timeout,
        )),
        "anthropic" => {
            let api_key = config.resolved_api_key().ok_or_else(|| {
                ConsiliumError::Config("Anthropic requires an API key".to_string())
            })?;
            Box::new(AnthropicClient::with_options(
                config.api_url.clone(),
                config.model.clone(),
                api_key,
                timeout,
            ))
        }
        other => {
            return Err(ConsiliumError::Config(format!(
                "Unknown LLM provider: {other}"
            )));
        }
    };

    let retrying = RetryingClient::new(base_client, config.retry.clone());
    let semaphored = SemaphoredClient::new(retrying, config.max_concurrent_requests);

    Ok(Arc::new(semaphored))
}

pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let base: Box<dyn Embedder> = match config.provider.as_str() {
        "openai" => Box::new(OpenAiEmbedder::with_timeout(
            config.api_url.clone(),
            config.model.clone(),
            config.resolved_api_key(),
            Duration::from_millis(config.timeout_ms),
        )),
        #[cfg(feature = "local-embeddings")]
        "local" => Box::new(crate::local::LocalEmbedder::from_model_str(&config.model)?),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => {
            return Err(ConsiliumError::Config(
                "Local embeddings require the `local-embeddings` feature".to_string(),
            ));
        }
        other => {
            return Err(ConsiliumError::Config(format!(
                "Unknown embedding provider: {other}"
            )));
        }
    };

    let retrying = RetryingClient::new(base, config.retry.clone());
    let semaphored = SemaphoredClient::new(retrying, config.max_concurrent_requests);

    Ok(Arc::new(semaphored))
}
