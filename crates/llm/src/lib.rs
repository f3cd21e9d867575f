pub mod anthropic;
pub mod client;
pub mod config;
pub mod http;
#[cfg(feature = "local-embeddings")]
pub mod local;
pub mod openai;
pub mod retry;

pub use anthropic::AnthropicClient;
pub use client::{ChatMessage, Embedder, LlmClient, LlmRequest, LlmResponse, Role, TokenUsage};
pub use config::{
    EmbeddingConfig, LlmConfig, SemaphoredClient, build_embedder, build_llm_client,
};
#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;
pub use openai::{OpenAiClient, OpenAiEmbedder};
pub use retry::{RetryConfig, RetryingClient};
