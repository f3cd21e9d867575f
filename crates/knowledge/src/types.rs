//! Knowledge store configuration.

use serde::{Deserialize, Serialize};

/// Which vector backend to use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VectorBackendConfig {
    /// Process-local store, lost on restart
    Memory,
    /// Qdrant over gRPC (requires the `qdrant` feature)
    Qdrant {
        url: String,
        #[serde(default = "default_collection")]
        collection: String,
        #[serde(default = "default_dimension")]
        dimension: usize,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default = "default_qdrant_timeout_ms")]
        timeout_ms: u64,
    },
}

impl Default for VectorBackendConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// Configuration for the knowledge layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Maximum cached embeddings
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Records returned per retrieval
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum similarity score for retrieval
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,

    #[serde(default)]
    pub backend: VectorBackendConfig,
}

fn default_collection() -> String {
    "consilium_knowledge".into()
}

fn default_dimension() -> usize {
    768 // nomic-embed-text
}

fn default_qdrant_timeout_ms() -> u64 {
    10_000
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_top_k() -> usize {
    5
}

fn default_min_similarity() -> f32 {
    0.5
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            top_k: default_top_k(),
            min_similarity: default_min_similarity(),
            backend: VectorBackendConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = KnowledgeConfig::default();
        assert_eq!(config.cache_capacity, 1000);
        assert_eq!(config.top_k, 5);
        assert!((config.min_similarity - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.backend, VectorBackendConfig::Memory);
    }

    #[test]
    fn qdrant_backend_from_toml() {
        let config: KnowledgeConfig = toml::from_str(
            r#"
cache_capacity = 50

[backend]
kind = "qdrant"
url = "http://localhost:6334"
dimension = 384
"#,
        )
        .unwrap();
        assert_eq!(config.cache_capacity, 50);
        match config.backend {
            VectorBackendConfig::Qdrant {
                url,
                collection,
                dimension,
                api_key,
                ..
            } => {
                assert_eq!(url, "http://localhost:6334");
                assert_eq!(collection, "consilium_knowledge");
                assert_eq!(dimension, 384);
                assert!(api_key.is_none());
            }
            other => panic!("expected qdrant, got {other:?}"),
        }
    }
}
