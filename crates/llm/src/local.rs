//! In-process embeddings through fastembed.
//!
//! The ONNX model is loaded lazily on the first call and shared after that.

use std::sync::Arc;

use async_trait::async_trait;
use consilium_common::{ConsiliumError, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use once_cell::sync::OnceCell;
use tokio::task;
use tracing::{debug, info, instrument};

use crate::client::Embedder;

pub struct LocalEmbedder {
    model: EmbeddingModel,
    model_id: String,
    engine: OnceCell<Arc<TextEmbedding>>,
}

impl LocalEmbedder {
    pub fn new(model: EmbeddingModel, model_id: impl Into<String>) -> Self {
        Self {
            model,
            model_id: model_id.into(),
            engine: OnceCell::new(),
        }
    }

    /// Accepts the usual hub names (`all-MiniLM-L6-v2`, `bge-small-en-v1.5`, ...).
    pub fn from_model_str(name: &str) -> Result<Self> {
        let model = match name {
            "all-MiniLM-L6-v2" | "AllMiniLML6V2" => EmbeddingModel::AllMiniLML6V2,
            "all-MiniLM-L12-v2" | "AllMiniLML12V2" => EmbeddingModel::AllMiniLML12V2,
            "bge-small-en-v1.5" | "BGESmallENV15" => EmbeddingModel::BGESmallENV15,
            "bge-base-en-v1.5" | "BGEBaseENV15" => EmbeddingModel::BGEBaseENV15,
            "bge-large-en-v1.5" | "BGELargeENV15" => EmbeddingModel::BGELargeENV15,
            "nomic-embed-text-v1.5" | "NomicEmbedTextV15" => EmbeddingModel::NomicEmbedTextV15,
            "multilingual-e5-small" | "MultilingualE5Small" => EmbeddingModel::MultilingualE5Small,
            _ => {
                return Err(ConsiliumError::Config(format!(
                    "Unknown local embedding model: '{name}'"
                )));
            }
        };
        Ok(Self::new(model, name))
    }

    #[instrument(skip(self), fields(model = %self.model_id))]
    fn engine(&self) -> Result<Arc<TextEmbedding>> {
        self.engine
            .get_or_try_init(|| {
                info!("Initializing local embedding model");
                let mut options = InitOptions::new(self.model.clone());
                options.show_download_progress = false;
                let engine = TextEmbedding::try_new(options).map_err(|e| {
                    ConsiliumError::Config(format!("Failed to load embedding model: {e}"))
                })?;
                Ok(Arc::new(engine))
            })
            .cloned()
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let engine = self.engine()?;
        let batch = texts.to_vec();

        // fastembed is synchronous
        let vectors = task::spawn_blocking(move || engine.embed(batch, None))
            .await
            .map_err(|e| ConsiliumError::Backend {
                status: None,
                message: format!("Embedding task failed: {e}"),
            })?
            .map_err(|e| ConsiliumError::Backend {
                status: None,
                message: format!("Failed to generate embeddings: {e}"),
            })?;

        debug!(
            batch_size = vectors.len(),
            dimension = vectors.first().map(|v| v.len()).unwrap_or(0),
            "Generated local embeddings"
        );
        Ok(vectors)
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_models() {
        let embedder = LocalEmbedder::from_model_str("all-MiniLM-L6-v2").unwrap();
        assert_eq!(embedder.model_name(), "all-MiniLM-L6-v2");
        assert!(LocalEmbedder::from_model_str("unknown-model").is_err());
    }

    #[tokio::test]
    #[ignore = "Downloads model from network, slow"]
    async fn embeds_batch_in_order() {
        let embedder = LocalEmbedder::from_model_str("all-MiniLM-L6-v2").unwrap();
        let texts = vec!["Hello".to_string(), "World".to_string()];
        let vectors = embedder.embed(&texts).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), 384);
    }
}
