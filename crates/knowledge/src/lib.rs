//! Tenant-partitioned semantic knowledge for Consilium.
//!
//! ```text
//!   query text ──► EmbeddingCache ──miss──► Embedder
//!                       │
//!                       ▼ vector
//!                 KnowledgeStore ──tenant-scoped──► VectorBackend
//!                                                   ├─ InMemoryBackend
//!                                                   └─ QdrantBackend
//! ```
//!
//! - **Solution**: a reusable answer to a past request
//! - **CollaborationTrace**: which responders took part and how they fared
//! - **DomainFact**: standalone facts seeded per tenant

pub mod backend;
pub mod cache;
#[cfg(feature = "qdrant")]
pub mod qdrant;
pub mod store;
pub mod types;

use std::sync::Arc;

use consilium_common::Result;
use tracing::info;

pub use backend::{InMemoryBackend, VectorBackend, cosine_similarity};
pub use cache::EmbeddingCache;
#[cfg(feature = "qdrant")]
pub use qdrant::QdrantBackend;
pub use store::KnowledgeStore;
pub use types::{KnowledgeConfig, VectorBackendConfig};

/// Build the configured backend.
///
/// A Qdrant collection that cannot be bootstrapped is logged and the backend
/// is returned anyway; retrieval degrades until Qdrant becomes reachable.
pub async fn connect_backend(config: &VectorBackendConfig) -> Result<Arc<dyn VectorBackend>> {
    match config {
        VectorBackendConfig::Memory => {
            info!("Using in-memory vector backend");
            Ok(Arc::new(InMemoryBackend::new()))
        }
        #[cfg(feature = "qdrant")]
        VectorBackendConfig::Qdrant {
            url,
            collection,
            dimension,
            api_key,
            timeout_ms,
        } => {
            let backend = QdrantBackend::new(
                url,
                collection.clone(),
                *dimension,
                api_key.clone(),
                std::time::Duration::from_millis(*timeout_ms),
            )?;
            match backend.ensure_collection().await {
                Ok(()) => info!(url = %url, collection = %collection, "Qdrant backend ready"),
                Err(e) => tracing::warn!(
                    url = %url,
                    error = %e,
                    "Qdrant bootstrap failed, retrieval will degrade until it is reachable"
                ),
            }
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "qdrant"))]
        VectorBackendConfig::Qdrant { .. } => Err(consilium_common::ConsiliumError::Config(
            "The Qdrant backend requires the `qdrant` feature".to_string(),
        )),
    }
}
