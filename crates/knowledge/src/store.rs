//! Tenant-partitioned semantic knowledge store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use consilium_common::validation::validate_tenant_id;
use consilium_common::{
    ConsiliumError, KnowledgePayload, KnowledgeRecord, Metrics, Result, ScoredRecord,
};
use consilium_llm::Embedder;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::backend::VectorBackend;
use crate::cache::EmbeddingCache;

/// Semantic store over a [`VectorBackend`].
///
/// Query and record text is vectorized through the shared [`EmbeddingCache`].
/// Retrieval degrades to an empty list on any failure; writes report errors
/// and leave the decision to the caller.
pub struct KnowledgeStore {
    backend: Arc<dyn VectorBackend>,
    embedder: Arc<dyn Embedder>,
    cache: Arc<EmbeddingCache>,
    metrics: Arc<Metrics>,
}

impl KnowledgeStore {
    pub fn new(
        backend: Arc<dyn VectorBackend>,
        embedder: Arc<dyn Embedder>,
        cache: Arc<EmbeddingCache>,
        metrics: Arc<Metrics>,
    ) -> Self {
        info!(
            backend = backend.name(),
            embedding_model = embedder.model_name(),
            cache_capacity = cache.capacity(),
            "Initializing knowledge store"
        );
        Self {
            backend,
            embedder,
            cache,
            metrics,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        self.cache
            .get_or_embed(&texts, self.embedder.as_ref())
            .await?
            .pop()
            .ok_or_else(|| ConsiliumError::Retrieval("embedder returned no vector".into()))
    }

    /// Records similar to `query_text` within `tenant_id`, best first.
    ///
    /// Never fails: an invalid tenant, an embedder or backend error, or an
    /// empty tenant all yield an empty list.
    #[instrument(skip(self, query_text), fields(query_len = query_text.len()))]
    pub async fn retrieve(
        &self,
        tenant_id: &str,
        query_text: &str,
        top_k: usize,
        min_similarity: f32,
    ) -> Vec<ScoredRecord> {
        if let Err(e) = validate_tenant_id(tenant_id) {
            warn!(error = %e, "Rejected retrieval for invalid tenant");
            return Vec::new();
        }
        if top_k == 0 {
            return Vec::new();
        }

        let started = Instant::now();

        let vector = match self.embed_one(query_text).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Query embedding failed, continuing without knowledge");
                self.metrics.record_retrieval_failure();
                return Vec::new();
            }
        };

        let hits = match self.backend.query(tenant_id, &vector, top_k).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(
                    backend = self.backend.name(),
                    error = %e,
                    "Vector query failed, continuing without knowledge"
                );
                self.metrics.record_retrieval_failure();
                return Vec::new();
            }
        };

        let mut results: Vec<ScoredRecord> = hits
            .into_iter()
            .filter(|hit| {
                if hit.record.tenant_id != tenant_id {
                    warn!(
                        record_id = %hit.record.id,
                        record_tenant = %hit.record.tenant_id,
                        "Backend returned a record from another tenant, dropping it"
                    );
                    self.metrics.record_isolation_violation();
                    return false;
                }
                hit.score >= min_similarity
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);

        let elapsed = started.elapsed();
        self.metrics.record_retrieval(elapsed);
        debug!(
            results = results.len(),
            latency_ms = elapsed.as_millis() as u64,
            "Retrieved knowledge"
        );
        results
    }

    /// Embed the payload's canonical text and store one new record.
    #[instrument(skip(self, payload, metadata), fields(kind = payload.kind().as_str()))]
    pub async fn persist(
        &self,
        tenant_id: &str,
        payload: KnowledgePayload,
        metadata: HashMap<String, Value>,
    ) -> Result<String> {
        validate_tenant_id(tenant_id)?;

        let vector = self
            .embed_one(&payload.canonical_text())
            .await
            .map_err(|e| ConsiliumError::Persistence(format!("embedding failed: {e}")))?;

        let record = KnowledgeRecord {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            kind: payload.kind(),
            payload,
            vector,
            metadata,
            created_at: Utc::now(),
        };
        let id = record.id.clone();

        self.backend
            .upsert(tenant_id, record)
            .await
            .map_err(|e| ConsiliumError::Persistence(format!("backend write failed: {e}")))?;

        debug!(record_id = %id, "Persisted knowledge record");
        Ok(id)
    }

    /// Delete every record belonging to `tenant_id`.
    #[instrument(skip(self))]
    pub async fn erase_tenant(&self, tenant_id: &str) -> Result<usize> {
        validate_tenant_id(tenant_id)?;
        let removed = self.backend.delete_by_tenant(tenant_id).await?;
        info!(removed, "Erased tenant knowledge");
        Ok(removed)
    }
}
