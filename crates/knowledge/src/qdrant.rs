//! Qdrant backend over `qdrant-client`.
//!
//! One collection holds every tenant. Each point carries a `tenant_id`
//! payload field and every search, count and delete is filtered on it.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use consilium_common::{
    ConsiliumError, KnowledgeKind, KnowledgePayload, KnowledgeRecord, Result, ScoredRecord,
};
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldType, Filter, PointStruct, ScoredPoint,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::backend::VectorBackend;

const TENANT_FIELD: &str = "tenant_id";

/// Point payload. The vector lives beside it, not inside it.
#[derive(Debug, Serialize, Deserialize)]
struct PointPayload {
    record_id: String,
    tenant_id: String,
    kind: KnowledgeKind,
    payload: KnowledgePayload,
    #[serde(default)]
    metadata: HashMap<String, Value>,
    created_at: DateTime<Utc>,
}

impl PointPayload {
    fn from_record(record: &KnowledgeRecord) -> Self {
        Self {
            record_id: record.id.clone(),
            tenant_id: record.tenant_id.clone(),
            kind: record.kind,
            payload: record.payload.clone(),
            metadata: record.metadata.clone(),
            created_at: record.created_at,
        }
    }

    fn into_record(self, vector: Vec<f32>) -> KnowledgeRecord {
        KnowledgeRecord {
            id: self.record_id,
            tenant_id: self.tenant_id,
            kind: self.kind,
            payload: self.payload,
            vector,
            metadata: self.metadata,
            created_at: self.created_at,
        }
    }
}

fn store_error(context: &str, e: impl std::fmt::Display) -> ConsiliumError {
    ConsiliumError::VectorStore(format!("{context}: {e}"))
}

fn tenant_filter(tenant_id: &str) -> Filter {
    Filter::must([Condition::matches(TENANT_FIELD, tenant_id.to_string())])
}

fn encode_payload(record: &KnowledgeRecord) -> Result<Payload> {
    let json = serde_json::to_value(PointPayload::from_record(record))?;
    Payload::try_from(json).map_err(|e| store_error("Invalid point payload", e))
}

fn decode_payload(fields: HashMap<String, QdrantValue>) -> Option<PointPayload> {
    let json: serde_json::Map<String, Value> = fields
        .into_iter()
        .map(|(key, value)| (key, value.into_json()))
        .collect();
    match serde_json::from_value(Value::Object(json)) {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!(error = %e, "Skipping Qdrant point with an unreadable payload");
            None
        }
    }
}

fn scored_record(point: ScoredPoint) -> Option<ScoredRecord> {
    let payload = decode_payload(point.payload)?;
    Some(ScoredRecord {
        record: payload.into_record(Vec::new()),
        score: point.score,
    })
}

pub struct QdrantBackend {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantBackend {
    /// Build a client for `url`. No connection is made until the first call.
    pub fn new(
        url: &str,
        collection: impl Into<String>,
        dimension: usize,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .api_key(api_key)
            .timeout(timeout)
            .build()
            .map_err(|e| store_error("Failed to create Qdrant client", e))?;
        Ok(Self {
            client,
            collection: collection.into(),
            dimension,
        })
    }

    /// Create the collection (cosine distance) and the tenant payload index
    /// if the collection does not exist yet.
    #[instrument(skip(self), fields(collection = %self.collection))]
    pub async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| store_error("Qdrant unreachable", e))?;
        if exists {
            debug!("Collection already exists");
            return Ok(());
        }

        info!(dimension = self.dimension, "Creating collection");
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(
                    VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                ),
            )
            .await
            .map_err(|e| store_error("Failed to create collection", e))?;

        self.client
            .create_field_index(
                CreateFieldIndexCollectionBuilder::new(
                    &self.collection,
                    TENANT_FIELD,
                    FieldType::Keyword,
                )
                .wait(true),
            )
            .await
            .map_err(|e| store_error("Failed to index tenant field", e))?;

        info!("Collection created");
        Ok(())
    }
}

#[async_trait]
impl VectorBackend for QdrantBackend {
    fn name(&self) -> &str {
        "qdrant"
    }

    async fn upsert(&self, tenant_id: &str, record: KnowledgeRecord) -> Result<()> {
        if record.tenant_id != tenant_id {
            return Err(ConsiliumError::VectorStore(
                "record tenant does not match upsert tenant".into(),
            ));
        }
        if record.vector.len() != self.dimension {
            return Err(ConsiliumError::VectorStore(format!(
                "vector has {} dimensions, collection expects {}",
                record.vector.len(),
                self.dimension
            )));
        }

        let point = PointStruct::new(
            record.id.clone(),
            record.vector.clone(),
            encode_payload(&record)?,
        );
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await
            .map_err(|e| store_error("Qdrant upsert failed", e))?;
        Ok(())
    }

    async fn query(
        &self,
        tenant_id: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector.to_vec(), top_k as u64)
                    .filter(tenant_filter(tenant_id))
                    .with_payload(true),
            )
            .await
            .map_err(|e| store_error("Qdrant search failed", e))?;

        Ok(response.result.into_iter().filter_map(scored_record).collect())
    }

    async fn delete_by_tenant(&self, tenant_id: &str) -> Result<usize> {
        let count = self
            .client
            .count(
                CountPointsBuilder::new(&self.collection)
                    .filter(tenant_filter(tenant_id))
                    .exact(true),
            )
            .await
            .map_err(|e| store_error("Qdrant count failed", e))?
            .result
            .map(|r| r.count)
            .unwrap_or(0);

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(tenant_filter(tenant_id))
                    .wait(true),
            )
            .await
            .map_err(|e| store_error("Qdrant delete failed", e))?;

        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact_record() -> KnowledgeRecord {
        let payload = KnowledgePayload::DomainFact {
            fact: "Pools are sized per node".into(),
            source: Some("runbook".into()),
        };
        KnowledgeRecord {
            id: "6f1c1d38-0b7e-4d8e-9a59-7a3f0d3a8c11".into(),
            tenant_id: "acme".into(),
            kind: payload.kind(),
            payload,
            vector: vec![0.5, 0.5],
            metadata: HashMap::from([("status".to_string(), Value::from("completed"))]),
            created_at: Utc::now(),
        }
    }

    fn backend(dimension: usize) -> QdrantBackend {
        QdrantBackend::new(
            "http://localhost:6334",
            "knowledge",
            dimension,
            None,
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn tenant_filter_has_one_required_condition() {
        let filter = tenant_filter("acme");
        assert_eq!(filter.must.len(), 1);
        assert!(filter.should.is_empty());
        assert!(filter.must_not.is_empty());
    }

    #[test]
    fn scored_point_decodes_into_record() {
        let record = fact_record();
        let fields: HashMap<String, QdrantValue> = encode_payload(&record).unwrap().into();
        let point = ScoredPoint {
            payload: fields,
            score: 0.91,
            ..Default::default()
        };

        let hit = scored_record(point).unwrap();
        assert_eq!(hit.record.id, record.id);
        assert_eq!(hit.record.tenant_id, "acme");
        assert_eq!(hit.record.kind, KnowledgeKind::DomainFact);
        assert_eq!(hit.record.metadata["status"], "completed");
        assert!((hit.score - 0.91).abs() < 1e-6);
    }

    #[test]
    fn point_without_payload_is_skipped() {
        let point = ScoredPoint {
            score: 0.4,
            ..Default::default()
        };
        assert!(scored_record(point).is_none());
    }

    #[tokio::test]
    async fn upsert_rejects_dimension_mismatch() {
        let err = backend(384).upsert("acme", fact_record()).await.unwrap_err();
        assert!(matches!(err, ConsiliumError::VectorStore(_)));
    }

    #[tokio::test]
    async fn upsert_rejects_foreign_tenant() {
        let err = backend(2).upsert("other", fact_record()).await.unwrap_err();
        assert!(matches!(err, ConsiliumError::VectorStore(_)));
    }

    #[tokio::test]
    #[ignore = "Requires a running Qdrant at localhost:6334"]
    async fn round_trip_against_live_qdrant() {
        let backend = QdrantBackend::new(
            "http://localhost:6334",
            "consilium_test",
            2,
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        backend.ensure_collection().await.unwrap();
        backend.upsert("acme", fact_record()).await.unwrap();
        let hits = backend.query("acme", &[0.5, 0.5], 5).await.unwrap();
        assert!(!hits.is_empty());
        assert!(backend.query("other", &[0.5, 0.5], 5).await.unwrap().is_empty());
        assert!(backend.delete_by_tenant("acme").await.unwrap() >= 1);
    }
}
