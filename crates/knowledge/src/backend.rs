//! Vector backend abstraction and the in-memory implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use consilium_common::{ConsiliumError, KnowledgeRecord, Result, ScoredRecord};
use parking_lot::RwLock;

/// Storage engine behind the knowledge store.
///
/// Every operation is scoped to one tenant. Implementations must never
/// return a record stored under a different tenant.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Insert or replace the record with `record.id`.
    async fn upsert(&self, tenant_id: &str, record: KnowledgeRecord) -> Result<()>;

    /// Nearest neighbours by cosine similarity, best first.
    async fn query(&self, tenant_id: &str, vector: &[f32], top_k: usize)
        -> Result<Vec<ScoredRecord>>;

    /// Delete every record for the tenant, returning how many were removed.
    async fn delete_by_tenant(&self, tenant_id: &str) -> Result<usize>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Process-local backend. Each tenant has its own partition, so a query
/// can only ever see its own tenant's records.
#[derive(Default)]
pub struct InMemoryBackend {
    partitions: RwLock<HashMap<String, Vec<KnowledgeRecord>>>,
    unreachable: AtomicBool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails until switched back.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn len(&self, tenant_id: &str) -> usize {
        self.partitions
            .read()
            .get(tenant_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ConsiliumError::VectorStore(
                "in-memory backend marked unreachable".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, tenant_id: &str, record: KnowledgeRecord) -> Result<()> {
        self.check_reachable()?;
        let mut partitions = self.partitions.write();
        let partition = partitions.entry(tenant_id.to_string()).or_default();
        match partition.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => partition.push(record),
        }
        Ok(())
    }

    async fn query(
        &self,
        tenant_id: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        self.check_reachable()?;
        let partitions = self.partitions.read();
        let Some(partition) = partitions.get(tenant_id) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<ScoredRecord> = partition
            .iter()
            .map(|record| ScoredRecord {
                score: cosine_similarity(vector, &record.vector),
                record: record.clone(),
            })
            .collect();

        // Stable: equal scores keep insertion order
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete_by_tenant(&self, tenant_id: &str) -> Result<usize> {
        self.check_reachable()?;
        Ok(self
            .partitions
            .write()
            .remove(tenant_id)
            .map(|records| records.len())
            .unwrap_or(0))
    }
}
