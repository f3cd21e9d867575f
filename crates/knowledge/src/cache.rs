//! In-memory LRU cache of text embeddings.
//!
//! Keys are blake3 hashes of the normalized text plus the embedding model id,
//! so two models never share a vector. Entries are not tenant-scoped and
//! live only as long as the process.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use consilium_common::{ConsiliumError, Metrics, Result};
use consilium_llm::Embedder;
use parking_lot::Mutex;
use tracing::debug;

/// Trim, collapse whitespace runs, lowercase.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Deterministic cache key for `(normalized text, model)`.
pub fn cache_key(text: &str, model: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(normalize(text).as_bytes());
    hasher.update(&[0]);
    hasher.update(model.as_bytes());
    hasher.finalize().to_hex().to_string()
}

struct Slot {
    vector: Vec<f32>,
    tick: u64,
}

#[derive(Default)]
struct Lru {
    slots: HashMap<String, Slot>,
    /// tick -> key, oldest first
    order: BTreeMap<u64, String>,
    tick: u64,
}

impl Lru {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn touch(&mut self, key: &str) -> Option<Vec<f32>> {
        let tick = self.next_tick();
        let slot = self.slots.get_mut(key)?;
        self.order.remove(&slot.tick);
        slot.tick = tick;
        self.order.insert(tick, key.to_string());
        Some(slot.vector.clone())
    }

    fn insert(&mut self, key: String, vector: Vec<f32>, capacity: usize) {
        let tick = self.next_tick();
        if let Some(old) = self.slots.insert(key.clone(), Slot { vector, tick }) {
            self.order.remove(&old.tick);
        }
        self.order.insert(tick, key);

        while self.slots.len() > capacity {
            match self.order.pop_first() {
                Some((_, evicted)) => {
                    self.slots.remove(&evicted);
                    debug!(key = %evicted, "Evicted embedding from cache");
                }
                None => break,
            }
        }
    }
}

/// Capacity-bounded embedding cache with strict least-recently-used eviction.
///
/// One mutex guards both lookups (which reorder) and inserts (which evict).
pub struct EmbeddingCache {
    capacity: usize,
    lru: Mutex<Lru>,
    metrics: Arc<Metrics>,
}

impl EmbeddingCache {
    pub fn new(capacity: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            capacity: capacity.max(1),
            lru: Mutex::new(Lru::default()),
            metrics,
        }
    }

    pub fn get(&self, text: &str, model: &str) -> Option<Vec<f32>> {
        let key = cache_key(text, model);
        let found = self.lru.lock().touch(&key);
        match found {
            Some(_) => self.metrics.record_cache_hit(),
            None => self.metrics.record_cache_miss(),
        }
        found
    }

    pub fn put(&self, text: &str, model: &str, vector: Vec<f32>) {
        let key = cache_key(text, model);
        self.lru.lock().insert(key, vector, self.capacity);
    }

    pub fn len(&self) -> usize {
        self.lru.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        let mut lru = self.lru.lock();
        lru.slots.clear();
        lru.order.clear();
    }

    /// Vectors for `texts`, calling `embedder` once for all cache misses.
    ///
    /// Texts that normalize to the same string are embedded once.
    pub async fn get_or_embed(
        &self,
        texts: &[String],
        embedder: &dyn Embedder,
    ) -> Result<Vec<Vec<f32>>> {
        let model = embedder.model_name().to_string();
        let mut resolved: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut misses: Vec<String> = Vec::new();
        let mut miss_index: HashMap<String, usize> = HashMap::new();
        let mut pending: Vec<(usize, usize)> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            match self.get(text, &model) {
                Some(vector) => resolved.push(Some(vector)),
                None => {
                    resolved.push(None);
                    let normalized = normalize(text);
                    let slot = *miss_index.entry(normalized).or_insert_with(|| {
                        misses.push(text.clone());
                        misses.len() - 1
                    });
                    pending.push((i, slot));
                }
            }
        }

        if !misses.is_empty() {
            self.metrics.record_embedding_call();
            let vectors = embedder.embed(&misses).await?;
            if vectors.len() != misses.len() {
                return Err(ConsiliumError::Backend {
                    status: None,
                    message: format!(
                        "Embedder returned {} vectors for {} texts",
                        vectors.len(),
                        misses.len()
                    ),
                });
            }

            for (text, vector) in misses.iter().zip(&vectors) {
                self.put(text, &model, vector.clone());
            }
            for (i, slot) in pending {
                resolved[i] = Some(vectors[slot].clone());
            }
        }

        Ok(resolved.into_iter().flatten().collect())
    }
}
