//! Process-wide counters shared by every component.
//!
//! A single [`Metrics`] is created at startup and handed to each component
//! as an `Arc<Metrics>`. Counters are plain atomics; the latency ring is the
//! only piece behind a lock.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Number of retrieval latency samples kept.
pub const LATENCY_WINDOW: usize = 100;

#[derive(Debug, Default)]
pub struct Metrics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    embedding_calls: AtomicU64,
    retrievals: AtomicU64,
    retrieval_failures: AtomicU64,
    isolation_violations: AtomicU64,
    dispatch_successes: AtomicU64,
    dispatch_failures: AtomicU64,
    dispatch_timeouts: AtomicU64,
    synthesis_fallbacks: AtomicU64,
    persistence_failures: AtomicU64,
    requests_total: AtomicU64,
    requests_failed: AtomicU64,
    retrieval_latency_ms: Mutex<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_embedding_call(&self) {
        self.embedding_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed retrieval and its latency.
    pub fn record_retrieval(&self, latency: Duration) {
        self.retrievals.fetch_add(1, Ordering::Relaxed);
        let mut ring = self.retrieval_latency_ms.lock();
        if ring.len() == LATENCY_WINDOW {
            ring.pop_front();
        }
        ring.push_back(latency.as_millis() as u64);
    }

    pub fn record_retrieval_failure(&self) {
        self.retrieval_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_isolation_violation(&self) {
        self.isolation_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch_success(&self) {
        self.dispatch_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch_failure(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch_timeout(&self) {
        self.dispatch_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_synthesis_fallback(&self) {
        self.synthesis_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request(&self, failed: bool) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn embedding_calls(&self) -> u64 {
        self.embedding_calls.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let lookups = cache_hits + cache_misses;

        let (latency_avg_ms, latency_max_ms, latency_samples) = {
            let ring = self.retrieval_latency_ms.lock();
            let max = ring.iter().copied().max().unwrap_or(0);
            let avg = if ring.is_empty() {
                0.0
            } else {
                ring.iter().sum::<u64>() as f64 / ring.len() as f64
            };
            (avg, max, ring.len())
        };

        MetricsSnapshot {
            cache_hits,
            cache_misses,
            cache_hit_ratio: if lookups == 0 {
                0.0
            } else {
                cache_hits as f64 / lookups as f64
            },
            embedding_calls: self.embedding_calls.load(Ordering::Relaxed),
            retrievals: self.retrievals.load(Ordering::Relaxed),
            retrieval_failures: self.retrieval_failures.load(Ordering::Relaxed),
            retrieval_latency_avg_ms: latency_avg_ms,
            retrieval_latency_max_ms: latency_max_ms,
            retrieval_latency_samples: latency_samples,
            isolation_violations: self.isolation_violations.load(Ordering::Relaxed),
            dispatch_successes: self.dispatch_successes.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            dispatch_timeouts: self.dispatch_timeouts.load(Ordering::Relaxed),
            synthesis_fallbacks: self.synthesis_fallbacks.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
        }
    }

    /// Administrative reset. Not used on any request path.
    pub fn reset(&self) {
        for counter in [
            &self.cache_hits,
            &self.cache_misses,
            &self.embedding_calls,
            &self.retrievals,
            &self.retrieval_failures,
            &self.isolation_violations,
            &self.dispatch_successes,
            &self.dispatch_failures,
            &self.dispatch_timeouts,
            &self.synthesis_fallbacks,
            &self.persistence_failures,
            &self.requests_total,
            &self.requests_failed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.retrieval_latency_ms.lock().clear();
    }

    pub fn health(&self) -> HealthReport {
        let snapshot = self.snapshot();
        let mut reasons = Vec::new();

        let dispatched =
            snapshot.dispatch_successes + snapshot.dispatch_failures + snapshot.dispatch_timeouts;
        let unsuccessful = snapshot.dispatch_failures + snapshot.dispatch_timeouts;
        if dispatched > 0 && unsuccessful * 2 > dispatched {
            reasons.push(format!(
                "{unsuccessful} of {dispatched} responder calls failed or timed out"
            ));
        }

        if snapshot.retrieval_failures > 0 && snapshot.retrieval_failures > snapshot.retrievals {
            reasons.push(format!(
                "{} retrieval failures against {} successful retrievals",
                snapshot.retrieval_failures, snapshot.retrievals
            ));
        }

        HealthReport {
            status: if reasons.is_empty() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            reasons,
            metrics: snapshot,
        }
    }
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_ratio: f64,
    pub embedding_calls: u64,
    pub retrievals: u64,
    pub retrieval_failures: u64,
    pub retrieval_latency_avg_ms: f64,
    pub retrieval_latency_max_ms: u64,
    pub retrieval_latency_samples: usize,
    pub isolation_violations: u64,
    pub dispatch_successes: u64,
    pub dispatch_failures: u64,
    pub dispatch_timeouts: u64,
    pub synthesis_fallbacks: u64,
    pub persistence_failures: u64,
    pub requests_total: u64,
    pub requests_failed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub reasons: Vec<String>,
    pub metrics: MetricsSnapshot,
}
