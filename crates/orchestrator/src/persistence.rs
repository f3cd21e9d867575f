//! Writing interactions back to the knowledge store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use consilium_common::validation::truncate_chars;
use consilium_common::{
    Contribution, Interaction, InteractionStatus, KnowledgePayload, Metrics, ResponderOutcome,
};
use consilium_knowledge::KnowledgeStore;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Longest responder excerpt stored in a trace, in characters.
pub const EXCERPT_LIMIT: usize = 280;

/// When an answer is worth storing as a reusable solution.
#[derive(Debug, Clone, Copy)]
pub struct PersistencePolicy {
    pub solution_min_chars: usize,
    pub persist_solutions: bool,
}

impl PersistencePolicy {
    pub fn wants_solution(&self, status: InteractionStatus, answer: &str) -> bool {
        self.persist_solutions
            && status != InteractionStatus::Failed
            && answer.chars().count() >= self.solution_min_chars
    }
}

/// Ids of the records written for one interaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistReport {
    pub trace_id: Option<String>,
    pub solution_id: Option<String>,
}

pub struct Persister {
    store: Arc<KnowledgeStore>,
    policy: PersistencePolicy,
    timeout: Duration,
    metrics: Arc<Metrics>,
}

impl Persister {
    pub fn new(
        store: Arc<KnowledgeStore>,
        policy: PersistencePolicy,
        timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            policy,
            timeout,
            metrics,
        }
    }

    /// Store the interaction's trace and, when the policy allows, the answer
    /// as a solution. Failures are logged and counted, never returned.
    ///
    /// Writes stop at the persistence timeout or at `deadline`, whichever
    /// comes first.
    pub async fn persist(
        &self,
        interaction: &Interaction,
        answer: &str,
        deadline: Instant,
    ) -> PersistReport {
        let mut report = PersistReport::default();
        let until = deadline.min(Instant::now() + self.timeout);

        let writes = self.write_all(interaction, answer, &mut report);
        if tokio::time::timeout_at(until, writes).await.is_err() {
            warn!(
                interaction_id = %interaction.interaction_id,
                timeout_ms = self.timeout.as_millis() as u64,
                "Persistence cut short by its deadline"
            );
            self.metrics.record_persistence_failure();
        }

        report
    }

    async fn write_all(
        &self,
        interaction: &Interaction,
        answer: &str,
        report: &mut PersistReport,
    ) {
        let tenant_id = &interaction.request.tenant_id;
        let metadata = metadata_for(interaction);

        report.trace_id = self
            .write(interaction, tenant_id, trace_payload(interaction), metadata.clone())
            .await;

        if self.policy.wants_solution(interaction.status, answer) {
            let payload = KnowledgePayload::Solution {
                problem: interaction.request.text.clone(),
                solution: answer.to_string(),
                responders: interaction
                    .successes()
                    .map(|r| r.responder_id.clone())
                    .collect(),
            };
            report.solution_id = self.write(interaction, tenant_id, payload, metadata).await;
        }
    }

    async fn write(
        &self,
        interaction: &Interaction,
        tenant_id: &str,
        payload: KnowledgePayload,
        metadata: HashMap<String, Value>,
    ) -> Option<String> {
        let kind = payload.kind();
        match self.store.persist(tenant_id, payload, metadata).await {
            Ok(id) => {
                debug!(
                    interaction_id = %interaction.interaction_id,
                    kind = kind.as_str(),
                    record_id = %id,
                    "Persisted interaction record"
                );
                Some(id)
            }
            Err(e) => {
                warn!(
                    interaction_id = %interaction.interaction_id,
                    kind = kind.as_str(),
                    error = %e,
                    "Failed to persist interaction record"
                );
                self.metrics.record_persistence_failure();
                None
            }
        }
    }
}

fn metadata_for(interaction: &Interaction) -> HashMap<String, Value> {
    HashMap::from([
        ("interaction_id".to_string(), json!(interaction.interaction_id)),
        ("status".to_string(), json!(interaction.status.as_str())),
        (
            "complexity".to_string(),
            json!(interaction.analysis.complexity.as_str()),
        ),
    ])
}

pub fn trace_payload(interaction: &Interaction) -> KnowledgePayload {
    let contributions = interaction
        .responder_results
        .iter()
        .map(|r| Contribution {
            responder: r.responder_id.clone(),
            outcome: r.outcome.label().to_string(),
            excerpt: match &r.outcome {
                ResponderOutcome::Success(text) => truncate_chars(text, EXCERPT_LIMIT),
                ResponderOutcome::Error(cause) => truncate_chars(cause, EXCERPT_LIMIT),
                ResponderOutcome::Timeout => String::new(),
            },
        })
        .collect();

    KnowledgePayload::CollaborationTrace {
        interaction_id: interaction.interaction_id.clone(),
        request_text: interaction.request.text.clone(),
        responders: interaction.analysis.required_responders.clone(),
        contributions,
        status: interaction.status.as_str().to_string(),
        complexity: interaction.analysis.complexity.as_str().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use consilium_common::{
        Analysis, ConsiliumError, KnowledgeKind, Request, ResponderResult, Result,
    };
    use consilium_knowledge::{EmbeddingCache, InMemoryBackend};
    use consilium_llm::Embedder;
    use std::collections::BTreeSet;

    struct ConstEmbedder {
        fail: bool,
        hang: bool,
    }

    #[async_trait]
    impl Embedder for ConstEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.fail {
                return Err(ConsiliumError::Backend {
                    status: Some(503),
                    message: "down".into(),
                });
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
        fn model_name(&self) -> &str {
            "const"
        }
    }

    struct Fixture {
        backend: Arc<InMemoryBackend>,
        metrics: Arc<Metrics>,
        persister: Persister,
    }

    fn fixture(policy: PersistencePolicy, embed_fails: bool) -> Fixture {
        fixture_with(
            policy,
            ConstEmbedder {
                fail: embed_fails,
                hang: false,
            },
        )
    }

    fn fixture_with(policy: PersistencePolicy, embedder: ConstEmbedder) -> Fixture {
        let metrics = Arc::new(Metrics::new());
        let backend = Arc::new(InMemoryBackend::new());
        let store = Arc::new(KnowledgeStore::new(
            backend.clone(),
            Arc::new(embedder),
            Arc::new(EmbeddingCache::new(16, metrics.clone())),
            metrics.clone(),
        ));
        Fixture {
            backend,
            metrics: metrics.clone(),
            persister: Persister::new(store, policy, Duration::from_secs(1), metrics),
        }
    }

    fn later() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    fn policy() -> PersistencePolicy {
        PersistencePolicy {
            solution_min_chars: 20,
            persist_solutions: true,
        }
    }

    fn interaction(status: InteractionStatus) -> Interaction {
        let analysis = Analysis::fallback("research", BTreeSet::new());
        let mut interaction =
            Interaction::begin(Request::new("How big is the pool?", "t1"), analysis);
        interaction.responder_results = vec![ResponderResult {
            responder_id: "research".into(),
            responder_name: "Research Specialist".into(),
            outcome: if status == InteractionStatus::Failed {
                ResponderOutcome::Timeout
            } else {
                ResponderOutcome::Success("twenty connections".into())
            },
            duration_ms: 3,
        }];
        interaction.status = status;
        interaction
    }

    #[test]
    fn policy_thresholds() {
        let p = policy();
        assert!(p.wants_solution(InteractionStatus::Completed, &"x".repeat(20)));
        assert!(p.wants_solution(InteractionStatus::Partial, &"x".repeat(25)));
        assert!(!p.wants_solution(InteractionStatus::Completed, "short"));
        assert!(!p.wants_solution(InteractionStatus::Failed, &"x".repeat(500)));

        let off = PersistencePolicy {
            persist_solutions: false,
            ..p
        };
        assert!(!off.wants_solution(InteractionStatus::Completed, &"x".repeat(500)));
    }

    #[tokio::test]
    async fn writes_trace_and_solution() {
        let f = fixture(policy(), false);
        let report = f
            .persister
            .persist(&interaction(InteractionStatus::Completed), &"a".repeat(40), later())
            .await;

        assert!(report.trace_id.is_some());
        assert!(report.solution_id.is_some());
        assert_eq!(f.backend.len("t1"), 2);
        assert_eq!(f.metrics.snapshot().persistence_failures, 0);
    }

    #[tokio::test]
    async fn failed_interaction_writes_trace_only() {
        let f = fixture(policy(), false);
        let report = f
            .persister
            .persist(&interaction(InteractionStatus::Failed), &"a".repeat(400), later())
            .await;

        assert!(report.trace_id.is_some());
        assert!(report.solution_id.is_none());
        assert_eq!(f.backend.len("t1"), 1);
    }

    #[tokio::test]
    async fn embed_failure_is_swallowed_and_counted() {
        let f = fixture(policy(), true);
        let report = f
            .persister
            .persist(&interaction(InteractionStatus::Completed), &"a".repeat(40), later())
            .await;

        assert_eq!(report, PersistReport::default());
        assert_eq!(f.metrics.snapshot().persistence_failures, 2);
    }

    #[tokio::test]
    async fn hanging_embedder_stops_at_request_deadline() {
        let f = fixture_with(
            policy(),
            ConstEmbedder {
                fail: false,
                hang: true,
            },
        );
        let started = Instant::now();
        let report = f
            .persister
            .persist(
                &interaction(InteractionStatus::Completed),
                &"a".repeat(40),
                started + Duration::from_millis(100),
            )
            .await;

        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(report, PersistReport::default());
        assert_eq!(f.metrics.snapshot().persistence_failures, 1);
        assert_eq!(f.backend.len("t1"), 0);
    }

    #[test]
    fn trace_records_each_outcome() {
        let mut i = interaction(InteractionStatus::Partial);
        i.responder_results.push(ResponderResult {
            responder_id: "security".into(),
            responder_name: "Security Specialist".into(),
            outcome: ResponderOutcome::Error("rate limited".into()),
            duration_ms: 1,
        });

        let payload = trace_payload(&i);
        assert_eq!(payload.kind(), KnowledgeKind::CollaborationTrace);
        let KnowledgePayload::CollaborationTrace {
            contributions,
            status,
            ..
        } = payload
        else {
            panic!("expected a trace");
        };
        assert_eq!(status, "partial");
        assert_eq!(contributions[0].outcome, "success");
        assert_eq!(contributions[0].excerpt, "twenty connections");
        assert_eq!(contributions[1].outcome, "error");
        assert_eq!(contributions[1].excerpt, "rate limited");
    }
}
