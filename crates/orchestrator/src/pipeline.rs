//! The request pipeline.
//!
//! ```text
//! Analyzing → Retrieving → Dispatching → Synthesizing → Persisting → Done
//!      └───────────┴────────────┴─────────────┘
//!          request timeout ──► ErrorFallback ──► Persisting → Done
//! ```

use std::sync::Arc;

use consilium_common::validation::{validate_request_text, validate_tenant_id};
use consilium_common::{
    Analysis, Complexity, HealthReport, Interaction, InteractionStatus, Metrics,
    OrchestratorResponse, Request, ResponseMetadata, Result,
};
use consilium_knowledge::{EmbeddingCache, KnowledgeStore, connect_backend};
use consilium_llm::{LlmClient, build_embedder, build_llm_client};
use consilium_responders::{ContextBuilder, ResponderPool, ResponderRegistry};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::analysis::Classifier;
use crate::config::OrchestratorConfig;
use crate::persistence::{PersistencePolicy, Persister};
use crate::synthesis::{APOLOGY, Synthesis, Synthesizer, concatenate};

/// Pipeline states, in the order they are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Analyzing,
    Retrieving,
    Dispatching,
    Synthesizing,
    Persisting,
    Done,
    ErrorFallback,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyzing => "analyzing",
            Self::Retrieving => "retrieving",
            Self::Dispatching => "dispatching",
            Self::Synthesizing => "synthesizing",
            Self::Persisting => "persisting",
            Self::Done => "done",
            Self::ErrorFallback => "error_fallback",
        }
    }
}

/// What the bounded part of the pipeline produced before finishing or
/// running out of time.
#[derive(Default)]
struct Progress {
    stages: Vec<Stage>,
    analysis: Option<Analysis>,
    knowledge_used: usize,
    interaction: Option<Interaction>,
    synthesis: Option<Synthesis>,
}

impl Progress {
    fn enter(&mut self, stage: Stage) {
        debug!(stage = stage.as_str(), "Entering stage");
        self.stages.push(stage);
    }
}

/// Coordinates classification, retrieval, dispatch, synthesis and
/// persistence for one request at a time. Shared across tasks via `Arc`.
pub struct Orchestrator {
    config: OrchestratorConfig,
    classifier: Classifier,
    store: Arc<KnowledgeStore>,
    registry: Arc<ResponderRegistry>,
    pool: ResponderPool,
    synthesizer: Synthesizer,
    persister: Persister,
    metrics: Arc<Metrics>,
}

impl Orchestrator {
    /// Assemble an orchestrator from already-built parts.
    ///
    /// `llm` serves the classifier and synthesis; responders bring their
    /// own clients.
    pub fn new(
        config: OrchestratorConfig,
        llm: Arc<dyn LlmClient>,
        registry: ResponderRegistry,
        store: Arc<KnowledgeStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let registry = Arc::new(registry);

        let classifier = Classifier::new(
            llm.clone(),
            registry.clone(),
            config.default_responder.clone(),
            config.max_responders,
        );
        let pool = ResponderPool::new(
            registry.clone(),
            config.responder_timeout(),
            ContextBuilder::new(config.context_records, config.context_max_tokens),
            metrics.clone(),
        );
        let synthesizer = Synthesizer::new(
            llm,
            registry.clone(),
            config.skip_single_synthesis,
            metrics.clone(),
        );
        let persister = Persister::new(
            store.clone(),
            PersistencePolicy {
                solution_min_chars: config.solution_min_chars,
                persist_solutions: config.persist_solutions,
            },
            config.persist_timeout(),
            metrics.clone(),
        );

        info!(
            responders = ?registry.ids(),
            backend = store.backend_name(),
            "Orchestrator ready"
        );

        Self {
            config,
            classifier,
            store,
            registry,
            pool,
            synthesizer,
            persister,
            metrics,
        }
    }

    /// Build every component from configuration.
    pub async fn from_config(config: OrchestratorConfig) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(Metrics::new());
        let llm = build_llm_client(&config.llm)?;
        let embedder = build_embedder(&config.embedding)?;
        let backend = connect_backend(&config.knowledge.backend).await?;
        let cache = Arc::new(EmbeddingCache::new(
            config.knowledge.cache_capacity,
            metrics.clone(),
        ));
        let store = Arc::new(KnowledgeStore::new(backend, embedder, cache, metrics.clone()));
        let registry = ResponderRegistry::from_config(llm.clone(), &config.responders);

        Ok(Self::new(config, llm, registry, store, metrics))
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn health(&self) -> HealthReport {
        self.metrics.health()
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    /// Delete all knowledge for a tenant.
    pub async fn erase_tenant(&self, tenant_id: &str) -> Result<usize> {
        self.store.erase_tenant(tenant_id).await
    }

    /// Answer one request. Never fails and never returns empty content.
    pub async fn handle(&self, request: Request) -> OrchestratorResponse {
        let started = Instant::now();

        if let Err(e) = validate_request_text(&request.text, self.config.max_request_chars)
            .and_then(|()| validate_tenant_id(&request.tenant_id))
        {
            warn!(error = %e, "Rejected request");
            self.metrics.record_request(true);
            return rejected(&e.to_string());
        }

        info!(
            tenant_id = %request.tenant_id,
            chars = request.text.chars().count(),
            "Handling request"
        );

        let deadline = started + self.config.request_timeout();
        let mut progress = Progress::default();
        let timed_out =
            tokio::time::timeout_at(deadline, self.run(&request, deadline, &mut progress))
                .await
                .is_err();

        let analysis = progress
            .analysis
            .take()
            .unwrap_or_else(|| self.classifier.fallback(&request.text));
        let mut interaction = progress
            .interaction
            .take()
            .unwrap_or_else(|| Interaction::begin(request.clone(), analysis.clone()));

        let synthesis = match progress.synthesis.take() {
            Some(synthesis) if !timed_out => synthesis,
            _ => {
                warn!(
                    interaction_id = %interaction.interaction_id,
                    stages = ?progress.stages.iter().map(Stage::as_str).collect::<Vec<_>>(),
                    timeout_ms = self.config.request_timeout_ms,
                    "Request timed out, building fallback response"
                );
                progress.enter(Stage::ErrorFallback);
                self.error_fallback(&mut interaction)
            }
        };

        progress.enter(Stage::Persisting);
        self.persister
            .persist(&interaction, &synthesis.content, deadline)
            .await;
        progress.enter(Stage::Done);

        let failed = interaction.status == InteractionStatus::Failed;
        self.metrics.record_request(failed);

        info!(
            interaction_id = %interaction.interaction_id,
            status = interaction.status.as_str(),
            degraded = synthesis.degraded || analysis.fallback,
            duration_ms = started.elapsed().as_millis() as u64,
            "Request completed"
        );

        OrchestratorResponse {
            content: synthesis.content,
            metadata: ResponseMetadata {
                interaction_id: interaction.interaction_id.clone(),
                responders_involved: interaction
                    .responder_results
                    .iter()
                    .map(|r| r.responder_id.clone())
                    .collect(),
                complexity: analysis.complexity,
                status: interaction.status,
                knowledge_used: progress.knowledge_used,
                stages: progress.stages.iter().map(|s| s.as_str().to_string()).collect(),
                degraded: synthesis.degraded || analysis.fallback || timed_out,
            },
        }
    }

    /// Analysis through synthesis. Everything it learns is written to
    /// `progress` as soon as it is known.
    async fn run(&self, request: &Request, deadline: Instant, progress: &mut Progress) {
        progress.enter(Stage::Analyzing);
        let analysis = self.classifier.analyze(&request.text).await;
        progress.analysis = Some(analysis.clone());

        progress.enter(Stage::Retrieving);
        let (top_k, min_similarity) = self.config.retrieval_for(&request.tenant_id);
        let retrieval_budget = self
            .config
            .retrieval_timeout()
            .min(deadline.saturating_duration_since(Instant::now()));
        let retrieved = match tokio::time::timeout(
            retrieval_budget,
            self.store
                .retrieve(&request.tenant_id, &request.text, top_k, min_similarity),
        )
        .await
        {
            Ok(records) => records,
            Err(_) => {
                warn!(
                    tenant_id = %request.tenant_id,
                    timeout_ms = retrieval_budget.as_millis() as u64,
                    "Retrieval timed out, continuing without knowledge"
                );
                self.metrics.record_retrieval_failure();
                Vec::new()
            }
        };
        progress.knowledge_used = retrieved.len().min(self.config.context_records);

        progress.enter(Stage::Dispatching);
        let mut interaction = Interaction::begin(request.clone(), analysis.clone());
        let budget = self
            .config
            .dispatch_timeout()
            .min(deadline.saturating_duration_since(Instant::now()));
        let outcome = self
            .pool
            .dispatch_all(
                &interaction.interaction_id,
                request,
                &analysis,
                &retrieved,
                &request.tenant_id,
                budget,
            )
            .await;
        interaction.responder_results = outcome.results;
        interaction.status = outcome.status;
        let results = interaction.responder_results.clone();
        progress.interaction = Some(interaction);

        progress.enter(Stage::Synthesizing);
        let synthesis = self
            .synthesizer
            .synthesize(&request.text, &analysis, &results)
            .await;
        progress.synthesis = Some(synthesis);
    }

    /// Response built from whatever succeeded before the request timed out.
    fn error_fallback(&self, interaction: &mut Interaction) -> Synthesis {
        let content = concatenate(&self.registry, &interaction.responder_results);
        if content.is_empty() {
            interaction.status = InteractionStatus::Failed;
            Synthesis {
                content: APOLOGY.to_string(),
                degraded: true,
            }
        } else {
            Synthesis {
                content,
                degraded: true,
            }
        }
    }
}

fn rejected(reason: &str) -> OrchestratorResponse {
    OrchestratorResponse {
        content: format!("Your request could not be processed. {reason}"),
        metadata: ResponseMetadata {
            interaction_id: String::new(),
            responders_involved: Vec::new(),
            complexity: Complexity::default(),
            status: InteractionStatus::Failed,
            knowledge_used: 0,
            stages: Vec::new(),
            degraded: true,
        },
    }
}
