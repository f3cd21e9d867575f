//! Concurrent fan-out of one request to the responders an analysis selected.

use std::sync::Arc;
use std::time::Duration;

use consilium_common::interaction::status_for;
use consilium_common::{
    Analysis, InteractionStatus, Metrics, Request, ResponderOutcome, ResponderResult, ScoredRecord,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::context::ContextBuilder;
use crate::registry::ResponderRegistry;

/// Results of one dispatch, in the order responders were required.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub results: Vec<ResponderResult>,
    pub status: InteractionStatus,
    pub duration_ms: u64,
}

impl DispatchOutcome {
    pub fn successes(&self) -> impl Iterator<Item = &ResponderResult> {
        self.results.iter().filter(|r| r.outcome.is_success())
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }
}

enum Pending {
    Running {
        id: String,
        name: String,
        handle: JoinHandle<(ResponderOutcome, u64)>,
    },
    Done(ResponderResult),
}

/// Runs every required responder in its own task.
///
/// A responder failing or timing out only affects its own slot. Nothing is
/// retried here; retries belong to the LLM client layer.
pub struct ResponderPool {
    registry: Arc<ResponderRegistry>,
    responder_timeout: Duration,
    context: ContextBuilder,
    metrics: Arc<Metrics>,
}

impl ResponderPool {
    pub fn new(
        registry: Arc<ResponderRegistry>,
        responder_timeout: Duration,
        context: ContextBuilder,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry,
            responder_timeout,
            context,
            metrics,
        }
    }

    pub async fn dispatch_all(
        &self,
        interaction_id: &str,
        request: &Request,
        analysis: &Analysis,
        retrieved: &[ScoredRecord],
        tenant_id: &str,
        timeout: Duration,
    ) -> DispatchOutcome {
        let started = Instant::now();
        let deadline = started + timeout;

        let context: Arc<str> = Arc::from(self.context.build(retrieved));
        let text: Arc<str> = Arc::from(request.text.as_str());

        info!(
            interaction_id = %interaction_id,
            tenant_id = %tenant_id,
            responders = ?analysis.required_responders,
            knowledge_records = retrieved.len(),
            "Dispatching to responders"
        );

        let mut seen = std::collections::HashSet::new();
        let mut pending = Vec::new();

        for id in &analysis.required_responders {
            if !seen.insert(id.as_str()) {
                continue;
            }

            let Some(responder) = self.registry.get(id) else {
                warn!(interaction_id = %interaction_id, responder = %id, "Unknown responder");
                pending.push(Pending::Done(ResponderResult {
                    responder_id: id.clone(),
                    responder_name: id.clone(),
                    outcome: ResponderOutcome::Error(format!("unknown responder '{id}'")),
                    duration_ms: 0,
                }));
                continue;
            };

            let name = responder.name().to_string();
            let per_responder = self.responder_timeout;
            let text = text.clone();
            let context = context.clone();

            let handle = tokio::spawn(async move {
                let step_start = Instant::now();
                let outcome =
                    match tokio::time::timeout(per_responder, responder.respond(&text, &context))
                        .await
                    {
                        Ok(Ok(answer)) if !answer.trim().is_empty() => {
                            ResponderOutcome::Success(answer)
                        }
                        Ok(Ok(_)) => ResponderOutcome::Error("empty response".to_string()),
                        Ok(Err(e)) => ResponderOutcome::Error(e.to_string()),
                        Err(_) => ResponderOutcome::Timeout,
                    };
                (outcome, step_start.elapsed().as_millis() as u64)
            });

            pending.push(Pending::Running {
                id: id.clone(),
                name,
                handle,
            });
        }

        let mut results = Vec::with_capacity(pending.len());
        for slot in pending {
            let result = match slot {
                Pending::Done(result) => result,
                Pending::Running {
                    id,
                    name,
                    mut handle,
                } => {
                    let (outcome, duration_ms) =
                        match tokio::time::timeout_at(deadline, &mut handle).await {
                            Ok(Ok(finished)) => finished,
                            Ok(Err(e)) => {
                                error!(
                                    interaction_id = %interaction_id,
                                    responder = %id,
                                    error = %e,
                                    "Responder task failed"
                                );
                                (
                                    ResponderOutcome::Error(format!("task failed: {e}")),
                                    started.elapsed().as_millis() as u64,
                                )
                            }
                            Err(_) => {
                                handle.abort();
                                (
                                    ResponderOutcome::Timeout,
                                    started.elapsed().as_millis() as u64,
                                )
                            }
                        };
                    ResponderResult {
                        responder_id: id,
                        responder_name: name,
                        outcome,
                        duration_ms,
                    }
                }
            };

            match &result.outcome {
                ResponderOutcome::Success(_) => self.metrics.record_dispatch_success(),
                ResponderOutcome::Timeout => {
                    warn!(
                        interaction_id = %interaction_id,
                        responder = %result.responder_id,
                        duration_ms = result.duration_ms,
                        "Responder timed out"
                    );
                    self.metrics.record_dispatch_timeout();
                }
                ResponderOutcome::Error(cause) => {
                    warn!(
                        interaction_id = %interaction_id,
                        responder = %result.responder_id,
                        error = %cause,
                        "Responder failed"
                    );
                    self.metrics.record_dispatch_failure();
                }
            }
            results.push(result);
        }

        let status = status_for(&results);
        let duration_ms = started.elapsed().as_millis() as u64;

        info!(
            interaction_id = %interaction_id,
            status = status.as_str(),
            succeeded = results.iter().filter(|r| r.outcome.is_success()).count(),
            total = results.len(),
            duration_ms,
            "Dispatch completed"
        );

        DispatchOutcome {
            results,
            status,
            duration_ms,
        }
    }
}
