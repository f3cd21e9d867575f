//! Combining responder answers into one response.

use std::sync::Arc;

use consilium_common::{Analysis, ConsiliumError, Metrics, ResponderResult, Result};
use consilium_llm::{LlmClient, LlmRequest};
use consilium_responders::ResponderRegistry;
use tracing::{debug, warn};

/// Returned when no responder produced an answer.
pub const APOLOGY: &str = "I'm sorry, none of the specialists could answer this request right now. \
Please try again in a moment.";

const SYNTHESIS_SYSTEM_PROMPT: &str = r#"You combine answers from several specialists into one response for the user.

Guidelines:
- Keep every concrete recommendation, number, and caveat the specialists gave
- Resolve overlaps; when specialists disagree, say so and explain the trade-off
- Do not invent facts that none of the specialists stated
- Do not mention the specialists or this process; answer the user directly
- Use Markdown headings and lists where they help"#;

/// Output of the synthesis stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub content: String,
    /// True for the apology and the concatenation fallback
    pub degraded: bool,
}

pub struct Synthesizer {
    llm: Arc<dyn LlmClient>,
    registry: Arc<ResponderRegistry>,
    skip_single: bool,
    metrics: Arc<Metrics>,
}

impl Synthesizer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: Arc<ResponderRegistry>,
        skip_single: bool,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            llm,
            registry,
            skip_single,
            metrics,
        }
    }

    pub async fn synthesize(
        &self,
        request_text: &str,
        analysis: &Analysis,
        results: &[ResponderResult],
    ) -> Synthesis {
        let successes: Vec<&ResponderResult> =
            results.iter().filter(|r| r.outcome.is_success()).collect();

        match successes.as_slice() {
            [] => Synthesis {
                content: APOLOGY.to_string(),
                degraded: true,
            },
            [only] if self.skip_single => Synthesis {
                content: only.outcome.text().unwrap_or_default().to_string(),
                degraded: false,
            },
            _ => match self.combine(request_text, analysis, &successes).await {
                Ok(content) => Synthesis {
                    content,
                    degraded: false,
                },
                Err(e) => {
                    warn!(
                        error = %e,
                        responders = successes.len(),
                        "Synthesis failed, concatenating answers"
                    );
                    self.metrics.record_synthesis_fallback();
                    Synthesis {
                        content: concatenate(&self.registry, results),
                        degraded: true,
                    }
                }
            },
        }
    }

    async fn combine(
        &self,
        request_text: &str,
        analysis: &Analysis,
        successes: &[&ResponderResult],
    ) -> Result<String> {
        let mut prompt = format!(
            "## Request\n\n{request_text}\n\n## Complexity\n\n{}\n",
            analysis.complexity.as_str()
        );
        if !analysis.keywords.is_empty() {
            let keywords: Vec<&str> = analysis.keywords.iter().map(String::as_str).collect();
            prompt.push_str(&format!("\n## Keywords\n\n{}\n", keywords.join(", ")));
        }
        prompt.push_str("\n## Specialist answers\n");
        for result in successes {
            prompt.push_str(&format!(
                "\n### {}\n{}\n",
                result.responder_name,
                result.outcome.text().unwrap_or_default()
            ));
        }

        let response = self
            .llm
            .complete(LlmRequest::single(SYNTHESIS_SYSTEM_PROMPT, prompt).with_temperature(0.3))
            .await
            .map_err(|e| ConsiliumError::Synthesis(e.to_string()))?;

        let content = response.content.trim();
        if content.is_empty() {
            return Err(ConsiliumError::Synthesis("empty synthesis".into()));
        }
        debug!(chars = content.len(), model = %response.model, "Synthesized answer");
        Ok(content.to_string())
    }
}

/// Successful answers as `### <Name>` blocks, in roster order.
///
/// Returns an empty string when nothing succeeded.
pub fn concatenate(registry: &ResponderRegistry, results: &[ResponderResult]) -> String {
    let mut successes: Vec<&ResponderResult> =
        results.iter().filter(|r| r.outcome.is_success()).collect();
    successes.sort_by_key(|r| registry.position(&r.responder_id).unwrap_or(usize::MAX));

    successes
        .iter()
        .map(|r| {
            format!(
                "### {}\n{}",
                r.responder_name,
                r.outcome.text().unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use consilium_common::{Complexity, Responder, ResponderOutcome};
    use consilium_llm::LlmResponse;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedLlm {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl ScriptedLlm {
        fn new(reply: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(request.messages[0].content.contains("## Specialist answers"));
            match self.reply {
                Some(text) => Ok(LlmResponse {
                    content: text.to_string(),
                    model: "scripted".into(),
                    usage: None,
                    finish_reason: None,
                }),
                None => Err(ConsiliumError::Timeout("synthesis".into())),
            }
        }
        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    struct Named(&'static str, &'static str);

    #[async_trait]
    impl Responder for Named {
        fn id(&self) -> &str {
            self.0
        }
        fn name(&self) -> &str {
            self.1
        }
        async fn respond(&self, _request_text: &str, _context: &str) -> Result<String> {
            Ok(String::new())
        }
    }

    fn registry() -> Arc<ResponderRegistry> {
        Arc::new(
            ResponderRegistry::new()
                .with(Arc::new(Named("research", "Research Specialist")))
                .with(Arc::new(Named("infrastructure", "Infrastructure Specialist")))
                .with(Arc::new(Named("security", "Security Specialist"))),
        )
    }

    fn result(id: &str, name: &str, outcome: ResponderOutcome) -> ResponderResult {
        ResponderResult {
            responder_id: id.into(),
            responder_name: name.into(),
            outcome,
            duration_ms: 5,
        }
    }

    fn analysis() -> Analysis {
        Analysis {
            required_responders: vec!["security".into(), "research".into()],
            complexity: Complexity::Complex,
            keywords: BTreeSet::from(["tls".to_string()]),
            reasoning: String::new(),
            fallback: false,
        }
    }

    fn two_successes() -> Vec<ResponderResult> {
        vec![
            result(
                "security",
                "Security Specialist",
                ResponderOutcome::Success("Pin TLS 1.3.".into()),
            ),
            result("infrastructure", "Infrastructure Specialist", ResponderOutcome::Timeout),
            result(
                "research",
                "Research Specialist",
                ResponderOutcome::Success("TLS 1.3 removed RSA key exchange.".into()),
            ),
        ]
    }

    #[tokio::test]
    async fn no_successes_gives_apology() {
        let llm = ScriptedLlm::new(Some("unused"));
        let synthesizer =
            Synthesizer::new(llm.clone(), registry(), true, Arc::new(Metrics::new()));
        let results = vec![result("security", "Security Specialist", ResponderOutcome::Timeout)];

        let out = synthesizer.synthesize("q", &analysis(), &results).await;
        assert_eq!(out.content, APOLOGY);
        assert!(out.degraded);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn single_success_skips_llm() {
        let llm = ScriptedLlm::new(Some("unused"));
        let synthesizer =
            Synthesizer::new(llm.clone(), registry(), true, Arc::new(Metrics::new()));
        let results = vec![
            result("security", "Security Specialist", ResponderOutcome::Success("Only me".into())),
            result("research", "Research Specialist", ResponderOutcome::Error("x".into())),
        ];

        let out = synthesizer.synthesize("q", &analysis(), &results).await;
        assert_eq!(out.content, "Only me");
        assert!(!out.degraded);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn multiple_successes_use_llm() {
        let llm = ScriptedLlm::new(Some("  Use TLS 1.3 everywhere.  "));
        let synthesizer =
            Synthesizer::new(llm.clone(), registry(), true, Arc::new(Metrics::new()));

        let out = synthesizer.synthesize("q", &analysis(), &two_successes()).await;
        assert_eq!(out.content, "Use TLS 1.3 everywhere.");
        assert!(!out.degraded);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn llm_failure_concatenates_in_roster_order() {
        let metrics = Arc::new(Metrics::new());
        let synthesizer =
            Synthesizer::new(ScriptedLlm::new(None), registry(), true, metrics.clone());

        let out = synthesizer.synthesize("q", &analysis(), &two_successes()).await;
        assert!(out.degraded);
        assert_eq!(
            out.content,
            "### Research Specialist\nTLS 1.3 removed RSA key exchange.\n\n\
             ### Security Specialist\nPin TLS 1.3."
        );
        assert_eq!(metrics.snapshot().synthesis_fallbacks, 1);
    }

    #[tokio::test]
    async fn empty_synthesis_concatenates() {
        let synthesizer = Synthesizer::new(
            ScriptedLlm::new(Some("   ")),
            registry(),
            true,
            Arc::new(Metrics::new()),
        );
        let out = synthesizer.synthesize("q", &analysis(), &two_successes()).await;
        assert!(out.content.starts_with("### Research Specialist\n"));
    }

    #[test]
    fn concatenate_empty_when_nothing_succeeded() {
        let results = vec![result("research", "Research Specialist", ResponderOutcome::Timeout)];
        assert_eq!(concatenate(&registry(), &results), "");
    }
}
