//! LLM-backed specialist responder.

use std::sync::Arc;

use async_trait::async_trait;
use consilium_common::{ConsiliumError, Responder, Result};
use consilium_llm::{LlmClient, LlmRequest};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::kind::ResponderKind;

/// Per-responder overrides from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub name: Option<String>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

fn default_enabled() -> bool {
    true
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: None,
            system_prompt: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// A roster member answering through an [`LlmClient`] with its own prompt.
pub struct SpecialistResponder {
    kind: ResponderKind,
    name: String,
    system_prompt: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    llm: Arc<dyn LlmClient>,
}

impl SpecialistResponder {
    pub fn new(kind: ResponderKind, llm: Arc<dyn LlmClient>) -> Self {
        Self::with_config(kind, &ResponderConfig::default(), llm)
    }

    pub fn with_config(
        kind: ResponderKind,
        config: &ResponderConfig,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            kind,
            name: config
                .name
                .clone()
                .unwrap_or_else(|| kind.display_name().to_string()),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| kind.system_prompt().to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            llm,
        }
    }

    pub fn kind(&self) -> ResponderKind {
        self.kind
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn build_request(&self, request_text: &str, context: &str) -> LlmRequest {
        let user = if context.trim().is_empty() {
            request_text.to_string()
        } else {
            format!("{context}\n\n## Request\n\n{request_text}")
        };
        let mut request = LlmRequest::single(self.system_prompt.clone(), user);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;
        request
    }
}

#[async_trait]
impl Responder for SpecialistResponder {
    fn id(&self) -> &str {
        self.kind.id()
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn respond(&self, request_text: &str, context: &str) -> Result<String> {
        let request = self.build_request(request_text, context);
        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|e| ConsiliumError::Responder(format!("{}: {e}", self.kind.id())))?;

        debug!(
            responder = self.kind.id(),
            model = %response.model,
            chars = response.content.len(),
            "Responder answered"
        );

        let text = response.content.trim();
        if text.is_empty() {
            return Err(ConsiliumError::Responder(format!(
                "{}: empty response",
                self.kind.id()
            )));
        }
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consilium_llm::LlmResponse;
    use std::sync::Mutex;

    /// Echoes the request and remembers what it was sent.
    struct RecordingLlm {
        reply: String,
        seen: Mutex<Vec<LlmRequest>>,
    }

    impl RecordingLlm {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for RecordingLlm {
        async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
            self.seen.lock().unwrap().push(request);
            Ok(LlmResponse {
                content: self.reply.clone(),
                model: "mock".into(),
                usage: None,
                finish_reason: None,
            })
        }
        fn model_name(&self) -> &str {
            "mock"
        }
    }

    #[tokio::test]
    async fn uses_kind_prompt_and_context() {
        let llm = RecordingLlm::new("  Use a pool of 20.  ");
        let responder = SpecialistResponder::new(ResponderKind::Infrastructure, llm.clone());

        let answer = responder
            .respond("How big should the pool be?", "## Relevant Context\nold answer")
            .await
            .unwrap();
        assert_eq!(answer, "Use a pool of 20.");
        assert_eq!(responder.id(), "infrastructure");
        assert_eq!(responder.name(), "Infrastructure Specialist");

        let seen = llm.seen.lock().unwrap();
        let request = &seen[0];
        assert!(
            request
                .system_prompt
                .as_deref()
                .unwrap()
                .contains("infrastructure specialist")
        );
        let user = &request.messages[0].content;
        assert!(user.starts_with("## Relevant Context"));
        assert!(user.ends_with("How big should the pool be?"));
    }

    #[tokio::test]
    async fn empty_context_sends_bare_request() {
        let llm = RecordingLlm::new("ok");
        let responder = SpecialistResponder::new(ResponderKind::Research, llm.clone());
        responder.respond("What is Raft?", "").await.unwrap();
        assert_eq!(llm.seen.lock().unwrap()[0].messages[0].content, "What is Raft?");
    }

    #[tokio::test]
    async fn overrides_apply() {
        let llm = RecordingLlm::new("ok");
        let config = ResponderConfig {
            name: Some("Sec".into()),
            system_prompt: Some("Be paranoid.".into()),
            temperature: Some(0.1),
            max_tokens: Some(256),
            ..ResponderConfig::default()
        };
        let responder =
            SpecialistResponder::with_config(ResponderKind::Security, &config, llm.clone());
        responder.respond("Audit this", "").await.unwrap();

        assert_eq!(responder.name(), "Sec");
        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen[0].system_prompt.as_deref(), Some("Be paranoid."));
        assert_eq!(seen[0].temperature, Some(0.1));
        assert_eq!(seen[0].max_tokens, Some(256));
    }

    #[tokio::test]
    async fn blank_answer_is_an_error() {
        let responder = SpecialistResponder::new(ResponderKind::Writing, RecordingLlm::new(" \n"));
        let err = responder.respond("Draft an email", "").await.unwrap_err();
        assert!(matches!(err, ConsiliumError::Responder(_)));
    }

    #[test]
    fn config_from_toml() {
        let config: ResponderConfig = toml::from_str("temperature = 0.2\n").unwrap();
        assert!(config.enabled);
        assert_eq!(config.temperature, Some(0.2));
    }
}
