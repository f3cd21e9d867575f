//! Request classification.
//!
//! One LLM call decides which responders a request needs. The model's output
//! is untrusted: it must contain a JSON object matching [`RawAnalysis`]
//! exactly, responder ids are checked against the registry, and free-text
//! fields are bounded. Any failure yields [`Analysis::fallback`].

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use consilium_common::validation::truncate_chars;
use consilium_common::{Analysis, Complexity, ConsiliumError, Result};
use consilium_llm::{LlmClient, LlmRequest};
use consilium_responders::{ResponderKind, ResponderRegistry};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Maximum reasoning length kept from the classifier.
pub const MAX_REASONING_LENGTH: usize = 500;

/// Maximum keywords kept per analysis.
pub const MAX_KEYWORDS: usize = 16;

const CLASSIFIER_SYSTEM_PROMPT: &str = r#"You are the request classifier for a panel of specialist responders.

Decide which specialists should answer the user's request, how complex it is, and which keywords describe it.

IMPORTANT: Respond ONLY with a JSON object, no other text. The JSON must have this exact structure:

{
  "required_responders": ["<responder id>", ...],
  "complexity": "simple|medium|complex",
  "keywords": ["<keyword>", ...],
  "reasoning": "brief explanation of your choice"
}

Rules:
- "required_responders" lists between 1 and {max} ids from the roster below, most relevant first
- Use only ids that appear in the roster
- "complexity" is "simple" for quick factual questions, "complex" for multi-part problems
- "keywords" holds at most 16 short lowercase terms

Roster:
{roster}"#;

/// The exact shape the classifier must return.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAnalysis {
    required_responders: Vec<String>,
    complexity: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    reasoning: String,
}

/// Classifies requests against a fixed responder registry.
pub struct Classifier {
    llm: Arc<dyn LlmClient>,
    registry: Arc<ResponderRegistry>,
    default_responder: String,
    max_responders: usize,
    system_prompt: String,
}

impl Classifier {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: Arc<ResponderRegistry>,
        default_responder: impl Into<String>,
        max_responders: usize,
    ) -> Self {
        let roster = registry
            .ids()
            .into_iter()
            .map(|id| {
                let description = ResponderKind::from_id(id)
                    .map(|k| k.description())
                    .unwrap_or("general questions");
                format!("- \"{id}\": {description}")
            })
            .collect::<Vec<_>>()
            .join("\n");
        let system_prompt = CLASSIFIER_SYSTEM_PROMPT
            .replace("{max}", &max_responders.to_string())
            .replace("{roster}", &roster);

        Self {
            llm,
            registry,
            default_responder: default_responder.into(),
            max_responders,
            system_prompt,
        }
    }

    /// Classify `text`. Never fails; falls back to the default responder.
    pub async fn analyze(&self, text: &str) -> Analysis {
        match self.classify(text).await {
            Ok(analysis) => {
                info!(
                    responders = ?analysis.required_responders,
                    complexity = analysis.complexity.as_str(),
                    "Request classified"
                );
                analysis
            }
            Err(e) => {
                warn!(
                    error = %e,
                    default_responder = %self.default_responder,
                    "Classification failed, using default analysis"
                );
                self.fallback(text)
            }
        }
    }

    pub fn fallback(&self, text: &str) -> Analysis {
        Analysis::fallback(self.default_responder.clone(), heuristic_keywords(text))
    }

    async fn classify(&self, text: &str) -> Result<Analysis> {
        let request = LlmRequest::single(self.system_prompt.clone(), text)
            .with_temperature(0.2)
            .with_max_tokens(512);
        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|e| ConsiliumError::Classification(format!("LLM call failed: {e}")))?;

        debug!(response = %truncate_chars(&response.content, 200), "Classifier response");
        self.parse_response(&response.content)
    }

    fn parse_response(&self, response: &str) -> Result<Analysis> {
        let json = extract_json_object(response).ok_or_else(|| {
            ConsiliumError::Classification(format!(
                "no JSON object in response: {}",
                truncate_chars(response, 200)
            ))
        })?;

        let raw: RawAnalysis = serde_json::from_str(json)
            .map_err(|e| ConsiliumError::Classification(format!("invalid analysis JSON: {e}")))?;

        let mut seen = HashSet::new();
        let mut required_responders = Vec::new();
        for id in raw.required_responders {
            let id = id.trim().to_ascii_lowercase();
            if !self.registry.contains(&id) {
                warn!(responder = %id, "Classifier named an unknown responder, dropping it");
                continue;
            }
            if seen.insert(id.clone()) {
                required_responders.push(id);
            }
        }
        required_responders.truncate(self.max_responders);

        if required_responders.is_empty() {
            return Err(ConsiliumError::Classification(
                "no known responders selected".into(),
            ));
        }

        let complexity = Complexity::parse(&raw.complexity).ok_or_else(|| {
            ConsiliumError::Classification(format!("invalid complexity '{}'", raw.complexity))
        })?;

        Ok(Analysis {
            required_responders,
            complexity,
            keywords: bounded_keywords(raw.keywords),
            reasoning: truncate_chars(raw.reasoning.trim(), MAX_REASONING_LENGTH),
            fallback: false,
        })
    }
}

/// Lowercased, deduplicated, at most [`MAX_KEYWORDS`], first-seen wins.
fn bounded_keywords(keywords: impl IntoIterator<Item = String>) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for keyword in keywords {
        if out.len() >= MAX_KEYWORDS {
            break;
        }
        let keyword = keyword.trim().to_lowercase();
        if !keyword.is_empty() {
            out.insert(keyword);
        }
    }
    out
}

const STOPWORDS: &[&str] = &[
    "about", "after", "also", "and", "are", "before", "being", "but", "can", "could", "does",
    "for", "from", "have", "how", "into", "just", "more", "most", "need", "should", "some",
    "than", "that", "the", "their", "them", "then", "there", "these", "they", "this", "what",
    "when", "where", "which", "while", "who", "why", "will", "with", "would", "you", "your",
];

/// Keywords pulled from the request text when the classifier is unavailable.
pub fn heuristic_keywords(text: &str) -> BTreeSet<String> {
    let words = text
        .split(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
        .map(|w| w.trim_matches(|c| c == '-' || c == '_').to_lowercase())
        .filter(|w| w.chars().count() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()));
    bounded_keywords(words)
}

/// Extract the first balanced JSON object from a string that may contain
/// other text. Braces inside string literals are ignored.
pub fn extract_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
