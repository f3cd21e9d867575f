//! Knowledge record types shared by the store and the responders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of a stored knowledge record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeKind {
    /// A reusable answer to a past request
    Solution,
    /// Which responders took part in an interaction and how they fared
    CollaborationTrace,
    /// A standalone fact about the tenant's domain
    DomainFact,
}

impl KnowledgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Solution => "solution",
            Self::CollaborationTrace => "collaboration_trace",
            Self::DomainFact => "domain_fact",
        }
    }

    /// Short label used when rendering records into responder context.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Solution => "Solution",
            Self::CollaborationTrace => "Trace",
            Self::DomainFact => "Fact",
        }
    }
}

/// One responder's part in a collaboration trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub responder: String,
    /// "success", "timeout" or "error"
    pub outcome: String,
    #[serde(default)]
    pub excerpt: String,
}

/// Kind-specific record content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KnowledgePayload {
    Solution {
        problem: String,
        solution: String,
        #[serde(default)]
        responders: Vec<String>,
    },
    CollaborationTrace {
        interaction_id: String,
        request_text: String,
        responders: Vec<String>,
        contributions: Vec<Contribution>,
        status: String,
        complexity: String,
    },
    DomainFact {
        fact: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
}

impl KnowledgePayload {
    pub fn kind(&self) -> KnowledgeKind {
        match self {
            Self::Solution { .. } => KnowledgeKind::Solution,
            Self::CollaborationTrace { .. } => KnowledgeKind::CollaborationTrace,
            Self::DomainFact { .. } => KnowledgeKind::DomainFact,
        }
    }

    /// The text that gets embedded for this payload.
    pub fn canonical_text(&self) -> String {
        match self {
            Self::Solution {
                problem, solution, ..
            } => format!("Problem: {problem}\nSolution: {solution}"),
            Self::CollaborationTrace {
                request_text,
                contributions,
                status,
                ..
            } => {
                let summary = contributions
                    .iter()
                    .map(|c| format!("{} ({})", c.responder, c.outcome))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Request: {request_text}\nResponders: {summary}\nStatus: {status}")
            }
            Self::DomainFact { fact, source } => match source {
                Some(src) => format!("{fact} (source: {src})"),
                None => fact.clone(),
            },
        }
    }
}

/// A persisted, vectorized unit of history. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub id: String,
    pub tenant_id: String,
    pub kind: KnowledgeKind,
    pub payload: KnowledgePayload,
    #[serde(default)]
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A record with its similarity to a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub record: KnowledgeRecord,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_kind_matches_variant() {
        let fact = KnowledgePayload::DomainFact {
            fact: "Pools default to 10 connections".into(),
            source: None,
        };
        assert_eq!(fact.kind(), KnowledgeKind::DomainFact);
        assert_eq!(fact.canonical_text(), "Pools default to 10 connections");
    }

    #[test]
    fn payload_serializes_with_kind_tag() {
        let payload = KnowledgePayload::Solution {
            problem: "p".into(),
            solution: "s".into(),
            responders: vec!["research".into()],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "solution");
        assert_eq!(json["problem"], "p");

        let back: KnowledgePayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn trace_canonical_text_summarizes_outcomes() {
        let payload = KnowledgePayload::CollaborationTrace {
            interaction_id: "i-1".into(),
            request_text: "How to size a pool?".into(),
            responders: vec!["infrastructure".into(), "security".into()],
            contributions: vec![
                Contribution {
                    responder: "infrastructure".into(),
                    outcome: "success".into(),
                    excerpt: "Use N+1".into(),
                },
                Contribution {
                    responder: "security".into(),
                    outcome: "timeout".into(),
                    excerpt: String::new(),
                },
            ],
            status: "partial".into(),
            complexity: "medium".into(),
        };
        let text = payload.canonical_text();
        assert!(text.contains("How to size a pool?"));
        assert!(text.contains("infrastructure (success)"));
        assert!(text.contains("security (timeout)"));
    }
}
