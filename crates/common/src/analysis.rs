//! Request classification output.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How much work a request is expected to need.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    #[default]
    Medium,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Some(Self::Simple),
            "medium" => Some(Self::Medium),
            "complex" => Some(Self::Complex),
            _ => None,
        }
    }
}

/// Result of classifying a request. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    /// Responders to dispatch to, in order. Never empty.
    pub required_responders: Vec<String>,

    pub complexity: Complexity,

    #[serde(default)]
    pub keywords: BTreeSet<String>,

    /// Diagnostic only
    #[serde(default)]
    pub reasoning: String,

    /// Whether this came from the fallback path rather than the classifier
    #[serde(default)]
    pub fallback: bool,
}

impl Analysis {
    /// The analysis used whenever classification fails.
    pub fn fallback(default_responder: impl Into<String>, keywords: BTreeSet<String>) -> Self {
        Self {
            required_responders: vec![default_responder.into()],
            complexity: Complexity::Medium,
            keywords,
            reasoning: "Classification unavailable, using default responder".into(),
            fallback: true,
        }
    }
}
