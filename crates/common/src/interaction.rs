//! Per-request interaction state held in memory during processing.

use serde::{Deserialize, Serialize};

use crate::analysis::Analysis;
use crate::request::Request;

/// Current status of an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    Dispatching,
    Partial,
    Completed,
    Failed,
}

impl InteractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dispatching => "dispatching",
            Self::Partial => "partial",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// The result of invoking one responder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ResponderOutcome {
    Success(String),
    Timeout,
    Error(String),
}

impl ResponderOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Success(text) => Some(text),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Timeout => "timeout",
            Self::Error(_) => "error",
        }
    }
}

/// One slot in an interaction's result list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderResult {
    pub responder_id: String,
    /// Display name, falls back to the id for unknown responders
    pub responder_name: String,
    pub outcome: ResponderOutcome,
    pub duration_ms: u64,
}

/// Ephemeral state for one request. Discarded after the response is built.
#[derive(Debug, Clone)]
pub struct Interaction {
    pub interaction_id: String,
    pub request: Request,
    pub analysis: Analysis,
    /// Results in the order responders were required
    pub responder_results: Vec<ResponderResult>,
    pub status: InteractionStatus,
}

impl Interaction {
    /// Start an interaction. The id is generated here, when dispatch begins.
    pub fn begin(request: Request, analysis: Analysis) -> Self {
        Self {
            interaction_id: uuid::Uuid::new_v4().to_string(),
            request,
            analysis,
            responder_results: Vec::new(),
            status: InteractionStatus::Dispatching,
        }
    }

    pub fn successes(&self) -> impl Iterator<Item = &ResponderResult> {
        self.responder_results
            .iter()
            .filter(|r| r.outcome.is_success())
    }
}

/// Status implied by a set of results.
pub fn status_for(results: &[ResponderResult]) -> InteractionStatus {
    let succeeded = results.iter().filter(|r| r.outcome.is_success()).count();
    if succeeded == 0 {
        InteractionStatus::Failed
    } else if succeeded < results.len() {
        InteractionStatus::Partial
    } else {
        InteractionStatus::Completed
    }
}
