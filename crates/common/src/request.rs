//! Inbound request and outbound response types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::analysis::Complexity;
use crate::interaction::InteractionStatus;

/// A request entering the system boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// The question or task text
    pub text: String,

    /// Knowledge partition this request reads from and writes to
    #[serde(rename = "tenantId", alias = "tenant_id")]
    pub tenant_id: String,

    /// Opaque caller state, passed through untouched
    #[serde(
        rename = "conversationState",
        alias = "conversation_state",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub conversation_state: Option<HashMap<String, serde_json::Value>>,
}

impl Request {
    pub fn new(text: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tenant_id: tenant_id.into(),
            conversation_state: None,
        }
    }
}

/// Metadata attached to every response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    /// Empty when the request was rejected before dispatch began
    pub interaction_id: String,
    pub responders_involved: Vec<String>,
    pub complexity: Complexity,
    pub status: InteractionStatus,

    /// Number of knowledge records handed to responders
    #[serde(default)]
    pub knowledge_used: usize,

    /// Pipeline stages visited, in order
    #[serde(default)]
    pub stages: Vec<String>,

    /// True when any stage fell back to a lower-quality path
    #[serde(default)]
    pub degraded: bool,
}

/// The terminal output of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorResponse {
    pub content: String,
    pub metadata: ResponseMetadata,
}
