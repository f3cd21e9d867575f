//! Common types and traits shared across Consilium crates.
//!
//! This crate provides the data model that flows through the pipeline
//! (requests, analyses, knowledge records, interactions), the responder
//! trait, the shared error type, and the process-wide metrics handle.

pub mod analysis;
pub mod error;
pub mod interaction;
pub mod knowledge;
pub mod metrics;
pub mod request;
pub mod traits;
pub mod validation;

pub use analysis::{Analysis, Complexity};
pub use error::{ConsiliumError, Result};
pub use interaction::{Interaction, InteractionStatus, ResponderOutcome, ResponderResult};
pub use knowledge::{Contribution, KnowledgeKind, KnowledgePayload, KnowledgeRecord, ScoredRecord};
pub use metrics::{HealthReport, HealthStatus, Metrics, MetricsSnapshot};
pub use request::{OrchestratorResponse, Request, ResponseMetadata};
pub use traits::Responder;
