//! The Consilium request pipeline.
//!
//! ```text
//!   Request
//!      │
//!      ▼
//! ┌──────────────┐   LLM, JSON-only, strictly validated
//! │  Classifier  │──────────────────────────────────────► Analysis
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐   tenant-scoped, never fails
//! │KnowledgeStore│──────────────────────────────────────► context records
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐   one task per responder, deadline-bounded join
//! │ ResponderPool│──────────────────────────────────────► DispatchOutcome
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐   apology / passthrough / LLM / concatenation
//! │  Synthesizer │──────────────────────────────────────► content
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐   trace always, solution when worth keeping
//! │   Persister  │
//! └──────────────┘
//! ```

pub mod analysis;
pub mod config;
pub mod persistence;
pub mod pipeline;
pub mod synthesis;

pub use analysis::{Classifier, extract_json_object, heuristic_keywords};
pub use config::{OrchestratorConfig, TenantOverride};
pub use persistence::{PersistReport, PersistencePolicy, Persister};
pub use pipeline::{Orchestrator, Stage};
pub use synthesis::{APOLOGY, Synthesis, Synthesizer, concatenate};
