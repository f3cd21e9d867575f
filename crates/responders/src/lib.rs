//! Specialist responders and concurrent dispatch.
//!
//! - **Research**: facts, prior art, background
//! - **Planning**: step-by-step plans and sequencing
//! - **Writing**: documents and explanations for an audience
//! - **Review**: critique of code, designs, or proposals
//! - **Infrastructure**: deployment, scaling, reliability
//! - **Security**: threats, vulnerabilities, access control
//!
//! ```text
//!   Analysis ──► ResponderPool::dispatch_all
//!                  │  one tokio task per responder
//!      ┌───────────┼───────────┐
//!      ▼           ▼           ▼
//!  Research   Infrastructure  Security     (each: own timeout)
//!      │           │           │
//!      └───── join bounded by dispatch deadline ─────► DispatchOutcome
//! ```

pub mod context;
pub mod kind;
pub mod pool;
pub mod registry;
pub mod specialist;

pub use context::{CONTEXT_HEADING, ContextBuilder};
pub use kind::ResponderKind;
pub use pool::{DispatchOutcome, ResponderPool};
pub use registry::ResponderRegistry;
pub use specialist::{ResponderConfig, SpecialistResponder};
