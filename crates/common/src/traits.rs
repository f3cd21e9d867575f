//! Core responder trait.
//!
//! Defined in `consilium-common` so that both the responder pool and the
//! orchestrator can reference it without circular dependencies.

use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A specialist that answers a request given a block of retrieved context.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Stable identifier used in analyses and results.
    fn id(&self) -> &str;

    /// Human-readable name, used to label synthesized output.
    fn name(&self) -> &str;

    /// Produce an answer. `context` may be empty when nothing was retrieved.
    async fn respond(&self, request_text: &str, context: &str) -> Result<String>;
}

#[async_trait]
impl<T: Responder + ?Sized> Responder for Arc<T> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    async fn respond(&self, request_text: &str, context: &str) -> Result<String> {
        (**self).respond(request_text, context).await
    }
}
