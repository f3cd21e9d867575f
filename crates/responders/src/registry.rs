//! Startup-time registry of the responders that can be dispatched.

use std::collections::HashMap;
use std::sync::Arc;

use consilium_common::Responder;
use consilium_llm::LlmClient;
use tracing::info;

use crate::kind::ResponderKind;
use crate::specialist::{ResponderConfig, SpecialistResponder};

/// Ordered set of responders keyed by id.
///
/// Registration order is roster order. Re-registering an id replaces the
/// responder in place.
#[derive(Default, Clone)]
pub struct ResponderRegistry {
    responders: Vec<Arc<dyn Responder>>,
    index: HashMap<String, usize>,
}

impl ResponderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`SpecialistResponder`] per enabled roster kind.
    pub fn from_config(
        llm: Arc<dyn LlmClient>,
        overrides: &HashMap<String, ResponderConfig>,
    ) -> Self {
        let mut registry = Self::new();
        for kind in ResponderKind::ALL {
            let config = overrides.get(kind.id()).cloned().unwrap_or_default();
            if !config.enabled {
                info!(responder = kind.id(), "Responder disabled by configuration");
                continue;
            }
            registry.register(Arc::new(SpecialistResponder::with_config(
                kind,
                &config,
                llm.clone(),
            )));
        }
        info!(responders = ?registry.ids(), "Responder registry ready");
        registry
    }

    pub fn register(&mut self, responder: Arc<dyn Responder>) {
        let id = responder.id().to_string();
        match self.index.get(&id) {
            Some(&position) => self.responders[position] = responder,
            None => {
                self.index.insert(id, self.responders.len());
                self.responders.push(responder);
            }
        }
    }

    pub fn with(mut self, responder: Arc<dyn Responder>) -> Self {
        self.register(responder);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Responder>> {
        self.index.get(id).map(|&i| self.responders[i].clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Position in roster order, used to order fallback output.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.responders.iter().map(|r| r.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.responders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responders.is_empty()
    }
}
