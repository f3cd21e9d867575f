//! Configuration for the orchestrator.
//!
//! Everything is loaded from one TOML file; every key has a default, so an
//! empty file is a valid configuration.
//!
//! On Unix, [`OrchestratorConfig::from_file`] also checks the file's
//! permissions:
//!
//! - Config file must be a regular file
//! - Rejects world-writable files
//! - Rejects world-readable files containing API keys

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use consilium_common::validation::{DEFAULT_MAX_REQUEST_CHARS, validate_tenant_id};
use consilium_common::{ConsiliumError, Result};
use consilium_knowledge::{KnowledgeConfig, VectorBackendConfig};
use consilium_llm::{EmbeddingConfig, LlmConfig};
use consilium_responders::{ResponderConfig, ResponderKind};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Main orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Completion backend used by the classifier, responders and synthesis
    #[serde(default)]
    pub llm: LlmConfig,

    /// Embedding backend used by the knowledge store
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Cache, retrieval defaults and vector backend
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Bounds the whole request, persistence included
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Bounds the whole dispatch fan-in
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,

    /// Bounds each responder call
    #[serde(default = "default_responder_timeout_ms")]
    pub responder_timeout_ms: u64,

    /// Bounds retrieval; on expiry the request continues without knowledge
    #[serde(default = "default_retrieval_timeout_ms")]
    pub retrieval_timeout_ms: u64,

    /// Bounds the persistence stage, which also runs after a request timeout
    /// with whatever time is left
    #[serde(default = "default_persist_timeout_ms")]
    pub persist_timeout_ms: u64,

    /// Records rendered into each responder's context block
    #[serde(default = "default_context_records")]
    pub context_records: usize,

    #[serde(default = "default_context_max_tokens")]
    pub context_max_tokens: usize,

    /// Responder used when classification fails
    #[serde(default = "default_responder")]
    pub default_responder: String,

    #[serde(default = "default_max_responders")]
    pub max_responders: usize,

    /// Answers shorter than this are not stored as solutions
    #[serde(default = "default_solution_min_chars")]
    pub solution_min_chars: usize,

    #[serde(default = "default_true")]
    pub persist_solutions: bool,

    /// Return a lone successful answer without a synthesis call
    #[serde(default = "default_true")]
    pub skip_single_synthesis: bool,

    #[serde(default = "default_max_request_chars")]
    pub max_request_chars: usize,

    /// Per-responder overrides, keyed by responder id
    #[serde(default)]
    pub responders: HashMap<String, ResponderConfig>,

    /// Per-tenant retrieval overrides, keyed by tenant id
    #[serde(default)]
    pub tenants: HashMap<String, TenantOverride>,
}

/// Retrieval settings for a single tenant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantOverride {
    pub top_k: Option<usize>,
    pub min_similarity: Option<f32>,
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_dispatch_timeout_ms() -> u64 {
    45_000
}

fn default_responder_timeout_ms() -> u64 {
    30_000
}

fn default_retrieval_timeout_ms() -> u64 {
    5_000
}

fn default_persist_timeout_ms() -> u64 {
    10_000
}

fn default_context_records() -> usize {
    3
}

fn default_context_max_tokens() -> usize {
    2048
}

fn default_responder() -> String {
    ResponderKind::Research.id().to_string()
}

fn default_max_responders() -> usize {
    3
}

fn default_solution_min_chars() -> usize {
    200
}

fn default_true() -> bool {
    true
}

fn default_max_request_chars() -> usize {
    DEFAULT_MAX_REQUEST_CHARS
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            knowledge: KnowledgeConfig::default(),
            request_timeout_ms: default_request_timeout_ms(),
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
            responder_timeout_ms: default_responder_timeout_ms(),
            retrieval_timeout_ms: default_retrieval_timeout_ms(),
            persist_timeout_ms: default_persist_timeout_ms(),
            context_records: default_context_records(),
            context_max_tokens: default_context_max_tokens(),
            default_responder: default_responder(),
            max_responders: default_max_responders(),
            solution_min_chars: default_solution_min_chars(),
            persist_solutions: true,
            skip_single_synthesis: true,
            max_request_chars: default_max_request_chars(),
            responders: HashMap::new(),
            tenants: HashMap::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Load and validate configuration from a TOML file.
    ///
    /// On Unix the file must be a regular file, not world-writable, and not
    /// world-readable if it contains an API key.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();

        #[cfg(unix)]
        validate_config_file_permissions(path)?;

        let config = Self::from_file_unchecked(path)?;

        if config.has_inline_api_key() {
            warn!(
                "API key found in config file '{}'. Prefer environment variables \
                 (OPENAI_API_KEY, ANTHROPIC_API_KEY).",
                path.display()
            );
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file without permission checks or
    /// validation.
    pub fn from_file_unchecked(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml(&content)?)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn has_inline_api_key(&self) -> bool {
        let qdrant_key = matches!(
            &self.knowledge.backend,
            VectorBackendConfig::Qdrant { api_key: Some(_), .. }
        );
        self.llm.api_key.is_some() || self.embedding.api_key.is_some() || qdrant_key
    }

    /// Reject configurations the pipeline cannot honor.
    pub fn validate(&self) -> Result<()> {
        let capacities = [
            ("knowledge.cache_capacity", self.knowledge.cache_capacity),
            ("knowledge.top_k", self.knowledge.top_k),
            ("max_responders", self.max_responders),
            ("max_request_chars", self.max_request_chars),
            ("llm.max_concurrent_requests", self.llm.max_concurrent_requests),
            (
                "embedding.max_concurrent_requests",
                self.embedding.max_concurrent_requests,
            ),
        ];
        for (key, value) in capacities {
            if value == 0 {
                return Err(ConsiliumError::Config(format!("{key} must be at least 1")));
            }
        }

        let timeouts = [
            ("request_timeout_ms", self.request_timeout_ms),
            ("dispatch_timeout_ms", self.dispatch_timeout_ms),
            ("responder_timeout_ms", self.responder_timeout_ms),
            ("retrieval_timeout_ms", self.retrieval_timeout_ms),
            ("persist_timeout_ms", self.persist_timeout_ms),
        ];
        for (key, value) in timeouts {
            if value == 0 {
                return Err(ConsiliumError::Config(format!("{key} must be positive")));
            }
        }

        if self.responder_timeout_ms > self.dispatch_timeout_ms {
            return Err(ConsiliumError::Config(format!(
                "responder_timeout_ms ({}) exceeds dispatch_timeout_ms ({})",
                self.responder_timeout_ms, self.dispatch_timeout_ms
            )));
        }
        let stages = [
            ("dispatch_timeout_ms", self.dispatch_timeout_ms),
            ("retrieval_timeout_ms", self.retrieval_timeout_ms),
            ("persist_timeout_ms", self.persist_timeout_ms),
        ];
        for (key, value) in stages {
            if value > self.request_timeout_ms {
                return Err(ConsiliumError::Config(format!(
                    "{key} ({value}) exceeds request_timeout_ms ({})",
                    self.request_timeout_ms
                )));
            }
        }

        check_similarity("knowledge.min_similarity", self.knowledge.min_similarity)?;

        for id in self.responders.keys() {
            if ResponderKind::from_id(id).is_none() {
                return Err(ConsiliumError::Config(format!(
                    "unknown responder '{id}' in [responders]"
                )));
            }
        }

        if ResponderKind::from_id(&self.default_responder).is_none() {
            return Err(ConsiliumError::Config(format!(
                "default_responder '{}' is not a known responder",
                self.default_responder
            )));
        }
        if self
            .responders
            .get(&self.default_responder)
            .is_some_and(|r| !r.enabled)
        {
            return Err(ConsiliumError::Config(format!(
                "default_responder '{}' is disabled",
                self.default_responder
            )));
        }

        for (tenant, overrides) in &self.tenants {
            validate_tenant_id(tenant)
                .map_err(|e| ConsiliumError::Config(format!("[tenants.{tenant}]: {e}")))?;
            if overrides.top_k == Some(0) {
                return Err(ConsiliumError::Config(format!(
                    "tenants.{tenant}.top_k must be at least 1"
                )));
            }
            if let Some(min) = overrides.min_similarity {
                check_similarity(&format!("tenants.{tenant}.min_similarity"), min)?;
            }
        }

        Ok(())
    }

    /// `(top_k, min_similarity)` for a tenant, with overrides applied.
    pub fn retrieval_for(&self, tenant_id: &str) -> (usize, f32) {
        let overrides = self.tenants.get(tenant_id);
        (
            overrides
                .and_then(|o| o.top_k)
                .unwrap_or(self.knowledge.top_k),
            overrides
                .and_then(|o| o.min_similarity)
                .unwrap_or(self.knowledge.min_similarity),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn responder_timeout(&self) -> Duration {
        Duration::from_millis(self.responder_timeout_ms)
    }

    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval_timeout_ms)
    }

    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }
}

fn check_similarity(key: &str, value: f32) -> Result<()> {
    if !(-1.0..=1.0).contains(&value) {
        return Err(ConsiliumError::Config(format!(
            "{key} must be within [-1, 1], got {value}"
        )));
    }
    Ok(())
}

/// Validate config file permissions on Unix systems.
///
/// - File must be a regular file (not a directory or device)
/// - File must not be world-writable
/// - If the file holds an API key, it must not be world-readable
#[cfg(unix)]
fn validate_config_file_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;

    if !metadata.is_file() {
        anyhow::bail!("Config path '{}' is not a regular file", path.display());
    }

    let permission_bits = metadata.permissions().mode() & 0o777;

    if permission_bits & 0o002 != 0 {
        anyhow::bail!(
            "Config file '{}' is world-writable (mode {:04o}). Fix with: chmod o-w {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    let content = std::fs::read_to_string(path)?;
    let has_api_key = content.lines().any(|line| {
        let line = line.trim_start();
        !line.starts_with('#') && line.starts_with("api_key")
    });

    if has_api_key && permission_bits & 0o004 != 0 {
        anyhow::bail!(
            "Config file '{}' contains an API key but is world-readable (mode {:04o}). \
             Fix with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    if has_api_key && permission_bits & 0o040 != 0 {
        warn!(
            "Config file '{}' contains an API key and is group-readable (mode {:04o})",
            path.display(),
            permission_bits
        );
    }

    Ok(())
}
