//! Capability model catalog.
//!
//! A declarative list of backend model descriptors, each tagged with the
//! capabilities it provides.  The router selects models by capability rather
//! than by identity, so swapping the concrete backend behind a capability is
//! a catalog edit, not a code change.
//!
//! Invariant: exactly one entry carries [`ModelCapability::Default`].
//! Callers must not assume any particular match count for other
//! capabilities — the catalog is free to have zero or many.

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// A declared trait of a backend model, used for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelCapability {
    /// The fallback chat model; exactly one catalog entry carries this.
    Default,
    /// Accepts very large prompts.
    LargeContext,
    /// Reliable structured tool invocation.
    ToolUse,
    /// Deep multi-step reasoning.
    Reasoning,
    /// Cheap per-token pricing, used for auxiliary calls like summarization.
    CostEffective,
    /// Low-latency responses.
    Speed,
    /// Suitable for realtime/voice surfaces.
    Realtime,
}

impl std::fmt::Display for ModelCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Default => "default",
            Self::LargeContext => "large_context",
            Self::ToolUse => "tool_use",
            Self::Reasoning => "reasoning",
            Self::CostEffective => "cost_effective",
            Self::Speed => "speed",
            Self::Realtime => "realtime",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Model descriptor
// ---------------------------------------------------------------------------

/// A single backend model entry in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Stable catalog key (e.g. `"chat-default"`).
    pub key: String,

    /// Backend-specific model identifier.
    pub model_id: String,

    /// Human-readable display name for UI surfaces.
    pub display_name: String,

    /// Capabilities this model provides.
    pub capabilities: Vec<ModelCapability>,

    /// Context window limit in tokens.
    pub context_limit: u32,

    /// Token count at which context compaction should trigger
    /// (typically 80% of [`ModelSpec::context_limit`]).
    pub compaction_threshold: u32,

    /// Input cost in USD per million tokens.
    pub input_cost_per_mtok: f64,

    /// Output cost in USD per million tokens.
    pub output_cost_per_mtok: f64,
}

impl ModelSpec {
    /// Whether this model declares the given capability.
    pub fn has_capability(&self, capability: ModelCapability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Compaction trigger as a fraction of the context limit.
const COMPACTION_FRACTION: f64 = 0.8;

fn threshold_for(context_limit: u32) -> u32 {
    (f64::from(context_limit) * COMPACTION_FRACTION) as u32
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// The capability model catalog.
///
/// Built once at startup (either [`ModelCatalog::builtin`] or a validated
/// custom list) and shared read-only.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<ModelSpec>,
}

impl ModelCatalog {
    /// Build a catalog from an explicit model list.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::CatalogInvalid`] unless exactly one entry
    /// carries the `default` capability, or if any key is duplicated.
    pub fn new(models: Vec<ModelSpec>) -> Result<Self> {
        let default_count = models
            .iter()
            .filter(|m| m.has_capability(ModelCapability::Default))
            .count();
        if default_count != 1 {
            return Err(AgentError::CatalogInvalid {
                reason: format!("expected exactly one default model, found {default_count}"),
            });
        }

        for (i, model) in models.iter().enumerate() {
            if models[..i].iter().any(|m| m.key == model.key) {
                return Err(AgentError::CatalogInvalid {
                    reason: format!("duplicate model key: {}", model.key),
                });
            }
        }

        Ok(Self { models })
    }

    /// The built-in catalog shipped with the agent.
    pub fn builtin() -> Self {
        let models = vec![
            ModelSpec {
                key: "chat-default".into(),
                model_id: "claude-sonnet-4-20250514".into(),
                display_name: "Claude Sonnet 4".into(),
                capabilities: vec![ModelCapability::Default, ModelCapability::ToolUse],
                context_limit: 200_000,
                compaction_threshold: threshold_for(200_000),
                input_cost_per_mtok: 3.0,
                output_cost_per_mtok: 15.0,
            },
            ModelSpec {
                key: "long-context".into(),
                model_id: "claude-sonnet-4-20250514".into(),
                display_name: "Claude Sonnet 4 (1M context)".into(),
                capabilities: vec![ModelCapability::LargeContext],
                context_limit: 1_000_000,
                compaction_threshold: threshold_for(1_000_000),
                input_cost_per_mtok: 6.0,
                output_cost_per_mtok: 22.5,
            },
            ModelSpec {
                key: "deep-reasoning".into(),
                model_id: "claude-opus-4-20250514".into(),
                display_name: "Claude Opus 4".into(),
                capabilities: vec![ModelCapability::Reasoning],
                context_limit: 200_000,
                compaction_threshold: threshold_for(200_000),
                input_cost_per_mtok: 15.0,
                output_cost_per_mtok: 75.0,
            },
            ModelSpec {
                key: "fast".into(),
                model_id: "claude-3-5-haiku-20241022".into(),
                display_name: "Claude Haiku 3.5".into(),
                capabilities: vec![
                    ModelCapability::CostEffective,
                    ModelCapability::Speed,
                    ModelCapability::Realtime,
                ],
                context_limit: 200_000,
                compaction_threshold: threshold_for(200_000),
                input_cost_per_mtok: 0.8,
                output_cost_per_mtok: 4.0,
            },
        ];

        // The built-in list upholds the invariant by construction.
        Self { models }
    }

    /// Look up a model by its catalog key.
    pub fn by_key(&self, key: &str) -> Result<&ModelSpec> {
        self.models
            .iter()
            .find(|m| m.key == key)
            .ok_or_else(|| AgentError::UnknownModel {
                key: key.to_owned(),
            })
    }

    /// The first model declaring the given capability, if any.
    pub fn with_capability(&self, capability: ModelCapability) -> Option<&ModelSpec> {
        self.models.iter().find(|m| m.has_capability(capability))
    }

    /// All models declaring the given capability, in catalog order.
    pub fn all_with_capability(&self, capability: ModelCapability) -> Vec<&ModelSpec> {
        self.models
            .iter()
            .filter(|m| m.has_capability(capability))
            .collect()
    }

    /// All catalog entries, for UI display.
    pub fn all(&self) -> &[ModelSpec] {
        &self.models
    }

    /// The single default model.
    pub fn default_model(&self) -> &ModelSpec {
        self.with_capability(ModelCapability::Default)
            .expect("catalog invariant: exactly one default model")
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
