//! Runtime configuration.
//!
//! Settings load once at startup from an optional TOML file, then
//! environment variables override individual fields (`TASKWEAVE_*` plus the
//! provider API keys).  There is no hot reload; the process restarts to pick
//! up changes.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AgentError, Result};
use crate::executor::ExecutorConfig;
use crate::llm::client::{LlmClientConfig, LlmProvider};
use crate::planner::PlannerConfig;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Top-level runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Model provider: `"anthropic"` or `"openai"`.
    pub provider: String,

    /// API key; usually supplied via environment instead of the file.
    pub api_key: Option<String>,

    /// Override for the provider base URL (OpenAI-compatible endpoints).
    pub base_url: Option<String>,

    /// Planner settings.
    pub planner: PlannerSettings,

    /// Executor settings.
    pub executor: ExecutorSettings,
}

/// Planner-related settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    /// Backend model identifier used for plan generation.
    pub model: String,

    /// Maximum tokens for the planning response.
    pub max_tokens: u32,
}

/// Executor-related settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Wall-clock ceiling for a plan run, in seconds.
    pub timeout_secs: u64,

    /// Fixed inter-step (and retry) delay, in milliseconds.
    pub step_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_owned(),
            api_key: None,
            base_url: None,
            planner: PlannerSettings::default(),
            executor: ExecutorSettings::default(),
        }
    }
}

impl Default for PlannerSettings {
    fn default() -> Self {
        let defaults = PlannerConfig::default();
        Self {
            model: defaults.model,
            max_tokens: defaults.max_tokens,
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            step_delay_ms: 1_000,
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file, then apply environment
    /// overrides.
    ///
    /// A missing file is not an error -- defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) if path.exists() => {
                let content =
                    std::fs::read_to_string(path).map_err(|e| AgentError::ConfigError {
                        reason: format!("failed to read config file: {e}"),
                    })?;
                let settings: Settings =
                    toml::from_str(&content).map_err(|e| AgentError::ConfigError {
                        reason: format!("failed to parse config file: {e}"),
                    })?;
                info!(path = %path.display(), "settings loaded from file");
                settings
            }
            Some(path) => {
                warn!(path = %path.display(), "config file not found, using defaults");
                Settings::default()
            }
            None => Settings::default(),
        };

        settings.apply_env();
        Ok(settings)
    }

    /// Apply environment variable overrides.
    fn apply_env(&mut self) {
        if let Ok(provider) = std::env::var("TASKWEAVE_PROVIDER") {
            self.provider = provider;
        }
        if let Ok(model) = std::env::var("TASKWEAVE_PLANNER_MODEL") {
            self.planner.model = model;
        }
        if let Ok(secs) = std::env::var("TASKWEAVE_TIMEOUT_SECS") {
            match secs.parse() {
                Ok(parsed) => self.executor.timeout_secs = parsed,
                Err(_) => warn!(value = %secs, "ignoring invalid TASKWEAVE_TIMEOUT_SECS"),
            }
        }

        if self.api_key.is_none() {
            let key_var = match self.provider.as_str() {
                "openai" => "OPENAI_API_KEY",
                _ => "ANTHROPIC_API_KEY",
            };
            if let Ok(key) = std::env::var(key_var) {
                self.api_key = Some(key);
            }
        }
    }

    /// Build the model client configuration from these settings.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::MissingApiKey`] when no key was configured, and
    /// [`AgentError::ConfigError`] for an unknown provider name.
    pub fn llm_config(&self) -> Result<LlmClientConfig> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| AgentError::MissingApiKey {
                provider: self.provider.clone(),
            })?;

        let mut config = match self.provider.as_str() {
            "anthropic" => LlmClientConfig::anthropic(api_key),
            "openai" => LlmClientConfig::openai(api_key),
            other => {
                return Err(AgentError::ConfigError {
                    reason: format!("unknown provider `{other}`"),
                });
            }
        };
        if let Some(ref base_url) = self.base_url {
            config.base_url = base_url.clone();
        }
        Ok(config)
    }

    /// Build the planner configuration from these settings.
    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            model: self.planner.model.clone(),
            max_tokens: self.planner.max_tokens,
        }
    }

    /// Build the executor configuration from these settings.
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            timeout: Duration::from_secs(self.executor.timeout_secs),
            step_delay: Duration::from_millis(self.executor.step_delay_ms),
        }
    }
}

/// The provider enum for the configured provider name, if recognized.
pub fn provider_from_name(name: &str) -> Option<LlmProvider> {
    match name {
        "anthropic" => Some(LlmProvider::Anthropic),
        "openai" => Some(LlmProvider::OpenAi),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
