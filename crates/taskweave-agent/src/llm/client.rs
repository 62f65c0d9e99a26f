//! Multi-provider model client.
//!
//! Supports the **Anthropic Messages API** and the **OpenAI Chat Completions
//! API** (including OpenAI-compatible endpoints) in non-streaming mode.
//! Implements [`ChatBackend`] so the planner and compactor stay decoupled
//! from the concrete provider.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::error::{AgentError, Result};
use crate::llm::types::{ChatBackend, ChatRequest, ChatResponse, Role, Usage};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default Anthropic API base URL.
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Default OpenAI API base URL.
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// HTTP timeout for model requests.
const REQUEST_TIMEOUT_SECS: u64 = 120;

// ---------------------------------------------------------------------------
// Provider enum
// ---------------------------------------------------------------------------

/// Identifies which provider the client should target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// Anthropic Messages API.
    Anthropic,
    /// OpenAI Chat Completions API (also covers OpenAI-compatible endpoints).
    OpenAi,
}

impl LlmProvider {
    fn name(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }
}

// ---------------------------------------------------------------------------
// Client configuration
// ---------------------------------------------------------------------------

/// Configuration for connecting to a single provider endpoint.
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    /// Which provider this configuration targets.
    pub provider: LlmProvider,
    /// API key for authentication.
    pub api_key: String,
    /// Base URL for the API.
    pub base_url: String,
    /// Default maximum tokens per response.
    pub max_tokens: u32,
}

impl LlmClientConfig {
    /// Create a configuration for the Anthropic API.
    pub fn anthropic(api_key: impl Into<String>) -> Self {
        Self {
            provider: LlmProvider::Anthropic,
            api_key: api_key.into(),
            base_url: ANTHROPIC_BASE_URL.to_owned(),
            max_tokens: 4096,
        }
    }

    /// Create a configuration for the OpenAI API.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            provider: LlmProvider::OpenAi,
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_owned(),
            max_tokens: 4096,
        }
    }

    /// Create a configuration for any OpenAI-compatible endpoint.
    pub fn openai_compatible(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            provider: LlmProvider::OpenAi,
            api_key: api_key.into(),
            base_url: base_url.into(),
            max_tokens: 4096,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A model client for the Anthropic Messages API or the OpenAI Chat
/// Completions API.
#[derive(Debug, Clone)]
pub struct LlmClient {
    config: LlmClientConfig,
    http: reqwest::Client,
}

impl LlmClient {
    /// Create a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::MissingApiKey`] when the key is empty -- the one
    /// condition surfaced as a hard error rather than a structured outcome.
    pub fn new(config: LlmClientConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(AgentError::MissingApiKey {
                provider: config.provider.name().to_owned(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AgentError::LlmRequestFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { config, http })
    }

    /// The provider this client targets.
    pub fn provider(&self) -> LlmProvider {
        self.config.provider
    }

    // -----------------------------------------------------------------------
    // Anthropic
    // -----------------------------------------------------------------------

    async fn chat_anthropic(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/v1/messages", self.config.base_url);

        // The Messages API takes system prompts as a top-level field.
        let system: String = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let messages: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::User => "user",
                        _ => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
        });
        if !system.is_empty() {
            body["system"] = json!(system);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.config.api_key).map_err(|_| {
                AgentError::LlmRequestFailed {
                    reason: "api key contains invalid header characters".into(),
                }
            })?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        tracing::debug!(model = %request.model, url = %url, "sending anthropic chat request");

        let response = self
            .http
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let payload: Value = response.json().await?;

        if !status.is_success() {
            return Err(AgentError::LlmRequestFailed {
                reason: format!("anthropic returned {status}: {payload}"),
            });
        }

        let content = payload["content"]
            .as_array()
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find(|b| b["type"] == "text")
                    .and_then(|b| b["text"].as_str())
            })
            .ok_or_else(|| AgentError::LlmParseFailed {
                reason: format!("anthropic response has no text block: {payload}"),
            })?
            .to_owned();

        Ok(ChatResponse {
            content,
            usage: parse_usage(&payload["usage"], "input_tokens", "output_tokens"),
        })
    }

    // -----------------------------------------------------------------------
    // OpenAI
    // -----------------------------------------------------------------------

    async fn chat_openai(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let mut body = json!({
            "model": request.model,
            "messages": messages,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.config.api_key)).map_err(|_| {
                AgentError::LlmRequestFailed {
                    reason: "api key contains invalid header characters".into(),
                }
            })?,
        );

        tracing::debug!(model = %request.model, url = %url, "sending openai chat request");

        let response = self
            .http
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let payload: Value = response.json().await?;

        if !status.is_success() {
            return Err(AgentError::LlmRequestFailed {
                reason: format!("openai returned {status}: {payload}"),
            });
        }

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AgentError::LlmParseFailed {
                reason: format!("openai response has no message content: {payload}"),
            })?
            .to_owned();

        Ok(ChatResponse {
            content,
            usage: parse_usage(&payload["usage"], "prompt_tokens", "completion_tokens"),
        })
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        match self.config.provider {
            LlmProvider::Anthropic => self.chat_anthropic(request).await,
            LlmProvider::OpenAi => self.chat_openai(request).await,
        }
    }
}

fn parse_usage(usage: &Value, input_key: &str, output_key: &str) -> Usage {
    Usage {
        input_tokens: usage[input_key].as_u64().unwrap_or(0) as u32,
        output_tokens: usage[output_key].as_u64().unwrap_or(0) as u32,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
