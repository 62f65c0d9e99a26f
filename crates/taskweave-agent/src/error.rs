//! Agent error types.
//!
//! All agent subsystems surface errors through [`AgentError`].  Each variant
//! carries enough context for callers to decide how to handle the failure.
//! Tool and model-call errors are caught at the boundary and turned into
//! structured outcomes; only genuinely unexpected conditions (e.g. a missing
//! API key) surface as errors to the caller.

use taskweave_tools::ToolError;

/// Unified error type for the agent core.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    // -- LLM errors ----------------------------------------------------------
    /// An HTTP request to the model provider failed.
    #[error("llm request failed: {reason}")]
    LlmRequestFailed { reason: String },

    /// The model response could not be parsed into the expected format.
    #[error("llm response parse error: {reason}")]
    LlmParseFailed { reason: String },

    /// The API key is missing for a provider that requires one.
    #[error("missing api key for provider: {provider}")]
    MissingApiKey { provider: String },

    // -- Catalog errors ------------------------------------------------------
    /// No model with the requested key exists in the catalog.
    #[error("unknown model key: {key}")]
    UnknownModel { key: String },

    /// The model catalog violates its own invariants.
    #[error("invalid model catalog: {reason}")]
    CatalogInvalid { reason: String },

    // -- Planner errors ------------------------------------------------------
    /// The planner could not decompose the goal into actionable steps.
    #[error("planning failed: {reason}")]
    PlanningFailed { reason: String },

    /// The generated plan failed validation.
    #[error("plan validation failed: {}", errors.join("; "))]
    PlanValidation { errors: Vec<String> },

    // -- Executor errors -----------------------------------------------------
    /// A plan was submitted for execution in a state other than `Approved`.
    #[error("plan is not approved for execution (status: {status})")]
    PlanNotApproved { status: String },

    /// A single-step execution request targeted a step that cannot run.
    #[error("step `{step_id}` is not runnable: {reason}")]
    StepNotRunnable { step_id: String, reason: String },

    // -- Approval errors -----------------------------------------------------
    /// An approval decision was applied to a plan in the wrong state.
    #[error("approval rejected: {reason}")]
    ApprovalInvalid { reason: String },

    // -- Configuration -------------------------------------------------------
    /// Configuration loading or validation failed.
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // -- Upstream crate errors -----------------------------------------------
    /// An error propagated from a tool invocation.
    #[error("tool error: {0}")]
    Tool(#[from] ToolError),
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        Self::LlmRequestFailed {
            reason: err.to_string(),
        }
    }
}
