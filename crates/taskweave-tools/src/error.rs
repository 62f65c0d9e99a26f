//! Tool error types.
//!
//! Every tool implementation and the registry surface errors through
//! [`ToolError`].  Validation errors are surfaced immediately to the caller;
//! execution errors are retried by the executor according to its policy.

/// Unified error type for tool invocation and lookup.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The parameters passed to a tool failed validation.  Never retried.
    #[error("invalid parameters for `{tool_name}`: {reason}")]
    InvalidParams { tool_name: String, reason: String },

    /// The tool ran but failed.  The executor may retry once.
    #[error("tool execution failed for `{tool_name}`: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    /// The requested tool is not present in the registry.
    #[error("unknown tool: {tool_name}")]
    NotFound { tool_name: String },

    /// The invocation observed the cancellation signal and stopped early.
    #[error("tool `{tool_name}` cancelled")]
    Cancelled { tool_name: String },
}

/// Convenience alias used throughout the tools crate.
pub type Result<T> = std::result::Result<T, ToolError>;
