//! Model interaction: wire types, provider client, capability catalog, and
//! the message router.

pub mod catalog;
pub mod client;
pub mod router;
pub mod types;

pub use catalog::{ModelCapability, ModelCatalog, ModelSpec};
pub use client::{LlmClient, LlmClientConfig, LlmProvider};
pub use router::{
    AnalysisResult, Complexity, ConversationMode, DetectedFlags, LARGE_CONTEXT_THRESHOLD,
    RouteRequest, RoutingReason, analyze,
};
pub use types::{
    Attachment, AttachmentKind, ChatBackend, ChatMessage, ChatRequest, ChatResponse, Role, Usage,
};
