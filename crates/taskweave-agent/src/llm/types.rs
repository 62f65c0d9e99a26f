//! Core types for model interaction.
//!
//! These types model the data flowing between the agent core and model
//! providers.  They are provider-agnostic at this layer; the [`super::client`]
//! module translates them into provider-specific wire formats.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// The role of a participant in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions that shape model behavior.
    System,
    /// Input from the human user.
    User,
    /// Output from the model.
    Assistant,
}

/// The kind of attachment carried by a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    /// An image (drives vision routing and flat token accounting).
    Image,
    /// Any other file.
    File,
}

/// A non-text payload attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// The kind of attachment.
    pub kind: AttachmentKind,

    /// Original filename or label.
    pub name: String,
}

impl Attachment {
    /// Create an image attachment.
    pub fn image(name: impl Into<String>) -> Self {
        Self {
            kind: AttachmentKind::Image,
            name: name.into(),
        }
    }

    /// Create a generic file attachment.
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            kind: AttachmentKind::File,
            name: name.into(),
        }
    }

    /// Whether this attachment is an image.
    pub fn is_image(&self) -> bool {
        self.kind == AttachmentKind::Image
    }
}

/// A single message in a conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who produced this message.
    pub role: Role,

    /// The textual content of the message.
    #[serde(default)]
    pub content: String,

    /// Attachments carried by this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    /// Attach files or images to the message.
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

/// A full request to send to a model provider.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// The backend model identifier (e.g. `"claude-sonnet-4-20250514"`).
    pub model: String,

    /// The conversation history.
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature (0.0 = deterministic).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens the model may generate in this turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Token usage information returned by the model.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Number of tokens in the input (prompt).
    pub input_tokens: u32,
    /// Number of tokens generated by the model.
    pub output_tokens: u32,
}

/// The response from a model after processing a turn.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// The model's text output.
    pub content: String,

    /// Token usage for this request, when reported by the provider.
    pub usage: Usage,
}

// ---------------------------------------------------------------------------
// Backend seam
// ---------------------------------------------------------------------------

/// The seam between the agent core and a concrete model provider.
///
/// [`super::client::LlmClient`] is the production implementation; tests
/// drive the planner and compactor with scripted mock backends.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send a chat request and return the full response.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
