//! Context compaction -- keep the conversation within the selected model's
//! context budget by summarizing older turns.
//!
//! Token usage is estimated with a character-count heuristic, checked against
//! the model's compaction threshold before every model call.  When the
//! conversation is near the limit, all non-system messages except the most
//! recent turns are replaced by a single generated summary; the summary
//! request runs on the catalog's cost-effective model.  Summarization
//! failures degrade to a placeholder summary -- compaction never blocks the
//! surrounding conversation.

use tracing::{debug, info, warn};

use crate::llm::catalog::{ModelCapability, ModelCatalog, ModelSpec};
use crate::llm::types::{ChatBackend, ChatMessage, ChatRequest, Role};

// ---------------------------------------------------------------------------
// Token estimation
// ---------------------------------------------------------------------------

/// Baseline characters per token for prose.
const CHARS_PER_TOKEN_PROSE: f64 = 4.0;

/// Characters per token when code fences are present (code tokenizes denser).
const CHARS_PER_TOKEN_CODE: f64 = 3.5;

/// Characters per token for JSON-dense content.
const CHARS_PER_TOKEN_JSON: f64 = 3.0;

/// Flat token cost charged per image attachment.
const IMAGE_TOKENS: u32 = 765;

/// Per-message framing overhead (role markers and separators).
const ROLE_OVERHEAD_TOKENS: u32 = 4;

/// Estimate the token count of a piece of text.
///
/// Character-count heuristic: 4 chars/token for prose, 3.5 when code fences
/// are present, 3 for JSON-dense content.  Monotonically non-decreasing in
/// input length for a fixed content type.
pub fn estimate_tokens(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }

    let divisor = if text.contains("```") {
        CHARS_PER_TOKEN_CODE
    } else if is_json_dense(text) {
        CHARS_PER_TOKEN_JSON
    } else {
        CHARS_PER_TOKEN_PROSE
    };

    (text.chars().count() as f64 / divisor).ceil() as u32
}

/// Whether text reads as JSON rather than prose: it either starts with a
/// JSON container or carries a high density of structural characters.
fn is_json_dense(text: &str) -> bool {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return true;
    }

    let total = text.len().max(1);
    let structural = text
        .bytes()
        .filter(|b| matches!(b, b'{' | b'}' | b'[' | b']' | b'"' | b':' | b','))
        .count();
    structural * 100 / total > 15
}

/// A conversation-wide token estimate.
#[derive(Debug, Clone, Copy)]
pub struct ConversationEstimate {
    /// Estimated total tokens across all messages.
    pub tokens: u32,

    /// Whether the estimate has reached the model's compaction threshold.
    pub near_limit: bool,
}

/// Estimate the token footprint of a full conversation against a model.
///
/// Sums per-message estimates (role overhead + content) plus a flat
/// [`IMAGE_TOKENS`] cost per image attachment.
pub fn estimate_conversation_tokens(
    messages: &[ChatMessage],
    model: &ModelSpec,
) -> ConversationEstimate {
    let tokens: u32 = messages
        .iter()
        .map(|msg| {
            let images = msg.attachments.iter().filter(|a| a.is_image()).count() as u32;
            ROLE_OVERHEAD_TOKENS + estimate_tokens(&msg.content) + images * IMAGE_TOKENS
        })
        .sum();

    ConversationEstimate {
        tokens,
        near_limit: tokens >= model.compaction_threshold,
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for context compaction behavior.
#[derive(Debug, Clone)]
pub struct CompactionConfig {
    /// Number of recent non-system messages preserved verbatim.
    pub keep_recent: usize,

    /// Word budget given to the summarizer.
    pub summary_word_limit: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            keep_recent: 10,
            summary_word_limit: 500,
        }
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// The outcome of a compaction pass.
#[derive(Debug, Clone)]
pub struct CompactionResult {
    /// The (possibly rewritten) conversation.
    pub messages: Vec<ChatMessage>,

    /// Whether older turns were actually replaced by a summary.
    pub was_compacted: bool,

    /// The generated summary, when compaction happened.
    pub summary: Option<String>,

    /// How many messages the summary replaced.
    pub summarized_messages: usize,

    /// Whether the placeholder summary was used because summarization failed.
    pub used_fallback: bool,

    /// Token estimate of the returned conversation.
    pub estimated_tokens: u32,
}

// ---------------------------------------------------------------------------
// Compaction
// ---------------------------------------------------------------------------

/// Compact the conversation if it is near the model's context limit.
///
/// Below the threshold this is a no-op (`was_compacted == false`, input
/// returned unchanged, same estimate), regardless of message count.
/// Otherwise all non-system messages except the most recent
/// [`CompactionConfig::keep_recent`] are summarized on the catalog's
/// cost-effective model and replaced by one synthetic assistant message.
/// Reassembled order: original system messages, the summary message, then
/// the preserved recent turns.
///
/// Never fails: a summarization error is replaced by a generic placeholder.
pub async fn compact_context(
    messages: &[ChatMessage],
    model: &ModelSpec,
    backend: &dyn ChatBackend,
    catalog: &ModelCatalog,
    config: &CompactionConfig,
) -> CompactionResult {
    let estimate = estimate_conversation_tokens(messages, model);

    if !estimate.near_limit {
        debug!(
            tokens = estimate.tokens,
            threshold = model.compaction_threshold,
            "conversation below compaction threshold"
        );
        return CompactionResult {
            messages: messages.to_vec(),
            was_compacted: false,
            summary: None,
            summarized_messages: 0,
            used_fallback: false,
            estimated_tokens: estimate.tokens,
        };
    }

    // Separate system messages (always preserved) from the conversation.
    let system_messages: Vec<ChatMessage> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .cloned()
        .collect();
    let conversation: Vec<ChatMessage> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .cloned()
        .collect();

    if conversation.len() <= config.keep_recent {
        // Near the limit but nothing old enough to fold away.
        debug!(
            conversation = conversation.len(),
            keep_recent = config.keep_recent,
            "not enough messages to compact"
        );
        return CompactionResult {
            messages: messages.to_vec(),
            was_compacted: false,
            summary: None,
            summarized_messages: 0,
            used_fallback: false,
            estimated_tokens: estimate.tokens,
        };
    }

    let split_point = conversation.len() - config.keep_recent;
    let old_messages = &conversation[..split_point];
    let recent_messages = &conversation[split_point..];

    info!(
        old_count = old_messages.len(),
        recent_count = recent_messages.len(),
        tokens = estimate.tokens,
        "compacting conversation history"
    );

    let (summary, used_fallback) =
        match summarize_messages(old_messages, backend, catalog, config).await {
            Ok(summary) => (summary, false),
            Err(e) => {
                warn!(error = %e, "summarization failed, using placeholder summary");
                (
                    format!(
                        "Earlier conversation ({} messages) could not be summarized; \
                         key details from that span may be missing.",
                        old_messages.len()
                    ),
                    true,
                )
            }
        };

    let mut compacted = Vec::with_capacity(system_messages.len() + 1 + recent_messages.len());
    compacted.extend(system_messages);
    compacted.push(ChatMessage::assistant(format!(
        "[Summary of {count} earlier messages]\n{summary}",
        count = old_messages.len(),
    )));
    compacted.extend_from_slice(recent_messages);

    let new_estimate = estimate_conversation_tokens(&compacted, model);

    info!(
        original = messages.len(),
        compacted = compacted.len(),
        tokens = new_estimate.tokens,
        "compaction complete"
    );

    CompactionResult {
        messages: compacted,
        was_compacted: true,
        summary: Some(summary),
        summarized_messages: old_messages.len(),
        used_fallback,
        estimated_tokens: new_estimate.tokens,
    }
}

/// Ask the cost-effective model to summarize the older conversation span.
async fn summarize_messages(
    messages: &[ChatMessage],
    backend: &dyn ChatBackend,
    catalog: &ModelCatalog,
    config: &CompactionConfig,
) -> crate::error::Result<String> {
    let summarizer = catalog
        .with_capability(ModelCapability::CostEffective)
        .unwrap_or_else(|| catalog.default_model());

    let transcript = format_messages_for_summary(messages);
    let request = ChatRequest {
        model: summarizer.model_id.clone(),
        messages: vec![
            ChatMessage::system(format!(
                "You summarize conversation history. Preserve decisions made, facts \
                 established, and open items still pending. Stay within {} words.",
                config.summary_word_limit,
            )),
            ChatMessage::user(transcript),
        ],
        temperature: Some(0.0),
        max_tokens: Some(1024),
    };

    debug!(model = %summarizer.model_id, "requesting conversation summary");

    let response = backend.chat(&request).await?;
    Ok(response.content)
}

/// Format a slice of messages into a readable transcript for summarization.
fn format_messages_for_summary(messages: &[ChatMessage]) -> String {
    let mut buf = String::with_capacity(messages.len() * 200);
    for msg in messages {
        let role_label = match msg.role {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        buf.push_str(role_label);
        buf.push_str(": ");
        buf.push_str(&msg.content);
        for attachment in &msg.attachments {
            buf.push_str(&format!(" [attachment: {}]", attachment.name));
        }
        buf.push('\n');
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
