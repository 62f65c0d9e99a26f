//! Message analyzer and model router.
//!
//! A pure, synchronous decision function that inspects the current turn
//! (text, attachments, mode, accumulated context size, optional manual
//! override) and selects a backend model from the capability catalog,
//! together with a human-readable routing reason.
//!
//! Decision order, first match wins:
//!
//! 1. Valid manual override.
//! 2. Estimated total tokens exceed [`LARGE_CONTEXT_THRESHOLD`] — this
//!    always takes precedence over the next three checks.
//! 3. The mode requires tool execution.
//! 4. Deep-reasoning linguistic cues in the message text.
//! 5. Image attachments (keeps the default chat model; vision analysis is
//!    a separate internal step).
//! 6. Default.

use std::sync::LazyLock;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use serde::{Deserialize, Serialize};

use crate::compaction::estimate_tokens;
use crate::llm::catalog::{ModelCapability, ModelCatalog, ModelSpec};
use crate::llm::types::Attachment;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// How the current turn is being handled by the surrounding product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationMode {
    /// Plain conversational turn.
    Chat,
    /// The turn may plan and execute tools.
    Agentic,
}

/// Everything the router looks at for one turn.
#[derive(Debug, Clone)]
pub struct RouteRequest<'a> {
    /// The new message text.
    pub text: &'a str,

    /// Attachments carried by the new message.
    pub attachments: &'a [Attachment],

    /// The conversation mode for this turn.
    pub mode: ConversationMode,

    /// Estimated tokens already accumulated in the conversation.
    pub context_tokens: u32,

    /// Manual model override (catalog key), if the operator forced one.
    pub override_key: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// The enumerated justification for a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingReason {
    /// No special condition detected.
    Default,
    /// The message carries image attachments.
    ImageDetected,
    /// The mode requires tool execution.
    ToolRequired,
    /// Deep-reasoning cues detected in the message text.
    DeepReasoning,
    /// The conversation exceeds the large-context threshold.
    LargeContext,
    /// A manual override was supplied and resolved.
    DevOverride,
}

impl std::fmt::Display for RoutingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Default => "default",
            Self::ImageDetected => "image_detected",
            Self::ToolRequired => "tool_required",
            Self::DeepReasoning => "deep_reasoning",
            Self::LargeContext => "large_context",
            Self::DevOverride => "dev_override",
        };
        write!(f, "{s}")
    }
}

/// Capability cues detected in the turn.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DetectedFlags {
    /// The message carries image attachments.
    pub has_images: bool,
    /// The turn requires tool execution.
    pub needs_tools: bool,
    /// Deep-reasoning linguistic cues were found.
    pub deep_reasoning: bool,
    /// The message looks like a multi-step request.
    pub multi_step: bool,
}

/// Estimated complexity of a multi-step request, used downstream when
/// deciding whether to invoke the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// Short, single-action requests.
    Simple,
    /// Moderate requests with some coordination.
    Medium,
    /// Long requests chaining several actions.
    Complex,
}

/// The router's full output for one turn.
///
/// Recomputed per turn, never persisted by this subsystem.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    /// The selected backend model.
    pub model: ModelSpec,

    /// Why that model was selected.
    pub reason: RoutingReason,

    /// Capability cues detected in the turn.
    pub flags: DetectedFlags,

    /// The token estimate that drove the decision (context + new message).
    pub estimated_tokens: u32,

    /// Complexity classification of the request.
    pub complexity: Complexity,
}

// ---------------------------------------------------------------------------
// Fixed linguistic cues
// ---------------------------------------------------------------------------

/// Token estimate above which the large-context model is always selected.
pub const LARGE_CONTEXT_THRESHOLD: u32 = 200_000;

/// Phrases that signal a request for deep reasoning.
const DEEP_REASONING_CUES: &[&str] = &[
    "think through",
    "think step by step",
    "step by step",
    "reason about",
    "explain why",
    "pros and cons",
    "trade-off",
    "tradeoff",
    "root cause",
    "in depth",
    "deep dive",
    "prove that",
    "derive",
    "implications",
    "architecture decision",
];

/// Conjunctions counted when classifying request complexity.
const CONJUNCTION_CUES: &[&str] = &[
    " and ",
    " then ",
    " after ",
    " also ",
    " plus ",
    " followed by ",
    " as well as ",
];

static DEEP_REASONING: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .build(DEEP_REASONING_CUES)
        .expect("deep-reasoning cue table must compile")
});

static CONJUNCTIONS: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .build(CONJUNCTION_CUES)
        .expect("conjunction cue table must compile")
});

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Analyze one turn and select a backend model.
///
/// Pure function of its inputs; the catalog is read-only.  When a detected
/// condition has no model carrying the matching capability, the reason is
/// still reported and the default model is used — the reason describes the
/// decision, the catalog decides the backend.
pub fn analyze(request: &RouteRequest<'_>, catalog: &ModelCatalog) -> AnalysisResult {
    let message_tokens = estimate_tokens(request.text);
    let estimated_tokens = request.context_tokens.saturating_add(message_tokens);

    let flags = DetectedFlags {
        has_images: request.attachments.iter().any(Attachment::is_image),
        needs_tools: request.mode == ConversationMode::Agentic,
        deep_reasoning: DEEP_REASONING.is_match(request.text),
        multi_step: looks_multi_step(request.text),
    };
    let complexity = classify_complexity(request.text);

    let (model, reason) = decide(request, catalog, estimated_tokens, &flags);

    tracing::debug!(
        model = %model.key,
        reason = %reason,
        estimated_tokens,
        ?complexity,
        "routed turn"
    );

    AnalysisResult {
        model,
        reason,
        flags,
        estimated_tokens,
        complexity,
    }
}

fn decide(
    request: &RouteRequest<'_>,
    catalog: &ModelCatalog,
    estimated_tokens: u32,
    flags: &DetectedFlags,
) -> (ModelSpec, RoutingReason) {
    // 1. Manual override, when it resolves to a catalog entry.
    if let Some(key) = request.override_key {
        match catalog.by_key(key) {
            Ok(model) => return (model.clone(), RoutingReason::DevOverride),
            Err(_) => {
                tracing::warn!(key = %key, "ignoring unknown model override");
            }
        }
    }

    // 2. Large context wins over tools, reasoning, and images.
    if estimated_tokens > LARGE_CONTEXT_THRESHOLD {
        let model = catalog
            .with_capability(ModelCapability::LargeContext)
            .unwrap_or_else(|| catalog.default_model());
        return (model.clone(), RoutingReason::LargeContext);
    }

    // 3. Tool execution.
    if flags.needs_tools {
        let model = catalog
            .with_capability(ModelCapability::ToolUse)
            .unwrap_or_else(|| catalog.default_model());
        return (model.clone(), RoutingReason::ToolRequired);
    }

    // 4. Deep reasoning.
    if flags.deep_reasoning {
        let model = catalog
            .with_capability(ModelCapability::Reasoning)
            .unwrap_or_else(|| catalog.default_model());
        return (model.clone(), RoutingReason::DeepReasoning);
    }

    // 5. Images keep the default chat model; vision runs as a separate
    //    internal step.
    if flags.has_images {
        return (catalog.default_model().clone(), RoutingReason::ImageDetected);
    }

    (catalog.default_model().clone(), RoutingReason::Default)
}

/// Quick multi-step check on the message text alone.
///
/// The planner's [`crate::planner::is_multi_step`] adds registry-aware
/// signals; this variant feeds the detected-flags surface.
fn looks_multi_step(text: &str) -> bool {
    CONJUNCTIONS.is_match(text) && text.split_whitespace().count() > 5
}

/// Classify request complexity from word count and conjunction count.
fn classify_complexity(text: &str) -> Complexity {
    let word_count = text.split_whitespace().count();
    let conjunctions = CONJUNCTIONS.find_iter(text).count();

    if word_count > 40 || conjunctions >= 3 {
        Complexity::Complex
    } else if word_count > 15 || conjunctions >= 1 {
        Complexity::Medium
    } else {
        Complexity::Simple
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
