//! Core tool trait and supporting types.
//!
//! Every capability the agent can invoke (creating a work item, running an
//! analysis, generating a strategy document, etc.) implements the [`Tool`]
//! trait, providing a uniform interface for the planner to describe and the
//! executor to invoke.  The concrete business logic behind each tool lives
//! outside this workspace; this crate defines only the contract.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Result, ToolError};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// The functional category of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Tools that create new entities (work items, documents, boards).
    Creation,
    /// Tools that inspect or evaluate existing data.
    Analysis,
    /// Tools that improve or restructure existing entities.
    Optimization,
    /// Tools that produce plans, roadmaps, or recommendations.
    Strategy,
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Creation => write!(f, "creation"),
            Self::Analysis => write!(f, "analysis"),
            Self::Optimization => write!(f, "optimization"),
            Self::Strategy => write!(f, "strategy"),
        }
    }
}

/// The verb class of a tool, used as a secondary registry index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Writes a new entity.
    Create,
    /// Reads existing data without modifying it.
    Read,
    /// Mutates an existing entity.
    Update,
    /// Queries internal or external sources.
    Search,
    /// Produces derived content (summaries, drafts, reports).
    Generate,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Read => write!(f, "read"),
            Self::Update => write!(f, "update"),
            Self::Search => write!(f, "search"),
            Self::Generate => write!(f, "generate"),
        }
    }
}

/// Descriptive metadata registered alongside a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    /// Human-readable display name (e.g. "Create Work Item").
    pub display_name: String,

    /// Functional category.
    pub category: ToolCategory,

    /// Verb class.
    pub action: ActionKind,

    /// Whether invoking this tool requires human approval first.
    pub requires_approval: bool,

    /// Whether the tool's effect can be undone.
    pub is_reversible: bool,

    /// The entity type this tool operates on (e.g. "work_item", "board").
    pub entity: String,

    /// Keywords used for discovery and intent matching.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Example natural-language invocations, rendered into the planner prompt.
    #[serde(default)]
    pub examples: Vec<String>,
}

// ---------------------------------------------------------------------------
// Invocation context
// ---------------------------------------------------------------------------

/// Tenant scoping for a tool invocation.
///
/// Every invocation is bound to a workspace; the planner injects these
/// identifiers into every generated step's parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    /// The workspace (tenant) the invocation belongs to.
    pub workspace_id: String,

    /// Optional team within the workspace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

impl Scope {
    /// Create a workspace-only scope.
    pub fn workspace(workspace_id: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            team_id: None,
        }
    }

    /// Create a workspace + team scope.
    pub fn team(workspace_id: impl Into<String>, team_id: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            team_id: Some(team_id.into()),
        }
    }
}

/// Per-invocation context handed to a tool.
///
/// Carries the call id for correlation, the tenant scope, and the shared
/// cancellation signal.  The executor polls the signal between steps; tools
/// performing long-running work may additionally observe it mid-flight via
/// [`ToolContext::is_cancelled`].
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Unique identifier for this invocation.
    pub call_id: Uuid,

    /// Tenant scoping.
    pub scope: Scope,

    /// Shared cooperative cancellation flag.
    pub cancelled: Arc<AtomicBool>,
}

impl ToolContext {
    /// Create a context with a fresh call id and its own cancellation flag.
    pub fn new(scope: Scope) -> Self {
        Self {
            call_id: Uuid::now_v7(),
            scope,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a context sharing an externally-owned cancellation flag.
    pub fn with_cancellation(scope: Scope, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            call_id: Uuid::now_v7(),
            scope,
            cancelled,
        }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// The result of a tool invocation.
///
/// A closed set of variants so callers match exhaustively instead of probing
/// the shape of a dynamic result object.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    /// The tool ran to completion and produced this result.
    Completed(Value),

    /// The tool produced a preview that needs confirmation before taking
    /// effect.  Confirmation happens through [`Tool::execute_confirmed`].
    NeedsConfirmation {
        /// One-line description of what will happen on confirmation.
        summary: String,
        /// The previewed effect (tool-specific shape).
        preview: Value,
    },
}

impl ToolOutcome {
    /// Whether this outcome is a confirmation preview.
    pub fn needs_confirmation(&self) -> bool {
        matches!(self, Self::NeedsConfirmation { .. })
    }
}

// ---------------------------------------------------------------------------
// Core trait
// ---------------------------------------------------------------------------

/// The universal tool interface.
///
/// The planner discovers tools through the registry's catalog rendering and
/// the executor invokes them via [`Tool::execute`].  Tools that gate their
/// effect behind a preview return [`ToolOutcome::NeedsConfirmation`]; the
/// executor then calls [`Tool::execute_confirmed`], since plan-level approval
/// already happened upstream.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique, machine-readable tool name (registry key).
    fn name(&self) -> &str;

    /// Descriptive metadata for this tool.
    fn metadata(&self) -> ToolMetadata;

    /// Execute the tool with the given JSON parameters.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutcome>;

    /// Execute the confirmed form of a previewed invocation.
    ///
    /// The default implementation re-runs [`Tool::execute`] and requires it
    /// to complete; tools with a distinct confirmation path override this.
    async fn execute_confirmed(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        match self.execute(params, ctx).await? {
            ToolOutcome::Completed(value) => Ok(value),
            ToolOutcome::NeedsConfirmation { .. } => Err(ToolError::ExecutionFailed {
                tool_name: self.name().to_owned(),
                reason: "tool returned another preview on the confirmed path".to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
