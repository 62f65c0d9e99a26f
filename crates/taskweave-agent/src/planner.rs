//! Task planner.
//!
//! Turns a free-text goal into a validated [`TaskPlan`]: an ordered,
//! dependency-linked list of tool invocations drawn from the tool registry.
//! The decomposition itself is delegated to a model primed with the rendered
//! tool catalog; everything around that call -- multi-step detection,
//! post-processing, tool-name reconciliation, and validation -- is
//! deterministic.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use taskweave_tools::{Scope, ToolRegistry};

use crate::error::{AgentError, Result};
use crate::llm::types::{ChatBackend, ChatMessage, ChatRequest};

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

/// Upper bound on steps per plan.
pub const MAX_PLAN_STEPS: usize = 10;

/// Coarse duration estimate derived from step count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationClass {
    /// 1-3 steps.
    Fast,
    /// 4-6 steps.
    Medium,
    /// 7 or more steps.
    Slow,
}

impl DurationClass {
    /// Duration class for a plan with `step_count` steps.
    pub fn for_step_count(step_count: usize) -> Self {
        match step_count {
            0..=3 => Self::Fast,
            4..=6 => Self::Medium,
            _ => Self::Slow,
        }
    }
}

/// Lifecycle state of a whole plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    /// Created by the planner, awaiting approval.
    #[default]
    Draft,
    /// Approved for execution.
    Approved,
    /// Currently being executed.
    Executing,
    /// All steps completed or skipped.
    Completed,
    /// A step failed, validation failed mid-run, or the run timed out.
    Failed,
    /// Execution was cancelled by the caller.
    Cancelled,
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Approved => "approved",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle state of a single step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Not yet started.
    #[default]
    Pending,
    /// Currently executing.
    Running,
    /// Completed successfully.  Terminal.
    Completed,
    /// Failed after exhausting the retry.  Terminal.
    Failed,
    /// Never ran (e.g. the plan aborted first).  Terminal.
    Skipped,
}

/// One tool invocation within a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStep {
    /// Unique id within the plan (`step_1`, `step_2`, ...).
    pub id: String,

    /// 1-based position in the plan.
    pub order: u32,

    /// Human-readable description of what this step does.
    pub description: String,

    /// The registered tool to invoke.
    pub tool_name: String,

    /// Parameters passed to the tool (scoping identifiers injected by the
    /// planner).
    #[serde(default)]
    pub params: Map<String, Value>,

    /// Ids of steps that must complete before this one can run.
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Current lifecycle state.
    #[serde(default)]
    pub status: StepStatus,

    /// The tool result, once the step completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// The failure message, once the step failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A dependency-ordered decomposition of a natural-language goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPlan {
    /// Unique plan identifier.
    pub id: Uuid,

    /// The original goal text.
    pub goal: String,

    /// Ordered list of steps.
    pub steps: Vec<TaskStep>,

    /// Coarse duration estimate.
    pub estimated_duration: DurationClass,

    /// Whether human approval gates execution.  Currently always true.
    pub requires_approval: bool,

    /// When the plan was created.
    pub created_at: DateTime<Utc>,

    /// Current lifecycle state.
    #[serde(default)]
    pub status: PlanStatus,

    /// Free-form summary (set on rejection or completion).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl TaskPlan {
    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&TaskStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Number of completed steps.
    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }

    /// Whether every step reached `Completed` or `Skipped`.
    pub fn all_steps_settled(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(s.status, StepStatus::Completed | StepStatus::Skipped))
    }
}

// ---------------------------------------------------------------------------
// Multi-step detection
// ---------------------------------------------------------------------------

/// Sequencing and enumeration phrases that signal a multi-step request.
const SEQUENCE_CUES: &[&str] = &[
    "and then",
    "after that",
    "first,",
    "first ",
    "next,",
    "then ",
    "finally",
    "followed by",
    "once that",
    "as well as",
    "and also",
    "for each",
];

static SEQUENCE_MATCHER: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .build(SEQUENCE_CUES)
        .expect("sequence cue table must compile")
});

static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:\d+[.)]|[-*])\s+\S").expect("list marker pattern must compile")
});

/// Advisory heuristic: does this request look like it needs a plan?
///
/// True when the text carries sequencing/enumeration phrases, references at
/// least two distinct registered tools, or contains a numbered/bulleted
/// list.  The caller decides whether to actually invoke planning.
pub fn is_multi_step(text: &str, registry: &ToolRegistry) -> bool {
    if SEQUENCE_MATCHER.is_match(text) {
        return true;
    }
    if registry.referenced_tools(text) >= 2 {
        return true;
    }
    LIST_MARKER.is_match(text)
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Configuration for the task planner.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Backend model identifier used for plan generation.
    pub model: String,

    /// Maximum tokens for the planning response.
    pub max_tokens: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_owned(),
            max_tokens: 4096,
        }
    }
}

/// Decomposes goals into executable plans using a model.
pub struct Planner {
    backend: Arc<dyn ChatBackend>,
    registry: ToolRegistry,
    config: PlannerConfig,
}

impl Planner {
    /// Create a new planner over the given backend and tool registry.
    pub fn new(backend: Arc<dyn ChatBackend>, registry: ToolRegistry, config: PlannerConfig) -> Self {
        Self {
            backend,
            registry,
            config,
        }
    }

    /// Decompose a goal into a validated [`TaskPlan`].
    ///
    /// Workspace/team scoping identifiers are injected into every step's
    /// parameters.  Generation failures return an error with no partial
    /// plan; validation failures carry the full list of problems.
    pub async fn build_plan(&self, goal: &str, scope: &Scope) -> Result<TaskPlan> {
        let system_prompt = self.build_system_prompt();
        let user_prompt = format!("Decompose this request into an executable plan:\n\n{goal}");

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(user_prompt),
            ],
            temperature: Some(0.0),
            max_tokens: Some(self.config.max_tokens),
        };

        let response =
            self.backend
                .chat(&request)
                .await
                .map_err(|e| AgentError::PlanningFailed {
                    reason: format!("plan generation failed: {e}"),
                })?;

        let generated = parse_generated_plan(&response.content)?;
        let plan = self.assemble_plan(goal, scope, generated);

        let errors = validate_plan(&plan, &self.registry);
        if !errors.is_empty() {
            return Err(AgentError::PlanValidation { errors });
        }

        tracing::info!(
            plan_id = %plan.id,
            step_count = plan.steps.len(),
            duration = ?plan.estimated_duration,
            "plan generated"
        );

        Ok(plan)
    }

    /// Build the system prompt for the planning call.
    fn build_system_prompt(&self) -> String {
        let catalog = self.registry.render_catalog(None);

        format!(
            r#"You are a task planner. Decompose the user's request into an ordered sequence of tool invocations.

## Available Tools
{catalog}
## Output Format
Respond with valid JSON (no markdown fencing) in this exact structure:
{{
  "goal": "Restatement of the request",
  "steps": [
    {{
      "description": "What this step does",
      "tool": "name_of_tool",
      "params": {{}},
      "depends_on": []
    }}
  ],
  "estimated_duration": "fast"
}}

## Rules
- Use only the tools listed above, exactly one tool per step.
- Order steps so that every dependency comes before its dependents.
- `depends_on` lists the 1-based numbers of earlier steps whose results this step needs.
- At most {MAX_PLAN_STEPS} steps.
- estimated_duration: "fast" for 1-3 steps, "medium" for 4-6, "slow" for 7 or more."#,
        )
    }

    /// Post-process a generated plan into a normalized [`TaskPlan`].
    ///
    /// Clamps to [`MAX_PLAN_STEPS`], injects scoping identifiers into every
    /// step's parameters, assigns deterministic `step_N` ids, defaults
    /// dependencies, marks all steps pending, and reconciles unknown tool
    /// names against the registry.
    fn assemble_plan(&self, goal: &str, scope: &Scope, mut generated: GeneratedPlan) -> TaskPlan {
        if generated.steps.len() > MAX_PLAN_STEPS {
            tracing::warn!(
                generated = generated.steps.len(),
                max = MAX_PLAN_STEPS,
                "generated plan too long, truncating"
            );
            generated.steps.truncate(MAX_PLAN_STEPS);
        }

        let step_count = generated.steps.len();
        let steps: Vec<TaskStep> = generated
            .steps
            .into_iter()
            .enumerate()
            .map(|(i, generated_step)| {
                let order = (i + 1) as u32;

                let mut params = generated_step.params;
                params.insert(
                    "workspace_id".to_owned(),
                    Value::String(scope.workspace_id.clone()),
                );
                if let Some(ref team_id) = scope.team_id {
                    params.insert("team_id".to_owned(), Value::String(team_id.clone()));
                }

                let tool_name = self.reconcile_tool_name(generated_step.tool);

                TaskStep {
                    id: format!("step_{order}"),
                    order,
                    description: generated_step.description,
                    tool_name,
                    params,
                    depends_on: generated_step
                        .depends_on
                        .into_iter()
                        .map(|n| format!("step_{n}"))
                        .collect(),
                    status: StepStatus::Pending,
                    result: None,
                    error: None,
                }
            })
            .collect();

        TaskPlan {
            id: Uuid::now_v7(),
            goal: goal.to_owned(),
            steps,
            estimated_duration: DurationClass::for_step_count(step_count),
            requires_approval: true,
            created_at: Utc::now(),
            status: PlanStatus::Draft,
            summary: None,
        }
    }

    /// Remap an unregistered tool name to the closest registered one.
    ///
    /// Names with no plausible match are left unchanged and caught by
    /// validation.
    fn reconcile_tool_name(&self, name: String) -> String {
        if self.registry.contains(&name) {
            return name;
        }
        match self.registry.closest_match(&name) {
            Some(matched) => {
                tracing::debug!(from = %name, to = %matched, "remapped unknown tool name");
                matched
            }
            None => name,
        }
    }
}

// ---------------------------------------------------------------------------
// Generated-plan parsing
// ---------------------------------------------------------------------------

/// The raw shape produced by the planning model.
#[derive(Debug, Deserialize)]
struct GeneratedPlan {
    #[serde(default)]
    #[allow(dead_code)]
    goal: String,
    steps: Vec<GeneratedStep>,
}

#[derive(Debug, Deserialize)]
struct GeneratedStep {
    description: String,
    tool: String,
    #[serde(default)]
    params: Map<String, Value>,
    /// 1-based numbers of earlier steps this one depends on.
    #[serde(default)]
    depends_on: Vec<u32>,
}

/// Parse the model's JSON response into a [`GeneratedPlan`].
fn parse_generated_plan(text: &str) -> Result<GeneratedPlan> {
    let json_str = extract_json_block(text);

    let generated: GeneratedPlan =
        serde_json::from_str(json_str).map_err(|e| AgentError::PlanningFailed {
            reason: format!("failed to parse plan JSON: {e}"),
        })?;

    if generated.steps.is_empty() {
        return Err(AgentError::PlanningFailed {
            reason: "plan contains zero steps".into(),
        });
    }

    Ok(generated)
}

/// Try to extract a JSON block from text that might be wrapped in markdown
/// code fences.
fn extract_json_block(text: &str) -> &str {
    let trimmed = text.trim();

    // ```json ... ``` fences.
    if let Some(start) = trimmed.find("```json") {
        let json_start = start + 7;
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    // ``` ... ``` fences without a language tag.
    if let Some(start) = trimmed.find("```") {
        let json_start = start + 3;
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    trimmed
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a plan against its structural invariants and the registry.
///
/// Returns human-readable problem descriptions; an empty list means the
/// plan is valid.
pub fn validate_plan(plan: &TaskPlan, registry: &ToolRegistry) -> Vec<String> {
    let mut errors = Vec::new();

    if plan.steps.is_empty() {
        errors.push("plan has no steps".to_owned());
        return errors;
    }
    if plan.steps.len() > MAX_PLAN_STEPS {
        errors.push(format!(
            "plan has {} steps, maximum is {MAX_PLAN_STEPS}",
            plan.steps.len()
        ));
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for step in &plan.steps {
        if !seen_ids.insert(step.id.as_str()) {
            errors.push(format!("duplicate step id `{}`", step.id));
        }
    }

    let ids: HashSet<&str> = plan.steps.iter().map(|s| s.id.as_str()).collect();
    for step in &plan.steps {
        for dep in &step.depends_on {
            if dep == &step.id {
                errors.push(format!("step `{}` depends on itself", step.id));
            } else if !ids.contains(dep.as_str()) {
                errors.push(format!(
                    "step `{}` depends on unknown step `{dep}`",
                    step.id
                ));
            }
        }
        if !registry.contains(&step.tool_name) {
            errors.push(format!(
                "unknown tool `{}` in step `{}`",
                step.tool_name, step.id
            ));
        }
    }

    if let Some(cycle_member) = find_dependency_cycle(plan) {
        errors.push(format!(
            "dependency cycle involving step `{cycle_member}`"
        ));
    }

    errors
}

/// Detect a cycle in the dependency relation; returns a step id on the
/// cycle, if any.
fn find_dependency_cycle(plan: &TaskPlan) -> Option<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let index: HashMap<&str, usize> = plan
        .steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();
    let mut marks = vec![Mark::Unvisited; plan.steps.len()];

    fn visit(
        i: usize,
        plan: &TaskPlan,
        index: &HashMap<&str, usize>,
        marks: &mut Vec<Mark>,
    ) -> Option<String> {
        match marks[i] {
            Mark::Done => return None,
            Mark::InProgress => return Some(plan.steps[i].id.clone()),
            Mark::Unvisited => {}
        }
        marks[i] = Mark::InProgress;
        for dep in &plan.steps[i].depends_on {
            if let Some(&j) = index.get(dep.as_str()) {
                if let Some(cycle) = visit(j, plan, index, marks) {
                    return Some(cycle);
                }
            }
        }
        marks[i] = Mark::Done;
        None
    }

    for i in 0..plan.steps.len() {
        if let Some(cycle) = visit(i, plan, &index, &mut marks) {
            return Some(cycle);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::llm::types::{ChatResponse, Usage};
    use async_trait::async_trait;
    use taskweave_tools::{
        ActionKind, Tool, ToolCategory, ToolContext, ToolMetadata, ToolOutcome,
    };

    struct NamedTool {
        name: String,
        keywords: Vec<String>,
    }

    impl NamedTool {
        fn boxed(name: &str, keywords: &[&str]) -> Arc<dyn Tool> {
            Arc::new(Self {
                name: name.to_owned(),
                keywords: keywords.iter().map(|s| s.to_string()).collect(),
            })
        }
    }

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn metadata(&self) -> ToolMetadata {
            ToolMetadata {
                display_name: self.name.replace('_', " "),
                category: ToolCategory::Creation,
                action: ActionKind::Create,
                requires_approval: true,
                is_reversible: true,
                entity: "work_item".into(),
                keywords: self.keywords.clone(),
                examples: vec![],
            }
        }

        async fn execute(
            &self,
            params: Value,
            _ctx: &ToolContext,
        ) -> taskweave_tools::Result<ToolOutcome> {
            Ok(ToolOutcome::Completed(params))
        }
    }

    struct ScriptedBackend {
        reply: String,
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn chat(&self, _request: &ChatRequest) -> crate::error::Result<ChatResponse> {
            Ok(ChatResponse {
                content: self.reply.clone(),
                usage: Usage::default(),
            })
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl ChatBackend for FailingBackend {
        async fn chat(&self, _request: &ChatRequest) -> crate::error::Result<ChatResponse> {
            Err(AgentError::LlmRequestFailed {
                reason: "backend unavailable".into(),
            })
        }
    }

    fn test_registry() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry.register(NamedTool::boxed("create_work_item", &["work item", "ticket"]));
        registry.register(NamedTool::boxed("search_competitors", &["competitors"]));
        registry.register(NamedTool::boxed("summarize_board", &["summary"]));
        registry
    }

    fn two_step_reply() -> String {
        r#"{
            "goal": "research then record",
            "steps": [
                {
                    "description": "Search for competitors",
                    "tool": "search_competitors",
                    "params": {"query": "project tools"},
                    "depends_on": []
                },
                {
                    "description": "Create a work item for the findings",
                    "tool": "create_work_item",
                    "params": {"title": "Review competitors"},
                    "depends_on": [1]
                }
            ],
            "estimated_duration": "fast"
        }"#
        .to_owned()
    }

    #[tokio::test]
    async fn build_plan_normalizes_and_scopes_steps() {
        let planner = Planner::new(
            Arc::new(ScriptedBackend {
                reply: two_step_reply(),
            }),
            test_registry(),
            PlannerConfig::default(),
        );

        let scope = Scope::team("ws_42", "team_7");
        let plan = planner.build_plan("research competitors", &scope).await.unwrap();

        assert_eq!(plan.status, PlanStatus::Draft);
        assert!(plan.requires_approval);
        assert_eq!(plan.estimated_duration, DurationClass::Fast);
        assert_eq!(plan.steps.len(), 2);

        let first = &plan.steps[0];
        assert_eq!(first.id, "step_1");
        assert_eq!(first.order, 1);
        assert_eq!(first.status, StepStatus::Pending);
        assert_eq!(first.params["workspace_id"], "ws_42");
        assert_eq!(first.params["team_id"], "team_7");

        let second = &plan.steps[1];
        assert_eq!(second.id, "step_2");
        assert_eq!(second.depends_on, vec!["step_1"]);
        assert_eq!(second.params["title"], "Review competitors");
    }

    #[tokio::test]
    async fn build_plan_remaps_near_miss_tool_names() {
        // "Search_Competitors" and "work_item" both miss the registry but
        // have case-insensitive substring matches.
        let reply = r#"{
            "steps": [
                {"description": "Find rivals", "tool": "Search_Competitors", "params": {}, "depends_on": []},
                {"description": "Record one", "tool": "work_item", "params": {}, "depends_on": [1]}
            ]
        }"#;

        let planner = Planner::new(
            Arc::new(ScriptedBackend {
                reply: reply.to_owned(),
            }),
            test_registry(),
            PlannerConfig::default(),
        );

        let plan = planner
            .build_plan("find rivals", &Scope::workspace("ws_1"))
            .await
            .unwrap();
        assert_eq!(plan.steps[0].tool_name, "search_competitors");
        assert_eq!(plan.steps[1].tool_name, "create_work_item");
    }

    #[tokio::test]
    async fn build_plan_rejects_unmatchable_tool() {
        let reply = r#"{
            "steps": [
                {"description": "Impossible", "tool": "launch_rocket", "params": {}, "depends_on": []}
            ]
        }"#;

        let planner = Planner::new(
            Arc::new(ScriptedBackend {
                reply: reply.to_owned(),
            }),
            test_registry(),
            PlannerConfig::default(),
        );

        let result = planner
            .build_plan("launch", &Scope::workspace("ws_1"))
            .await;
        match result {
            Err(AgentError::PlanValidation { errors }) => {
                assert!(errors.iter().any(|e| e.contains("unknown tool `launch_rocket`")));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn generation_failure_yields_no_plan() {
        let planner = Planner::new(
            Arc::new(FailingBackend),
            test_registry(),
            PlannerConfig::default(),
        );

        let result = planner
            .build_plan("anything", &Scope::workspace("ws_1"))
            .await;
        assert!(matches!(result, Err(AgentError::PlanningFailed { .. })));
    }

    #[tokio::test]
    async fn oversized_plan_is_clamped() {
        let steps: Vec<String> = (0..14)
            .map(|i| {
                format!(
                    r#"{{"description": "Step {i}", "tool": "summarize_board", "params": {{}}, "depends_on": []}}"#
                )
            })
            .collect();
        let reply = format!(r#"{{"steps": [{}]}}"#, steps.join(","));

        let planner = Planner::new(
            Arc::new(ScriptedBackend { reply }),
            test_registry(),
            PlannerConfig::default(),
        );

        let plan = planner
            .build_plan("huge", &Scope::workspace("ws_1"))
            .await
            .unwrap();
        assert_eq!(plan.steps.len(), MAX_PLAN_STEPS);
        assert_eq!(plan.estimated_duration, DurationClass::Slow);
    }

    #[test]
    fn duration_class_from_step_count() {
        assert_eq!(DurationClass::for_step_count(1), DurationClass::Fast);
        assert_eq!(DurationClass::for_step_count(3), DurationClass::Fast);
        assert_eq!(DurationClass::for_step_count(4), DurationClass::Medium);
        assert_eq!(DurationClass::for_step_count(6), DurationClass::Medium);
        assert_eq!(DurationClass::for_step_count(7), DurationClass::Slow);
    }

    #[test]
    fn multi_step_detection_scenarios() {
        let registry = test_registry();

        // Sequencing phrase plus two tool references.
        assert!(is_multi_step(
            "search competitors and then create a work item for each finding",
            &registry
        ));

        // Two distinct tool references without sequencing words.
        assert!(is_multi_step(
            "give me a summary plus a new ticket for the regression",
            &registry
        ));

        // Numbered list.
        assert!(is_multi_step(
            "please do:\n1. audit the board\n2. flag stale items",
            &registry
        ));

        // Plain single-action request.
        assert!(!is_multi_step("what changed yesterday?", &registry));
    }

    #[test]
    fn extract_json_variants() {
        let fenced = "Here you go:\n```json\n{\"steps\": []}\n```";
        assert_eq!(extract_json_block(fenced), r#"{"steps": []}"#);

        let bare_fence = "```\n{\"steps\": []}\n```";
        assert_eq!(extract_json_block(bare_fence), r#"{"steps": []}"#);

        let plain = r#"{"steps": []}"#;
        assert_eq!(extract_json_block(plain), plain);
    }

    #[test]
    fn parse_rejects_empty_steps() {
        assert!(parse_generated_plan(r#"{"steps": []}"#).is_err());
        assert!(parse_generated_plan("not json").is_err());
    }

    fn bare_step(id: &str, order: u32, tool: &str, deps: &[&str]) -> TaskStep {
        TaskStep {
            id: id.to_owned(),
            order,
            description: format!("step {order}"),
            tool_name: tool.to_owned(),
            params: Map::new(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            status: StepStatus::Pending,
            result: None,
            error: None,
        }
    }

    fn bare_plan(steps: Vec<TaskStep>) -> TaskPlan {
        TaskPlan {
            id: Uuid::now_v7(),
            goal: "test".into(),
            steps,
            estimated_duration: DurationClass::Fast,
            requires_approval: true,
            created_at: Utc::now(),
            status: PlanStatus::Draft,
            summary: None,
        }
    }

    #[test]
    fn validation_flags_self_dependency() {
        let registry = test_registry();
        let plan = bare_plan(vec![bare_step("step_1", 1, "summarize_board", &["step_1"])]);
        let errors = validate_plan(&plan, &registry);
        assert!(errors.iter().any(|e| e.contains("depends on itself")));
    }

    #[test]
    fn validation_flags_unknown_dependency() {
        let registry = test_registry();
        let plan = bare_plan(vec![bare_step("step_1", 1, "summarize_board", &["step_9"])]);
        let errors = validate_plan(&plan, &registry);
        assert!(errors.iter().any(|e| e.contains("unknown step `step_9`")));
    }

    #[test]
    fn validation_flags_duplicate_ids() {
        let registry = test_registry();
        let plan = bare_plan(vec![
            bare_step("step_1", 1, "summarize_board", &[]),
            bare_step("step_1", 2, "summarize_board", &[]),
        ]);
        let errors = validate_plan(&plan, &registry);
        assert!(errors.iter().any(|e| e.contains("duplicate step id")));
    }

    #[test]
    fn validation_flags_dependency_cycle() {
        let registry = test_registry();
        let plan = bare_plan(vec![
            bare_step("step_1", 1, "summarize_board", &["step_2"]),
            bare_step("step_2", 2, "summarize_board", &["step_1"]),
        ]);
        let errors = validate_plan(&plan, &registry);
        assert!(errors.iter().any(|e| e.contains("dependency cycle")));
    }

    #[test]
    fn valid_plan_passes_validation() {
        let registry = test_registry();
        let plan = bare_plan(vec![
            bare_step("step_1", 1, "search_competitors", &[]),
            bare_step("step_2", 2, "create_work_item", &["step_1"]),
        ]);
        assert!(validate_plan(&plan, &registry).is_empty());
    }
}
