//! Plan executor (agent loop).
//!
//! Drives an approved [`TaskPlan`] to a terminal state: picks the next
//! runnable step, invokes its tool, applies exactly one retry on failure,
//! reports progress, and terminates on completion, failure, timeout, or
//! cancellation.  Execution is a single sequential cursor over the
//! dependency DAG -- independent branches never run concurrently.
//!
//! The executor never returns an error: every failure is captured in the
//! returned [`ExecutionResult`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::mpsc;

use taskweave_tools::{Scope, ToolContext, ToolError, ToolOutcome, ToolRegistry};

use crate::error::{AgentError, Result};
use crate::planner::{PlanStatus, StepStatus, TaskPlan};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the plan executor.
///
/// The retry policy is fixed at exactly one retry with a fixed delay; the
/// inter-step delay doubles as the retry delay and as pacing between steps.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Wall-clock ceiling for a whole plan run.
    pub timeout: Duration,

    /// Fixed delay between steps and before the single retry.
    pub step_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            step_delay: Duration::from_millis(1_000),
        }
    }
}

// ---------------------------------------------------------------------------
// Progress events
// ---------------------------------------------------------------------------

/// Progress events emitted while a plan executes.
///
/// Delivered over an optional channel; the channel closing is the stream's
/// terminating sentinel.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A step transitioned to running.
    StepStart {
        /// 1-based position of the step.
        index: u32,
        /// The step id.
        step_id: String,
        /// Human-readable progress message.
        message: String,
    },

    /// A step completed successfully.
    StepComplete {
        /// 1-based position of the step.
        index: u32,
        /// The step id.
        step_id: String,
        /// Human-readable progress message.
        message: String,
    },

    /// The run reached a non-failure terminal state (completed or cancelled).
    ExecutionComplete {
        /// The final execution result.
        result: Box<ExecutionResult>,
    },

    /// The run failed (step failure, validation, or timeout).
    ExecutionFailed {
        /// The final execution result.
        result: Box<ExecutionResult>,
    },
}

// ---------------------------------------------------------------------------
// Execution result
// ---------------------------------------------------------------------------

/// The immutable outcome of one executor run.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Whether the plan ran to completion.
    pub success: bool,

    /// Number of steps that completed.
    pub completed_steps: usize,

    /// Total number of steps in the plan.
    pub total_steps: usize,

    /// Raw tool results keyed by step id.
    pub step_results: HashMap<String, Value>,

    /// Ordered error descriptions accumulated during the run.
    pub errors: Vec<String>,

    /// Wall-clock duration of the run.
    pub elapsed: Duration,

    /// Final snapshot of the plan.
    pub plan: TaskPlan,
}

// ---------------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------------

/// Caller-supplied state for one executor run.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Tenant scoping forwarded into every tool invocation.
    pub scope: Scope,

    /// Externally-owned cancellation flag, polled once per loop iteration.
    pub cancelled: Arc<AtomicBool>,

    /// Optional progress channel.
    pub progress: Option<mpsc::Sender<ProgressEvent>>,
}

impl ExecutionContext {
    /// Create a context with its own (never-set) cancellation flag.
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            cancelled: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    /// Share an externally-owned cancellation flag.
    pub fn with_cancellation(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// Attach a progress channel.
    pub fn with_progress(mut self, progress: mpsc::Sender<ProgressEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    async fn emit(&self, event: ProgressEvent) {
        if let Some(ref tx) = self.progress {
            // A closed channel means the consumer went away; execution
            // continues regardless.
            let _ = tx.send(event).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Step selection
// ---------------------------------------------------------------------------

/// Index of the next runnable step: the first `Pending` step in declaration
/// order whose dependencies are all `Completed`.
pub fn next_pending_step(plan: &TaskPlan) -> Option<usize> {
    plan.steps.iter().position(|step| {
        step.status == StepStatus::Pending
            && step.depends_on.iter().all(|dep| {
                plan.step(dep)
                    .is_some_and(|d| d.status == StepStatus::Completed)
            })
    })
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// A failed tool invocation, with its retry eligibility.
struct StepFailure {
    message: String,
    retryable: bool,
}

/// Executes approved plans against the tool registry.
pub struct Executor {
    registry: ToolRegistry,
    config: ExecutorConfig,
}

impl Executor {
    /// Create a new executor over the given registry.
    pub fn new(registry: ToolRegistry, config: ExecutorConfig) -> Self {
        Self { registry, config }
    }

    /// Execute an approved plan to a terminal state.
    ///
    /// The plan must be in [`PlanStatus::Approved`]; anything else produces
    /// an immediate failure result without running any step.
    pub async fn execute_task_plan(
        &self,
        mut plan: TaskPlan,
        ctx: &ExecutionContext,
    ) -> ExecutionResult {
        let started = Instant::now();
        let total_steps = plan.steps.len();
        let mut step_results: HashMap<String, Value> = HashMap::new();
        let mut errors: Vec<String> = Vec::new();

        if plan.status != PlanStatus::Approved {
            errors.push(format!(
                "plan is not approved for execution (status: {})",
                plan.status
            ));
            let result = finish(plan, step_results, errors, started, total_steps);
            ctx.emit(ProgressEvent::ExecutionFailed {
                result: Box::new(result.clone()),
            })
            .await;
            return result;
        }

        plan.status = PlanStatus::Executing;
        tracing::info!(plan_id = %plan.id, total_steps, "plan execution started");

        loop {
            // 1. Cancellation is polled once per iteration; a step already in
            //    flight finishes before the flag is observed.
            if ctx.cancelled.load(Ordering::SeqCst) {
                tracing::info!(plan_id = %plan.id, "plan execution cancelled");
                plan.status = PlanStatus::Cancelled;
                break;
            }

            // 2. Wall-clock ceiling, likewise checked between steps only.
            if started.elapsed() > self.config.timeout {
                tracing::warn!(
                    plan_id = %plan.id,
                    timeout = ?self.config.timeout,
                    "plan execution timed out"
                );
                errors.push(format!(
                    "execution timed out after {:?}",
                    self.config.timeout
                ));
                plan.status = PlanStatus::Failed;
                break;
            }

            // 3. Pick the next runnable step.
            let Some(index) = next_pending_step(&plan) else {
                if plan.all_steps_settled() {
                    plan.status = PlanStatus::Completed;
                } else {
                    let blocked = plan
                        .steps
                        .iter()
                        .filter(|s| s.status == StepStatus::Pending)
                        .count();
                    errors.push(format!(
                        "no runnable step remains; {blocked} steps blocked by failed dependencies"
                    ));
                    plan.status = PlanStatus::Failed;
                }
                break;
            };

            // 4. Run it.
            let (step_id, order, description, tool_name) = {
                let step = &mut plan.steps[index];
                step.status = StepStatus::Running;
                (
                    step.id.clone(),
                    step.order,
                    step.description.clone(),
                    step.tool_name.clone(),
                )
            };

            ctx.emit(ProgressEvent::StepStart {
                index: order,
                step_id: step_id.clone(),
                message: format!("Executing step {order}/{total_steps}: {description}"),
            })
            .await;

            // 5. Exactly one retry, after the fixed delay, unless the failure
            //    was a parameter validation error.
            let attempt_result = match self.invoke_tool(&plan.steps[index], ctx).await {
                Err(failure) if failure.retryable => {
                    tracing::warn!(
                        step_id = %step_id,
                        error = %failure.message,
                        "step failed, retrying once"
                    );
                    tokio::time::sleep(self.config.step_delay).await;
                    self.invoke_tool(&plan.steps[index], ctx).await
                }
                other => other,
            };

            match attempt_result {
                Ok(value) => {
                    let step = &mut plan.steps[index];
                    step.status = StepStatus::Completed;
                    step.result = Some(value.clone());
                    step_results.insert(step_id.clone(), value);

                    tracing::info!(step_id = %step_id, tool = %tool_name, "step completed");
                    ctx.emit(ProgressEvent::StepComplete {
                        index: order,
                        step_id: step_id.clone(),
                        message: format!("Completed step {order}/{total_steps}"),
                    })
                    .await;

                    // Pacing between steps (rate limiting downstream).
                    tokio::time::sleep(self.config.step_delay).await;
                }
                Err(failure) => {
                    tracing::error!(
                        step_id = %step_id,
                        tool = %tool_name,
                        error = %failure.message,
                        "step failed, aborting plan"
                    );

                    let step = &mut plan.steps[index];
                    step.status = StepStatus::Failed;
                    step.error = Some(failure.message.clone());
                    errors.push(format!("step {step_id} ({tool_name}): {}", failure.message));

                    // Fail fast: remaining pending steps will never run.
                    for remaining in &mut plan.steps {
                        if remaining.status == StepStatus::Pending {
                            remaining.status = StepStatus::Skipped;
                        }
                    }
                    plan.status = PlanStatus::Failed;
                    break;
                }
            }
        }

        let result = finish(plan, step_results, errors, started, total_steps);

        tracing::info!(
            plan_id = %result.plan.id,
            status = %result.plan.status,
            completed = result.completed_steps,
            total = result.total_steps,
            elapsed = ?result.elapsed,
            "plan execution finished"
        );

        let event = if result.plan.status == PlanStatus::Failed {
            ProgressEvent::ExecutionFailed {
                result: Box::new(result.clone()),
            }
        } else {
            ProgressEvent::ExecutionComplete {
                result: Box::new(result.clone()),
            }
        };
        ctx.emit(event).await;

        result
    }

    /// Execute exactly one step on demand (step-by-step approval mode).
    ///
    /// The step must be `Pending` with all dependencies `Completed`; it runs
    /// once with no retry.  The updated plan is returned whether the step
    /// succeeded or failed.
    pub async fn execute_step(
        &self,
        mut plan: TaskPlan,
        step_id: &str,
        ctx: &ExecutionContext,
    ) -> Result<TaskPlan> {
        let index = plan
            .steps
            .iter()
            .position(|s| s.id == step_id)
            .ok_or_else(|| AgentError::StepNotRunnable {
                step_id: step_id.to_owned(),
                reason: "no such step in plan".to_owned(),
            })?;

        let step = &plan.steps[index];
        if step.status != StepStatus::Pending {
            return Err(AgentError::StepNotRunnable {
                step_id: step_id.to_owned(),
                reason: format!("step status is {:?}, expected pending", step.status),
            });
        }
        for dep in &step.depends_on {
            let satisfied = plan
                .step(dep)
                .is_some_and(|d| d.status == StepStatus::Completed);
            if !satisfied {
                return Err(AgentError::StepNotRunnable {
                    step_id: step_id.to_owned(),
                    reason: format!("dependency `{dep}` is not completed"),
                });
            }
        }

        plan.steps[index].status = StepStatus::Running;
        match self.invoke_tool(&plan.steps[index], ctx).await {
            Ok(value) => {
                let step = &mut plan.steps[index];
                step.status = StepStatus::Completed;
                step.result = Some(value);
                tracing::info!(step_id = %step_id, "single step completed");
            }
            Err(failure) => {
                let step = &mut plan.steps[index];
                step.status = StepStatus::Failed;
                step.error = Some(failure.message.clone());
                tracing::warn!(step_id = %step_id, error = %failure.message, "single step failed");
            }
        }

        Ok(plan)
    }

    /// Invoke a step's tool, auto-confirming preview outcomes.
    async fn invoke_tool(
        &self,
        step: &crate::planner::TaskStep,
        ctx: &ExecutionContext,
    ) -> std::result::Result<Value, StepFailure> {
        let tool = self
            .registry
            .get(&step.tool_name)
            .map_err(|e| StepFailure {
                message: e.to_string(),
                retryable: false,
            })?;

        let tool_ctx = ToolContext::with_cancellation(ctx.scope.clone(), ctx.cancelled.clone());
        let params = Value::Object(step.params.clone());

        let outcome = tool
            .execute(params.clone(), &tool_ctx)
            .await
            .map_err(classify_failure)?;

        match outcome {
            ToolOutcome::Completed(value) => Ok(value),
            ToolOutcome::NeedsConfirmation { summary, .. } => {
                // Plan-level approval already happened upstream, so previews
                // are confirmed immediately.
                tracing::debug!(
                    step_id = %step.id,
                    summary = %summary,
                    "auto-confirming tool preview"
                );
                tool.execute_confirmed(params, &tool_ctx)
                    .await
                    .map_err(classify_failure)
            }
        }
    }
}

/// Map a tool error onto its retry eligibility: parameter validation errors
/// surface immediately, everything else earns the single retry.
fn classify_failure(error: ToolError) -> StepFailure {
    let retryable = !matches!(error, ToolError::InvalidParams { .. });
    StepFailure {
        message: error.to_string(),
        retryable,
    }
}

fn finish(
    plan: TaskPlan,
    step_results: HashMap<String, Value>,
    errors: Vec<String>,
    started: Instant,
    total_steps: usize,
) -> ExecutionResult {
    ExecutionResult {
        success: plan.status == PlanStatus::Completed,
        completed_steps: plan.completed_steps(),
        total_steps,
        step_results,
        errors,
        elapsed: started.elapsed(),
        plan,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{DurationClass, TaskStep};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::{Map, json};
    use std::sync::atomic::AtomicU32;
    use taskweave_tools::{
        ActionKind, Tool, ToolCategory, ToolMetadata, ToolOutcome,
    };
    use uuid::Uuid;

    fn metadata(name: &str) -> ToolMetadata {
        ToolMetadata {
            display_name: name.replace('_', " "),
            category: ToolCategory::Creation,
            action: ActionKind::Create,
            requires_approval: false,
            is_reversible: true,
            entity: "work_item".into(),
            keywords: vec![],
            examples: vec![],
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn metadata(&self) -> ToolMetadata {
            metadata("echo")
        }

        async fn execute(
            &self,
            params: Value,
            _ctx: &ToolContext,
        ) -> taskweave_tools::Result<ToolOutcome> {
            Ok(ToolOutcome::Completed(params))
        }
    }

    /// Fails the first `fail_times` invocations, then succeeds.
    struct FlakyTool {
        calls: AtomicU32,
        fail_times: u32,
    }

    #[async_trait]
    impl Tool for FlakyTool {
        fn name(&self) -> &str {
            "flaky"
        }

        fn metadata(&self) -> ToolMetadata {
            metadata("flaky")
        }

        async fn execute(
            &self,
            _params: Value,
            _ctx: &ToolContext,
        ) -> taskweave_tools::Result<ToolOutcome> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(ToolError::ExecutionFailed {
                    tool_name: "flaky".into(),
                    reason: format!("simulated failure {n}"),
                })
            } else {
                Ok(ToolOutcome::Completed(json!({"attempt": n + 1})))
            }
        }
    }

    struct RejectingTool;

    #[async_trait]
    impl Tool for RejectingTool {
        fn name(&self) -> &str {
            "rejecting"
        }

        fn metadata(&self) -> ToolMetadata {
            metadata("rejecting")
        }

        async fn execute(
            &self,
            _params: Value,
            _ctx: &ToolContext,
        ) -> taskweave_tools::Result<ToolOutcome> {
            Err(ToolError::InvalidParams {
                tool_name: "rejecting".into(),
                reason: "title is required".into(),
            })
        }
    }

    struct PreviewTool;

    #[async_trait]
    impl Tool for PreviewTool {
        fn name(&self) -> &str {
            "preview"
        }

        fn metadata(&self) -> ToolMetadata {
            metadata("preview")
        }

        async fn execute(
            &self,
            _params: Value,
            _ctx: &ToolContext,
        ) -> taskweave_tools::Result<ToolOutcome> {
            Ok(ToolOutcome::NeedsConfirmation {
                summary: "will create one item".into(),
                preview: json!({"title": "draft"}),
            })
        }

        async fn execute_confirmed(
            &self,
            _params: Value,
            _ctx: &ToolContext,
        ) -> taskweave_tools::Result<Value> {
            Ok(json!({"confirmed": true}))
        }
    }

    /// Sets the shared cancellation flag as a side effect of succeeding.
    struct CancellingTool {
        flag: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Tool for CancellingTool {
        fn name(&self) -> &str {
            "cancelling"
        }

        fn metadata(&self) -> ToolMetadata {
            metadata("cancelling")
        }

        async fn execute(
            &self,
            _params: Value,
            _ctx: &ToolContext,
        ) -> taskweave_tools::Result<ToolOutcome> {
            self.flag.store(true, Ordering::SeqCst);
            Ok(ToolOutcome::Completed(json!({"done": true})))
        }
    }

    fn step(id: &str, order: u32, tool: &str, deps: &[&str]) -> TaskStep {
        TaskStep {
            id: id.to_owned(),
            order,
            description: format!("run {tool}"),
            tool_name: tool.to_owned(),
            params: Map::new(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            status: StepStatus::Pending,
            result: None,
            error: None,
        }
    }

    fn approved_plan(steps: Vec<TaskStep>) -> TaskPlan {
        TaskPlan {
            id: Uuid::now_v7(),
            goal: "test goal".into(),
            steps,
            estimated_duration: DurationClass::Fast,
            requires_approval: true,
            created_at: Utc::now(),
            status: PlanStatus::Approved,
            summary: None,
        }
    }

    fn fast_executor(registry: ToolRegistry) -> Executor {
        Executor::new(
            registry,
            ExecutorConfig {
                timeout: Duration::from_secs(30),
                step_delay: Duration::from_millis(1),
            },
        )
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(Scope::workspace("ws_1"))
    }

    #[tokio::test]
    async fn linear_plan_runs_to_completion() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let executor = fast_executor(registry);

        let plan = approved_plan(vec![
            step("step_1", 1, "echo", &[]),
            step("step_2", 2, "echo", &["step_1"]),
            step("step_3", 3, "echo", &["step_2"]),
        ]);

        let result = executor.execute_task_plan(plan, &ctx()).await;
        assert!(result.success);
        assert_eq!(result.plan.status, PlanStatus::Completed);
        assert_eq!(result.completed_steps, 3);
        assert_eq!(result.total_steps, 3);
        assert!(result.errors.is_empty());
        assert!(result.step_results.contains_key("step_2"));
    }

    #[tokio::test]
    async fn retry_recovers_a_single_failure() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(FlakyTool {
            calls: AtomicU32::new(0),
            fail_times: 1,
        }));
        let executor = fast_executor(registry);

        let plan = approved_plan(vec![step("step_1", 1, "flaky", &[])]);
        let result = executor.execute_task_plan(plan, &ctx()).await;

        assert!(result.success);
        assert_eq!(result.step_results["step_1"]["attempt"], 2);
    }

    #[tokio::test]
    async fn double_failure_fails_the_plan_fast() {
        // Step 2 fails on both attempts in a 3-step chain.
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(FlakyTool {
            calls: AtomicU32::new(0),
            fail_times: 2,
        }));
        let executor = fast_executor(registry);

        let plan = approved_plan(vec![
            step("step_1", 1, "echo", &[]),
            step("step_2", 2, "flaky", &["step_1"]),
            step("step_3", 3, "echo", &["step_2"]),
        ]);

        let result = executor.execute_task_plan(plan, &ctx()).await;
        assert!(!result.success);
        assert_eq!(result.plan.status, PlanStatus::Failed);
        assert_eq!(result.completed_steps, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("step_2"));
        assert_eq!(result.plan.steps[1].status, StepStatus::Failed);
        assert_eq!(result.plan.steps[2].status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn invalid_params_are_not_retried() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(RejectingTool));
        let executor = fast_executor(registry);

        let plan = approved_plan(vec![step("step_1", 1, "rejecting", &[])]);
        let result = executor.execute_task_plan(plan, &ctx()).await;

        assert!(!result.success);
        assert!(result.errors[0].contains("title is required"));
    }

    #[tokio::test]
    async fn preview_outcomes_are_auto_confirmed() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(PreviewTool));
        let executor = fast_executor(registry);

        let plan = approved_plan(vec![step("step_1", 1, "preview", &[])]);
        let result = executor.execute_task_plan(plan, &ctx()).await;

        assert!(result.success);
        assert_eq!(result.step_results["step_1"]["confirmed"], true);
    }

    #[tokio::test]
    async fn cancellation_between_steps() {
        // The flag is set right after step 1 completes, so step 2 never
        // transitions to running.
        let flag = Arc::new(AtomicBool::new(false));
        let registry = ToolRegistry::new();
        registry.register(Arc::new(CancellingTool { flag: flag.clone() }));
        registry.register(Arc::new(EchoTool));
        let executor = fast_executor(registry);

        let plan = approved_plan(vec![
            step("step_1", 1, "cancelling", &[]),
            step("step_2", 2, "echo", &["step_1"]),
        ]);

        let context = ctx().with_cancellation(flag);
        let result = executor.execute_task_plan(plan, &context).await;

        assert_eq!(result.plan.status, PlanStatus::Cancelled);
        assert_eq!(result.completed_steps, 1);
        assert!(!result.success);
        assert!(result.errors.is_empty());
        assert_eq!(result.plan.steps[1].status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn cancellation_before_start_runs_nothing() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let executor = fast_executor(registry);

        let plan = approved_plan(vec![step("step_1", 1, "echo", &[])]);
        let flag = Arc::new(AtomicBool::new(true));
        let context = ctx().with_cancellation(flag);

        let result = executor.execute_task_plan(plan, &context).await;
        assert_eq!(result.plan.status, PlanStatus::Cancelled);
        assert_eq!(result.completed_steps, 0);
        assert_eq!(result.plan.steps[0].status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn timeout_fails_with_distinguishable_error() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let executor = Executor::new(
            registry,
            ExecutorConfig {
                timeout: Duration::ZERO,
                step_delay: Duration::from_millis(1),
            },
        );

        let plan = approved_plan(vec![step("step_1", 1, "echo", &[])]);
        let result = executor.execute_task_plan(plan, &ctx()).await;

        assert_eq!(result.plan.status, PlanStatus::Failed);
        assert!(result.errors[0].contains("timed out"));
        assert_eq!(result.completed_steps, 0);
    }

    #[tokio::test]
    async fn unapproved_plan_is_refused() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let executor = fast_executor(registry);

        let mut plan = approved_plan(vec![step("step_1", 1, "echo", &[])]);
        plan.status = PlanStatus::Draft;

        let result = executor.execute_task_plan(plan, &ctx()).await;
        assert!(!result.success);
        assert!(result.errors[0].contains("not approved"));
        assert_eq!(result.completed_steps, 0);
    }

    #[tokio::test]
    async fn progress_events_arrive_in_order() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let executor = fast_executor(registry);

        let (tx, mut rx) = mpsc::channel(16);
        let plan = approved_plan(vec![
            step("step_1", 1, "echo", &[]),
            step("step_2", 2, "echo", &["step_1"]),
        ]);

        let context = ctx().with_progress(tx);
        let result = executor.execute_task_plan(plan, &context).await;
        assert!(result.success);
        drop(context);

        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(match event {
                ProgressEvent::StepStart { index, .. } => format!("start:{index}"),
                ProgressEvent::StepComplete { index, .. } => format!("complete:{index}"),
                ProgressEvent::ExecutionComplete { .. } => "done".to_owned(),
                ProgressEvent::ExecutionFailed { .. } => "failed".to_owned(),
            });
        }
        assert_eq!(
            kinds,
            vec!["start:1", "complete:1", "start:2", "complete:2", "done"]
        );
    }

    #[tokio::test]
    async fn execute_step_runs_one_step_without_retry() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(FlakyTool {
            calls: AtomicU32::new(0),
            fail_times: 1,
        }));
        let executor = fast_executor(registry);

        let plan = approved_plan(vec![step("step_1", 1, "flaky", &[])]);
        let updated = executor.execute_step(plan, "step_1", &ctx()).await.unwrap();

        // No retry on the single-step path: the first failure sticks.
        assert_eq!(updated.steps[0].status, StepStatus::Failed);
        assert!(updated.steps[0].error.as_deref().unwrap().contains("simulated"));
    }

    #[tokio::test]
    async fn execute_step_requires_completed_dependencies() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let executor = fast_executor(registry);

        let plan = approved_plan(vec![
            step("step_1", 1, "echo", &[]),
            step("step_2", 2, "echo", &["step_1"]),
        ]);

        let result = executor.execute_step(plan, "step_2", &ctx()).await;
        assert!(matches!(result, Err(AgentError::StepNotRunnable { .. })));
    }

    #[test]
    fn next_pending_step_respects_dependencies() {
        let mut plan = approved_plan(vec![
            step("step_1", 1, "echo", &[]),
            step("step_2", 2, "echo", &["step_1"]),
        ]);

        assert_eq!(next_pending_step(&plan), Some(0));

        plan.steps[0].status = StepStatus::Completed;
        assert_eq!(next_pending_step(&plan), Some(1));

        plan.steps[1].status = StepStatus::Completed;
        assert_eq!(next_pending_step(&plan), None);
    }

    #[test]
    fn next_pending_step_skips_blocked_branches() {
        let mut plan = approved_plan(vec![
            step("step_1", 1, "echo", &[]),
            step("step_2", 2, "echo", &["step_1"]),
            step("step_3", 3, "echo", &[]),
        ]);

        plan.steps[0].status = StepStatus::Failed;
        // step_2 is blocked by the failed dependency; step_3 is independent.
        assert_eq!(next_pending_step(&plan), Some(2));
    }
}
