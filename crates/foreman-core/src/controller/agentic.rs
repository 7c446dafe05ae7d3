//! The agentic loop: analyze, select a tool, dispatch through the
//! security gate, update the plan, iterate, submit.
//!
//! One controller instance runs per active task. Dispatch is
//! non-blocking: the controller suspends on the manager's future at
//! `AwaitingResult` and resumes on completion, so many tasks share the
//! bounded sandbox pool. A step budget caps total loop iterations, so the
//! loop reaches `Submitting` or `Aborted` for every well-formed
//! initiating event.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collab::{
    merge_facts, KnowledgeRetriever, OutputChannel, Planner, StepReport, TaskReport,
};
use crate::domain::error::{AgentError, Result, ValidationError};
use crate::domain::event::{AgentEvent, EventKind};
use crate::domain::operation::Operation;
use crate::domain::task::{PlanStep, StepStatus, Task, TaskStatus};
use crate::plan::PlanTracker;
use crate::security::sandbox::AbortSource;
use crate::security::validator::SecurityContext;
use crate::security::SecurityManager;

use super::state::LoopState;

/// Controller policy knobs.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Maximum loop iterations per task before forced submission.
    pub step_budget: u32,
    /// Maximum attempts per step (first attempt included).
    pub retry_limit: u32,
    /// Tool-resolution attempts before a step counts as unplannable.
    pub planning_retries: u32,
    /// Role operations are dispatched under.
    pub role: String,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            step_budget: 16,
            retry_limit: 3,
            planning_retries: 2,
            role: "agent".to_string(),
        }
    }
}

/// Marker a planner can append to flag a step as critical.
const CRITICAL_MARKER: &str = "[critical]";

/// The orchestrating state machine for one task.
pub struct AgenticLoop {
    planner: Arc<dyn Planner>,
    knowledge: Arc<dyn KnowledgeRetriever>,
    manager: Arc<SecurityManager>,
    tracker: Arc<PlanTracker>,
    output: Arc<dyn OutputChannel>,
    config: LoopConfig,
    state: StdMutex<LoopState>,
    abort: AbortSource,
}

impl AgenticLoop {
    pub fn new(
        planner: Arc<dyn Planner>,
        knowledge: Arc<dyn KnowledgeRetriever>,
        manager: Arc<SecurityManager>,
        tracker: Arc<PlanTracker>,
        output: Arc<dyn OutputChannel>,
        config: LoopConfig,
    ) -> Self {
        let (abort, _token) = AbortSource::new();
        Self {
            planner,
            knowledge,
            manager,
            tracker,
            output,
            config,
            state: StdMutex::new(LoopState::Idle),
            abort,
        }
    }

    /// Current machine state.
    pub fn state(&self) -> LoopState {
        *self.state.lock().unwrap()
    }

    /// Signal abort into any in-flight dispatch. Best-effort.
    pub fn abort(&self) {
        self.abort.abort();
    }

    fn transition(&self, to: LoopState) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.can_transition(to) {
            return Err(AgentError::Infrastructure(format!(
                "illegal controller transition: {state} -> {to}"
            )));
        }
        debug!(from = %*state, to = %to, "controller transition");
        *state = to;
        Ok(())
    }

    /// Drive one task from an initiating event to `Standby` or `Aborted`.
    pub async fn run_task(&self, event: AgentEvent) -> Result<TaskReport> {
        event.validate()?;
        if event.kind != EventKind::UserMessage {
            return Err(ValidationError::NotTaskInitiating {
                kind: event.kind.to_string(),
            }
            .into());
        }

        self.transition(LoopState::Analyzing)?;
        let description = event
            .payload
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let instructions = self.planner.generate_plan(description).await?;

        let steps: Vec<PlanStep> = instructions
            .iter()
            .enumerate()
            .map(|(i, instruction)| {
                let (text, critical) = split_critical(instruction);
                let step = PlanStep::new(i, text);
                if critical {
                    step.critical()
                } else {
                    step
                }
            })
            .collect();

        let task = Task::new(event.id, steps, self.config.step_budget);
        let task_id = task.task_id;
        self.tracker.create_plan(&task).await?;
        info!(task_id = %task_id, steps = task.steps.len(), "plan created");

        let ctx = SecurityContext::new(&self.config.role, &event.source);
        let token = self.abort.token();

        // Original parameters per step; retries reuse these untouched.
        let mut resolved: HashMap<usize, (String, serde_json::Value)> = HashMap::new();
        let mut outputs: Vec<serde_json::Value> = Vec::new();
        let mut last_partial: Option<serde_json::Value> = None;
        let mut budget_exhausted = false;

        loop {
            // ANALYZING: consult the plan for the next actionable step.
            let snapshot = self.tracker.get_snapshot(task_id).await?;
            if snapshot.iterations >= snapshot.step_budget {
                warn!(task_id = %task_id, "step budget exhausted; forcing submission");
                budget_exhausted = true;
                break;
            }
            let Some(step) = snapshot.next_pending() else {
                break;
            };
            let index = step.index;
            let instruction = step.instruction.clone();
            let critical = step.critical;
            let first_attempt = step.status == StepStatus::Pending;
            self.tracker.record_iteration(task_id).await?;

            // SELECTING_TOOL: resolve once; retries keep the originals.
            self.transition(LoopState::SelectingTool)?;
            if !resolved.contains_key(&index) {
                match self.resolve_with_retries(&instruction).await {
                    Some((tool, mut params)) => {
                        self.enrich_params(&instruction, &mut params).await;
                        resolved.insert(index, (tool, params));
                    }
                    None => {
                        return self
                            .abort_task(
                                task_id,
                                &format!("no viable tool for step {index}"),
                                outputs,
                            )
                            .await;
                    }
                }
            }
            let (tool_name, params) = resolved[&index].clone();

            if first_attempt {
                self.tracker
                    .update_step(task_id, index, StepStatus::Running, None)
                    .await?;
            }

            // DISPATCHING: hand one operation to the security manager.
            self.transition(LoopState::Dispatching)?;
            let op = Operation::new(tool_name.as_str(), params, task_id, index);

            // AWAITING_RESULT: suspend until the operation is terminal.
            self.transition(LoopState::AwaitingResult)?;
            let result = self.manager.execute(&op, &ctx, &token).await;

            // UPDATING_PLAN: fold the outcome into the step status.
            self.transition(LoopState::UpdatingPlan)?;
            match result {
                Ok(report) => {
                    self.tracker
                        .update_step(
                            task_id,
                            index,
                            StepStatus::Done,
                            Some(report.result_digest.clone()),
                        )
                        .await?;
                    outputs.push(report.output);
                    last_partial = None;
                }
                Err(err) if err.is_fatal() => {
                    return self
                        .abort_task(task_id, &format!("step {index}: {err}"), outputs)
                        .await;
                }
                Err(err) if err.is_retryable() => {
                    if let Some(partial) = err.partial_output() {
                        last_partial = Some(partial.clone());
                    }
                    let attempts = self.tracker.record_retry(task_id, index).await?;
                    if attempts >= self.config.retry_limit {
                        warn!(task_id = %task_id, index, %err, "retry budget exhausted");
                        self.tracker
                            .update_step(task_id, index, StepStatus::Failed, None)
                            .await?;
                        if critical {
                            return self
                                .abort_task(
                                    task_id,
                                    &format!("critical step {index} failed: {err}"),
                                    outputs,
                                )
                                .await;
                        }
                    }
                }
                Err(err) => {
                    // Not retryable, not fatal: the step fails in place.
                    warn!(task_id = %task_id, index, %err, "step failed");
                    self.tracker
                        .update_step(task_id, index, StepStatus::Failed, None)
                        .await?;
                    if critical {
                        return self
                            .abort_task(
                                task_id,
                                &format!("critical step {index} failed: {err}"),
                                outputs,
                            )
                            .await;
                    }
                }
            }
            self.transition(LoopState::Analyzing)?;
        }

        // SUBMITTING: deliver the result and stand by.
        self.transition(LoopState::Submitting)?;
        if budget_exhausted {
            self.tracker.skip_remaining(task_id).await?;
        }
        if let Some(partial) = last_partial {
            outputs.push(serde_json::json!({ "partial": partial }));
        }
        self.tracker
            .set_task_status(task_id, TaskStatus::Submitted)
            .await?;

        let report = self.build_report(task_id, outputs, None).await?;
        self.output.deliver(&report).await?;
        self.transition(LoopState::Standby)?;
        info!(task_id = %task_id, "task submitted");
        Ok(report)
    }

    /// Terminal abort path: release in-flight sandbox work, flush the
    /// plan snapshot, record the reason.
    async fn abort_task(
        &self,
        task_id: Uuid,
        reason: &str,
        outputs: Vec<serde_json::Value>,
    ) -> Result<TaskReport> {
        warn!(task_id = %task_id, reason, "aborting task");
        self.abort.abort();

        // The step that was in flight fails; everything untouched is
        // skipped. The tracker persists each mutation.
        let snapshot = self.tracker.get_snapshot(task_id).await?;
        for step in &snapshot.steps {
            if step.status == StepStatus::Running {
                self.tracker
                    .update_step(task_id, step.index, StepStatus::Failed, None)
                    .await?;
            }
        }
        self.tracker.skip_remaining(task_id).await?;
        self.tracker
            .set_task_status(task_id, TaskStatus::Aborted)
            .await?;
        self.manager
            .audit()
            .record_task_aborted(task_id, reason)
            .await?;

        self.transition(LoopState::Aborted)?;
        self.build_report(task_id, outputs, Some(reason.to_string()))
            .await
    }

    async fn build_report(
        &self,
        task_id: Uuid,
        outputs: Vec<serde_json::Value>,
        abort_reason: Option<String>,
    ) -> Result<TaskReport> {
        let snapshot = self.tracker.get_snapshot(task_id).await?;
        Ok(TaskReport {
            task_id,
            status: snapshot.status,
            steps: snapshot
                .steps
                .iter()
                .map(|s| StepReport {
                    index: s.index,
                    instruction: s.instruction.clone(),
                    status: s.status,
                    result_ref: s.result_ref.clone(),
                })
                .collect(),
            outputs,
            abort_reason,
        })
    }

    /// Attach retrieved context to the parameters, honoring the
    /// fact-priority policy.
    async fn enrich_params(&self, instruction: &str, params: &mut serde_json::Value) {
        match self.knowledge.retrieve(instruction).await {
            Ok(facts) if !facts.is_empty() => {
                let merged = merge_facts(facts);
                if let Ok(value) = serde_json::to_value(&merged) {
                    params["context"] = value;
                }
            }
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "knowledge retrieval failed; continuing without context");
            }
        }
    }

    async fn resolve_with_retries(
        &self,
        instruction: &str,
    ) -> Option<(String, serde_json::Value)> {
        for attempt in 0..=self.config.planning_retries {
            if let Some(resolved) = resolve_tool(instruction) {
                return Some(resolved);
            }
            debug!(attempt, instruction, "tool resolution failed");
        }
        None
    }
}

/// Strip a trailing criticality marker from a step instruction.
fn split_critical(instruction: &str) -> (String, bool) {
    let trimmed = instruction.trim();
    match trimmed.strip_suffix(CRITICAL_MARKER) {
        Some(rest) => (rest.trim().to_string(), true),
        None => (trimmed.to_string(), false),
    }
}

/// Map a step instruction to a tool name and parameters.
///
/// Steps that need no tool resolve to the message adapter, so every step
/// still passes the security gate.
pub fn resolve_tool(instruction: &str) -> Option<(String, serde_json::Value)> {
    let trimmed = instruction.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_lowercase();

    if let Some(rest) = trimmed
        .strip_prefix("run ")
        .or_else(|| trimmed.strip_prefix("exec "))
    {
        return Some((
            "shell".to_string(),
            serde_json::json!({ "command": rest.trim() }),
        ));
    }

    if lower.contains("list") && (lower.contains("file") || lower.contains("director")) {
        let path = extract_path(trimmed).unwrap_or_else(|| ".".to_string());
        return Some((
            "file".to_string(),
            serde_json::json!({ "action": "list", "path": path }),
        ));
    }

    if lower.starts_with("read ") || lower.contains("read file") {
        let path = extract_path(trimmed)?;
        return Some((
            "file".to_string(),
            serde_json::json!({ "action": "read", "path": path }),
        ));
    }

    if lower.contains("search")
        || lower.contains("look up")
        || lower.contains("retrieve")
        || lower.contains("find out")
    {
        return Some((
            "knowledge".to_string(),
            serde_json::json!({ "query": trimmed }),
        ));
    }

    // Direct-response path.
    Some((
        "message".to_string(),
        serde_json::json!({ "text": trimmed }),
    ))
}

/// Pull the first path-looking token out of an instruction.
fn extract_path(instruction: &str) -> Option<String> {
    instruction
        .split_whitespace()
        .find(|tok| tok.starts_with('/') || tok.starts_with("./"))
        .map(|tok| tok.trim_end_matches(&['.', ',', ';', ':'][..]).to_string())
}
