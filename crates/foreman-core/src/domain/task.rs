//! Tasks and plan steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Submitted,
    Aborted,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Active => "active",
            TaskStatus::Submitted => "submitted",
            TaskStatus::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle status of a plan step.
///
/// Transitions are strictly monotonic: `Pending -> Running -> {Done |
/// Failed}`; `Skipped` only from `Pending`. Terminal states never change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Whether this status is terminal (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Done | StepStatus::Failed | StepStatus::Skipped
        )
    }

    /// Whether a transition from `self` to `to` is legal.
    pub fn can_transition(&self, to: StepStatus) -> bool {
        matches!(
            (self, to),
            (StepStatus::Pending, StepStatus::Running)
                | (StepStatus::Pending, StepStatus::Skipped)
                | (StepStatus::Running, StepStatus::Done)
                | (StepStatus::Running, StepStatus::Failed)
        )
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Done => "done",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// One unit of a task's ordered execution plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStep {
    /// Position in the plan, 0-based.
    pub index: usize,

    /// Natural-language instruction for this step.
    pub instruction: String,

    /// Current lifecycle status.
    pub status: StepStatus,

    /// Content digest of the sanitized result, set when the step is done.
    pub result_ref: Option<String>,

    /// Failed attempts so far. Survives restart via the persisted snapshot.
    pub retry_count: u32,

    /// When true, exhausting retries on this step aborts the whole task.
    pub critical: bool,
}

impl PlanStep {
    pub fn new(index: usize, instruction: impl Into<String>) -> Self {
        Self {
            index,
            instruction: instruction.into(),
            status: StepStatus::Pending,
            result_ref: None,
            retry_count: 0,
            critical: false,
        }
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }
}

/// A task: one originating event and its ordered plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Unique identifier for this task.
    pub task_id: Uuid,

    /// The event that initiated the task.
    pub origin_event: Uuid,

    /// Current task status.
    pub status: TaskStatus,

    /// Ordered plan steps.
    pub steps: Vec<PlanStep>,

    /// Maximum controller loop iterations before forced submission.
    pub step_budget: u32,

    /// Iterations consumed so far. Survives restart.
    pub iterations: u32,

    /// When the task was created.
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(origin_event: Uuid, steps: Vec<PlanStep>, step_budget: u32) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            origin_event,
            status: TaskStatus::Active,
            steps,
            step_budget,
            iterations: 0,
            created_at: Utc::now(),
        }
    }

    /// Whether every step has reached a terminal status.
    pub fn all_steps_terminal(&self) -> bool {
        self.steps.iter().all(|s| s.status.is_terminal())
    }

    /// The next step that has not started yet, if any.
    pub fn next_pending(&self) -> Option<&PlanStep> {
        self.steps
            .iter()
            .find(|s| matches!(s.status, StepStatus::Pending | StepStatus::Running))
    }
}
