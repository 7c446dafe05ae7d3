//! Operations and security decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One tool invocation request, tied to a plan step. Exists only for the
/// duration of one dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    /// Unique identifier for this dispatch.
    pub operation_id: Uuid,

    /// Registry name of the tool to invoke.
    pub tool_name: String,

    /// Opaque parameters forwarded to the adapter.
    pub params: serde_json::Value,

    /// The owning task.
    pub task_id: Uuid,

    /// The owning plan step.
    pub step_index: usize,
}

impl Operation {
    pub fn new(
        tool_name: impl Into<String>,
        params: serde_json::Value,
        task_id: Uuid,
        step_index: usize,
    ) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            tool_name: tool_name.into(),
            params,
            task_id,
            step_index,
        }
    }
}

/// Allow/deny verdict for an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Deny { reason: String },
}

impl Verdict {
    pub fn is_allow(&self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

/// The verdict produced before an operation may execute.
///
/// Exactly one decision precedes any sandbox session; a deny verdict means
/// no session is ever created for the operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityDecision {
    /// The operation this decision covers.
    pub operation_id: Uuid,

    /// Allow or deny, with the internal denial reason.
    pub verdict: Verdict,

    /// When the decision was made.
    pub decided_at: DateTime<Utc>,
}

impl SecurityDecision {
    pub fn allow(operation_id: Uuid) -> Self {
        Self {
            operation_id,
            verdict: Verdict::Allow,
            decided_at: Utc::now(),
        }
    }

    pub fn deny(operation_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            operation_id,
            verdict: Verdict::Deny {
                reason: reason.into(),
            },
            decided_at: Utc::now(),
        }
    }
}
