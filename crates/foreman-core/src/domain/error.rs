//! Error taxonomy for the Foreman core.

use uuid::Uuid;

use super::task::{StepStatus, TaskStatus};

/// Where in the security pipeline a rejection originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityStage {
    /// An adapter's own structural check, before any decision was made.
    Structural,
    /// The permission gate or the sandbox itself.
    Gate,
}

/// Errors produced by event and parameter shape validation.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown event kind: {kind}")]
    UnknownEventKind { kind: String },

    #[error("event kind {kind} missing required payload field: {field}")]
    MissingPayloadField { kind: String, field: String },

    #[error("event source must not be empty")]
    EmptySource,

    #[error("event is missing required field: {field}")]
    MissingEventField { field: String },

    #[error("event kind {kind} cannot initiate a task")]
    NotTaskInitiating { kind: String },

    #[error("tool {tool} missing required parameter: {field}")]
    MissingParameter { tool: String, field: String },

    #[error("tool {tool} rejected parameters: {reason}")]
    InvalidParameter { tool: String, reason: String },
}

/// Operational errors for the task-execution pipeline.
///
/// Classification drives the controller's retry policy: only `Security` and
/// `Infrastructure` abort a task outright; everything else is absorbed into
/// step-status updates with bounded retry.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Permission denial or sandbox violation. The denial reason is kept
    /// for the audit trail but deliberately absent from the display form,
    /// so callers see a generic denial without policy detail. An adapter
    /// structural rejection fails the step; a gate denial aborts the task.
    #[error("operation denied")]
    Security {
        reason: String,
        stage: SecurityStage,
    },

    #[error("tool not found: {name}")]
    ToolNotFound { name: String },

    /// The tool ran but failed. Carries any partial output the adapter
    /// produced before the failure.
    #[error("tool execution failed after {attempts} attempt(s): {reason}")]
    Execution {
        reason: String,
        partial: Option<serde_json::Value>,
        attempts: u32,
    },

    /// Wall-clock limit exceeded (execution) or dispatch-queue wait
    /// exceeded (pool admission). Forces sandbox teardown either way.
    #[error("operation timed out after {limit_ms}ms")]
    Timeout {
        limit_ms: u64,
        partial: Option<serde_json::Value>,
    },

    #[error("planning failed: {reason}")]
    Planning { reason: String },

    #[error("illegal step transition at index {index}: {from} -> {to}")]
    Transition {
        index: usize,
        from: StepStatus,
        to: StepStatus,
    },

    #[error("illegal task transition: {from} -> {to}")]
    TaskTransition { from: TaskStatus, to: TaskStatus },

    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("task {task_id} has no step at index {index}")]
    StepNotFound { task_id: Uuid, index: usize },

    #[error("infrastructure failure: {0}")]
    Infrastructure(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<foreman_state::StorageError> for AgentError {
    fn from(err: foreman_state::StorageError) -> Self {
        AgentError::Infrastructure(err.to_string())
    }
}

impl AgentError {
    /// Whether the controller may retry the operation with its original
    /// parameters.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::Execution { .. } | AgentError::Timeout { .. }
        )
    }

    /// Whether the error escapes step handling and aborts the whole task.
    /// Structural security rejections stay at step scope; gate denials and
    /// infrastructure failures do not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AgentError::Security {
                stage: SecurityStage::Gate,
                ..
            } | AgentError::Infrastructure(_)
        )
    }

    /// Partial output buffered before the failure, if any.
    pub fn partial_output(&self) -> Option<&serde_json::Value> {
        match self {
            AgentError::Execution { partial, .. } | AgentError::Timeout { partial, .. } => {
                partial.as_ref()
            }
            _ => None,
        }
    }
}

/// Result type for Foreman core operations.
pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_display_does_not_leak_reason() {
        let err = AgentError::Security {
            reason: "role 'intern' lacks admin on shell".to_string(),
            stage: SecurityStage::Gate,
        };
        assert_eq!(err.to_string(), "operation denied");
    }

    #[test]
    fn retry_classification() {
        assert!(AgentError::Execution {
            reason: "exit 1".into(),
            partial: None,
            attempts: 1
        }
        .is_retryable());
        assert!(AgentError::Timeout {
            limit_ms: 100,
            partial: None
        }
        .is_retryable());
        assert!(!AgentError::Security {
            reason: "denied".into(),
            stage: SecurityStage::Gate,
        }
        .is_retryable());
        assert!(!AgentError::Planning {
            reason: "no viable tool".into()
        }
        .is_retryable());
    }

    #[test]
    fn fatal_classification() {
        assert!(AgentError::Security {
            reason: "denied".into(),
            stage: SecurityStage::Gate,
        }
        .is_fatal());
        // A structural rejection stays at step scope.
        assert!(!AgentError::Security {
            reason: "denied pattern".into(),
            stage: SecurityStage::Structural,
        }
        .is_fatal());
        assert!(AgentError::Infrastructure("store down".into()).is_fatal());
        assert!(!AgentError::ToolNotFound {
            name: "nope".into()
        }
        .is_fatal());
    }

    #[test]
    fn transition_error_names_both_states() {
        let err = AgentError::Transition {
            index: 2,
            from: StepStatus::Done,
            to: StepStatus::Running,
        };
        let msg = err.to_string();
        assert!(msg.contains("done"));
        assert!(msg.contains("running"));
    }
}
