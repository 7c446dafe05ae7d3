//! Domain model: events, tasks, operations, and the error taxonomy.

pub mod error;
pub mod event;
pub mod operation;
pub mod task;

pub use error::{AgentError, Result, SecurityStage, ValidationError};
pub use event::{AgentEvent, EventKind, PriorityTier};
pub use operation::{Operation, SecurityDecision, Verdict};
pub use task::{PlanStep, StepStatus, Task, TaskStatus};

/// Compute the hex SHA-256 digest of a serialized value, used as a
/// result reference in plan snapshots.
pub fn result_digest(value: &serde_json::Value) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn result_digest_is_stable() {
        let v = json!({"output": "hello"});
        assert_eq!(result_digest(&v), result_digest(&v));
        assert_ne!(result_digest(&v), result_digest(&json!({"output": "bye"})));
    }

    #[test]
    fn result_digest_is_hex_sha256() {
        let d = result_digest(&json!(null));
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
