//! Security manager — the single gate every operation passes through.
//!
//! Pipeline: registry lookup (unknown tool fails before any decision
//! exists) -> adapter structural validation -> permission verdict ->
//! sandbox admission and session configuration -> timed execution racing
//! the task abort signal -> output sanitization. The audit logger records
//! {operation, decision, outcome} unconditionally on every path, and the
//! sandbox session is torn down on every path, success or not.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::error::{AgentError, Result, SecurityStage};
use crate::domain::operation::{Operation, SecurityDecision, Verdict};
use crate::domain::result_digest;
use crate::security::audit::{AuditLog, AuditOutcome};
use crate::security::sandbox::{AbortToken, SandboxPool};
use crate::security::validator::{PolicyTable, SecurityContext};
use crate::tools::ToolRegistry;

/// Result of a successfully gated and executed operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub operation_id: Uuid,
    /// Sanitized adapter output.
    pub output: serde_json::Value,
    /// Content digest of the sanitized output.
    pub result_digest: String,
    pub duration_ms: u64,
}

/// Composes the permission validator, sandbox controller, tool registry,
/// and audit logger into one gate.
pub struct SecurityManager {
    registry: Arc<ToolRegistry>,
    policy: Arc<PolicyTable>,
    pool: SandboxPool,
    audit: Arc<AuditLog>,
}

impl SecurityManager {
    pub fn new(
        registry: Arc<ToolRegistry>,
        policy: Arc<PolicyTable>,
        pool: SandboxPool,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            registry,
            policy,
            pool,
            audit,
        }
    }

    /// The audit trail this gate writes to.
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Free sandbox permits, for observability.
    pub fn pool_available(&self) -> usize {
        self.pool.available()
    }

    /// Gate and execute one operation.
    pub async fn execute(
        &self,
        op: &Operation,
        ctx: &SecurityContext,
        abort: &AbortToken,
    ) -> Result<ExecutionReport> {
        // Registry lookup comes first: an unknown name fails before any
        // security decision is produced.
        let adapter = match self.registry.lookup(&op.tool_name) {
            Ok(adapter) => adapter,
            Err(err) => {
                self.audit
                    .record_operation(op, None, AuditOutcome::ToolMissing)
                    .await?;
                return Err(err);
            }
        };

        // Adapter structural checks, still before any decision.
        if let Err(err) = adapter.validate(&op.params) {
            self.audit
                .record_operation(
                    op,
                    None,
                    AuditOutcome::Rejected {
                        reason: audit_reason(&err),
                    },
                )
                .await?;
            return Err(err);
        }

        // Permission verdict. Fail-closed; deny means no session is ever
        // created for this operation.
        let decision = self.policy.decide(
            op.operation_id,
            &ctx.role,
            adapter.kind(),
            adapter.required_level(),
        );
        if let Verdict::Deny { reason } = &decision.verdict {
            warn!(operation_id = %op.operation_id, tool = %op.tool_name, "operation denied");
            let reason = reason.clone();
            self.audit
                .record_operation(op, Some(&decision), AuditOutcome::Denied)
                .await?;
            return Err(AgentError::Security {
                reason,
                stage: SecurityStage::Gate,
            });
        }

        // Sandbox admission. Saturation surfaces as a timeout, not a drop.
        let session = match self.pool.acquire(adapter.kind()).await {
            Ok(session) => session,
            Err(err) => {
                self.audit
                    .record_operation(op, Some(&decision), outcome_for(&err))
                    .await?;
                return Err(err);
            }
        };

        debug!(
            operation_id = %op.operation_id,
            session_id = %session.session_id,
            tool = %op.tool_name,
            "executing operation in sandbox"
        );

        let limit = Duration::from_millis(session.limits.wall_clock_ms);
        let started = Instant::now();
        let outcome = tokio::select! {
            res = tokio::time::timeout(limit, adapter.execute(&op.params, &session)) => {
                match res {
                    Ok(inner) => inner,
                    Err(_elapsed) => Err(AgentError::Timeout {
                        limit_ms: limit.as_millis() as u64,
                        partial: session.take_partial(),
                    }),
                }
            }
            _ = abort.aborted() => Err(AgentError::Execution {
                reason: "operation aborted by task".to_string(),
                partial: session.take_partial(),
                attempts: 1,
            }),
        };

        // Teardown happens here on every path, before any response or
        // audit write can fail.
        session.release();

        match outcome {
            Ok(raw) => {
                let output = adapter.sanitize_output(raw);
                let digest = result_digest(&output);
                self.audit
                    .record_operation(
                        op,
                        Some(&decision),
                        AuditOutcome::Completed {
                            result_digest: digest.clone(),
                        },
                    )
                    .await?;
                Ok(ExecutionReport {
                    operation_id: op.operation_id,
                    output,
                    result_digest: digest,
                    duration_ms: started.elapsed().as_millis() as u64,
                })
            }
            Err(err) => {
                self.audit
                    .record_operation(op, Some(&decision), outcome_for(&err))
                    .await?;
                Err(err)
            }
        }
    }
}

/// Full-detail reason for the audit trail. Unlike the error display form,
/// this keeps the internal denial reason.
fn audit_reason(err: &AgentError) -> String {
    match err {
        AgentError::Security { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}

fn outcome_for(err: &AgentError) -> AuditOutcome {
    match err {
        AgentError::Timeout { limit_ms, .. } => AuditOutcome::TimedOut {
            limit_ms: *limit_ms,
        },
        AgentError::Security { reason, .. } => AuditOutcome::Rejected {
            reason: reason.clone(),
        },
        other => AuditOutcome::Failed {
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use async_trait::async_trait;
    use serde_json::json;

    use foreman_state::MemoryKvStore;

    use crate::security::sandbox::{AbortSource, SandboxSession};
    use crate::security::validator::PermissionLevel;
    use crate::tools::{ToolAdapter, ToolKind};

    /// Adapter that sleeps forever, buffering partial output first.
    struct StallingTool;

    #[async_trait]
    impl ToolAdapter for StallingTool {
        fn name(&self) -> &str {
            "stall"
        }
        fn kind(&self) -> ToolKind {
            ToolKind::Message
        }
        fn validate(&self, _params: &serde_json::Value) -> Result<()> {
            Ok(())
        }
        async fn execute(
            &self,
            _params: &serde_json::Value,
            session: &SandboxSession,
        ) -> Result<serde_json::Value> {
            session.buffer_partial(json!({"progress": "halfway"}));
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    fn make_manager(registry: ToolRegistry, workdir: PathBuf) -> SecurityManager {
        let audit = Arc::new(AuditLog::new(Arc::new(MemoryKvStore::new())));
        SecurityManager::new(
            Arc::new(registry),
            Arc::new(PolicyTable::standard_agent()),
            SandboxPool::new(2, Duration::from_millis(200), workdir),
            audit,
        )
    }

    #[tokio::test]
    async fn timeout_surfaces_partial_output_and_releases_session() {
        let dir = tempfile::tempdir().unwrap();
        let manager = make_manager(
            ToolRegistry::new().register(Arc::new(StallingTool)),
            dir.path().to_path_buf(),
        );
        let (_source, token) = AbortSource::new();

        let op = Operation::new("stall", json!({}), Uuid::new_v4(), 0);
        // Message-kind wall clock is 5s; shrink the race by using
        // tokio's paused clock.
        tokio::time::pause();
        let err = manager
            .execute(&op, &SecurityContext::new("agent", "test"), &token)
            .await
            .unwrap_err();
        tokio::time::resume();

        match err {
            AgentError::Timeout { partial, .. } => {
                assert_eq!(partial.unwrap()["progress"], "halfway");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(manager.pool_available(), 2);
    }

    #[tokio::test]
    async fn abort_cancels_inflight_execution() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(make_manager(
            ToolRegistry::new().register(Arc::new(StallingTool)),
            dir.path().to_path_buf(),
        ));
        let (source, token) = AbortSource::new();

        let op = Operation::new("stall", json!({}), Uuid::new_v4(), 0);
        let handle = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .execute(&op, &SecurityContext::new("agent", "test"), &token)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        source.abort();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, AgentError::Execution { .. }));
        assert_eq!(manager.pool_available(), 2);
    }
}
