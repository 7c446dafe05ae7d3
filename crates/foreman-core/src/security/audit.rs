//! Append-only audit ledger.
//!
//! Every security decision, execution outcome, dropped event, and task
//! abort lands here, unconditionally, before any response is emitted.
//! Records are never mutated after append. Each record is also persisted
//! write-through under `audit/<seq>` so the trail survives a restart.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use foreman_state::KvStore;

use crate::domain::error::Result;
use crate::domain::event::AgentEvent;
use crate::domain::operation::{Operation, SecurityDecision, Verdict};

/// What happened to the audited operation or event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Tool executed and produced sanitized output.
    Completed { result_digest: String },
    /// Tool ran but failed.
    Failed { reason: String },
    /// Wall-clock or admission limit exceeded.
    TimedOut { limit_ms: u64 },
    /// The permission gate denied the operation.
    Denied,
    /// An adapter structural check rejected the operation before the gate.
    Rejected { reason: String },
    /// No adapter registered under the requested name. No decision exists
    /// for these records.
    ToolMissing,
    /// An event was dropped from the backlog under capacity pressure.
    EventDropped { tier: String },
    /// A task reached its terminal abort state.
    TaskAborted { reason: String },
}

/// One immutable entry in the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    /// Unique identifier for this record.
    pub record_id: Uuid,

    /// Monotonic position in the trail.
    pub seq: u64,

    /// Operation (or event) context at the time of the decision.
    pub operation: serde_json::Value,

    /// The security decision, when one was produced. Absent for records
    /// written before any decision existed (unknown tool, dropped event).
    pub decision: Option<SecurityDecision>,

    /// What happened.
    pub outcome: AuditOutcome,

    /// When the record was appended.
    pub timestamp: DateTime<Utc>,
}

/// Append-only audit logger with write-through persistence.
pub struct AuditLog {
    store: Arc<dyn KvStore>,
    records: Mutex<Vec<AuditRecord>>,
    seq: AtomicU64,
}

impl AuditLog {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            records: Mutex::new(Vec::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Append a record. The in-memory trail and the backing store are
    /// updated together; the record is immutable from here on.
    pub async fn append(
        &self,
        operation: serde_json::Value,
        decision: Option<SecurityDecision>,
        outcome: AuditOutcome,
    ) -> Result<u64> {
        // Sequence assignment and the in-memory append happen under one
        // lock so trail order always matches seq order.
        let record = {
            let mut records = self.records.lock().await;
            let seq = self.seq.fetch_add(1, Ordering::SeqCst);
            let record = AuditRecord {
                record_id: Uuid::new_v4(),
                seq,
                operation,
                decision,
                outcome,
                timestamp: Utc::now(),
            };
            records.push(record.clone());
            record
        };

        let bytes = serde_json::to_vec(&record)?;
        self.store
            .put(&format!("audit/{:08}", record.seq), &bytes)
            .await?;
        Ok(record.seq)
    }

    /// Record an operation outcome with its decision context.
    pub async fn record_operation(
        &self,
        op: &Operation,
        decision: Option<&SecurityDecision>,
        outcome: AuditOutcome,
    ) -> Result<u64> {
        self.append(
            serde_json::to_value(op)?,
            decision.cloned(),
            outcome,
        )
        .await
    }

    /// Record an event dropped from the backlog.
    pub async fn record_event_dropped(&self, event: &AgentEvent) -> Result<u64> {
        let tier = event.tier().to_string();
        self.append(
            json!({
                "event_id": event.id,
                "kind": event.kind,
                "source": event.source,
            }),
            None,
            AuditOutcome::EventDropped { tier },
        )
        .await
    }

    /// Record a task abort with its reason.
    pub async fn record_task_aborted(&self, task_id: Uuid, reason: &str) -> Result<u64> {
        self.append(
            json!({ "task_id": task_id }),
            None,
            AuditOutcome::TaskAborted {
                reason: reason.to_string(),
            },
        )
        .await
    }

    /// Snapshot of the full trail, in append order.
    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }

    /// Records whose operation context references the given operation id.
    pub async fn records_for_operation(&self, operation_id: Uuid) -> Vec<AuditRecord> {
        let needle = operation_id.to_string();
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| {
                r.operation
                    .get("operation_id")
                    .and_then(|v| v.as_str())
                    .map(|s| s == needle)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Records carrying a deny verdict or a pre-gate rejection.
    pub async fn denials(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| {
                matches!(
                    r.outcome,
                    AuditOutcome::Denied | AuditOutcome::Rejected { .. }
                ) || matches!(
                    r.decision.as_ref().map(|d| &d.verdict),
                    Some(Verdict::Deny { .. })
                )
            })
            .cloned()
            .collect()
    }

    /// Number of records appended so far.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
