//! Collaborator contracts consumed and produced by the core.
//!
//! These traits are the boundary to external systems: the planner, the
//! knowledge retriever, and the output channel. Shipping implementations
//! are deliberately small; real deployments plug their own in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::domain::error::Result;
use crate::domain::task::{StepStatus, TaskStatus};

/// Produces an ordered list of step instructions for a task description.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn generate_plan(&self, description: &str) -> Result<Vec<String>>;
}

/// Deterministic planner: one step per `;`/newline-separated clause, the
/// whole description as a single step otherwise.
pub struct LinePlanner;

#[async_trait]
impl Planner for LinePlanner {
    async fn generate_plan(&self, description: &str) -> Result<Vec<String>> {
        let steps: Vec<String> = description
            .split(|c| c == ';' || c == '\n')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Ok(steps)
    }
}

/// Where a retrieved fact came from. Order encodes the fact-priority
/// policy: authoritative datasource > live search > internal knowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceClass {
    Authoritative = 0,
    LiveSearch = 1,
    Internal = 2,
}

/// One retrieved fact with its ranking inputs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedFact {
    /// Topic key; facts sharing a key are considered conflicting.
    pub key: String,
    pub content: String,
    pub source: SourceClass,
    pub score: f64,
}

/// Retrieves ranked context items for a query.
#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<RankedFact>>;
}

/// Retriever that knows nothing. Default for deployments without a
/// knowledge backend.
pub struct NoKnowledge;

#[async_trait]
impl KnowledgeRetriever for NoKnowledge {
    async fn retrieve(&self, _query: &str) -> Result<Vec<RankedFact>> {
        Ok(Vec::new())
    }
}

/// Merge facts under the fact-priority policy: for each key keep the fact
/// from the highest-priority source class, breaking ties by score.
pub fn merge_facts(facts: Vec<RankedFact>) -> Vec<RankedFact> {
    use std::collections::HashMap;

    let mut best: HashMap<String, RankedFact> = HashMap::new();
    for fact in facts {
        match best.get(&fact.key) {
            Some(existing)
                if (existing.source, -existing.score) <= (fact.source, -fact.score) => {}
            _ => {
                best.insert(fact.key.clone(), fact);
            }
        }
    }
    let mut merged: Vec<RankedFact> = best.into_values().collect();
    merged.sort_by(|a, b| {
        (a.source, a.key.as_str())
            .partial_cmp(&(b.source, b.key.as_str()))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged
}

/// Outcome of one plan step, as reported to the output channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepReport {
    pub index: usize,
    pub instruction: String,
    pub status: StepStatus,
    pub result_ref: Option<String>,
}

/// The final result delivered when a task submits or aborts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskReport {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub steps: Vec<StepReport>,
    /// Sanitized outputs of completed steps, in execution order.
    pub outputs: Vec<serde_json::Value>,
    /// Abort reason, when the task aborted.
    pub abort_reason: Option<String>,
}

/// Delivers task reports to whoever is listening.
#[async_trait]
pub trait OutputChannel: Send + Sync {
    /// Deliver a report. Returning `Ok(())` is the acknowledgement.
    async fn deliver(&self, report: &TaskReport) -> Result<()>;
}

/// Channel that logs reports through `tracing`. Default for the daemon.
pub struct LogChannel;

#[async_trait]
impl OutputChannel for LogChannel {
    async fn deliver(&self, report: &TaskReport) -> Result<()> {
        info!(
            task_id = %report.task_id,
            status = %report.status,
            steps = report.steps.len(),
            "task report delivered"
        );
        Ok(())
    }
}
