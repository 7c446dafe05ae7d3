//! Bridges the event stream into the agentic loop.
//!
//! One [`AgenticLoop`] instance runs per task, so the dispatcher builds a
//! fresh controller for every task-initiating event it receives and keeps
//! the resulting reports for the caller.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::collab::{KnowledgeRetriever, OutputChannel, Planner, TaskReport};
use crate::domain::error::Result;
use crate::domain::event::AgentEvent;
use crate::events::EventHandler;
use crate::plan::PlanTracker;
use crate::security::SecurityManager;

use super::agentic::{AgenticLoop, LoopConfig};

/// Event handler that runs one agentic loop per initiating event.
pub struct TaskDispatcher {
    planner: Arc<dyn Planner>,
    knowledge: Arc<dyn KnowledgeRetriever>,
    manager: Arc<SecurityManager>,
    tracker: Arc<PlanTracker>,
    output: Arc<dyn OutputChannel>,
    config: LoopConfig,
    reports: Mutex<Vec<TaskReport>>,
}

impl TaskDispatcher {
    pub fn new(
        planner: Arc<dyn Planner>,
        knowledge: Arc<dyn KnowledgeRetriever>,
        manager: Arc<SecurityManager>,
        tracker: Arc<PlanTracker>,
        output: Arc<dyn OutputChannel>,
        config: LoopConfig,
    ) -> Self {
        Self {
            planner,
            knowledge,
            manager,
            tracker,
            output,
            config,
            reports: Mutex::new(Vec::new()),
        }
    }

    /// Reports of every task run so far, in completion order.
    pub async fn reports(&self) -> Vec<TaskReport> {
        self.reports.lock().await.clone()
    }
}

#[async_trait]
impl EventHandler for TaskDispatcher {
    async fn handle(&self, event: &AgentEvent) -> Result<()> {
        let controller = AgenticLoop::new(
            self.planner.clone(),
            self.knowledge.clone(),
            self.manager.clone(),
            self.tracker.clone(),
            self.output.clone(),
            self.config.clone(),
        );
        let report = controller.run_task(event.clone()).await?;
        self.reports.lock().await.push(report);
        Ok(())
    }
}
