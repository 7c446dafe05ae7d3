//! Plan/state tracker with write-through persistence.
//!
//! Every mutation validates the step transition, applies it, and persists
//! the full task snapshot before returning, so a restart resumes from the
//! last committed state. Updates to one task serialize through a per-task
//! async mutex (single writer per task); distinct tasks are independent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;
use uuid::Uuid;

use foreman_state::{KvStore, StorageError};

use crate::domain::error::{AgentError, Result};
use crate::domain::task::{StepStatus, Task, TaskStatus};

fn plan_key(task_id: Uuid) -> String {
    format!("plan/{task_id}")
}

/// Tracks plan state for all active tasks.
pub struct PlanTracker {
    store: Arc<dyn KvStore>,
    tasks: StdMutex<HashMap<Uuid, Arc<Mutex<Task>>>>,
}

impl PlanTracker {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            tasks: StdMutex::new(HashMap::new()),
        }
    }

    fn entry(&self, task_id: Uuid) -> Result<Arc<Mutex<Task>>> {
        self.tasks
            .lock()
            .unwrap()
            .get(&task_id)
            .cloned()
            .ok_or(AgentError::TaskNotFound(task_id))
    }

    async fn persist(&self, task: &Task) -> Result<()> {
        let bytes = serde_json::to_vec(task)?;
        self.store.put(&plan_key(task.task_id), &bytes).await?;
        Ok(())
    }

    /// Register a new task and persist its initial snapshot. All steps
    /// must still be pending.
    pub async fn create_plan(&self, task: &Task) -> Result<()> {
        self.persist(task).await?;
        self.tasks
            .lock()
            .unwrap()
            .insert(task.task_id, Arc::new(Mutex::new(task.clone())));
        Ok(())
    }

    /// Apply a step status transition, with an optional result reference.
    ///
    /// Illegal transitions fail with `AgentError::Transition`. Re-delivering
    /// a result to an already-terminal step is an idempotent no-op when the
    /// status matches the step's current status.
    pub async fn update_step(
        &self,
        task_id: Uuid,
        index: usize,
        status: StepStatus,
        result_ref: Option<String>,
    ) -> Result<()> {
        let entry = self.entry(task_id)?;
        let mut task = entry.lock().await;

        let step = task
            .steps
            .get_mut(index)
            .ok_or(AgentError::StepNotFound { task_id, index })?;

        if step.status == status && step.status.is_terminal() {
            // Idempotent re-delivery: terminal steps never mutate.
            return Ok(());
        }
        if !step.status.can_transition(status) {
            return Err(AgentError::Transition {
                index,
                from: step.status,
                to: status,
            });
        }

        step.status = status;
        if let Some(r) = result_ref {
            step.result_ref = Some(r);
        }
        self.persist(&task).await
    }

    /// Record one failed attempt on a step; returns the new retry count.
    pub async fn record_retry(&self, task_id: Uuid, index: usize) -> Result<u32> {
        let entry = self.entry(task_id)?;
        let mut task = entry.lock().await;
        let step = task
            .steps
            .get_mut(index)
            .ok_or(AgentError::StepNotFound { task_id, index })?;
        step.retry_count += 1;
        let count = step.retry_count;
        self.persist(&task).await?;
        Ok(count)
    }

    /// Consume one unit of the task's step budget; returns iterations used.
    pub async fn record_iteration(&self, task_id: Uuid) -> Result<u32> {
        let entry = self.entry(task_id)?;
        let mut task = entry.lock().await;
        task.iterations += 1;
        let used = task.iterations;
        self.persist(&task).await?;
        Ok(used)
    }

    /// Move the task to a terminal status. Only `Active` tasks may move;
    /// setting the current status again is a no-op.
    pub async fn set_task_status(&self, task_id: Uuid, status: TaskStatus) -> Result<()> {
        let entry = self.entry(task_id)?;
        let mut task = entry.lock().await;
        if task.status == status {
            return Ok(());
        }
        if task.status != TaskStatus::Active {
            return Err(AgentError::TaskTransition {
                from: task.status,
                to: status,
            });
        }
        task.status = status;
        self.persist(&task).await
    }

    /// Mark every still-pending step as skipped. Returns how many were
    /// skipped.
    pub async fn skip_remaining(&self, task_id: Uuid) -> Result<usize> {
        let entry = self.entry(task_id)?;
        let mut task = entry.lock().await;
        let mut skipped = 0;
        for step in task.steps.iter_mut() {
            if step.status == StepStatus::Pending {
                step.status = StepStatus::Skipped;
                skipped += 1;
            }
        }
        if skipped > 0 {
            self.persist(&task).await?;
        }
        Ok(skipped)
    }

    /// Immutable snapshot of the task.
    pub async fn get_snapshot(&self, task_id: Uuid) -> Result<Task> {
        let entry = self.entry(task_id)?;
        let task = entry.lock().await;
        Ok(task.clone())
    }

    /// Resume a task from its last committed snapshot, registering it for
    /// further updates.
    pub async fn load(&self, task_id: Uuid) -> Result<Task> {
        let bytes = match self.store.get(&plan_key(task_id)).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound { .. }) => return Err(AgentError::TaskNotFound(task_id)),
            Err(e) => return Err(e.into()),
        };
        let task: Task = serde_json::from_slice(&bytes)?;
        self.tasks
            .lock()
            .unwrap()
            .insert(task_id, Arc::new(Mutex::new(task.clone())));
        Ok(task)
    }
}
