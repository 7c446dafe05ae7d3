//! Crash-consistency of plan state over the durable store.

use std::sync::Arc;

use uuid::Uuid;

use foreman_core::{PlanStep, PlanTracker, StepStatus, Task, TaskStatus};
use foreman_state::FsKvStore;

#[tokio::test]
async fn restart_resumes_from_last_committed_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let task = Task::new(
        Uuid::new_v4(),
        vec![
            PlanStep::new(0, "fetch the report"),
            PlanStep::new(1, "summarize it").critical(),
        ],
        8,
    );
    let task_id = task.task_id;

    // First process: run halfway through the plan.
    {
        let store = Arc::new(FsKvStore::new(dir.path()).unwrap());
        let tracker = PlanTracker::new(store);
        tracker.create_plan(&task).await.unwrap();
        tracker
            .update_step(task_id, 0, StepStatus::Running, None)
            .await
            .unwrap();
        tracker
            .update_step(task_id, 0, StepStatus::Done, Some("digest-0".into()))
            .await
            .unwrap();
        tracker.record_iteration(task_id).await.unwrap();
        tracker
            .update_step(task_id, 1, StepStatus::Running, None)
            .await
            .unwrap();
        tracker.record_retry(task_id, 1).await.unwrap();
        // Process dies here: step 1 still running, one retry recorded.
    }

    // Second process: resume and finish.
    let store = Arc::new(FsKvStore::new(dir.path()).unwrap());
    let tracker = PlanTracker::new(store);
    let resumed = tracker.load(task_id).await.unwrap();

    assert_eq!(resumed.status, TaskStatus::Active);
    assert_eq!(resumed.steps[0].status, StepStatus::Done);
    assert_eq!(resumed.steps[0].result_ref.as_deref(), Some("digest-0"));
    assert_eq!(resumed.steps[1].status, StepStatus::Running);
    assert_eq!(resumed.steps[1].retry_count, 1);
    assert!(resumed.steps[1].critical);
    assert_eq!(resumed.iterations, 1);

    tracker
        .update_step(task_id, 1, StepStatus::Done, Some("digest-1".into()))
        .await
        .unwrap();
    tracker
        .set_task_status(task_id, TaskStatus::Submitted)
        .await
        .unwrap();

    let final_snap = tracker.get_snapshot(task_id).await.unwrap();
    assert_eq!(final_snap.status, TaskStatus::Submitted);
    assert!(final_snap.all_steps_terminal());
}
