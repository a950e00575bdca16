//! Slow-pass scheduling.
//!
//! One state machine, two interchangeable backends: an in-process executor
//! on the tokio runtime and a Redis-brokered one for multi-process
//! deployments. The backend is chosen once at startup by [`probe`].

pub mod distributed;
pub mod in_process;
pub mod orchestrator;
pub mod probe;
pub mod sweeper;

pub use distributed::RedisExecutor;
pub use in_process::InProcessExecutor;
pub use orchestrator::{TaskExecutor, TaskOrchestrator};
pub use probe::select_executor;
pub use sweeper::{start_sweeper, SweeperHandle};

use thiserror::Error;

use crate::models::{ErrorKind, SlowPassJob, TaskResult, TaskFailure, TaskStatus};

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Task backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("Invalid task transition for {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Task record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Task table lock poisoned")]
    LockPoisoned,
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::NotFound(_) => ErrorKind::NotFound,
            TaskError::BackendUnreachable(_) => ErrorKind::BackendUnreachable,
            TaskError::InvalidTransition { .. }
            | TaskError::Serialization(_)
            | TaskError::LockPoisoned => ErrorKind::Internal,
        }
    }
}

impl From<redis::RedisError> for TaskError {
    fn from(e: redis::RedisError) -> Self {
        TaskError::BackendUnreachable(e.to_string())
    }
}

/// The body of a slow-pass task. Runs on a blocking thread.
pub trait JobRunner: Send + Sync + 'static {
    fn run(&self, job: &SlowPassJob) -> Result<TaskResult, TaskFailure>;
}

/// Outcome of one job execution, shared by both backends.
///
/// `permit` is the pool slot the job runs under. It moves into the blocking
/// body and is released only when that body returns, so a job that outlives
/// `max_runtime` keeps occupying its slot.
pub(crate) async fn execute_job(
    runner: std::sync::Arc<dyn JobRunner>,
    job: SlowPassJob,
    max_runtime: std::time::Duration,
    permit: tokio::sync::OwnedSemaphorePermit,
) -> Result<TaskResult, TaskFailure> {
    let document_id = job.document_id.clone();
    let handle = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        runner.run(&job)
    });

    match tokio::time::timeout(max_runtime, handle).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_err)) => {
            tracing::error!(document_id = %document_id, error = %join_err, "Slow pass panicked");
            Err(TaskFailure {
                kind: ErrorKind::Internal,
                message: "Internal processing error".into(),
            })
        }
        Err(_) => {
            tracing::warn!(
                document_id = %document_id,
                max_runtime_secs = max_runtime.as_secs(),
                "Slow pass exceeded max runtime"
            );
            Err(timeout_failure(max_runtime))
        }
    }
}

pub(crate) fn timeout_failure(max_runtime: std::time::Duration) -> TaskFailure {
    TaskFailure {
        kind: ErrorKind::TaskTimeout,
        message: format!("Task exceeded maximum runtime of {}s", max_runtime.as_secs()),
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::testing::{job, slot, Behavior, ScriptedRunner};
    use super::*;

    #[tokio::test]
    async fn successful_job_returns_result_and_frees_slot() {
        let runner = Arc::new(ScriptedRunner::new(Behavior::Succeed));
        let (pool, permit) = slot().await;
        let result = execute_job(runner, job("doc", true), Duration::from_secs(5), permit)
            .await
            .unwrap();
        assert_eq!(result.document_id, "doc");
        assert_eq!(pool.available_permits(), 1);
    }

    #[tokio::test]
    async fn timed_out_job_holds_slot_until_body_ends() {
        let runner = Arc::new(ScriptedRunner::new(Behavior::Sleep(Duration::from_millis(300))));
        let (pool, permit) = slot().await;
        let failure = execute_job(runner, job("doc", true), Duration::from_millis(20), permit)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::TaskTimeout);
        assert_eq!(pool.available_permits(), 0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(pool.available_permits(), 1);
    }

    #[tokio::test]
    async fn panicking_job_is_internal_and_frees_slot() {
        let runner = Arc::new(ScriptedRunner::new(Behavior::Panic));
        let (pool, permit) = slot().await;
        let failure = execute_job(runner, job("doc", false), Duration::from_secs(5), permit)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::Internal);
        assert_eq!(pool.available_permits(), 1);
    }
}
