//! Task backend living inside the serving process.
//!
//! Records sit in a mutex-guarded table owned by the executor. Each job is a
//! tokio task that waits for a permit from one of two pools, then runs the
//! blocking body under the runtime timeout. The permit stays with the body,
//! so a timed-out job still counts against its pool until it returns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::{execute_job, timeout_failure, JobRunner, TaskError};
use crate::models::{ErrorKind, SlowPassJob, TaskRecord, TaskStatus};

type TaskTable = Arc<Mutex<HashMap<String, TaskRecord>>>;

pub struct InProcessExecutor {
    tasks: TaskTable,
    runner: Arc<dyn JobRunner>,
    recognition_pool: Arc<Semaphore>,
    enhancement_pool: Arc<Semaphore>,
    max_runtime: Duration,
}

impl InProcessExecutor {
    pub fn new(
        runner: Arc<dyn JobRunner>,
        recognition_workers: usize,
        enhancement_workers: usize,
        max_runtime: Duration,
    ) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            runner,
            recognition_pool: Arc::new(Semaphore::new(recognition_workers.max(1))),
            enhancement_pool: Arc::new(Semaphore::new(enhancement_workers.max(1))),
            max_runtime,
        }
    }

    /// Record the task as `PENDING` and spawn it. Returns immediately.
    pub fn submit(&self, job: SlowPassJob) -> Result<String, TaskError> {
        let task_id = Uuid::new_v4().to_string();
        lock(&self.tasks)?.insert(
            task_id.clone(),
            TaskRecord::pending(task_id.clone(), job.document_id.clone()),
        );

        let pool = if job.needs_recognition {
            Arc::clone(&self.recognition_pool)
        } else {
            Arc::clone(&self.enhancement_pool)
        };
        let tasks = Arc::clone(&self.tasks);
        let runner = Arc::clone(&self.runner);
        let max_runtime = self.max_runtime;
        let id = task_id.clone();

        tokio::spawn(async move {
            let Ok(permit) = pool.acquire_owned().await else {
                return;
            };
            if !matches!(transition(&tasks, &id, |r| r.processing()), Ok(true)) {
                return;
            }
            tracing::debug!(task_id = %id, document_id = %job.document_id, "Task picked up");

            let outcome = execute_job(runner, job, max_runtime, permit).await;
            let applied = match outcome {
                Ok(result) => transition(&tasks, &id, |r| r.completed(result)),
                Err(failure) => transition(&tasks, &id, |r| r.failed(failure.kind, failure.message)),
            };
            match applied {
                Ok(true) => {}
                Ok(false) => tracing::warn!(task_id = %id, "Late task outcome rejected"),
                Err(e) => tracing::error!(task_id = %id, error = %e, "Failed to record task outcome"),
            }
        });

        Ok(task_id)
    }

    pub fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, TaskError> {
        Ok(lock(&self.tasks)?.get(task_id).cloned())
    }

    /// Compare-and-set from `expected` to `next`. False when the record has
    /// moved on or the move is not allowed.
    pub fn compare_and_set(
        &self,
        expected: TaskStatus,
        next: &TaskRecord,
    ) -> Result<bool, TaskError> {
        let mut tasks = lock(&self.tasks)?;
        match tasks.get(&next.task_id) {
            Some(current)
                if current.status == expected && current.status.can_transition_to(next.status) =>
            {
                tasks.insert(next.task_id.clone(), next.clone());
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(TaskError::NotFound(next.task_id.clone())),
        }
    }

    /// Drop terminal records last touched before `now - older_than`.
    pub fn cleanup(&self, older_than: Duration) -> Result<usize, TaskError> {
        let cutoff = Utc::now() - to_chrono(older_than);
        let mut tasks = lock(&self.tasks)?;
        let before = tasks.len();
        tasks.retain(|_, r| !(r.status.is_terminal() && r.updated_at < cutoff));
        Ok(before - tasks.len())
    }

    /// Fail every `PROCESSING` record that has outlived the runtime limit.
    pub fn expire_overdue(&self) -> Result<usize, TaskError> {
        let now = Utc::now();
        let limit = to_chrono(self.max_runtime);
        let failure = timeout_failure(self.max_runtime);
        let mut tasks = lock(&self.tasks)?;
        let mut expired = 0;
        for record in tasks.values_mut() {
            if record.is_overdue(now, limit) {
                *record = record.failed(ErrorKind::TaskTimeout, failure.message.clone());
                expired += 1;
            }
        }
        Ok(expired)
    }

    pub fn task_count(&self) -> usize {
        lock(&self.tasks).map(|t| t.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn seed_for_test(&self, record: TaskRecord) {
        self.tasks
            .lock()
            .unwrap()
            .insert(record.task_id.clone(), record);
    }
}

fn lock(tasks: &TaskTable) -> Result<MutexGuard<'_, HashMap<String, TaskRecord>>, TaskError> {
    tasks.lock().map_err(|_| TaskError::LockPoisoned)
}

fn transition<F>(tasks: &TaskTable, task_id: &str, next: F) -> Result<bool, TaskError>
where
    F: FnOnce(&TaskRecord) -> TaskRecord,
{
    let mut guard = lock(tasks)?;
    let Some(current) = guard.get(task_id) else {
        return Ok(false);
    };
    let updated = next(current);
    if !current.status.can_transition_to(updated.status) {
        return Ok(false);
    }
    guard.insert(task_id.to_string(), updated);
    Ok(true)
}

pub(crate) fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(36_500))
}
