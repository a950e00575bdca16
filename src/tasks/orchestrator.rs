use std::time::Duration;

use chrono::Utc;

use super::in_process::to_chrono;
use super::{timeout_failure, InProcessExecutor, RedisExecutor, TaskError};
use crate::models::{ErrorKind, SlowPassJob, StatusProjection, TaskRecord, TaskStatus};
use crate::pipeline::limiter::{CeilingLayer, ResultLimiter};

/// The backend picked at startup.
pub enum TaskExecutor {
    InProcess(InProcessExecutor),
    Distributed(RedisExecutor),
}

impl TaskExecutor {
    pub fn name(&self) -> &'static str {
        match self {
            TaskExecutor::InProcess(_) => "in_process",
            TaskExecutor::Distributed(_) => "redis",
        }
    }

    pub fn is_distributed(&self) -> bool {
        matches!(self, TaskExecutor::Distributed(_))
    }

    async fn submit(&self, job: SlowPassJob) -> Result<String, TaskError> {
        match self {
            TaskExecutor::InProcess(e) => e.submit(job),
            TaskExecutor::Distributed(e) => e.submit(job).await,
        }
    }

    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, TaskError> {
        match self {
            TaskExecutor::InProcess(e) => e.get(task_id),
            TaskExecutor::Distributed(e) => e.get(task_id).await,
        }
    }

    async fn compare_and_set(&self, expected: TaskStatus, next: &TaskRecord) -> Result<bool, TaskError> {
        match self {
            TaskExecutor::InProcess(e) => e.compare_and_set(expected, next),
            TaskExecutor::Distributed(e) => e.compare_and_set(expected, next).await,
        }
    }

    async fn cleanup(&self, older_than: Duration) -> Result<usize, TaskError> {
        match self {
            TaskExecutor::InProcess(e) => e.cleanup(older_than),
            TaskExecutor::Distributed(e) => e.cleanup(older_than).await,
        }
    }

    async fn expire_overdue(&self) -> Result<usize, TaskError> {
        match self {
            TaskExecutor::InProcess(e) => e.expire_overdue(),
            TaskExecutor::Distributed(e) => e.expire_overdue().await,
        }
    }
}

/// Uniform submit/poll/cleanup over whichever backend is active.
pub struct TaskOrchestrator {
    executor: TaskExecutor,
    limiter: ResultLimiter,
    max_runtime: Duration,
}

impl TaskOrchestrator {
    pub fn new(executor: TaskExecutor, limiter: ResultLimiter, max_runtime: Duration) -> Self {
        Self {
            executor,
            limiter,
            max_runtime,
        }
    }

    pub fn executor(&self) -> &TaskExecutor {
        &self.executor
    }

    pub fn backend_name(&self) -> &'static str {
        self.executor.name()
    }

    /// Whether the distributed backend answers. Always false in-process.
    pub async fn backend_reachable(&self) -> bool {
        match &self.executor {
            TaskExecutor::InProcess(_) => false,
            TaskExecutor::Distributed(e) => e.ping().await,
        }
    }

    pub async fn submit(&self, job: SlowPassJob) -> Result<String, TaskError> {
        let document_id = job.document_id.clone();
        let needs_recognition = job.needs_recognition;
        let task_id = self.executor.submit(job).await?;
        tracing::info!(
            task_id = %task_id,
            document_id = %document_id,
            needs_recognition,
            backend = self.backend_name(),
            "Slow pass scheduled"
        );
        Ok(task_id)
    }

    /// Raw record, with the runtime limit applied first.
    pub async fn record(&self, task_id: &str) -> Result<Option<TaskRecord>, TaskError> {
        let Some(record) = self.executor.get(task_id).await? else {
            return Ok(None);
        };
        if !record.is_overdue(Utc::now(), to_chrono(self.max_runtime)) {
            return Ok(Some(record));
        }

        let failure = timeout_failure(self.max_runtime);
        let failed = record.failed(ErrorKind::TaskTimeout, failure.message);
        if self.executor.compare_and_set(TaskStatus::Processing, &failed).await? {
            tracing::warn!(task_id = %task_id, "Task expired on poll");
            return Ok(Some(failed));
        }
        self.executor.get(task_id).await
    }

    /// Status projection. Embedded tables are re-capped at
    /// `min(response ceiling, requested_limit)`.
    pub async fn poll(
        &self,
        task_id: &str,
        requested_limit: Option<usize>,
    ) -> Result<StatusProjection, TaskError> {
        let record = self
            .record(task_id)
            .await?
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;

        let result = record.result.map(|mut result| {
            result.tables = self
                .limiter
                .cap_all(CeilingLayer::Response, &result.tables, requested_limit);
            result
        });

        Ok(StatusProjection {
            task_id: record.task_id,
            status: record.status,
            document_id: record.document_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
            result,
            error: record.error,
        })
    }

    pub async fn cleanup(&self, older_than: Duration) -> Result<usize, TaskError> {
        let removed = self.executor.cleanup(older_than).await?;
        if removed > 0 {
            tracing::info!(removed, "Expired task records removed");
        }
        Ok(removed)
    }

    pub async fn expire_overdue(&self) -> Result<usize, TaskError> {
        let expired = self.executor.expire_overdue().await?;
        if expired > 0 {
            tracing::warn!(expired, "Overdue tasks failed with timeout");
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::{
        keyed_row, ProcessingMethod, Table, TableSource, TableType, TaskFailure, TaskResult,
    };
    use crate::pipeline::limiter::Ceilings;
    use crate::tasks::testing::{job, Behavior, ScriptedRunner};
    use crate::tasks::JobRunner;

    fn limiter() -> ResultLimiter {
        ResultLimiter::new(Ceilings {
            storage: 10_000,
            preview: 50,
            response: 10,
        })
    }

    fn orchestrator(runner: Arc<dyn JobRunner>, max_runtime: Duration) -> TaskOrchestrator {
        let exec = InProcessExecutor::new(runner, 2, 4, max_runtime);
        TaskOrchestrator::new(TaskExecutor::InProcess(exec), limiter(), max_runtime)
    }

    async fn wait_terminal(orch: &TaskOrchestrator, task_id: &str, limit: Option<usize>) -> StatusProjection {
        for _ in 0..200 {
            let status = orch.poll(task_id, limit).await.unwrap();
            if status.status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task never finished");
    }

    struct TableRunner;

    impl JobRunner for TableRunner {
        fn run(&self, job: &SlowPassJob) -> Result<TaskResult, TaskFailure> {
            let headers = vec!["id".to_string()];
            let rows = (0..50).map(|i| keyed_row(&headers, &[i.to_string()])).collect();
            let table = Table {
                index: 0,
                headers,
                rows,
                true_row_count: 5_000,
                applied_ceiling: 50,
                is_truncated: true,
                table_type: TableType::Data,
                confidence: 1.0,
                source: TableSource::DelimitedParser,
                column_types: Vec::new(),
                page_number: None,
                warnings: Vec::new(),
            };
            Ok(TaskResult {
                document_id: job.document_id.clone(),
                processing_method: ProcessingMethod::Native,
                recognition_used: false,
                word_count: 0,
                page_count: 1,
                table_count: 1,
                tables: vec![table],
                warnings: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn poll_recaps_tables_at_response_ceiling() {
        let orch = orchestrator(Arc::new(TableRunner), Duration::from_secs(5));
        let id = orch.submit(job("doc", false)).await.unwrap();

        let status = wait_terminal(&orch, &id, None).await;
        let table = &status.result.unwrap().tables[0];
        assert_eq!(table.rows.len(), 10);
        assert!(table.is_truncated);
        assert_eq!(table.true_row_count, 5_000);
        assert_eq!(table.applied_ceiling, 10);

        let narrow = orch.poll(&id, Some(3)).await.unwrap();
        assert_eq!(narrow.result.unwrap().tables[0].rows.len(), 3);
        let wide = orch.poll(&id, Some(500)).await.unwrap();
        assert_eq!(wide.result.unwrap().tables[0].rows.len(), 10);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let orch = orchestrator(Arc::new(ScriptedRunner::new(Behavior::Succeed)), Duration::from_secs(5));
        let err = orch.poll("missing", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn failure_projection_carries_kind_only() {
        let orch = orchestrator(
            Arc::new(ScriptedRunner::new(Behavior::Fail(ErrorKind::UnsupportedFormat))),
            Duration::from_secs(5),
        );
        let id = orch.submit(job("doc", false)).await.unwrap();
        let status = wait_terminal(&orch, &id, None).await;
        assert_eq!(status.status, TaskStatus::Failed);
        assert!(status.result.is_none());
        assert_eq!(status.error.unwrap().kind, ErrorKind::UnsupportedFormat);
    }

    #[tokio::test]
    async fn overdue_record_fails_on_poll() {
        let orch = orchestrator(Arc::new(ScriptedRunner::new(Behavior::Succeed)), Duration::from_secs(60));
        let TaskExecutor::InProcess(exec) = orch.executor() else {
            unreachable!()
        };
        let pending = TaskRecord::pending("t1".into(), "doc".into());
        let mut running = pending.processing();
        running.started_at = Some(Utc::now() - chrono::Duration::seconds(600));
        exec.seed_for_test(pending);
        assert!(exec.compare_and_set(TaskStatus::Pending, &running).unwrap());

        let status = orch.poll("t1", None).await.unwrap();
        assert_eq!(status.status, TaskStatus::Failed);
        assert_eq!(status.error.unwrap().kind, ErrorKind::TaskTimeout);
    }

    #[tokio::test]
    async fn in_process_backend_reports_unreachable_broker() {
        let orch = orchestrator(Arc::new(ScriptedRunner::new(Behavior::Succeed)), Duration::from_secs(5));
        assert_eq!(orch.backend_name(), "in_process");
        assert!(!orch.backend_reachable().await);
        assert_eq!(orch.cleanup(Duration::from_secs(3600)).await.unwrap(), 0);
        assert_eq!(orch.expire_overdue().await.unwrap(), 0);
    }
}
