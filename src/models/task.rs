use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{DocumentFormat, ErrorKind, ProcessingMethod, TaskStatus};
use super::table::Table;

/// The independently schedulable stage of the pipeline.
///
/// Carries only references: the worker reloads the raw bytes from the content
/// store by fingerprint, so the job stays small enough for a broker queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowPassJob {
    pub document_id: String,
    pub filename: String,
    pub format: DocumentFormat,
    /// Routes the job to the small recognition pool instead of the
    /// general enhancement pool.
    pub needs_recognition: bool,
}

/// Bounded outcome of a completed slow pass. Tables are preview-capped
/// before they are written here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub document_id: String,
    pub processing_method: ProcessingMethod,
    pub recognition_used: bool,
    pub word_count: usize,
    pub page_count: usize,
    pub table_count: usize,
    pub tables: Vec<Table>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// Durable task record, shared by both execution backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub status: TaskStatus,
    pub document_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub result: Option<TaskResult>,
    pub error: Option<TaskFailure>,
}

impl TaskRecord {
    pub fn pending(task_id: String, document_id: String) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            status: TaskStatus::Pending,
            document_id,
            created_at: now,
            updated_at: now,
            started_at: None,
            result: None,
            error: None,
        }
    }

    /// Copy of this record moved to `PROCESSING`. `started_at` is kept on re-pickup.
    pub fn processing(&self) -> Self {
        let now = Utc::now();
        Self {
            status: TaskStatus::Processing,
            updated_at: now,
            started_at: self.started_at.or(Some(now)),
            ..self.clone()
        }
    }

    pub fn completed(&self, result: TaskResult) -> Self {
        Self {
            status: TaskStatus::Completed,
            updated_at: Utc::now(),
            result: Some(result),
            error: None,
            ..self.clone()
        }
    }

    pub fn failed(&self, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            updated_at: Utc::now(),
            result: None,
            error: Some(TaskFailure {
                kind,
                message: message.into(),
            }),
            ..self.clone()
        }
    }

    /// True when a `PROCESSING` record has run past `max_runtime`.
    pub fn is_overdue(&self, now: DateTime<Utc>, max_runtime: chrono::Duration) -> bool {
        if self.status != TaskStatus::Processing {
            return false;
        }
        let started = self.started_at.unwrap_or(self.updated_at);
        now - started > max_runtime
    }
}

/// What a poller sees. Embedded tables are re-capped on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusProjection {
    pub task_id: String,
    pub status: TaskStatus,
    pub document_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_record_has_no_result() {
        let record = TaskRecord::pending("t1".into(), "doc".into());
        assert_eq!(record.status, TaskStatus::Pending);
        assert!(record.started_at.is_none());
        assert!(record.result.is_none());
    }

    #[test]
    fn reprocessing_keeps_start_time() {
        let first = TaskRecord::pending("t1".into(), "doc".into()).processing();
        let again = first.processing();
        assert_eq!(first.started_at, again.started_at);
    }

    #[test]
    fn overdue_only_while_processing() {
        let mut record = TaskRecord::pending("t1".into(), "doc".into()).processing();
        record.started_at = Some(Utc::now() - chrono::Duration::seconds(120));
        assert!(record.is_overdue(Utc::now(), chrono::Duration::seconds(60)));
        assert!(!record.is_overdue(Utc::now(), chrono::Duration::seconds(600)));

        let failed = record.failed(ErrorKind::TaskTimeout, "late");
        assert!(!failed.is_overdue(Utc::now(), chrono::Duration::seconds(60)));
    }

    #[test]
    fn record_survives_json() {
        let record = TaskRecord::pending("t1".into(), "doc".into())
            .processing()
            .failed(ErrorKind::StorageCorruption, "bad blob");
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"status\":\"FAILED\""));
        assert!(json.contains("\"kind\":\"storage_corruption\""));
        let back: TaskRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
