//! Shared engine state.
//!
//! `EngineState` wires the content store, the extraction pipeline and the
//! task orchestrator together behind the submission, poll, table-read and
//! health contracts. Built once at startup and shared as `Arc<EngineState>`
//! by the HTTP layer and the worker entry point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, EngineConfig};
use crate::models::{
    DocumentSummary, ErrorKind, ProcessingMethod, StatusProjection, Table, TableType, TaskStatus,
};
use crate::pipeline::extraction::{
    render_window, CollaboratorRegistry, DisabledRecognition, ExtractionError, RecognitionEngine,
    RenderFormat, TesseractCli,
};
use crate::pipeline::import::compute_fingerprint;
use crate::pipeline::limiter::{CeilingLayer, TableWindow};
use crate::pipeline::processor::ExtractionPipeline;
use crate::pipeline::storage::{ContentStore, SearchHit, StorageError, StoreStats, TableHit};
use crate::pipeline::PipelineError;
use crate::tasks::{select_executor, start_sweeper, JobRunner, SweeperHandle, TaskError, TaskExecutor, TaskOrchestrator};

/// Most documents a single listing or search returns.
const MAX_LIST_LIMIT: usize = 500;

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Blocking worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Pipeline(e) => e.kind(),
            ServiceError::Storage(e) => e.kind(),
            ServiceError::Extraction(e) => e.kind(),
            ServiceError::Task(e) => e.kind(),
            ServiceError::Config(_) | ServiceError::Worker(_) => ErrorKind::Internal,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Contract types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitStatus {
    /// Finalized by the fast pass.
    Completed,
    /// A slow pass was scheduled by this call.
    Enhancing,
    /// Content already known. Nothing new scheduled.
    Duplicate,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub document_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub status: SubmitStatus,
    pub is_new: bool,
    pub document: DocumentSummary,
}

/// Metadata plus preview-capped tables. Never decodes the text blob.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentDetail {
    #[serde(flatten)]
    pub summary: DocumentSummary,
    pub tables: Vec<Table>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableQuery {
    #[serde(default)]
    pub table_index: usize,
    /// 1-based.
    #[serde(default = "first_page")]
    pub page: usize,
    pub page_size: Option<usize>,
    #[serde(default)]
    pub format: RenderFormat,
}

fn first_page() -> usize {
    1
}

impl Default for TableQuery {
    fn default() -> Self {
        Self {
            table_index: 0,
            page: 1,
            page_size: None,
            format: RenderFormat::Json,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderedTable {
    pub format: RenderFormat,
    pub window: TableWindow,
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub store_reachable: bool,
    pub recognition_available: bool,
    pub backend_reachable: bool,
    pub backend: &'static str,
}

// ═══════════════════════════════════════════════════════════
// EngineState
// ═══════════════════════════════════════════════════════════

type IngestLock = Arc<tokio::sync::Mutex<()>>;

pub struct EngineState {
    config: EngineConfig,
    pipeline: Arc<ExtractionPipeline>,
    orchestrator: Arc<TaskOrchestrator>,
    /// One async lock per fingerprint being ingested.
    ingest_locks: Mutex<HashMap<String, IngestLock>>,
    shutdown: Arc<AtomicBool>,
    consumers: Mutex<Vec<JoinHandle<()>>>,
    sweeper: Mutex<Option<SweeperHandle>>,
}

impl EngineState {
    /// Open the database, build collaborators and pick the task backend.
    pub async fn initialize(config: EngineConfig) -> Result<Arc<Self>, ServiceError> {
        config.validate()?;

        let store = Arc::new(ContentStore::open(&config.database_path)?);
        tracing::info!(path = %config.database_path.display(), "Content store opened");

        let registry = Arc::new(CollaboratorRegistry::with_defaults(recognition_engine(&config)));
        let pipeline = Arc::new(ExtractionPipeline::new(store, registry, &config));
        let runner: Arc<dyn JobRunner> = pipeline.clone();
        let executor = select_executor(&config, runner).await;

        Ok(Arc::new(Self::from_parts(config, pipeline, executor)))
    }

    pub fn from_parts(
        config: EngineConfig,
        pipeline: Arc<ExtractionPipeline>,
        executor: TaskExecutor,
    ) -> Self {
        let orchestrator = Arc::new(TaskOrchestrator::new(
            executor,
            pipeline.limiter().clone(),
            config.max_task_runtime,
        ));
        Self {
            config,
            pipeline,
            orchestrator,
            ingest_locks: Mutex::new(HashMap::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            consumers: Mutex::new(Vec::new()),
            sweeper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<TaskOrchestrator> {
        &self.orchestrator
    }

    /// Start the maintenance sweeper.
    pub fn start_sweeper(&self) {
        let handle = start_sweeper(
            Arc::clone(&self.orchestrator),
            self.config.sweep_interval,
            self.config.task_retention_window,
        );
        *self.sweeper.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Start the Redis consumer loops. No-op for the in-process backend,
    /// whose jobs run where they are submitted.
    pub fn start_consumers(&self) -> bool {
        let TaskExecutor::Distributed(redis) = self.orchestrator.executor() else {
            return false;
        };
        let runner: Arc<dyn JobRunner> = self.pipeline.clone();
        let handles = redis.spawn_consumers(
            runner,
            self.config.recognition_workers,
            self.config.enhancement_workers,
            Arc::clone(&self.shutdown),
        );
        tracing::info!(consumers = handles.len(), "Distributed consumers started");
        self.consumers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(handles);
        true
    }

    /// Signal every background loop to stop and wait for the consumers.
    pub async fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let sweeper = self.sweeper.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(sweeper) = sweeper {
            sweeper.stop().await;
        }
        let consumers: Vec<_> = self
            .consumers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for handle in consumers {
            let _ = handle.await;
        }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&ExtractionPipeline) -> Result<T, ServiceError> + Send + 'static,
        T: Send + 'static,
    {
        let pipeline = Arc::clone(&self.pipeline);
        tokio::task::spawn_blocking(move || f(&pipeline)).await?
    }

    // ── Submission ──────────────────────────────────────────

    /// Ingest raw bytes. Runs the fast pass inline and schedules the slow
    /// pass when needed. Identical concurrent uploads serialize on one
    /// per-fingerprint lock, so exactly one of them schedules work.
    pub async fn submit(&self, raw: Vec<u8>, filename: String) -> Result<SubmitOutcome, ServiceError> {
        let (fingerprint, raw) = tokio::task::spawn_blocking(move || {
            let fingerprint = compute_fingerprint(&raw);
            (fingerprint, raw)
        })
        .await?;

        let lock = self.ingest_lock(&fingerprint);
        let outcome = {
            let _guard = lock.lock().await;
            self.submit_locked(raw, filename).await
        };
        drop(lock);
        self.release_ingest_lock(&fingerprint);
        outcome
    }

    async fn submit_locked(&self, raw: Vec<u8>, filename: String) -> Result<SubmitOutcome, ServiceError> {
        let fast = self
            .blocking(move |p| Ok(p.fast_pass(&raw, &filename)?))
            .await?;
        let document_id = fast.summary.document_id.clone();

        if fast.is_new {
            let Some(job) = fast.job else {
                return Ok(SubmitOutcome {
                    document_id,
                    task_id: None,
                    status: SubmitStatus::Completed,
                    is_new: true,
                    document: fast.summary,
                });
            };
            let task_id = self.schedule(job).await?;
            let document = self.refreshed(&document_id).await?;
            return Ok(SubmitOutcome {
                document_id,
                task_id: Some(task_id),
                status: SubmitStatus::Enhancing,
                is_new: true,
                document,
            });
        }

        if fast.summary.is_finalized() {
            return Ok(SubmitOutcome {
                document_id,
                task_id: None,
                status: SubmitStatus::Duplicate,
                is_new: false,
                document: fast.summary,
            });
        }

        // Pending enhancement: reuse the live task, or replace a lost one.
        if let Some(task_id) = fast.summary.enhancement_task_id.clone() {
            if let Some(record) = self.orchestrator.record(&task_id).await? {
                if !record.status.is_terminal() || record.status == TaskStatus::Completed {
                    return Ok(SubmitOutcome {
                        document_id,
                        task_id: Some(task_id),
                        status: SubmitStatus::Duplicate,
                        is_new: false,
                        document: fast.summary,
                    });
                }
            }
        }

        tracing::info!(document_id = %document_id, "Rescheduling lost enhancement");
        let summary = fast.summary;
        let job = self.blocking(move |p| Ok(p.job_for(&summary)?)).await?;
        let task_id = self.schedule(job).await?;
        let document = self.refreshed(&document_id).await?;
        Ok(SubmitOutcome {
            document_id,
            task_id: Some(task_id),
            status: SubmitStatus::Enhancing,
            is_new: false,
            document,
        })
    }

    async fn schedule(&self, job: crate::models::SlowPassJob) -> Result<String, ServiceError> {
        let document_id = job.document_id.clone();
        let task_id = self.orchestrator.submit(job).await?;
        let (doc, task) = (document_id.clone(), task_id.clone());
        self.blocking(move |p| Ok(p.store().set_enhancement_task(&doc, &task)?))
            .await?;
        Ok(task_id)
    }

    async fn refreshed(&self, document_id: &str) -> Result<DocumentSummary, ServiceError> {
        let id = document_id.to_string();
        self.blocking(move |p| Ok(p.store().summary(&id)?)).await
    }

    fn ingest_lock(&self, fingerprint: &str) -> IngestLock {
        let mut locks = self.ingest_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(fingerprint.to_string()).or_default())
    }

    /// Drop the map entry once nobody else holds or waits on it.
    fn release_ingest_lock(&self, fingerprint: &str) {
        let mut locks = self.ingest_locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(fingerprint)
            .is_some_and(|lock| Arc::strong_count(lock) <= 1)
        {
            locks.remove(fingerprint);
        }
    }

    // ── Reads ───────────────────────────────────────────────

    pub async fn poll(
        &self,
        task_id: &str,
        requested_limit: Option<usize>,
    ) -> Result<StatusProjection, ServiceError> {
        Ok(self.orchestrator.poll(task_id, requested_limit).await?)
    }

    pub async fn document(&self, document_id: &str) -> Result<DocumentDetail, ServiceError> {
        let id = document_id.to_string();
        self.blocking(move |p| {
            let summary = p.store().summary(&id)?;
            let tables = p.store().tables(&id)?;
            let tables = p.limiter().cap_all(CeilingLayer::Preview, &tables, None);
            Ok(DocumentDetail { summary, tables })
        })
        .await
    }

    /// Paginated table read. `page` is 1-based; `page_size` is clamped to
    /// the response ceiling.
    pub async fn read_table(
        &self,
        document_id: &str,
        query: TableQuery,
    ) -> Result<RenderedTable, ServiceError> {
        let id = document_id.to_string();
        self.blocking(move |p| {
            let table = p.store().table(&id, query.table_index)?;
            let page_size = query
                .page_size
                .unwrap_or_else(|| p.limiter().ceiling(CeilingLayer::Response))
                .max(1);
            let page_size = p.limiter().effective_ceiling(CeilingLayer::Response, Some(page_size));
            let offset = query.page.max(1).saturating_sub(1).saturating_mul(page_size);
            let window = p.limiter().paginate(&table, offset, page_size);
            let body = render_window(&window, query.format)?;
            Ok(RenderedTable {
                format: query.format,
                window,
                body,
            })
        })
        .await
    }

    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<DocumentSummary>, ServiceError> {
        let limit = limit.clamp(1, MAX_LIST_LIMIT);
        self.blocking(move |p| Ok(p.store().list(limit, offset)?))
            .await
    }

    pub async fn list_by_method(
        &self,
        method: ProcessingMethod,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<DocumentSummary>, ServiceError> {
        let limit = limit.clamp(1, MAX_LIST_LIMIT);
        self.blocking(move |p| Ok(p.store().list_by_method(method, limit, offset)?))
            .await
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ServiceError> {
        let query = query.to_string();
        let limit = limit.clamp(1, MAX_LIST_LIMIT);
        self.blocking(move |p| Ok(p.store().search(&query, limit)?))
            .await
    }

    pub async fn tables_by_type(
        &self,
        table_type: TableType,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TableHit>, ServiceError> {
        let limit = limit.clamp(1, MAX_LIST_LIMIT);
        self.blocking(move |p| Ok(p.store().tables_by_type(table_type, limit, offset)?))
            .await
    }

    pub async fn search_tables(&self, query: &str, limit: usize) -> Result<Vec<TableHit>, ServiceError> {
        let query = query.to_string();
        let limit = limit.clamp(1, MAX_LIST_LIMIT);
        self.blocking(move |p| Ok(p.store().search_tables(&query, limit)?))
            .await
    }

    pub async fn stats(&self) -> Result<StoreStats, ServiceError> {
        self.blocking(|p| Ok(p.store().stats()?)).await
    }

    pub async fn health(&self) -> HealthReport {
        let (store_reachable, recognition_available) = self
            .blocking(|p| Ok((p.store().ping(), p.recognition_available())))
            .await
            .unwrap_or((false, false));
        HealthReport {
            store_reachable,
            recognition_available,
            backend_reachable: self.orchestrator.backend_reachable().await,
            backend: self.orchestrator.backend_name(),
        }
    }

    /// Retire terminal task records older than the retention window.
    pub async fn cleanup(&self) -> Result<usize, ServiceError> {
        Ok(self
            .orchestrator
            .cleanup(self.config.task_retention_window)
            .await?)
    }
}

fn recognition_engine(config: &EngineConfig) -> Arc<dyn RecognitionEngine> {
    let binary = config.recognition_command.as_deref().unwrap_or("tesseract");
    if binary.eq_ignore_ascii_case("off") {
        tracing::info!("Recognition disabled by configuration");
        return Arc::new(DisabledRecognition);
    }
    Arc::new(TesseractCli::detect(binary, &config.recognition_languages))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use super::*;
    use crate::pipeline::extraction::recognition::testing::ScriptedRecognition;
    use crate::tasks::InProcessExecutor;

    /// In-memory engine on the in-process backend.
    pub(crate) fn test_state(recognition: Arc<dyn RecognitionEngine>) -> Arc<EngineState> {
        let config = EngineConfig {
            response_ceiling: 100,
            preview_ceiling: 50,
            ..EngineConfig::default()
        };
        let store = Arc::new(ContentStore::open_in_memory().unwrap());
        let registry = Arc::new(CollaboratorRegistry::with_defaults(recognition));
        let pipeline = Arc::new(ExtractionPipeline::new(store, registry, &config));
        let executor = TaskExecutor::InProcess(InProcessExecutor::new(
            pipeline.clone(),
            config.recognition_workers,
            config.enhancement_workers,
            config.max_task_runtime,
        ));
        Arc::new(EngineState::from_parts(config, pipeline, executor))
    }

    pub(crate) async fn wait_for_task(state: &EngineState, task_id: &str) -> StatusProjection {
        for _ in 0..300 {
            let status = state.poll(task_id, None).await.unwrap();
            if status.status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {task_id} did not finish");
    }

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    #[tokio::test]
    async fn text_upload_completes_inline() {
        let state = test_state(Arc::new(DisabledRecognition));
        let out = state
            .submit(b"Plain notes about the quarterly plan".to_vec(), "notes.txt".into())
            .await
            .unwrap();
        assert_eq!(out.status, SubmitStatus::Completed);
        assert!(out.is_new);
        assert!(out.task_id.is_none());

        let again = state
            .submit(b"Plain notes about the quarterly plan".to_vec(), "copy.txt".into())
            .await
            .unwrap();
        assert_eq!(again.status, SubmitStatus::Duplicate);
        assert_eq!(again.document_id, out.document_id);
        assert!(again.task_id.is_none());
    }

    #[tokio::test]
    async fn image_upload_enhances_and_records_task() {
        let state = test_state(Arc::new(ScriptedRecognition::new("Recognized invoice text", 0.9)));
        let out = state.submit(JPEG.to_vec(), "scan.jpg".into()).await.unwrap();
        assert_eq!(out.status, SubmitStatus::Enhancing);
        let task_id = out.task_id.clone().unwrap();
        assert_eq!(out.document.enhancement_task_id.as_deref(), Some(task_id.as_str()));

        let status = wait_for_task(&state, &task_id).await;
        assert_eq!(status.status, TaskStatus::Completed);
        let result = status.result.unwrap();
        assert_eq!(result.processing_method, ProcessingMethod::HybridWithRecognition);

        let detail = state.document(&out.document_id).await.unwrap();
        assert!(detail.summary.is_finalized());
        assert!(detail.summary.preview.contains("Recognized"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_identical_uploads_schedule_once() {
        let state = test_state(Arc::new(DisabledRecognition));
        let uploads: Vec<_> = (0..8)
            .map(|i| {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    state
                        .submit(JPEG.to_vec(), format!("copy{i}.jpg"))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut outcomes = Vec::new();
        for upload in uploads {
            outcomes.push(upload.await.unwrap());
        }
        let ids: std::collections::HashSet<_> = outcomes.iter().map(|o| o.document_id.clone()).collect();
        assert_eq!(ids.len(), 1);
        assert_eq!(outcomes.iter().filter(|o| o.is_new).count(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| o.status == SubmitStatus::Enhancing)
                .count(),
            1
        );
        let task_ids: std::collections::HashSet<_> =
            outcomes.iter().filter_map(|o| o.task_id.clone()).collect();
        assert!(task_ids.len() <= 1);
        assert!(state.ingest_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn degraded_recognition_still_completes() {
        let state = test_state(Arc::new(DisabledRecognition));
        let out = state.submit(JPEG.to_vec(), "scan.jpg".into()).await.unwrap();
        let status = wait_for_task(&state, &out.task_id.unwrap()).await;
        assert_eq!(status.status, TaskStatus::Completed);
        assert_eq!(
            status.result.unwrap().processing_method,
            ProcessingMethod::NativeOnlyDegraded
        );
    }

    #[tokio::test]
    async fn table_reads_respect_ceilings() {
        let state = test_state(Arc::new(DisabledRecognition));
        let mut csv = String::from("item,price\n");
        for i in 0..5_000 {
            csv.push_str(&format!("item{i},{i}.00\n"));
        }
        let out = state.submit(csv.into_bytes(), "prices.csv".into()).await.unwrap();

        let detail = state.document(&out.document_id).await.unwrap();
        assert_eq!(detail.tables[0].rows.len(), 50);
        assert!(detail.tables[0].is_truncated);
        assert_eq!(detail.tables[0].true_row_count, 5_000);

        let first = state
            .read_table(&out.document_id, TableQuery::default())
            .await
            .unwrap();
        assert_eq!(first.window.rows.len(), 100);
        assert!(first.window.truncation.is_truncated);
        assert!(first.window.has_more);

        let query = TableQuery {
            page: 3,
            page_size: Some(1_000),
            format: RenderFormat::Csv,
            ..TableQuery::default()
        };
        let third = state.read_table(&out.document_id, query).await.unwrap();
        assert_eq!(third.window.offset, 200);
        assert_eq!(third.window.rows.len(), 100);
        assert!(third.body.starts_with("item,price\nitem200,200.00\n"));
    }

    #[tokio::test]
    async fn missing_reads_are_not_found() {
        let state = test_state(Arc::new(DisabledRecognition));
        let err = state.document("nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = state.poll("nope", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn health_reports_each_dependency() {
        let state = test_state(Arc::new(DisabledRecognition));
        let health = state.health().await;
        assert!(health.store_reachable);
        assert!(!health.recognition_available);
        assert!(!health.backend_reachable);
        assert_eq!(health.backend, "in_process");
    }

    #[tokio::test]
    async fn listing_search_and_stats() {
        let state = test_state(Arc::new(DisabledRecognition));
        state
            .submit(b"alpha report on harbour logistics".to_vec(), "a.txt".into())
            .await
            .unwrap();
        state
            .submit(b"beta memo about staffing".to_vec(), "b.txt".into())
            .await
            .unwrap();

        assert_eq!(state.list(10, 0).await.unwrap().len(), 2);
        assert_eq!(
            state.list_by_method(ProcessingMethod::Native, 10, 0).await.unwrap().len(),
            2
        );
        assert_eq!(
            state.list_by_method(ProcessingMethod::Native, 10, 1).await.unwrap().len(),
            1
        );
        assert!(state
            .list_by_method(ProcessingMethod::HybridWithRecognition, 10, 0)
            .await
            .unwrap()
            .is_empty());
        let hits = state.search("harbour", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].filename, "a.txt");
        assert_eq!(state.stats().await.unwrap().total_documents, 2);
        assert_eq!(state.cleanup().await.unwrap(), 0);
    }

    #[test]
    fn recognition_command_selects_engine() {
        let mut config = EngineConfig::default();
        config.recognition_command = None;
        assert_eq!(recognition_engine(&config).name(), "tesseract");

        config.recognition_command = Some("OFF".into());
        assert_eq!(recognition_engine(&config).name(), "disabled");
        assert!(!recognition_engine(&config).is_available());
    }
}
