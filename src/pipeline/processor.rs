//! Two-phase extraction coordinator.
//!
//! The fast pass runs inline for the submitting caller: native extraction
//! only, layout tables from the text layer, then persistence. When native
//! text covers too little of the document it leaves a [`SlowPassJob`]
//! behind, which a task worker later runs through [`JobRunner`]:
//! recognition, table extraction over the merged text and an in-place merge
//! into the stored record.

use std::sync::Arc;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::models::{
    DocumentSummary, EnhancedFields, ErrorKind, ExtractedContent, ExtractedTable,
    ProcessingMethod, SlowPassJob, TableSource, TaskFailure, TaskResult,
};
use crate::pipeline::extraction::table_detect::detect_tables;
use crate::pipeline::extraction::{
    finalize_tables, sanitize_extracted_text, CollaboratorRegistry, Collaborators,
    ExtractionError, NativeText,
};
use crate::pipeline::import::{compute_fingerprint, detect_format, sanitize_filename};
use crate::pipeline::limiter::{CeilingLayer, ResultLimiter};
use crate::pipeline::storage::ContentStore;
use crate::pipeline::PipelineError;
use crate::tasks::JobRunner;

// ═══════════════════════════════════════════════════════════
// Result types
// ═══════════════════════════════════════════════════════════

/// What the fast pass hands back to the submitter.
#[derive(Debug, Clone, Serialize)]
pub struct FastPassOutcome {
    pub summary: DocumentSummary,
    pub is_new: bool,
    /// Present only when this call created a document that needs enhancement.
    pub job: Option<SlowPassJob>,
}

/// Text recognized for one region.
struct RecognizedRegion {
    page_number: Option<usize>,
    text: String,
}

// ═══════════════════════════════════════════════════════════
// Pipeline
// ═══════════════════════════════════════════════════════════

pub struct ExtractionPipeline {
    store: Arc<ContentStore>,
    registry: Arc<CollaboratorRegistry>,
    limiter: ResultLimiter,
    text_coverage_threshold: f32,
    recognition_confidence_threshold: f32,
}

impl ExtractionPipeline {
    pub fn new(
        store: Arc<ContentStore>,
        registry: Arc<CollaboratorRegistry>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            limiter: ResultLimiter::new(config.into()),
            text_coverage_threshold: config.text_coverage_threshold,
            recognition_confidence_threshold: config.recognition_confidence_threshold,
        }
    }

    pub fn store(&self) -> &Arc<ContentStore> {
        &self.store
    }

    pub fn limiter(&self) -> &ResultLimiter {
        &self.limiter
    }

    pub fn recognition_available(&self) -> bool {
        self.registry.recognition().is_available()
    }

    /// Inline stage. Never touches the recognition engine.
    ///
    /// A fingerprint already in the store short-circuits before any
    /// extraction work and returns the stored record with `is_new = false`.
    pub fn fast_pass(&self, raw: &[u8], filename_hint: &str) -> Result<FastPassOutcome, PipelineError> {
        let fingerprint = compute_fingerprint(raw);
        if let Some(summary) = self.store.lookup(&fingerprint)? {
            tracing::info!(document_id = %fingerprint, "Duplicate content, skipping extraction");
            return Ok(FastPassOutcome {
                summary,
                is_new: false,
                job: None,
            });
        }

        let filename = sanitize_filename(filename_hint);
        let detection = detect_format(raw, &filename)?;
        let collaborators = self.registry.resolve(detection.format)?;
        let native = collaborators.native.extract(raw)?;

        let coverage = native.coverage();
        let needs_enhancement = coverage < self.text_coverage_threshold;
        let needs_recognition = collaborators.has_image_regions && !native.regions.is_empty();
        let text = sanitize_extracted_text(&native.text());
        // Layout detection reads only the text layer; its warnings are logged.
        let mut table_warnings = Vec::new();
        let candidates = self.candidate_tables(&collaborators, raw, &native, &mut table_warnings);
        let tables = finalize_tables(candidates, self.limiter.ceiling(CeilingLayer::Storage));

        let content = ExtractedContent {
            filename: filename.clone(),
            format: detection.format,
            text,
            page_count: native.page_count,
            text_coverage: coverage,
            needs_enhancement,
            tables,
        };
        let put = self.store.put(raw, &content)?;
        let summary = self.store.summary(&put.document_id)?;

        tracing::info!(
            document_id = %put.document_id,
            format = detection.format.as_str(),
            extractor = collaborators.native.name(),
            coverage,
            needs_enhancement,
            is_new = put.is_new,
            "Fast pass complete"
        );

        let job = (put.is_new && summary.needs_enhancement).then(|| SlowPassJob {
            document_id: put.document_id.clone(),
            filename,
            format: detection.format,
            needs_recognition,
        });

        Ok(FastPassOutcome {
            summary,
            is_new: put.is_new,
            job,
        })
    }

    /// Fresh job for a stored document whose earlier enhancement was lost.
    pub fn job_for(&self, summary: &DocumentSummary) -> Result<SlowPassJob, PipelineError> {
        let collaborators = self.registry.resolve(summary.format)?;
        Ok(SlowPassJob {
            document_id: summary.document_id.clone(),
            filename: summary.filename.clone(),
            format: summary.format,
            needs_recognition: collaborators.has_image_regions,
        })
    }

    /// Deferred stage: recognition, tables, merge.
    ///
    /// Safe to run twice for the same document: a record that is already
    /// finalized is returned as-is without redoing any heavy work.
    pub fn slow_pass(&self, job: &SlowPassJob) -> Result<TaskResult, PipelineError> {
        let summary = self.store.summary(&job.document_id)?;
        if summary.is_finalized() {
            tracing::info!(
                document_id = %job.document_id,
                "Document already finalized, skipping slow pass"
            );
            let tables = self.store.tables(&job.document_id)?;
            return Ok(self.task_result(&summary, &tables, Vec::new()));
        }

        let raw = self.store.raw_bytes(&job.document_id)?;
        let collaborators = self.registry.resolve(job.format)?;
        let native = collaborators.native.extract(&raw)?;
        let mut warnings = native.warnings.clone();

        let (recognized, engine_unavailable) = self.recognize_regions(&raw, &native, &mut warnings);
        let recognition_used = !recognized.is_empty();
        let processing_method = if recognition_used {
            ProcessingMethod::HybridWithRecognition
        } else if native.regions.is_empty() && !engine_unavailable {
            ProcessingMethod::Native
        } else {
            ProcessingMethod::NativeOnlyDegraded
        };

        let mut candidates = self.candidate_tables(&collaborators, &raw, &native, &mut warnings);
        for region in &recognized {
            for mut table in detect_tables(&region.text, TableSource::RecognizedText) {
                table.page_number = region.page_number;
                candidates.push(table);
            }
        }

        let text = sanitize_extracted_text(&merge_text(&native, &recognized));
        let tables = finalize_tables(candidates, self.limiter.ceiling(CeilingLayer::Storage));
        let page_count = native.page_count.max(1);

        let fields = EnhancedFields {
            text,
            page_count,
            processing_method,
            recognition_used,
            tables,
        };
        let updated = self.store.update(&job.document_id, &fields)?;

        tracing::info!(
            document_id = %job.document_id,
            method = processing_method.as_str(),
            regions = native.regions.len(),
            recognized = recognized.len(),
            tables = fields.tables.len(),
            "Slow pass complete"
        );

        Ok(self.task_result(&updated, &fields.tables, warnings))
    }

    /// Tables the format carries natively plus those its layout extractor
    /// finds in the text layer. A failing layout extractor is not fatal.
    fn candidate_tables(
        &self,
        collaborators: &Collaborators,
        raw: &[u8],
        native: &NativeText,
        warnings: &mut Vec<String>,
    ) -> Vec<ExtractedTable> {
        let mut candidates = native.tables.clone();
        if let Some(extractor) = &collaborators.tables {
            match extractor.extract_tables(raw, native) {
                Ok(found) => candidates.extend(found),
                Err(e) => {
                    tracing::warn!(
                        extractor = extractor.name(),
                        error = %e,
                        "Table extraction failed, continuing without"
                    );
                    warnings.push(format!("Table extraction failed: {e}"));
                }
            }
        }
        candidates
    }

    /// Run recognition over every region. Returns accepted regions and
    /// whether the engine turned out to be unavailable.
    fn recognize_regions(
        &self,
        raw: &[u8],
        native: &NativeText,
        warnings: &mut Vec<String>,
    ) -> (Vec<RecognizedRegion>, bool) {
        if native.regions.is_empty() {
            return (Vec::new(), false);
        }

        let engine = self.registry.recognition();
        if !engine.is_available() {
            tracing::warn!(
                engine = engine.name(),
                regions = native.regions.len(),
                "Recognition engine unavailable, completing with native text only"
            );
            warnings.push("Recognition engine unavailable; native text only".into());
            return (Vec::new(), true);
        }

        let mut accepted = Vec::new();
        for region in &native.regions {
            match engine.recognize(raw, region) {
                Ok(result) if result.confidence < self.recognition_confidence_threshold => {
                    tracing::warn!(
                        page = ?region.page_number,
                        confidence = result.confidence,
                        threshold = self.recognition_confidence_threshold,
                        "Discarding low-confidence region"
                    );
                    warnings.push(format!(
                        "Region {} discarded: confidence {:.2} below threshold",
                        region_label(region.page_number),
                        result.confidence
                    ));
                }
                Ok(result) if result.text.trim().is_empty() => {}
                Ok(result) => accepted.push(RecognizedRegion {
                    page_number: region.page_number,
                    text: result.text,
                }),
                Err(ExtractionError::RecognitionUnavailable(reason)) => {
                    tracing::warn!(reason = %reason, "Recognition engine went away mid-pass");
                    warnings.push("Recognition engine unavailable; native text only".into());
                    return (accepted, true);
                }
                Err(e) => {
                    tracing::warn!(page = ?region.page_number, error = %e, "Region recognition failed");
                    warnings.push(format!(
                        "Region {} not recognized: {e}",
                        region_label(region.page_number)
                    ));
                }
            }
        }
        (accepted, false)
    }

    fn task_result(
        &self,
        summary: &DocumentSummary,
        tables: &[crate::models::Table],
        warnings: Vec<String>,
    ) -> TaskResult {
        TaskResult {
            document_id: summary.document_id.clone(),
            processing_method: summary.processing_method,
            recognition_used: summary.recognition_used,
            word_count: summary.word_count,
            page_count: summary.page_count,
            table_count: tables.len(),
            tables: self.limiter.cap_all(CeilingLayer::Preview, tables, None),
            warnings,
        }
    }
}

impl JobRunner for ExtractionPipeline {
    fn run(&self, job: &SlowPassJob) -> Result<TaskResult, TaskFailure> {
        self.slow_pass(job).map_err(|e| {
            let kind = e.kind();
            tracing::error!(document_id = %job.document_id, kind = kind.as_str(), error = %e, "Slow pass failed");
            let message = match kind {
                ErrorKind::Internal => "Internal processing error".to_string(),
                _ => e.to_string(),
            };
            TaskFailure { kind, message }
        })
    }
}

fn region_label(page_number: Option<usize>) -> String {
    match page_number {
        Some(p) => format!("page {p}"),
        None => "image".to_string(),
    }
}

/// Native pages in order, with recognized text standing in for pages that
/// had no usable text layer. Whole-file regions are appended.
fn merge_text(native: &NativeText, recognized: &[RecognizedRegion]) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(native.pages.len() + recognized.len());
    for page in &native.pages {
        match recognized
            .iter()
            .find(|r| r.page_number == Some(page.page_number))
        {
            Some(r) => parts.push(&r.text),
            None => parts.push(&page.text),
        }
    }
    parts.extend(
        recognized
            .iter()
            .filter(|r| r.page_number.is_none())
            .map(|r| r.text.as_str()),
    );
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
