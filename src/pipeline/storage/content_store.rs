//! Content-addressed document store.
//!
//! One `documents` row per fingerprint. Compressed text and source bytes live
//! in `document_blobs`, tables in `document_tables` as compressed JSON, so
//! listing and metadata reads never decompress anything. Every text write
//! refreshes the `documents_fts` projection inside the same transaction.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;

use super::compress::{compress, decompress};
use super::StorageError;
use crate::db::{self, DatabaseError};
use crate::models::{
    preview_of, word_count, Document, DocumentFormat, DocumentSummary, EnhancedFields,
    ExtractedContent, ProcessingMethod, Table, TableSource, TableType,
};
use crate::pipeline::import::hash::compute_fingerprint;

/// Characters kept in the plaintext preview column.
pub const PREVIEW_CHARS: usize = 200;

const SUMMARY_COLUMNS: &str = "fingerprint, filename, format, preview, word_count, page_count,
     char_count, table_count, processing_method, recognition_used, needs_enhancement,
     enhancement_task_id, text_coverage, size_bytes, created_at, updated_at";

const TABLE_HIT_COLUMNS: &str = "t.fingerprint, d.filename, t.table_index, t.page_number,
     t.table_type, t.extraction_method, t.headers, t.true_row_count, t.confidence,
     t.is_truncated, substr(t.search_text, 1, 200)";

/// Searchable text kept per table.
pub const TABLE_SEARCH_BYTES: usize = 64 * 1024;

/// Result of [`ContentStore::put`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PutOutcome {
    pub document_id: String,
    pub is_new: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document_id: String,
    pub filename: String,
    pub processing_method: ProcessingMethod,
    pub snippet: String,
}

/// Table metadata from a cross-document query. Rows stay behind
/// `/documents/{id}/tables`.
#[derive(Debug, Clone, Serialize)]
pub struct TableHit {
    pub document_id: String,
    pub filename: String,
    pub table_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<usize>,
    pub table_type: TableType,
    pub source: TableSource,
    pub headers: Vec<String>,
    pub column_count: usize,
    pub true_row_count: usize,
    pub confidence: f32,
    pub is_truncated: bool,
    /// Leading characters of the table's searchable text.
    pub excerpt: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub total_documents: usize,
    pub pending_enhancement: usize,
    pub total_tables: usize,
    pub truncated_tables: usize,
    pub by_method: BTreeMap<String, usize>,
    pub by_table_type: BTreeMap<String, usize>,
}

/// SQLite-backed content store. A single connection behind a mutex
/// serializes writers in this process; the fingerprint primary key
/// arbitrates between processes.
pub struct ContentStore {
    conn: Mutex<Connection>,
}

impl ContentStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Ok(Self::new(db::open_database(path)?))
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Ok(Self::new(db::open_memory_database()?))
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database(DatabaseError::LockPoisoned))
    }

    /// Reachability probe for the health surface.
    pub fn ping(&self) -> bool {
        match self.conn() {
            Ok(conn) => conn
                .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Metadata for a fingerprint, if stored.
    pub fn lookup(&self, fingerprint: &str) -> Result<Option<DocumentSummary>, StorageError> {
        let conn = self.conn()?;
        load_summary(&conn, fingerprint)
    }

    pub fn summary(&self, document_id: &str) -> Result<DocumentSummary, StorageError> {
        self.lookup(document_id)?
            .ok_or_else(|| StorageError::DocumentNotFound(document_id.to_string()))
    }

    /// Store extracted content under the fingerprint of `raw`.
    ///
    /// An existing fingerprint short-circuits with `is_new = false` before any
    /// compression work. Two racing writers are arbitrated by the primary key:
    /// the loser's insert is a no-op and it reports the winner's id.
    pub fn put(&self, raw: &[u8], content: &ExtractedContent) -> Result<PutOutcome, StorageError> {
        let fingerprint = compute_fingerprint(raw);

        if self.lookup(&fingerprint)?.is_some() {
            return Ok(PutOutcome {
                document_id: fingerprint,
                is_new: false,
            });
        }

        let text_blob = compress(content.text.as_bytes())?;
        let source_blob = compress(raw)?;
        let encoded_tables = encode_tables(&content.tables)?;
        let now = Utc::now();

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let inserted = tx.execute(
            "INSERT INTO documents
             (fingerprint, filename, format, preview, word_count, page_count, char_count,
              table_count, processing_method, recognition_used, needs_enhancement,
              text_coverage, size_bytes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10, ?11, ?12, ?13, ?13)
             ON CONFLICT(fingerprint) DO NOTHING",
            params![
                fingerprint,
                content.filename,
                content.format.as_str(),
                preview_of(&content.text, PREVIEW_CHARS),
                word_count(&content.text) as i64,
                content.page_count as i64,
                content.text.chars().count() as i64,
                content.tables.len() as i64,
                ProcessingMethod::Native.as_str(),
                content.needs_enhancement,
                content.text_coverage as f64,
                raw.len() as i64,
                now,
            ],
        )?;

        if inserted == 0 {
            tracing::debug!(document_id = %fingerprint, "Lost insert race, reusing existing record");
            return Ok(PutOutcome {
                document_id: fingerprint,
                is_new: false,
            });
        }

        tx.execute(
            "INSERT INTO document_blobs (fingerprint, text_blob, source_blob) VALUES (?1, ?2, ?3)",
            params![fingerprint, text_blob, source_blob],
        )?;
        write_tables(&tx, &fingerprint, &content.tables, &encoded_tables)?;
        refresh_search_projection(&tx, &fingerprint, &content.filename, &content.text)?;
        tx.commit()?;

        tracing::info!(
            document_id = %fingerprint,
            format = content.format.as_str(),
            bytes = raw.len(),
            tables = content.tables.len(),
            needs_enhancement = content.needs_enhancement,
            "Stored new document"
        );

        Ok(PutOutcome {
            document_id: fingerprint,
            is_new: true,
        })
    }

    /// Merge slow-pass output into an existing record.
    ///
    /// Row, blob, tables and search projection change in one transaction, so
    /// readers see the document either before or after the merge.
    pub fn update(
        &self,
        document_id: &str,
        fields: &EnhancedFields,
    ) -> Result<DocumentSummary, StorageError> {
        let text_blob = compress(fields.text.as_bytes())?;
        let encoded_tables = encode_tables(&fields.tables)?;

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let filename: Option<String> = tx
            .query_row(
                "SELECT filename FROM documents WHERE fingerprint = ?1",
                params![document_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(filename) = filename else {
            return Err(StorageError::DocumentNotFound(document_id.to_string()));
        };

        tx.execute(
            "UPDATE documents SET
                preview = ?2, word_count = ?3, page_count = ?4, char_count = ?5,
                table_count = ?6, processing_method = ?7, recognition_used = ?8,
                needs_enhancement = 0, updated_at = ?9
             WHERE fingerprint = ?1",
            params![
                document_id,
                preview_of(&fields.text, PREVIEW_CHARS),
                word_count(&fields.text) as i64,
                fields.page_count as i64,
                fields.text.chars().count() as i64,
                fields.tables.len() as i64,
                fields.processing_method.as_str(),
                fields.recognition_used,
                Utc::now(),
            ],
        )?;
        tx.execute(
            "UPDATE document_blobs SET text_blob = ?2 WHERE fingerprint = ?1",
            params![document_id, text_blob],
        )?;
        tx.execute(
            "DELETE FROM document_tables WHERE fingerprint = ?1",
            params![document_id],
        )?;
        write_tables(&tx, document_id, &fields.tables, &encoded_tables)?;
        refresh_search_projection(&tx, document_id, &filename, &fields.text)?;
        tx.commit()?;

        tracing::info!(
            document_id = %document_id,
            method = fields.processing_method.as_str(),
            tables = fields.tables.len(),
            "Merged enhancement into document"
        );

        load_summary(&conn, document_id)?
            .ok_or_else(|| StorageError::DocumentNotFound(document_id.to_string()))
    }

    /// Record which task owns the pending enhancement for a document.
    pub fn set_enhancement_task(&self, document_id: &str, task_id: &str) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE documents SET enhancement_task_id = ?2 WHERE fingerprint = ?1",
            params![document_id, task_id],
        )?;
        if changed == 0 {
            return Err(StorageError::DocumentNotFound(document_id.to_string()));
        }
        Ok(())
    }

    /// Full document with decompressed text and stored tables.
    pub fn get(&self, document_id: &str) -> Result<Document, StorageError> {
        let conn = self.conn()?;
        let summary = load_summary(&conn, document_id)?
            .ok_or_else(|| StorageError::DocumentNotFound(document_id.to_string()))?;

        let text_blob: Vec<u8> = conn
            .query_row(
                "SELECT text_blob FROM document_blobs WHERE fingerprint = ?1",
                params![document_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| corruption(document_id, "text blob missing"))?;
        let full_text = decode_text(document_id, &text_blob)?;
        let tables = load_tables(&conn, document_id)?;

        Ok(Document {
            summary,
            full_text,
            tables,
        })
    }

    /// Original bytes, for the deferred pass.
    pub fn raw_bytes(&self, document_id: &str) -> Result<Vec<u8>, StorageError> {
        let conn = self.conn()?;
        let blob: Vec<u8> = conn
            .query_row(
                "SELECT source_blob FROM document_blobs WHERE fingerprint = ?1",
                params![document_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StorageError::DocumentNotFound(document_id.to_string()))?;
        decompress(&blob).map_err(|e| corruption(document_id, &format!("source blob: {e}")))
    }

    pub fn tables(&self, document_id: &str) -> Result<Vec<Table>, StorageError> {
        let conn = self.conn()?;
        if load_summary(&conn, document_id)?.is_none() {
            return Err(StorageError::DocumentNotFound(document_id.to_string()));
        }
        load_tables(&conn, document_id)
    }

    pub fn table(&self, document_id: &str, index: usize) -> Result<Table, StorageError> {
        let conn = self.conn()?;
        let payload: Option<Vec<u8>> = conn
            .query_row(
                "SELECT payload FROM document_tables WHERE fingerprint = ?1 AND table_index = ?2",
                params![document_id, index as i64],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(bytes) => decode_table(document_id, &bytes),
            None if load_summary(&conn, document_id)?.is_none() => {
                Err(StorageError::DocumentNotFound(document_id.to_string()))
            }
            None => Err(StorageError::TableNotFound {
                document_id: document_id.to_string(),
                index,
            }),
        }
    }

    /// Newest first. Metadata columns only.
    pub fn list(&self, limit: usize, offset: usize) -> Result<Vec<DocumentSummary>, StorageError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM documents
             ORDER BY created_at DESC, fingerprint ASC LIMIT ?1 OFFSET ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![limit as i64, offset as i64], read_summary_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(SummaryRow::into_summary).collect()
    }

    pub fn list_by_method(
        &self,
        method: ProcessingMethod,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<DocumentSummary>, StorageError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM documents WHERE processing_method = ?1
             ORDER BY created_at DESC, fingerprint ASC LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![method.as_str(), limit as i64, offset as i64],
                read_summary_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(SummaryRow::into_summary).collect()
    }

    /// Full-text search over the projection. Terms are matched literally
    /// and all must be present.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, StorageError> {
        let Some(match_expr) = fts_match_expression(query) else {
            return Ok(Vec::new());
        };
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT d.fingerprint, d.filename, d.processing_method,
                    snippet(documents_fts, 2, '[', ']', '...', 12)
             FROM documents_fts
             JOIN documents d ON d.fingerprint = documents_fts.fingerprint
             WHERE documents_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![match_expr, limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(document_id, filename, method, snippet)| -> Result<SearchHit, StorageError> {
                Ok(SearchHit {
                    document_id,
                    filename,
                    processing_method: method.parse()?,
                    snippet,
                })
            })
            .collect()
    }

    /// Tables of one type across all documents, newest document first.
    pub fn tables_by_type(
        &self,
        table_type: TableType,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TableHit>, StorageError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {TABLE_HIT_COLUMNS} FROM document_tables t
             JOIN documents d ON d.fingerprint = t.fingerprint
             WHERE t.table_type = ?1
             ORDER BY d.created_at DESC, t.fingerprint ASC, t.table_index ASC
             LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![table_type.as_str(), limit as i64, offset as i64],
                read_table_hit_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(TableHitRow::into_hit).collect()
    }

    /// Tables whose headers or stored rows contain `query`, ignoring ASCII
    /// case. Rows past the storage ceiling are not searched.
    pub fn search_tables(&self, query: &str, limit: usize) -> Result<Vec<TableHit>, StorageError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {TABLE_HIT_COLUMNS} FROM document_tables t
             JOIN documents d ON d.fingerprint = t.fingerprint
             WHERE instr(lower(t.search_text), lower(?1)) > 0
             ORDER BY d.created_at DESC, t.fingerprint ASC, t.table_index ASC
             LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![query, limit as i64], read_table_hit_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(TableHitRow::into_hit).collect()
    }

    pub fn stats(&self) -> Result<StoreStats, StorageError> {
        let conn = self.conn()?;
        let mut stats = StoreStats::default();

        let (docs, pending): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(needs_enhancement), 0) FROM documents",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        stats.total_documents = docs as usize;
        stats.pending_enhancement = pending as usize;

        let (tables, truncated): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(is_truncated), 0) FROM document_tables",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        stats.total_tables = tables as usize;
        stats.truncated_tables = truncated as usize;

        stats.by_method = grouped_counts(
            &conn,
            "SELECT processing_method, COUNT(*) FROM documents GROUP BY processing_method",
        )?;
        stats.by_table_type = grouped_counts(
            &conn,
            "SELECT table_type, COUNT(*) FROM document_tables GROUP BY table_type",
        )?;
        Ok(stats)
    }
}

// ═══════════════════════════════════════════════════════════
// Row mapping
// ═══════════════════════════════════════════════════════════

struct SummaryRow {
    fingerprint: String,
    filename: String,
    format: String,
    preview: String,
    word_count: i64,
    page_count: i64,
    char_count: i64,
    table_count: i64,
    processing_method: String,
    recognition_used: bool,
    needs_enhancement: bool,
    enhancement_task_id: Option<String>,
    text_coverage: f64,
    size_bytes: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn read_summary_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SummaryRow> {
    Ok(SummaryRow {
        fingerprint: row.get(0)?,
        filename: row.get(1)?,
        format: row.get(2)?,
        preview: row.get(3)?,
        word_count: row.get(4)?,
        page_count: row.get(5)?,
        char_count: row.get(6)?,
        table_count: row.get(7)?,
        processing_method: row.get(8)?,
        recognition_used: row.get(9)?,
        needs_enhancement: row.get(10)?,
        enhancement_task_id: row.get(11)?,
        text_coverage: row.get(12)?,
        size_bytes: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

impl SummaryRow {
    fn into_summary(self) -> Result<DocumentSummary, StorageError> {
        Ok(DocumentSummary {
            document_id: self.fingerprint,
            filename: self.filename,
            format: self.format.parse::<DocumentFormat>()?,
            preview: self.preview,
            word_count: self.word_count.max(0) as usize,
            page_count: self.page_count.max(0) as usize,
            char_count: self.char_count.max(0) as usize,
            table_count: self.table_count.max(0) as usize,
            processing_method: self.processing_method.parse::<ProcessingMethod>()?,
            recognition_used: self.recognition_used,
            needs_enhancement: self.needs_enhancement,
            enhancement_task_id: self.enhancement_task_id,
            text_coverage: self.text_coverage as f32,
            size_bytes: self.size_bytes.max(0) as u64,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn load_summary(conn: &Connection, fingerprint: &str) -> Result<Option<DocumentSummary>, StorageError> {
    let sql = format!("SELECT {SUMMARY_COLUMNS} FROM documents WHERE fingerprint = ?1");
    let row = conn
        .query_row(&sql, params![fingerprint], read_summary_row)
        .optional()?;
    row.map(SummaryRow::into_summary).transpose()
}

fn load_tables(conn: &Connection, document_id: &str) -> Result<Vec<Table>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT payload FROM document_tables WHERE fingerprint = ?1 ORDER BY table_index ASC",
    )?;
    let payloads = stmt
        .query_map(params![document_id], |row| row.get::<_, Vec<u8>>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    payloads
        .iter()
        .map(|bytes| decode_table(document_id, bytes))
        .collect()
}

fn grouped_counts(conn: &Connection, sql: &str) -> Result<BTreeMap<String, usize>, StorageError> {
    let mut stmt = conn.prepare(sql)?;
    let pairs = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(pairs
        .into_iter()
        .map(|(k, v)| (k, v.max(0) as usize))
        .collect())
}

// ═══════════════════════════════════════════════════════════
// Write helpers
// ═══════════════════════════════════════════════════════════

fn encode_tables(tables: &[Table]) -> Result<Vec<Vec<u8>>, StorageError> {
    tables
        .iter()
        .map(|t| -> Result<Vec<u8>, StorageError> { Ok(compress(&serde_json::to_vec(t)?)?) })
        .collect()
}

fn write_tables(
    tx: &Transaction<'_>,
    fingerprint: &str,
    tables: &[Table],
    encoded: &[Vec<u8>],
) -> Result<(), StorageError> {
    let mut stmt = tx.prepare(
        "INSERT INTO document_tables
         (fingerprint, table_index, table_type, extraction_method, confidence,
          true_row_count, stored_row_count, applied_ceiling, is_truncated, payload,
          page_number, headers, search_text)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    )?;
    for (table, payload) in tables.iter().zip(encoded) {
        let headers = serde_json::to_string(&table.headers)?;
        stmt.execute(params![
            fingerprint,
            table.index as i64,
            table.table_type.as_str(),
            table.source.as_str(),
            table.confidence as f64,
            table.true_row_count as i64,
            table.rows.len() as i64,
            i64::try_from(table.applied_ceiling).unwrap_or(i64::MAX),
            table.is_truncated,
            payload,
            table.page_number.map(|p| p as i64),
            headers,
            table_search_text(table),
        ])?;
    }
    Ok(())
}

/// Headers then rows, one line each, cells joined by ` | `. Capped at
/// [`TABLE_SEARCH_BYTES`] on a char boundary.
fn table_search_text(table: &Table) -> String {
    let mut text = table.headers.join(" | ");
    for row in &table.rows {
        if text.len() >= TABLE_SEARCH_BYTES {
            break;
        }
        text.push('\n');
        text.push_str(&table.cells(row).join(" | "));
    }
    if text.len() > TABLE_SEARCH_BYTES {
        let mut cut = TABLE_SEARCH_BYTES;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

struct TableHitRow {
    fingerprint: String,
    filename: String,
    table_index: i64,
    page_number: Option<i64>,
    table_type: String,
    source: String,
    headers: String,
    true_row_count: i64,
    confidence: f64,
    is_truncated: bool,
    excerpt: String,
}

fn read_table_hit_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TableHitRow> {
    Ok(TableHitRow {
        fingerprint: row.get(0)?,
        filename: row.get(1)?,
        table_index: row.get(2)?,
        page_number: row.get(3)?,
        table_type: row.get(4)?,
        source: row.get(5)?,
        headers: row.get(6)?,
        true_row_count: row.get(7)?,
        confidence: row.get(8)?,
        is_truncated: row.get(9)?,
        excerpt: row.get(10)?,
    })
}

impl TableHitRow {
    fn into_hit(self) -> Result<TableHit, StorageError> {
        let headers: Vec<String> = serde_json::from_str(&self.headers)
            .map_err(|e| corruption(&self.fingerprint, &format!("table headers: {e}")))?;
        Ok(TableHit {
            column_count: headers.len(),
            headers,
            document_id: self.fingerprint,
            filename: self.filename,
            table_index: self.table_index.max(0) as usize,
            page_number: self.page_number.map(|p| p.max(0) as usize),
            table_type: self.table_type.parse()?,
            source: self.source.parse()?,
            true_row_count: self.true_row_count.max(0) as usize,
            confidence: self.confidence as f32,
            is_truncated: self.is_truncated,
            excerpt: self.excerpt,
        })
    }
}

fn refresh_search_projection(
    tx: &Transaction<'_>,
    fingerprint: &str,
    filename: &str,
    text: &str,
) -> Result<(), StorageError> {
    tx.execute(
        "DELETE FROM documents_fts WHERE fingerprint = ?1",
        params![fingerprint],
    )?;
    tx.execute(
        "INSERT INTO documents_fts (fingerprint, filename, body) VALUES (?1, ?2, ?3)",
        params![fingerprint, filename, text],
    )?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Decode helpers
// ═══════════════════════════════════════════════════════════

fn corruption(document_id: &str, reason: &str) -> StorageError {
    StorageError::Corruption {
        document_id: document_id.to_string(),
        reason: reason.to_string(),
    }
}

fn decode_text(document_id: &str, blob: &[u8]) -> Result<String, StorageError> {
    let bytes = decompress(blob).map_err(|e| corruption(document_id, &format!("text blob: {e}")))?;
    String::from_utf8(bytes).map_err(|e| corruption(document_id, &format!("text blob: {e}")))
}

fn decode_table(document_id: &str, payload: &[u8]) -> Result<Table, StorageError> {
    let bytes =
        decompress(payload).map_err(|e| corruption(document_id, &format!("table payload: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| corruption(document_id, &format!("table payload: {e}")))
}

/// Quote every term so user input never reaches FTS5 query syntax.
fn fts_match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| t.replace('"', ""))
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::keyed_row;
    use std::sync::Arc;

    fn content(text: &str) -> ExtractedContent {
        ExtractedContent {
            filename: "report.txt".into(),
            format: DocumentFormat::PlainText,
            text: text.into(),
            page_count: 1,
            text_coverage: 1.0,
            needs_enhancement: false,
            tables: vec![],
        }
    }

    fn table(index: usize, rows: usize, applied: usize) -> Table {
        let headers = vec!["item".to_string(), "price".to_string()];
        Table {
            index,
            rows: (0..rows.min(applied))
                .map(|i| keyed_row(&headers, &[format!("item{i}"), format!("{i}.00")]))
                .collect(),
            headers,
            true_row_count: rows,
            applied_ceiling: applied,
            is_truncated: rows > applied,
            table_type: TableType::Financial,
            confidence: 0.9,
            source: TableSource::DelimitedParser,
            column_types: vec![],
            page_number: None,
            warnings: vec![],
        }
    }

    #[test]
    fn put_is_content_addressed() {
        let store = ContentStore::open_in_memory().unwrap();
        let first = store.put(b"same bytes", &content("hello")).unwrap();
        assert!(first.is_new);

        let mut renamed = content("hello");
        renamed.filename = "other-name.txt".into();
        let second = store.put(b"same bytes", &renamed).unwrap();
        assert!(!second.is_new);
        assert_eq!(first.document_id, second.document_id);
        assert_eq!(store.list(10, 0).unwrap().len(), 1);
        assert_eq!(store.summary(&first.document_id).unwrap().filename, "report.txt");
    }

    #[test]
    fn concurrent_puts_elect_one_winner() {
        let store = Arc::new(ContentStore::open_in_memory().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.put(b"racing bytes", &content("race")).unwrap())
            })
            .collect();
        let outcomes: Vec<PutOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(outcomes.iter().filter(|o| o.is_new).count(), 1);
        let id = &outcomes[0].document_id;
        assert!(outcomes.iter().all(|o| &o.document_id == id));
        assert_eq!(store.stats().unwrap().total_documents, 1);
    }

    #[test]
    fn get_round_trips_text_and_tables() {
        let store = ContentStore::open_in_memory().unwrap();
        let mut c = content("alpha beta gamma");
        c.tables = vec![table(0, 3, 10)];
        let out = store.put(b"doc", &c).unwrap();

        let doc = store.get(&out.document_id).unwrap();
        assert_eq!(doc.full_text, "alpha beta gamma");
        assert_eq!(doc.summary.word_count, 3);
        assert_eq!(doc.tables.len(), 1);
        assert_eq!(doc.tables[0].rows.len(), 3);
        assert_eq!(doc.tables[0].headers, vec!["item", "price"]);
        assert_eq!(store.raw_bytes(&out.document_id).unwrap(), b"doc");
    }

    #[test]
    fn corrupted_blob_reports_storage_corruption() {
        let store = ContentStore::open_in_memory().unwrap();
        let out = store.put(b"doc", &content("text")).unwrap();
        {
            let conn = store.conn().unwrap();
            conn.execute(
                "UPDATE document_blobs SET text_blob = x'DEADBEEF' WHERE fingerprint = ?1",
                params![out.document_id],
            )
            .unwrap();
        }
        let err = store.get(&out.document_id).unwrap_err();
        assert!(matches!(err, StorageError::Corruption { .. }));
        assert_eq!(err.kind(), crate::models::ErrorKind::StorageCorruption);

        // Metadata reads do not touch the blob.
        assert_eq!(store.list(10, 0).unwrap().len(), 1);
        assert!(store.lookup(&out.document_id).unwrap().is_some());
    }

    #[test]
    fn update_merges_in_place_and_refreshes_search() {
        let store = ContentStore::open_in_memory().unwrap();
        let mut c = content("placeholder");
        c.needs_enhancement = true;
        c.text_coverage = 0.1;
        let out = store.put(b"scan", &c).unwrap();
        assert_eq!(store.search("placeholder", 10).unwrap().len(), 1);

        let summary = store
            .update(
                &out.document_id,
                &EnhancedFields {
                    text: "recognized invoice totals".into(),
                    page_count: 2,
                    processing_method: ProcessingMethod::HybridWithRecognition,
                    recognition_used: true,
                    tables: vec![table(0, 20, 10)],
                },
            )
            .unwrap();

        assert!(summary.is_finalized());
        assert!(summary.recognition_used);
        assert_eq!(summary.processing_method, ProcessingMethod::HybridWithRecognition);
        assert_eq!(summary.table_count, 1);
        assert_eq!(store.list(10, 0).unwrap().len(), 1);
        assert!(store.search("placeholder", 10).unwrap().is_empty());
        let hits = store.search("invoice", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, out.document_id);

        let stored = store.table(&out.document_id, 0).unwrap();
        assert_eq!(stored.true_row_count, 20);
        assert_eq!(stored.rows.len(), 10);
        assert!(stored.is_truncated);
    }

    #[test]
    fn update_unknown_document_fails() {
        let store = ContentStore::open_in_memory().unwrap();
        let err = store
            .update(
                "missing",
                &EnhancedFields {
                    text: String::new(),
                    page_count: 0,
                    processing_method: ProcessingMethod::Native,
                    recognition_used: false,
                    tables: vec![],
                },
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::DocumentNotFound(_)));
    }

    #[test]
    fn table_lookup_distinguishes_missing_document_and_index() {
        let store = ContentStore::open_in_memory().unwrap();
        let out = store.put(b"doc", &content("x")).unwrap();
        assert!(matches!(
            store.table(&out.document_id, 3).unwrap_err(),
            StorageError::TableNotFound { index: 3, .. }
        ));
        assert!(matches!(
            store.table("nope", 0).unwrap_err(),
            StorageError::DocumentNotFound(_)
        ));
    }

    #[test]
    fn enhancement_task_recorded() {
        let store = ContentStore::open_in_memory().unwrap();
        let out = store.put(b"doc", &content("x")).unwrap();
        store.set_enhancement_task(&out.document_id, "task-1").unwrap();
        let summary = store.summary(&out.document_id).unwrap();
        assert_eq!(summary.enhancement_task_id.as_deref(), Some("task-1"));
    }

    #[test]
    fn search_ignores_query_syntax() {
        let store = ContentStore::open_in_memory().unwrap();
        store.put(b"doc", &content("budget AND \"revenue\"")).unwrap();
        assert!(store.search("\"", 10).unwrap().is_empty());
        assert_eq!(store.search("budget OR", 10).unwrap().len(), 0);
        assert_eq!(store.search("revenue budget", 10).unwrap().len(), 1);
    }

    #[test]
    fn listing_by_method_and_stats() {
        let store = ContentStore::open_in_memory().unwrap();
        let mut c = content("one");
        c.tables = vec![table(0, 5, 2)];
        store.put(b"a", &c).unwrap();
        store.put(b"b", &content("two")).unwrap();

        assert_eq!(store.list_by_method(ProcessingMethod::Native, 10, 0).unwrap().len(), 2);
        let first = store.list_by_method(ProcessingMethod::Native, 1, 0).unwrap();
        let second = store.list_by_method(ProcessingMethod::Native, 1, 1).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_ne!(first[0].document_id, second[0].document_id);
        assert!(store
            .list_by_method(ProcessingMethod::Native, 10, 2)
            .unwrap()
            .is_empty());
        assert!(store
            .list_by_method(ProcessingMethod::NativeOnlyDegraded, 10, 0)
            .unwrap()
            .is_empty());

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_documents, 2);
        assert_eq!(stats.total_tables, 1);
        assert_eq!(stats.truncated_tables, 1);
        assert_eq!(stats.by_method.get("native"), Some(&2));
        assert_eq!(stats.by_table_type.get("financial"), Some(&1));
    }

    #[test]
    fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let id = {
            let store = ContentStore::open(&path).unwrap();
            store.put(b"persisted", &content("kept")).unwrap().document_id
        };
        let reopened = ContentStore::open(&path).unwrap();
        assert_eq!(reopened.get(&id).unwrap().full_text, "kept");
        assert!(reopened.ping());
    }

    fn contact_table(index: usize) -> Table {
        let headers = vec!["Name".to_string(), "Email".to_string()];
        Table {
            rows: vec![keyed_row(&headers, &["Ann Lee".into(), "ann@example.com".into()])],
            headers,
            true_row_count: 1,
            applied_ceiling: 10,
            is_truncated: false,
            table_type: TableType::Contact,
            page_number: Some(2),
            source: TableSource::Markup,
            ..table(index, 0, 10)
        }
    }

    #[test]
    fn tables_by_type_spans_documents_and_pages() {
        let store = ContentStore::open_in_memory().unwrap();
        let mut first = content("first");
        first.tables = vec![table(0, 3, 10), contact_table(1)];
        let first = store.put(b"one", &first).unwrap();
        let mut second = content("second");
        second.filename = "prices.csv".into();
        second.tables = vec![table(0, 20, 10)];
        store.put(b"two", &second).unwrap();

        let financial = store.tables_by_type(TableType::Financial, 10, 0).unwrap();
        assert_eq!(financial.len(), 2);
        assert!(financial.iter().all(|t| t.table_type == TableType::Financial));
        assert!(financial.iter().any(|t| t.is_truncated && t.true_row_count == 20));

        let contacts = store.tables_by_type(TableType::Contact, 10, 0).unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].document_id, first.document_id);
        assert_eq!(contacts[0].table_index, 1);
        assert_eq!(contacts[0].page_number, Some(2));
        assert_eq!(contacts[0].headers, vec!["Name", "Email"]);
        assert_eq!(contacts[0].column_count, 2);
        assert_eq!(contacts[0].source, TableSource::Markup);

        let paged: Vec<_> = (0..3)
            .map(|offset| store.tables_by_type(TableType::Financial, 1, offset).unwrap())
            .collect();
        assert_eq!(paged[0].len(), 1);
        assert_eq!(paged[1].len(), 1);
        assert_ne!(paged[0][0].document_id, paged[1][0].document_id);
        assert!(paged[2].is_empty());
        assert!(store.tables_by_type(TableType::Schedule, 10, 0).unwrap().is_empty());
    }

    #[test]
    fn table_search_matches_cells_and_headers() {
        let store = ContentStore::open_in_memory().unwrap();
        let mut c = content("directory");
        c.tables = vec![table(0, 3, 10), contact_table(1)];
        let out = store.put(b"dir", &c).unwrap();

        let hits = store.search_tables("ANN@EXAMPLE", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, out.document_id);
        assert_eq!(hits[0].table_index, 1);
        assert!(hits[0].excerpt.starts_with("Name | Email\nAnn Lee | ann@example.com"));

        assert_eq!(store.search_tables("price", 10).unwrap().len(), 1);
        assert_eq!(store.search_tables("item2", 10).unwrap().len(), 1);
        assert!(store.search_tables("nobody", 10).unwrap().is_empty());
        assert!(store.search_tables("  ", 10).unwrap().is_empty());
    }

    #[test]
    fn rewritten_tables_replace_search_text() {
        let store = ContentStore::open_in_memory().unwrap();
        let mut c = content("placeholder");
        c.tables = vec![contact_table(0)];
        let out = store.put(b"scan", &c).unwrap();
        store
            .update(
                &out.document_id,
                &EnhancedFields {
                    text: "recognized".into(),
                    page_count: 1,
                    processing_method: ProcessingMethod::HybridWithRecognition,
                    recognition_used: true,
                    tables: vec![table(0, 2, 10)],
                },
            )
            .unwrap();
        assert!(store.search_tables("ann", 10).unwrap().is_empty());
        assert_eq!(store.search_tables("item1", 10).unwrap().len(), 1);
    }

    #[test]
    fn search_text_is_capped_on_char_boundary() {
        let headers = vec!["note".to_string()];
        let cell = "é".repeat(TABLE_SEARCH_BYTES);
        let mut t = table(0, 0, 10);
        t.rows = vec![keyed_row(&headers, &[cell])];
        t.headers = headers;
        let text = table_search_text(&t);
        assert!(text.len() <= TABLE_SEARCH_BYTES);
        assert!(text.starts_with("note\né"));
    }
}
