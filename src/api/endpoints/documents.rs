//! Document submission and reads.
//!
//! `POST /api/documents` takes a base64 payload (raw or data URL), runs the
//! fast pass and answers with the submission outcome. Reads never touch
//! the compressed text blob except through the table read path.

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, DEFAULT_PAGE_LIMIT};
use crate::core_state::{DocumentDetail, SubmitOutcome, SubmitStatus, TableQuery};
use crate::models::{DocumentSummary, ProcessingMethod};
use crate::pipeline::extraction::RenderFormat;

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub filename: String,
    /// Base64, optionally as a data URL (`data:application/pdf;base64,...`).
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_list_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    pub method: Option<ProcessingMethod>,
}

fn default_list_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

#[derive(Debug, Deserialize)]
pub struct TableParams {
    pub table_index: Option<usize>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub format: Option<String>,
}

/// `POST /api/documents`
pub async fn submit(
    State(ctx): State<ApiContext>,
    Json(payload): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitOutcome>), ApiError> {
    let bytes = decode_data_url(&payload.data).map_err(ApiError::BadRequest)?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Empty document".into()));
    }

    let outcome = ctx.engine.submit(bytes, payload.filename).await?;
    let status = match outcome.status {
        SubmitStatus::Completed => StatusCode::CREATED,
        SubmitStatus::Enhancing => StatusCode::ACCEPTED,
        SubmitStatus::Duplicate => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

/// `GET /api/documents?limit&offset&method`, newest first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<DocumentSummary>>, ApiError> {
    let documents = match params.method {
        Some(method) => ctx.engine.list_by_method(method, params.limit, params.offset).await?,
        None => ctx.engine.list(params.limit, params.offset).await?,
    };
    Ok(Json(documents))
}

/// `GET /api/documents/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<DocumentDetail>, ApiError> {
    Ok(Json(ctx.engine.document(&id).await?))
}

/// `GET /api/documents/:id/tables?table_index&page&page_size&format`
pub async fn tables(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    Query(params): Query<TableParams>,
) -> Result<Response, ApiError> {
    let format = match params.format.as_deref() {
        Some(f) => RenderFormat::from_str(f).map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => RenderFormat::Json,
    };
    let query = TableQuery {
        table_index: params.table_index.unwrap_or(0),
        page: params.page.unwrap_or(1),
        page_size: params.page_size,
        format,
    };

    let rendered = ctx.engine.read_table(&id, query).await?;
    Ok(match rendered.format {
        RenderFormat::Json => Json(rendered.window).into_response(),
        other => ([(header::CONTENT_TYPE, other.content_type())], rendered.body).into_response(),
    })
}

/// Decode a base64 data URL to raw bytes.
///
/// Handles both `data:...;base64,...` and raw base64 strings.
fn decode_data_url(data_url: &str) -> Result<Vec<u8>, String> {
    let base64_data = match data_url.find(',') {
        Some(idx) => &data_url[idx + 1..],
        None => data_url,
    };

    base64::engine::general_purpose::STANDARD
        .decode(base64_data.trim())
        .map_err(|e| format!("Base64 decode failed: {e}"))
}
