//! Cross-document table queries. Results carry metadata only; rows are
//! read per document through `/documents/:id/tables`.

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, DEFAULT_PAGE_LIMIT};
use crate::models::TableType;
use crate::pipeline::storage::TableHit;

#[derive(Debug, Deserialize)]
pub struct ByTypeParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Deserialize)]
pub struct TableSearchParams {
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

/// `GET /api/tables/by-type/:table_type?limit&offset`
pub async fn by_type(
    State(ctx): State<ApiContext>,
    Path(table_type): Path<String>,
    Query(params): Query<ByTypeParams>,
) -> Result<Json<Vec<TableHit>>, ApiError> {
    let table_type = TableType::from_str(&table_type.to_ascii_lowercase())
        .map_err(|_| ApiError::BadRequest(format!("Unknown table type: {table_type}")))?;
    Ok(Json(
        ctx.engine
            .tables_by_type(table_type, params.limit, params.offset)
            .await?,
    ))
}

/// `GET /api/tables/search?q&limit`
pub async fn search(
    State(ctx): State<ApiContext>,
    Query(params): Query<TableSearchParams>,
) -> Result<Json<Vec<TableHit>>, ApiError> {
    if params.q.trim().is_empty() {
        return Err(ApiError::BadRequest("Query must not be empty".into()));
    }
    Ok(Json(ctx.engine.search_tables(&params.q, params.limit).await?))
}
