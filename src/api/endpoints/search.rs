//! Full-text search and store statistics.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::storage::{SearchHit, StoreStats};

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// `GET /api/search?q&limit`
pub async fn search(
    State(ctx): State<ApiContext>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SearchHit>>, ApiError> {
    if params.q.trim().is_empty() {
        return Err(ApiError::BadRequest("Query must not be empty".into()));
    }
    Ok(Json(ctx.engine.search(&params.q, params.limit).await?))
}

/// `GET /api/stats`
pub async fn stats(State(ctx): State<ApiContext>) -> Result<Json<StoreStats>, ApiError> {
    Ok(Json(ctx.engine.stats().await?))
}
