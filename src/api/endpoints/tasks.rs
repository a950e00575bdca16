use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::StatusProjection;

#[derive(Debug, Deserialize)]
pub struct PollParams {
    pub limit: Option<usize>,
}

/// `GET /api/tasks/:id?limit`: status projection with re-capped tables.
pub async fn poll(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    Query(params): Query<PollParams>,
) -> Result<Json<StatusProjection>, ApiError> {
    Ok(Json(ctx.engine.poll(&id, params.limit).await?))
}
