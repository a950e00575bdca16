//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;
use crate::core_state::HealthReport;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(flatten)]
    pub report: HealthReport,
}

/// `GET /api/health`: independent dependency checks. Always 200; the
/// store flag decides between `ok` and `degraded`.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    let report = ctx.engine.health().await;
    Json(HealthResponse {
        status: if report.store_reachable { "ok" } else { "degraded" },
        version: crate::config::APP_VERSION,
        report,
    })
}
