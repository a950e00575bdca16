//! HTTP router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::core_state::EngineState;

/// Largest accepted request body: a 100 MB document after base64 expansion.
const MAX_BODY_BYTES: usize = 140 * 1024 * 1024;

pub fn api_router(engine: Arc<EngineState>) -> Router {
    let ctx = ApiContext::new(engine);

    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let api = Router::new()
        .route(
            "/documents",
            get(endpoints::documents::list).post(endpoints::documents::submit),
        )
        .route("/documents/:id", get(endpoints::documents::detail))
        .route("/documents/:id/tables", get(endpoints::documents::tables))
        .route("/tasks/:id", get(endpoints::tasks::poll))
        .route("/tables/search", get(endpoints::tables::search))
        .route("/tables/by-type/:table_type", get(endpoints::tables::by_type))
        .route("/search", get(endpoints::search::search))
        .route("/stats", get(endpoints::search::stats))
        .route("/health", get(endpoints::health::check))
        .with_state(ctx);

    Router::new()
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
