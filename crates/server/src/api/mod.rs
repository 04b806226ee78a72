//! Router assembly.

pub mod errors;
pub mod handlers;
pub mod models;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use handlers::AppState;

/// Build the full application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics_text))
        .route("/api/v1/similarity", post(handlers::similarity_search))
        .route("/api/v1/plagiarism", post(handlers::plagiarism_check))
        .route("/api/v1/index/search", post(handlers::index_search))
        .route("/api/v1/stats", get(handlers::stats))
        .route("/api/v1/admin/save", post(handlers::admin_save))
        .route("/api/v1/admin/clear", post(handlers::admin_clear))
        .route("/api/v1/admin/backup", post(handlers::admin_backup))
        .route(
            "/api/v1/admin/remove-duplicates",
            post(handlers::admin_remove_duplicates),
        )
        .route(
            "/api/v1/admin/reset-limits",
            post(handlers::admin_reset_limits),
        )
        .route(
            "/api/v1/admin/clear-cache",
            post(handlers::admin_clear_cache),
        )
        .route(
            "/api/v1/admin/dedup-stats",
            get(handlers::admin_dedup_stats),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
