//! HTTP request handlers and shared application state.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::Json;
use metrics_exporter_prometheus::PrometheusHandle;

use paperscan_core::{CoreContext, Fragment};

use crate::api::errors::ApiError;
use crate::api::models::*;

/// Shared state passed to every handler via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<CoreContext>,
    pub prometheus_handle: PrometheusHandle,
    pub start_time: Instant,
}

fn to_fragments(tuples: &[FragmentTuple]) -> Vec<Fragment> {
    tuples
        .iter()
        .map(|(page, paragraph, text)| Fragment {
            page: page.clone(),
            paragraph: paragraph.clone(),
            text: text.clone(),
        })
        .collect()
}

/// `POST /api/v1/similarity`
pub async fn similarity_search(
    State(state): State<AppState>,
    Json(request): Json<SimilarityRequest>,
) -> Result<Json<SimilarityResponse>, ApiError> {
    let (theme, language, tuples) = &request.data;
    let fragments = to_fragments(tuples);
    let threshold = request
        .threshold
        .unwrap_or(state.ctx.config.default_threshold);
    let use_index = request.use_index.unwrap_or(true);

    let outcome = state
        .ctx
        .run_batch(
            &fragments,
            theme,
            language,
            threshold,
            request.sources.as_deref(),
            use_index,
        )
        .await?;

    Ok(Json(SimilarityResponse {
        count: outcome.matches.len(),
        processed_texts: outcome.processed_texts,
        threshold_used: threshold,
        index_enabled: use_index,
        deadline_exceeded: outcome.deadline_exceeded,
        results: outcome.matches,
    }))
}

/// `POST /api/v1/plagiarism`
pub async fn plagiarism_check(
    State(state): State<AppState>,
    Json(request): Json<PlagiarismRequest>,
) -> Result<Json<PlagiarismResponse>, ApiError> {
    let (theme, language, tuples) = &request.data;
    let fragments = to_fragments(tuples);
    let threshold = request
        .threshold
        .unwrap_or(state.ctx.config.default_threshold);
    let min_chunk_words = request.min_chunk_words.unwrap_or(15);

    let report = state
        .ctx
        .plagiarism_check(
            &fragments,
            theme,
            language,
            threshold,
            &request.chunk_mode,
            min_chunk_words,
            request.sources.as_deref(),
        )
        .await?;

    Ok(Json(PlagiarismResponse {
        plagiarism_detected: report.plagiarism_detected,
        chunks_analyzed: report.chunks_analyzed,
        total_matches: report.total_matches,
        coverage_percent: report.coverage_percent,
        summary: report.summary,
        matches: report.matches,
        threshold_used: report.threshold_used,
        chunk_mode: report.chunk_mode,
        deadline_exceeded: report.deadline_exceeded,
    }))
}

/// `POST /api/v1/index/search`
pub async fn index_search(
    State(state): State<AppState>,
    Json(request): Json<IndexSearchRequest>,
) -> Result<Json<IndexSearchResponse>, ApiError> {
    let k = request.k.unwrap_or(10).clamp(1, 100);
    let threshold = request
        .threshold
        .unwrap_or(state.ctx.config.default_threshold);
    let language = request.language.as_deref().unwrap_or("en");

    let results = state
        .ctx
        .direct_index_search(&request.query, language, k, threshold)
        .await?;

    Ok(Json(IndexSearchResponse {
        count: results.len(),
        results,
    }))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.ctx.index.stats();
    Json(HealthResponse {
        status: if stats.corrupted { "degraded" } else { "ok" },
        papers_indexed: stats.count,
        index_strategy: stats.strategy.to_string(),
        index_corrupted: stats.corrupted,
        embedding_model: state.ctx.embedding.model_name().to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// `GET /metrics`
pub async fn metrics_text(State(state): State<AppState>) -> String {
    state.prometheus_handle.render()
}

/// `GET /api/v1/stats`
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        index: state.ctx.index.stats(),
        dedup: state.ctx.ledger.stats(),
        result_cache_entries: state.ctx.result_cache.len(),
        sources: state
            .ctx
            .federator
            .source_tags()
            .into_iter()
            .map(str::to_string)
            .collect(),
        circuits: state.ctx.breaker.snapshot(),
    })
}

/// `POST /api/v1/admin/save`
pub async fn admin_save(
    State(state): State<AppState>,
) -> Result<Json<AdminActionResponse>, ApiError> {
    let ctx = Arc::clone(&state.ctx);
    tokio::task::spawn_blocking(move || ctx.save_index())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(AdminActionResponse::ok("index saved")))
}

/// `POST /api/v1/admin/clear`
pub async fn admin_clear(State(state): State<AppState>) -> Json<AdminActionResponse> {
    state.ctx.clear_index();
    Json(AdminActionResponse::ok("index and ledger cleared"))
}

/// `POST /api/v1/admin/backup`
pub async fn admin_backup(
    State(state): State<AppState>,
) -> Result<Json<AdminActionResponse>, ApiError> {
    let ctx = Arc::clone(&state.ctx);
    let path = tokio::task::spawn_blocking(move || ctx.backup_index())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(AdminActionResponse::ok(path.display().to_string())))
}

/// `POST /api/v1/admin/remove-duplicates`
pub async fn admin_remove_duplicates(
    State(state): State<AppState>,
) -> Result<Json<AdminActionResponse>, ApiError> {
    let ctx = Arc::clone(&state.ctx);
    let removed = tokio::task::spawn_blocking(move || ctx.remove_duplicates())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(AdminActionResponse::ok(format!(
        "{removed} duplicates removed"
    ))))
}

/// `POST /api/v1/admin/reset-limits`
pub async fn admin_reset_limits(State(state): State<AppState>) -> Json<AdminActionResponse> {
    state.ctx.reset_limits();
    Json(AdminActionResponse::ok("rate limits and circuits reset"))
}

/// `POST /api/v1/admin/clear-cache`
pub async fn admin_clear_cache(State(state): State<AppState>) -> Json<AdminActionResponse> {
    state.ctx.clear_result_cache();
    Json(AdminActionResponse::ok("result cache cleared"))
}

/// `GET /api/v1/admin/dedup-stats`
pub async fn admin_dedup_stats(
    State(state): State<AppState>,
) -> Json<paperscan_core::dedup::DedupStats> {
    Json(state.ctx.ledger.stats())
}
