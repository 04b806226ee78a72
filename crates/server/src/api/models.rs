//! Request and response DTOs.

use serde::{Deserialize, Serialize};

use paperscan_core::orchestrator::{BandCounts, FragmentMatch};
use paperscan_core::Match;

/// `(page, paragraph, text)` as submitted by clients.
pub type FragmentTuple = (String, String, String);

/// Body of `POST /api/v1/similarity`.
#[derive(Debug, Deserialize)]
pub struct SimilarityRequest {
    /// `(theme, language, fragments)`.
    pub data: (String, String, Vec<FragmentTuple>),
    pub threshold: Option<f32>,
    pub use_index: Option<bool>,
    pub sources: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct SimilarityResponse {
    pub results: Vec<FragmentMatch>,
    pub count: usize,
    pub processed_texts: usize,
    pub threshold_used: f32,
    pub index_enabled: bool,
    pub deadline_exceeded: bool,
}

/// Body of `POST /api/v1/plagiarism`.
#[derive(Debug, Deserialize)]
pub struct PlagiarismRequest {
    pub data: (String, String, Vec<FragmentTuple>),
    pub threshold: Option<f32>,
    #[serde(default = "default_chunk_mode")]
    pub chunk_mode: String,
    pub min_chunk_words: Option<usize>,
    pub sources: Option<Vec<String>>,
}

fn default_chunk_mode() -> String {
    "sentences".to_string()
}

#[derive(Debug, Serialize)]
pub struct PlagiarismResponse {
    pub plagiarism_detected: bool,
    pub chunks_analyzed: usize,
    pub total_matches: usize,
    pub coverage_percent: f32,
    pub summary: BandCounts,
    pub matches: Vec<FragmentMatch>,
    pub threshold_used: f32,
    pub chunk_mode: String,
    pub deadline_exceeded: bool,
}

/// Body of `POST /api/v1/index/search`.
#[derive(Debug, Deserialize)]
pub struct IndexSearchRequest {
    pub query: String,
    pub k: Option<usize>,
    pub threshold: Option<f32>,
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IndexSearchResponse {
    pub results: Vec<Match>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub papers_indexed: usize,
    pub index_strategy: String,
    pub index_corrupted: bool,
    pub embedding_model: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub index: paperscan_core::index::IndexStats,
    pub dedup: paperscan_core::dedup::DedupStats,
    pub result_cache_entries: usize,
    pub sources: Vec<String>,
    pub circuits: Vec<paperscan_core::breaker::CircuitSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct AdminActionResponse {
    pub ok: bool,
    pub detail: String,
}

impl AdminActionResponse {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            ok: true,
            detail: detail.into(),
        }
    }
}
