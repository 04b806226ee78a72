//! Configuration for the similarity pipeline.
//!
//! Tuning parameters and validation limits are compile-time constants here.
//! Deployment-specific knobs (data directory, API keys, contact email) are
//! read once at startup into [`CoreConfig`]; there is no hot reload.

use std::path::PathBuf;
use std::time::Duration;

/// Embedding dimension produced by the default model (AllMiniLM-L6-v2).
pub const DEFAULT_DIMENSION: usize = 384;

/// Maximum number of texts per embedding batch.
pub const EMBED_BATCH_SIZE: usize = 64;

/// Capacity of the in-process embedding cache (entries, keyed by normalized text).
pub const EMBED_CACHE_CAPACITY: usize = 4096;

/// Tolerance when verifying that an embedding is L2-normalized.
pub const NORM_EPSILON: f32 = 1e-4;

/// Default similarity threshold when the request does not supply one.
pub const DEFAULT_THRESHOLD: f32 = 0.70;

/// Index strategy upgrade boundaries (vector counts).
pub const FLAT_MAX_VECTORS: u64 = 10_000;
pub const HNSW_MAX_VECTORS: u64 = 100_000;
pub const IVF_FLAT_MAX_VECTORS: u64 = 1_000_000;

/// HNSW graph parameters (M connections, construction/search candidate lists).
pub const HNSW_M: usize = 32;
pub const HNSW_EF_CONSTRUCTION: usize = 40;
pub const HNSW_EF_SEARCH: usize = 16;
pub const HNSW_MAX_LAYERS: usize = 16;

/// IVF coarse quantizer limits: nlist = sqrt(n) clamped to these bounds.
pub const IVF_FLAT_MAX_NLIST: usize = 1_000;
pub const IVF_PQ_MAX_NLIST: usize = 4_000;
pub const IVF_FLAT_NPROBE: usize = 10;
pub const IVF_PQ_NPROBE: usize = 20;

/// Product quantization: 48 subspaces, 8-bit codes = 48 bytes per vector.
pub const PQ_SUBSPACES: usize = 48;
pub const PQ_KMEANS_ITERATIONS: usize = 10;

/// Deduplicator sizing: expected cardinality and Bloom false-positive rate.
pub const DEDUP_TARGET_CARDINALITY: usize = 1_000_000;
pub const DEDUP_FALSE_POSITIVE_RATE: f64 = 0.01;

/// Per-source result cap applied before federator concatenation.
pub const MAX_RESULTS_PER_SOURCE: usize = 5;

/// Per-source HTTP timeout.
pub const SOURCE_TIMEOUT: Duration = Duration::from_secs(8);

/// Global federator deadline across all sources.
pub const FEDERATOR_DEADLINE: Duration = Duration::from_secs(10);

/// Circuit breaker: consecutive failures before opening, and cool-down.
pub const BREAKER_FAILURE_THRESHOLD: u32 = 5;
pub const BREAKER_COOLDOWN: Duration = Duration::from_secs(30);

/// Rate limiter defaults: bucket capacity and refill rate (tokens/second).
pub const LIMITER_CAPACITY: f64 = 5.0;
pub const LIMITER_REFILL_PER_SEC: f64 = 1.0;

/// Result cache TTL.
pub const RESULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Index probe: neighbors requested per query, and the number of index hits
/// that makes external fetching unnecessary for that query.
pub const INDEX_PROBE_K: usize = 20;
pub const SUFFICIENT_INDEX_MATCHES: usize = 5;

/// Results kept per query after re-scoring.
pub const RESULTS_PER_QUERY: usize = 10;

/// Debounce window for coalescing index saves.
pub const SAVE_DEBOUNCE: Duration = Duration::from_secs(5);

/// Global deadline for one orchestrated batch.
pub const BATCH_DEADLINE: Duration = Duration::from_secs(25);

/// Minimum length of a normalized abstract for a fetched paper to be indexed.
pub const MIN_ABSTRACT_CHARS: usize = 20;

/// Minimum length of a normalized fragment worth searching for.
pub const MIN_QUERY_CHARS: usize = 10;

/// Maximum fragments per request.
pub const MAX_FRAGMENTS_PER_REQUEST: usize = 256;

/// Maximum fragment text length in bytes.
pub const MAX_FRAGMENT_BYTES: usize = 20_000;

/// Deployment configuration, read from the environment once at startup.
///
/// | Variable | Field |
/// |----------|-------|
/// | `PAPERSCAN_DATA_DIR` | `data_dir` |
/// | `PAPERSCAN_DEFAULT_THRESHOLD` | `default_threshold` |
/// | `PAPERSCAN_DIMENSION` | `dimension` |
/// | `PAPERSCAN_EMBED_BATCH` | `embed_batch` |
/// | `PAPERSCAN_CACHE_TTL_SECS` | `result_cache_ttl` |
/// | `PAPERSCAN_CONTACT_EMAIL` | `contact_email` (sent as `mailto`/User-Agent where a source asks for it) |
/// | `PAPERSCAN_CORE_API_KEY` | `core_api_key` |
/// | `PAPERSCAN_SEMANTIC_SCHOLAR_API_KEY` | `semantic_scholar_api_key` |
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    pub default_threshold: f32,
    pub dimension: usize,
    pub embed_batch: usize,
    pub result_cache_ttl: Duration,
    pub contact_email: Option<String>,
    pub core_api_key: Option<String>,
    pub semantic_scholar_api_key: Option<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            default_threshold: DEFAULT_THRESHOLD,
            dimension: DEFAULT_DIMENSION,
            embed_batch: EMBED_BATCH_SIZE,
            result_cache_ttl: RESULT_CACHE_TTL,
            contact_email: None,
            core_api_key: None,
            semantic_scholar_api_key: None,
        }
    }
}

impl CoreConfig {
    /// Build a configuration from the process environment. Missing variables
    /// fall back to defaults; malformed numeric values are logged and ignored
    /// rather than failing startup.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(dir) = std::env::var("PAPERSCAN_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Ok(raw) = std::env::var("PAPERSCAN_DEFAULT_THRESHOLD") {
            match raw.parse::<f32>() {
                Ok(t) if (0.0..=1.0).contains(&t) => cfg.default_threshold = t,
                _ => tracing::warn!("ignoring invalid PAPERSCAN_DEFAULT_THRESHOLD={raw}"),
            }
        }
        if let Ok(raw) = std::env::var("PAPERSCAN_DIMENSION") {
            match raw.parse::<usize>() {
                Ok(d) if d > 0 => cfg.dimension = d,
                _ => tracing::warn!("ignoring invalid PAPERSCAN_DIMENSION={raw}"),
            }
        }
        if let Ok(raw) = std::env::var("PAPERSCAN_EMBED_BATCH") {
            match raw.parse::<usize>() {
                Ok(b) if b > 0 => cfg.embed_batch = b,
                _ => tracing::warn!("ignoring invalid PAPERSCAN_EMBED_BATCH={raw}"),
            }
        }
        if let Ok(raw) = std::env::var("PAPERSCAN_CACHE_TTL_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => cfg.result_cache_ttl = Duration::from_secs(secs),
                _ => tracing::warn!("ignoring invalid PAPERSCAN_CACHE_TTL_SECS={raw}"),
            }
        }
        cfg.contact_email = env_nonempty("PAPERSCAN_CONTACT_EMAIL");
        cfg.core_api_key = env_nonempty("PAPERSCAN_CORE_API_KEY");
        cfg.semantic_scholar_api_key = env_nonempty("PAPERSCAN_SEMANTIC_SCHOLAR_API_KEY");
        cfg
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}
