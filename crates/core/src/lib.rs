//! # paperscan-core
//!
//! Similarity pipeline for academic plagiarism detection: text
//! normalization, batched embeddings, a self-upgrading vector index with
//! crash-safe persistence, a content-hash deduplication ledger, and a
//! federated fetcher over twelve external bibliographic sources.
//!
//! The HTTP surface lives in the sibling server crate; this crate is the
//! engine and carries no transport code beyond the outbound source client.

/// Per-source circuit breaker with closed/open/half-open states.
pub mod breaker;
/// Result cache: request fingerprint to match set with TTL.
pub mod cache;
/// Monotonic clock seam shared by the time-sensitive components.
pub mod clock;
/// Tuning constants and environment-derived deployment configuration.
pub mod config;
/// Content-hash ledger: Bloom accelerator over an authoritative set.
pub mod dedup;
/// Embedding providers and the batching/caching embedding service.
pub mod embed;
/// Error surface of the pipeline.
pub mod error;
/// Parallel fan-out across source adapters with a global deadline.
pub mod federate;
/// Sentence and sliding-window fragmentation of submitted texts.
pub mod fragment;
/// Vector index: flat/HNSW/IVF strategies, auto-upgrade, persistence.
pub mod index;
/// Text normalization ahead of embedding and hashing.
pub mod normalize;
/// Batch orchestration tying the pipeline together.
pub mod orchestrator;
/// Paper, content hash, match, and severity band types.
pub mod paper;
/// Per-source token bucket rate limiter.
pub mod limiter;
/// External source adapters and the shared template driver.
pub mod sources;

pub use config::CoreConfig;
pub use error::{CoreError, CoreResult};
pub use orchestrator::{
    BandCounts, BatchOutcome, CoreContext, Fragment, FragmentMatch, PlagiarismReport,
};
pub use paper::{ContentHash, Match, Paper, PaperDraft, PlagiarismBand};
