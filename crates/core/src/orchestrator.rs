//! Batch similarity orchestration.
//!
//! [`CoreContext`] owns the wired pipeline (normalizer, embedding service,
//! result cache, vector index, deduplication ledger, federator) and is
//! constructed once at startup, then threaded explicitly through calls; no
//! component lives in a global.
//!
//! One [`CoreContext::run_batch`] call runs, in order for each unique
//! normalized text: cache probe, embedding, index probe, federated fetch,
//! re-score, index write-back, cache write. The whole batch observes one
//! deadline; on expiry the remaining queries keep their index-only results
//! and the outcome is flagged instead of failed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::breaker::CircuitBreaker;
use crate::cache::{Fingerprint, ResultCache};
use crate::clock::{system_clock, SharedClock};
use crate::config::{self, CoreConfig};
use crate::dedup::DedupLedger;
use crate::embed::{Embedder, EmbeddingService};
use crate::error::{CoreError, CoreResult};
use crate::federate::Federator;
use crate::fragment;
use crate::index::VectorIndex;
use crate::normalize;
use crate::paper::{Match, PlagiarismBand};
use crate::sources::{
    registry, HttpTransport, ReqwestTransport, SourceAdapter, SourceDriver,
};
use crate::limiter::RateLimiter;

/// One submitted text fragment with its origin in the source document.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub page: String,
    pub paragraph: String,
    pub text: String,
}

/// A match rebroadcast to the fragment that produced it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FragmentMatch {
    /// Position of the originating fragment in the request.
    pub fragment_index: usize,
    pub page: String,
    pub paragraph: String,
    #[serde(flatten)]
    pub matched: Match,
}

/// Result of one orchestrated batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub matches: Vec<FragmentMatch>,
    /// Unique normalized texts that went through the pipeline.
    pub processed_texts: usize,
    pub deadline_exceeded: bool,
    pub new_papers_indexed: usize,
}

/// Match counts per severity band.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct BandCounts {
    pub very_high: usize,
    pub high: usize,
    pub moderate: usize,
    pub low: usize,
    pub minimal: usize,
}

impl BandCounts {
    fn record(&mut self, band: PlagiarismBand) {
        match band {
            PlagiarismBand::VeryHigh => self.very_high += 1,
            PlagiarismBand::High => self.high += 1,
            PlagiarismBand::Moderate => self.moderate += 1,
            PlagiarismBand::Low => self.low += 1,
            PlagiarismBand::Minimal => self.minimal += 1,
        }
    }
}

/// Aggregated plagiarism-check report.
#[derive(Debug, serde::Serialize)]
pub struct PlagiarismReport {
    pub plagiarism_detected: bool,
    pub chunks_analyzed: usize,
    pub total_matches: usize,
    /// Percentage of submitted fragments with at least one matching chunk.
    pub coverage_percent: f32,
    pub summary: BandCounts,
    pub matches: Vec<FragmentMatch>,
    pub threshold_used: f32,
    pub chunk_mode: String,
    pub deadline_exceeded: bool,
}

/// Debounced, coalescing trigger for index persistence. Requests within the
/// debounce window collapse into one save; a failed save logs and waits for
/// the next trigger.
struct IndexSaver {
    index: Arc<VectorIndex>,
    pending: Arc<AtomicBool>,
    debounce: Duration,
}

impl IndexSaver {
    fn new(index: Arc<VectorIndex>, debounce: Duration) -> Self {
        Self {
            index,
            pending: Arc::new(AtomicBool::new(false)),
            debounce,
        }
    }

    fn request(&self) {
        if self.pending.swap(true, Ordering::SeqCst) {
            return;
        }
        let index = Arc::clone(&self.index);
        let pending = Arc::clone(&self.pending);
        let debounce = self.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            pending.store(false, Ordering::SeqCst);
            let result = tokio::task::spawn_blocking(move || index.save()).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "debounced index save failed"),
                Err(e) => tracing::warn!(error = %e, "index save task panicked"),
            }
        });
    }
}

/// The wired similarity pipeline.
pub struct CoreContext {
    pub config: CoreConfig,
    pub clock: SharedClock,
    pub embedding: EmbeddingService,
    pub index: Arc<VectorIndex>,
    pub ledger: Arc<DedupLedger>,
    pub limiter: Arc<RateLimiter>,
    pub breaker: Arc<CircuitBreaker>,
    pub federator: Federator,
    pub result_cache: ResultCache,
    saver: IndexSaver,
    batch_deadline: Duration,
}

impl CoreContext {
    /// Production wiring: reqwest transport, the full adapter registry, and
    /// the system clock.
    pub fn new(config: CoreConfig, embedder: Arc<dyn Embedder>) -> Self {
        let adapters = registry(&config);
        Self::with_parts(
            config,
            embedder,
            adapters,
            Arc::new(ReqwestTransport::new()),
            system_clock(),
        )
    }

    /// Explicit wiring for tests and embedders with custom transports.
    pub fn with_parts(
        config: CoreConfig,
        embedder: Arc<dyn Embedder>,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        transport: Arc<dyn HttpTransport>,
        clock: SharedClock,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::with_defaults(clock.clone()));
        let breaker = Arc::new(CircuitBreaker::with_defaults(clock.clone()));
        let driver = Arc::new(SourceDriver::new(
            transport,
            Arc::clone(&limiter),
            Arc::clone(&breaker),
            config::SOURCE_TIMEOUT,
        ));
        let federator = Federator::new(adapters, driver, Arc::clone(&breaker));
        let index = Arc::new(VectorIndex::new(config.dimension, &config.data_dir));
        let ledger = Arc::new(DedupLedger::default());
        let embedding = EmbeddingService::new(embedder, config.embed_batch);

        Self {
            clock: clock.clone(),
            embedding,
            saver: IndexSaver::new(Arc::clone(&index), config::SAVE_DEBOUNCE),
            index,
            ledger,
            limiter,
            breaker,
            federator,
            result_cache: ResultCache::in_memory(clock).with_ttl(config.result_cache_ttl),
            batch_deadline: config::BATCH_DEADLINE,
            config,
        }
    }

    /// Shorter batch deadline, for tests.
    pub fn with_batch_deadline(mut self, deadline: Duration) -> Self {
        self.batch_deadline = deadline;
        self
    }

    /// Restore persisted index state and rebuild the ledger from it.
    pub fn load_persisted(&self) {
        self.index.load(&self.ledger);
    }

    /// End-to-end similarity batch. See the module docs for the step order.
    pub async fn run_batch(
        &self,
        fragments: &[Fragment],
        theme: &str,
        language: &str,
        threshold: f32,
        allowed_sources: Option<&[String]>,
        use_index: bool,
    ) -> CoreResult<BatchOutcome> {
        validate_request(fragments, language, threshold)?;
        let deadline = tokio::time::Instant::now() + self.batch_deadline;
        let mut deadline_exceeded = false;

        // Step 1: normalize and group identical texts.
        struct Group {
            normalized: String,
            fingerprint: Fingerprint,
            fragment_indices: Vec<usize>,
            vector: Option<Arc<Vec<f32>>>,
            matches: Option<Vec<Match>>,
            from_cache: bool,
        }
        let mut groups: Vec<Group> = Vec::new();
        let mut slot_of: HashMap<String, usize> = HashMap::new();
        for (idx, fragment) in fragments.iter().enumerate() {
            let normalized = normalize::normalize(&fragment.text, language);
            if normalized.chars().count() < config::MIN_QUERY_CHARS {
                tracing::debug!(fragment = idx, "fragment too short after normalization");
                continue;
            }
            match slot_of.get(&normalized) {
                Some(&slot) => groups[slot].fragment_indices.push(idx),
                None => {
                    let fingerprint =
                        Fingerprint::compute(theme, language, &normalized, threshold);
                    slot_of.insert(normalized.clone(), groups.len());
                    groups.push(Group {
                        normalized,
                        fingerprint,
                        fragment_indices: vec![idx],
                        vector: None,
                        matches: None,
                        from_cache: false,
                    });
                }
            }
        }
        if groups.is_empty() {
            return Ok(BatchOutcome::default());
        }

        // Step 2: cache probe; hits short-circuit the rest of the pipeline.
        for group in &mut groups {
            if let Some(hit) = self.result_cache.lookup(&group.fingerprint) {
                group.matches = Some(hit);
                group.from_cache = true;
            }
        }

        // Step 3: one embedding batch for every missed unique text.
        let miss_slots: Vec<usize> = groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.matches.is_none())
            .map(|(slot, _)| slot)
            .collect();
        if !miss_slots.is_empty() {
            let texts: Vec<String> = miss_slots
                .iter()
                .map(|&slot| groups[slot].normalized.clone())
                .collect();
            let vectors = self.embedding.embed_batch(&texts).await?;
            for (&slot, vector) in miss_slots.iter().zip(vectors) {
                groups[slot].vector = Some(vector);
            }
        }

        // Step 4: probe the index for every missed query in one batched call.
        let mut index_hits: HashMap<usize, Vec<Match>> = HashMap::new();
        if use_index && !miss_slots.is_empty() && !self.index.is_empty() {
            let queries: Vec<Vec<f32>> = miss_slots
                .iter()
                .map(|&slot| {
                    groups[slot]
                        .vector
                        .as_ref()
                        .expect("missed groups were embedded above")
                        .as_ref()
                        .clone()
                })
                .collect();
            let batched =
                self.index
                    .search_batch(&queries, config::INDEX_PROBE_K, threshold)?;
            for (&slot, results) in miss_slots.iter().zip(batched) {
                let matches: Vec<Match> = results
                    .into_iter()
                    .filter_map(|hit| Match::new((*hit.paper).clone(), hit.score))
                    .collect();
                index_hits.insert(slot, matches);
            }
        }

        // Steps 5-6: federated fetch, write-back, and re-score for queries
        // the index could not satisfy.
        let mut new_papers_indexed = 0usize;
        for &slot in &miss_slots {
            let from_index = index_hits.remove(&slot).unwrap_or_default();
            if from_index.len() >= config::SUFFICIENT_INDEX_MATCHES {
                groups[slot].matches = Some(cap_matches(from_index));
                continue;
            }

            let now = tokio::time::Instant::now();
            if deadline_exceeded || now >= deadline {
                deadline_exceeded = true;
                groups[slot].matches = Some(cap_matches(from_index));
                continue;
            }

            let fed_outcome = tokio::time::timeout_at(
                deadline,
                self.federator.search(
                    &groups[slot].normalized,
                    theme,
                    language,
                    allowed_sources,
                ),
            )
            .await;
            let fetched = match fed_outcome {
                Ok(result) => result,
                Err(_) => {
                    deadline_exceeded = true;
                    groups[slot].matches = Some(cap_matches(from_index));
                    continue;
                }
            };

            // Discard papers without a usable abstract, then embed the rest.
            let mut drafts = Vec::new();
            let mut abstracts = Vec::new();
            for draft in fetched.papers {
                let normalized_abstract = normalize::normalize(&draft.abstract_text, language);
                if normalized_abstract.chars().count() < config::MIN_ABSTRACT_CHARS {
                    continue;
                }
                drafts.push(draft);
                abstracts.push(normalized_abstract);
            }

            let mut combined = from_index;
            if !drafts.is_empty() {
                let vectors = self.embedding.embed_batch(&abstracts).await?;
                let items: Vec<_> = drafts
                    .iter()
                    .cloned()
                    .zip(vectors.iter().map(|v| v.as_ref().clone()))
                    .collect();
                new_papers_indexed += self.index.add(items, &self.ledger)?;

                let query_vector = groups[slot]
                    .vector
                    .as_ref()
                    .expect("missed groups were embedded above");
                let mut scored: Vec<Match> = Vec::new();
                for (draft, vector) in drafts.iter().zip(&vectors) {
                    let score: f32 = query_vector
                        .iter()
                        .zip(vector.iter())
                        .map(|(a, b)| a * b)
                        .sum();
                    if score < threshold {
                        continue;
                    }
                    // The indexed copy carries the canonical paper_id.
                    let Some(paper) = self.index.find_by_content_hash(&draft.content_hash())
                    else {
                        tracing::debug!(title = %draft.title, "fetched paper not indexed, dropped");
                        continue;
                    };
                    if let Some(matched) = Match::new((*paper).clone(), score) {
                        scored.push(matched);
                    }
                }
                scored.sort_by(|a, b| {
                    b.score
                        .total_cmp(&a.score)
                        .then(a.paper.paper_id.cmp(&b.paper.paper_id))
                });
                scored.truncate(config::RESULTS_PER_QUERY);

                combined = union_by_paper_id(combined, scored);
            }

            groups[slot].matches = Some(cap_matches(combined));
        }

        // Step 8 (cache write) for everything computed this call.
        for group in &groups {
            if !group.from_cache {
                if let Some(matches) = &group.matches {
                    self.result_cache.store(group.fingerprint, matches.clone());
                }
            }
        }

        // Step 7: rebroadcast per original fragment.
        let mut out = Vec::new();
        for group in &groups {
            let matches = group.matches.as_deref().unwrap_or_default();
            for &idx in &group.fragment_indices {
                for matched in matches {
                    out.push(FragmentMatch {
                        fragment_index: idx,
                        page: fragments[idx].page.clone(),
                        paragraph: fragments[idx].paragraph.clone(),
                        matched: matched.clone(),
                    });
                }
            }
        }

        if new_papers_indexed > 0 {
            self.saver.request();
        }
        if deadline_exceeded {
            metrics::counter!("paperscan_batch_deadline_exceeded").increment(1);
        }
        metrics::counter!("paperscan_batches").increment(1);

        Ok(BatchOutcome {
            matches: out,
            processed_texts: groups.len(),
            deadline_exceeded,
            new_papers_indexed,
        })
    }

    /// Chunk fragments, run the batch over the chunks, and aggregate the
    /// matches into severity bands.
    #[allow(clippy::too_many_arguments)]
    pub async fn plagiarism_check(
        &self,
        fragments: &[Fragment],
        theme: &str,
        language: &str,
        threshold: f32,
        chunk_mode: &str,
        min_chunk_words: usize,
        allowed_sources: Option<&[String]>,
    ) -> CoreResult<PlagiarismReport> {
        let mut chunks = Vec::new();
        let mut origin_of_chunk = Vec::new();
        for (idx, fragment) in fragments.iter().enumerate() {
            let pieces = match chunk_mode {
                "sliding" => {
                    if min_chunk_words < 2 {
                        return Err(CoreError::InvalidInput(
                            "sliding mode needs a window of at least 2 words".to_string(),
                        ));
                    }
                    let overlap = 5.min(min_chunk_words - 1);
                    fragment::sliding(&fragment.text, min_chunk_words, overlap)?
                }
                "sentences" => fragment::sentences(&fragment.text, min_chunk_words),
                other => {
                    return Err(CoreError::InvalidInput(format!(
                        "unknown chunk_mode '{other}'"
                    )))
                }
            };
            for (_, text) in pieces {
                chunks.push(Fragment {
                    page: fragment.page.clone(),
                    paragraph: fragment.paragraph.clone(),
                    text,
                });
                origin_of_chunk.push(idx);
            }
        }

        let chunks_analyzed = chunks.len();
        let outcome = self
            .run_batch(&chunks, theme, language, threshold, allowed_sources, true)
            .await?;

        let mut summary = BandCounts::default();
        let mut covered: std::collections::HashSet<usize> = std::collections::HashSet::new();
        for matched in &outcome.matches {
            summary.record(matched.matched.band);
            covered.insert(origin_of_chunk[matched.fragment_index]);
        }
        let coverage_percent = if fragments.is_empty() {
            0.0
        } else {
            covered.len() as f32 / fragments.len() as f32 * 100.0
        };
        let plagiarism_detected = summary.very_high + summary.high > 0;

        Ok(PlagiarismReport {
            plagiarism_detected,
            chunks_analyzed,
            total_matches: outcome.matches.len(),
            coverage_percent,
            summary,
            matches: outcome.matches,
            threshold_used: threshold,
            chunk_mode: chunk_mode.to_string(),
            deadline_exceeded: outcome.deadline_exceeded,
        })
    }

    /// Search the index directly, bypassing cache and federation.
    pub async fn direct_index_search(
        &self,
        query: &str,
        language: &str,
        k: usize,
        threshold: f32,
    ) -> CoreResult<Vec<Match>> {
        let normalized = normalize::normalize(query, language);
        if normalized.is_empty() {
            return Err(CoreError::InvalidInput("query is empty".to_string()));
        }
        let vector = self.embedding.embed_one(&normalized).await?;
        let hits = self.index.search(&vector, k, threshold)?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| Match::new((*hit.paper).clone(), hit.score))
            .collect())
    }

    // Admin surface, delegated to by the HTTP layer.

    pub fn save_index(&self) -> CoreResult<()> {
        self.index.save()
    }

    /// Clear index and ledger together; they describe the same population.
    pub fn clear_index(&self) {
        self.index.clear();
        self.ledger.clear();
    }

    pub fn backup_index(&self) -> CoreResult<std::path::PathBuf> {
        self.index.backup()
    }

    pub fn remove_duplicates(&self) -> usize {
        self.index.remove_duplicates()
    }

    pub fn reset_limits(&self) {
        self.limiter.reset();
        self.breaker.reset();
    }

    pub fn clear_result_cache(&self) {
        self.result_cache.clear();
    }
}

fn validate_request(fragments: &[Fragment], language: &str, threshold: f32) -> CoreResult<()> {
    if fragments.is_empty() {
        return Err(CoreError::InvalidInput("no fragments supplied".to_string()));
    }
    if fragments.len() > config::MAX_FRAGMENTS_PER_REQUEST {
        return Err(CoreError::InvalidInput(format!(
            "too many fragments: {} (limit {})",
            fragments.len(),
            config::MAX_FRAGMENTS_PER_REQUEST
        )));
    }
    if !(0.0..=1.0).contains(&threshold) {
        return Err(CoreError::InvalidInput(format!(
            "threshold {threshold} outside [0, 1]"
        )));
    }
    if language.len() != 2 || !language.chars().all(|c| c.is_ascii_lowercase()) {
        return Err(CoreError::InvalidInput(format!(
            "language code '{language}' is not a two-letter code"
        )));
    }
    for fragment in fragments {
        if fragment.text.len() > config::MAX_FRAGMENT_BYTES {
            return Err(CoreError::InvalidInput(format!(
                "fragment exceeds {} bytes",
                config::MAX_FRAGMENT_BYTES
            )));
        }
    }
    Ok(())
}

/// Merge two match lists by paper id, keeping the higher score, sorted by
/// descending score with ties on lower paper id.
fn union_by_paper_id(a: Vec<Match>, b: Vec<Match>) -> Vec<Match> {
    let mut by_id: HashMap<u64, Match> = HashMap::new();
    for matched in a.into_iter().chain(b) {
        match by_id.entry(matched.paper.paper_id) {
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                if matched.score > slot.get().score {
                    slot.insert(matched);
                }
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(matched);
            }
        }
    }
    let mut merged: Vec<Match> = by_id.into_values().collect();
    merged.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.paper.paper_id.cmp(&b.paper.paper_id))
    });
    merged
}

fn cap_matches(mut matches: Vec<Match>) -> Vec<Match> {
    matches.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.paper.paper_id.cmp(&b.paper.paper_id))
    });
    matches.truncate(config::RESULTS_PER_QUERY);
    matches
}
