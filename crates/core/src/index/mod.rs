//! In-memory vector index with ID mapping, metadata, persistence, and
//! automatic strategy upgrades.
//!
//! One reader/writer lock guards the whole index state: writers (add,
//! migrate, remove, clear) are exclusive, readers (search, stats) are
//! concurrent. Strategy migration happens post-insert under the same write
//! lock as the insert, as a pure rebuild from the authoritative
//! `paper_id -> (vector, metadata)` map, so concurrent readers observe
//! either the old structure or the new one, never a partial build.

pub mod flat;
pub mod hnsw;
pub mod ivf;
pub mod persist;
pub mod strategy;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::dedup::{DedupLedger, Seen};
use crate::error::{CoreError, CoreResult};
use crate::paper::{Paper, PaperDraft};

use flat::FlatIndex;
use hnsw::HnswGraph;
use ivf::IvfIndex;
use persist::{IndexSnapshot, LoadOutcome};
use strategy::{Strategy, UpgradePolicy};

/// The active ANN/flat structure. Rebuilt wholesale on strategy migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AnnStructure {
    Flat(FlatIndex),
    Hnsw(HnswGraph),
    IvfFlat(IvfIndex),
    IvfPq(IvfIndex),
}

impl AnnStructure {
    fn strategy(&self) -> Strategy {
        match self {
            AnnStructure::Flat(_) => Strategy::Flat,
            AnnStructure::Hnsw(_) => Strategy::Hnsw,
            AnnStructure::IvfFlat(_) => Strategy::IvfFlat,
            AnnStructure::IvfPq(_) => Strategy::IvfPq,
        }
    }

    /// Build the structure for `strategy` from scratch. `entries` must be
    /// sorted by ascending paper id so rebuilds are reproducible.
    fn build(strategy: Strategy, dimension: usize, entries: &[(u64, &[f32])]) -> Self {
        match strategy {
            Strategy::Flat => {
                let mut index = FlatIndex::new(dimension);
                for (id, vector) in entries {
                    index.insert(*id, vector);
                }
                AnnStructure::Flat(index)
            }
            Strategy::Hnsw => {
                let mut graph = HnswGraph::new(dimension);
                for (id, vector) in entries {
                    graph.insert(*id, vector);
                }
                AnnStructure::Hnsw(graph)
            }
            Strategy::IvfFlat => AnnStructure::IvfFlat(IvfIndex::build(dimension, entries, false)),
            Strategy::IvfPq => AnnStructure::IvfPq(IvfIndex::build(dimension, entries, true)),
        }
    }

    fn insert(&mut self, paper_id: u64, vector: &[f32]) {
        match self {
            AnnStructure::Flat(index) => index.insert(paper_id, vector),
            AnnStructure::Hnsw(graph) => graph.insert(paper_id, vector),
            AnnStructure::IvfFlat(index) | AnnStructure::IvfPq(index) => {
                index.insert(paper_id, vector)
            }
        }
    }

    fn remove(&mut self, paper_id: u64) -> bool {
        match self {
            AnnStructure::Flat(index) => index.remove(paper_id),
            AnnStructure::IvfFlat(index) => index.remove(paper_id),
            AnnStructure::Hnsw(_) | AnnStructure::IvfPq(_) => false,
        }
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(f32, u64)> {
        match self {
            AnnStructure::Flat(index) => index.search(query, k),
            AnnStructure::Hnsw(graph) => graph.search(query, k),
            AnnStructure::IvfFlat(index) | AnnStructure::IvfPq(index) => index.search(query, k),
        }
    }

    /// Batched search primitive: one pass over all queries against the same
    /// structure generation.
    fn search_batch(&self, queries: &[&[f32]], k: usize) -> Vec<Vec<(f32, u64)>> {
        queries.iter().map(|query| self.search(query, k)).collect()
    }
}

#[derive(Debug)]
struct IndexInner {
    dimension: usize,
    papers: BTreeMap<u64, Arc<Paper>>,
    /// Authoritative vectors, the rebuild source for every migration.
    vectors: BTreeMap<u64, Vec<f32>>,
    /// Content hash to the lowest paper id carrying it. Not persisted;
    /// rebuilt from metadata on load.
    hash_to_id: std::collections::HashMap<crate::paper::ContentHash, u64>,
    ann: AnnStructure,
    next_paper_id: u64,
    /// Set when a loaded strategy disagrees with the target for its count;
    /// cleared by the rebuild that the first write triggers.
    read_only: bool,
    corrupted: bool,
}

impl IndexInner {
    fn rebuild_as(&mut self, target: Strategy) {
        // Borrow only the vectors field so the structure can be replaced in place.
        let entries: Vec<(u64, &[f32])> = self
            .vectors
            .iter()
            .map(|(&id, vector)| (id, vector.as_slice()))
            .collect();
        self.ann = AnnStructure::build(target, self.dimension, &entries);
    }
}

/// A search hit joined with its metadata.
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub paper: Arc<Paper>,
    pub score: f32,
}

/// Snapshot of index health for the stats/admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub count: usize,
    pub dimension: usize,
    pub strategy: &'static str,
    pub supports_removal: bool,
    pub is_approximate: bool,
    pub corrupted: bool,
}

/// Thread-safe vector index over papers with automatic strategy upgrades.
pub struct VectorIndex {
    inner: RwLock<IndexInner>,
    policy: UpgradePolicy,
    data_dir: PathBuf,
}

impl VectorIndex {
    pub fn new(dimension: usize, data_dir: impl Into<PathBuf>) -> Self {
        Self::with_policy(dimension, data_dir, UpgradePolicy::default())
    }

    /// Index with custom upgrade boundaries; tests shrink them to exercise
    /// migrations without inserting tens of thousands of vectors.
    pub fn with_policy(
        dimension: usize,
        data_dir: impl Into<PathBuf>,
        policy: UpgradePolicy,
    ) -> Self {
        Self {
            inner: RwLock::new(IndexInner {
                dimension,
                papers: BTreeMap::new(),
                vectors: BTreeMap::new(),
                hash_to_id: std::collections::HashMap::new(),
                ann: AnnStructure::Flat(FlatIndex::new(dimension)),
                next_paper_id: 0,
                read_only: false,
                corrupted: false,
            }),
            policy,
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Number of indexed papers.
    pub fn count(&self) -> usize {
        self.inner.read().papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Add papers with precomputed embeddings. Each draft is checked against
    /// the deduplication ledger; duplicates are skipped silently. Returns
    /// the number actually added.
    pub fn add(
        &self,
        items: Vec<(PaperDraft, Vec<f32>)>,
        ledger: &DedupLedger,
    ) -> CoreResult<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        let mut inner = self.inner.write();
        for (_, vector) in &items {
            if vector.len() != inner.dimension {
                return Err(CoreError::InvalidInput(format!(
                    "embedding dimension {} does not match index dimension {}",
                    vector.len(),
                    inner.dimension
                )));
            }
        }

        // A loaded strategy mismatch leaves the structure read-only; the
        // first write pays for the full rebuild before inserting.
        if inner.read_only {
            let target = self.policy.target_for(inner.papers.len() as u64);
            tracing::info!(strategy = target.as_str(), "rebuilding read-only index before write");
            inner.rebuild_as(target);
            inner.read_only = false;
        }

        let mut added = 0usize;
        for (draft, vector) in items {
            let hash = draft.content_hash();
            if ledger.seen_or_add(hash) == Seen::Duplicate {
                tracing::debug!(title = %draft.title, "duplicate paper skipped");
                metrics::counter!("paperscan_index_duplicates_skipped").increment(1);
                continue;
            }
            let paper_id = inner.next_paper_id;
            inner.next_paper_id += 1;
            let paper = Arc::new(Paper {
                paper_id,
                content_hash: hash,
                title: draft.title,
                abstract_text: draft.abstract_text,
                authors: draft.authors,
                source: draft.source,
                document_type: draft.document_type,
                publication_date: draft.publication_date,
                doi: draft.doi,
                url: draft.url,
            });
            inner.ann.insert(paper_id, &vector);
            inner.vectors.insert(paper_id, vector);
            inner.papers.insert(paper_id, paper);
            inner.hash_to_id.entry(hash).or_insert(paper_id);
            added += 1;
        }

        if added > 0 {
            metrics::counter!("paperscan_index_papers_added").increment(added as u64);
            self.maybe_upgrade(&mut inner);
        }
        Ok(added)
    }

    /// Post-insert strategy check. Runs under the caller's write lock.
    fn maybe_upgrade(&self, inner: &mut IndexInner) {
        let count = inner.papers.len() as u64;
        let target = self.policy.target_for(count);
        let current = inner.ann.strategy();
        if target != current {
            tracing::info!(
                from = current.as_str(),
                to = target.as_str(),
                count,
                "index strategy upgrade"
            );
            inner.rebuild_as(target);
            metrics::counter!("paperscan_index_migrations").increment(1);
        }
    }

    /// Top-`k` matches with cosine score at or above `min_score`, sorted by
    /// descending score with ties broken by lower paper id.
    pub fn search(&self, query: &[f32], k: usize, min_score: f32) -> CoreResult<Vec<IndexMatch>> {
        let inner = self.inner.read();
        if query.len() != inner.dimension {
            return Err(CoreError::InvalidInput(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                inner.dimension
            )));
        }
        Ok(Self::join_metadata(&inner, inner.ann.search(query, k), min_score))
    }

    /// Batched variant of [`Self::search`]: all queries run against the same
    /// structure generation under one read lock.
    pub fn search_batch(
        &self,
        queries: &[Vec<f32>],
        k: usize,
        min_score: f32,
    ) -> CoreResult<Vec<Vec<IndexMatch>>> {
        let inner = self.inner.read();
        for query in queries {
            if query.len() != inner.dimension {
                return Err(CoreError::InvalidInput(format!(
                    "query dimension {} does not match index dimension {}",
                    query.len(),
                    inner.dimension
                )));
            }
        }
        let borrowed: Vec<&[f32]> = queries.iter().map(|q| q.as_slice()).collect();
        Ok(inner
            .ann
            .search_batch(&borrowed, k)
            .into_iter()
            .map(|results| Self::join_metadata(&inner, results, min_score))
            .collect())
    }

    fn join_metadata(
        inner: &IndexInner,
        results: Vec<(f32, u64)>,
        min_score: f32,
    ) -> Vec<IndexMatch> {
        results
            .into_iter()
            .filter(|&(score, _)| score >= min_score)
            .filter_map(|(score, id)| {
                inner.papers.get(&id).map(|paper| IndexMatch {
                    paper: Arc::clone(paper),
                    score,
                })
            })
            .collect()
    }

    /// Fetch a paper by id.
    pub fn get(&self, paper_id: u64) -> Option<Arc<Paper>> {
        self.inner.read().papers.get(&paper_id).cloned()
    }

    /// Fetch the indexed paper carrying a content hash, if any.
    pub fn find_by_content_hash(
        &self,
        hash: &crate::paper::ContentHash,
    ) -> Option<Arc<Paper>> {
        let inner = self.inner.read();
        inner
            .hash_to_id
            .get(hash)
            .and_then(|id| inner.papers.get(id))
            .cloned()
    }

    /// Remove papers by id. Rejected when the active strategy does not
    /// support removal. Returns the number removed.
    pub fn remove(&self, paper_ids: &[u64]) -> CoreResult<usize> {
        let mut inner = self.inner.write();
        let strategy = inner.ann.strategy();
        if !strategy.supports_removal() {
            return Err(CoreError::UnsupportedOperation(format!(
                "strategy {} does not support removal",
                strategy.as_str()
            )));
        }
        let mut removed = 0usize;
        for &id in paper_ids {
            if let Some(paper) = inner.papers.remove(&id) {
                inner.vectors.remove(&id);
                inner.ann.remove(id);
                if inner.hash_to_id.get(&paper.content_hash) == Some(&id) {
                    inner.hash_to_id.remove(&paper.content_hash);
                }
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Deduplication sweep: group metadata by content hash, keep the lowest
    /// paper id in each group, drop the rest, and rebuild the structure from
    /// the survivors. Works under every strategy. Returns the number removed.
    pub fn remove_duplicates(&self) -> usize {
        let mut inner = self.inner.write();
        let mut keeper: std::collections::HashMap<crate::paper::ContentHash, u64> =
            std::collections::HashMap::new();
        for (&id, paper) in &inner.papers {
            // BTreeMap iterates ascending, so the first id seen is the lowest.
            keeper.entry(paper.content_hash).or_insert(id);
        }
        let doomed: Vec<u64> = inner
            .papers
            .iter()
            .filter(|(&id, paper)| keeper[&paper.content_hash] != id)
            .map(|(&id, _)| id)
            .collect();
        if doomed.is_empty() {
            return 0;
        }
        for id in &doomed {
            inner.papers.remove(id);
            inner.vectors.remove(id);
        }
        let strategy = inner.ann.strategy();
        inner.rebuild_as(strategy);
        inner.hash_to_id = inner
            .papers
            .iter()
            .map(|(&id, paper)| (paper.content_hash, id))
            .collect();
        tracing::info!(removed = doomed.len(), "duplicate sweep complete");
        doomed.len()
    }

    /// Empty the index. `next_paper_id` is preserved so ids are never reused
    /// within a session, keeping logs unambiguous.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.papers.clear();
        inner.vectors.clear();
        inner.hash_to_id.clear();
        inner.ann = AnnStructure::Flat(FlatIndex::new(inner.dimension));
        inner.read_only = false;
        inner.corrupted = false;
    }

    pub fn stats(&self) -> IndexStats {
        let inner = self.inner.read();
        let strategy = inner.ann.strategy();
        IndexStats {
            count: inner.papers.len(),
            dimension: inner.dimension,
            strategy: strategy.as_str(),
            supports_removal: strategy.supports_removal(),
            is_approximate: strategy.is_approximate(),
            corrupted: inner.corrupted,
        }
    }

    /// Content hashes of every indexed paper, for ledger reconstruction.
    pub fn content_hashes(&self) -> Vec<crate::paper::ContentHash> {
        self.inner
            .read()
            .papers
            .values()
            .map(|paper| paper.content_hash)
            .collect()
    }

    /// Persist both index files atomically.
    pub fn save(&self) -> CoreResult<()> {
        let snapshot = {
            let inner = self.inner.read();
            IndexSnapshot {
                strategy: inner.ann.strategy(),
                dimension: inner.dimension,
                next_paper_id: inner.next_paper_id,
                papers: inner.papers.values().map(|p| (**p).clone()).collect(),
                vectors: inner
                    .vectors
                    .iter()
                    .map(|(&id, vector)| (id, vector.clone()))
                    .collect(),
                ann: inner.ann.clone(),
            }
        };
        persist::save_snapshot(&self.data_dir, &snapshot)?;
        Ok(())
    }

    /// Restore persisted state and rebuild the deduplication ledger from the
    /// restored content hashes. A corrupted or dimension-mismatched file set
    /// leaves an empty index with `corrupted=true` instead of failing.
    pub fn load(&self, ledger: &DedupLedger) {
        let outcome = {
            let inner = self.inner.read();
            persist::load_snapshot(&self.data_dir, inner.dimension)
        };
        match outcome {
            LoadOutcome::Empty => {
                tracing::info!("no persisted index found, starting empty");
            }
            LoadOutcome::Corrupted(reason) => {
                tracing::warn!(reason, "persisted index unusable, starting empty");
                metrics::counter!("paperscan_index_load_corrupted").increment(1);
                self.inner.write().corrupted = true;
            }
            LoadOutcome::Loaded(snapshot) => {
                let target = self.policy.target_for(snapshot.papers.len() as u64);
                let read_only = snapshot.strategy != target;
                if read_only {
                    tracing::warn!(
                        loaded = snapshot.strategy.as_str(),
                        target = target.as_str(),
                        "loaded strategy differs from target, index read-only until rebuild"
                    );
                }
                let mut inner = self.inner.write();
                inner.papers = snapshot
                    .papers
                    .into_iter()
                    .map(|paper| (paper.paper_id, Arc::new(paper)))
                    .collect();
                inner.vectors = snapshot.vectors.into_iter().collect();
                inner.hash_to_id = inner
                    .papers
                    .iter()
                    .map(|(&id, paper)| (paper.content_hash, id))
                    .collect();
                inner.next_paper_id = snapshot.next_paper_id;
                inner.ann = snapshot.ann;
                inner.read_only = read_only;
                inner.corrupted = false;
                tracing::info!(count = inner.papers.len(), "index restored");
                ledger.rebuild_from(inner.papers.values().map(|p| p.content_hash));
            }
        }
    }

    /// Save current state, then copy both files into a timestamped backup
    /// directory. Returns the backup path.
    pub fn backup(&self) -> CoreResult<PathBuf> {
        self.save()?;
        Ok(persist::backup(&self.data_dir)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::content_hash_for;

    fn unit(mut v: Vec<f32>) -> Vec<f32> {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        for x in v.iter_mut() {
            *x /= norm;
        }
        v
    }

    fn sample_vector(n: u64, dim: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; dim];
        let mut h = n.wrapping_mul(0x2545_f491_4f6c_dd1d).wrapping_add(11);
        for x in v.iter_mut() {
            h ^= h << 13;
            h ^= h >> 7;
            h ^= h << 17;
            *x = ((h >> 40) as f32 / (1u64 << 24) as f32) - 0.5;
        }
        unit(v)
    }

    fn draft(n: u64) -> PaperDraft {
        PaperDraft {
            title: format!("Paper {n}"),
            abstract_text: format!("Abstract text number {n} with enough words."),
            authors: vec!["Author".to_string()],
            source: "test".to_string(),
            document_type: "article".to_string(),
            publication_date: None,
            doi: None,
            url: None,
        }
    }

    fn index(dim: usize) -> (VectorIndex, DedupLedger, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::new(dim, dir.path());
        (index, DedupLedger::new(10_000, 0.01), dir)
    }

    #[test]
    fn test_add_assigns_monotonic_ids() {
        let (index, ledger, _dir) = index(4);
        let added = index
            .add(
                vec![
                    (draft(1), sample_vector(1, 4)),
                    (draft(2), sample_vector(2, 4)),
                ],
                &ledger,
            )
            .unwrap();
        assert_eq!(added, 2);
        assert!(index.get(0).is_some());
        assert!(index.get(1).is_some());
        assert_eq!(index.get(0).unwrap().title, "Paper 1");
    }

    #[test]
    fn test_add_skips_duplicates_silently() {
        let (index, ledger, _dir) = index(4);
        let added = index
            .add(
                vec![
                    (draft(1), sample_vector(1, 4)),
                    (draft(1), sample_vector(1, 4)),
                ],
                &ledger,
            )
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(index.count(), 1);

        // A later call with the same content is also skipped.
        let again = index
            .add(vec![(draft(1), sample_vector(1, 4))], &ledger)
            .unwrap();
        assert_eq!(again, 0);
    }

    #[test]
    fn test_content_hash_unique_in_index() {
        let (index, ledger, _dir) = index(4);
        for _ in 0..3 {
            index
                .add(vec![(draft(7), sample_vector(7, 4))], &ledger)
                .unwrap();
        }
        let expected = content_hash_for(&draft(7).title, &draft(7).abstract_text);
        let matching = index
            .content_hashes()
            .into_iter()
            .filter(|h| *h == expected)
            .count();
        assert_eq!(matching, 1);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let (index, ledger, _dir) = index(4);
        let err = index
            .add(vec![(draft(1), vec![1.0, 0.0])], &ledger)
            .expect_err("wrong dimension must fail");
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn test_search_threshold_and_order() {
        let (index, ledger, _dir) = index(4);
        let items: Vec<_> = (0..20)
            .map(|n| (draft(n), sample_vector(n, 4)))
            .collect();
        index.add(items, &ledger).unwrap();

        let matches = index.search(&sample_vector(3, 4), 10, 0.0).unwrap();
        assert!(!matches.is_empty());
        assert!(matches.len() <= 10);
        for pair in matches.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(matches[0].paper.paper_id, 3);

        let strict = index.search(&sample_vector(3, 4), 10, 0.999).unwrap();
        assert_eq!(strict.len(), 1);
    }

    #[test]
    fn test_search_batch_matches_single_search() {
        let (index, ledger, _dir) = index(4);
        let items: Vec<_> = (0..15)
            .map(|n| (draft(n), sample_vector(n, 4)))
            .collect();
        index.add(items, &ledger).unwrap();

        let queries = vec![sample_vector(2, 4), sample_vector(9, 4)];
        let batched = index.search_batch(&queries, 5, 0.0).unwrap();
        for (query, batch_results) in queries.iter().zip(&batched) {
            let single = index.search(query, 5, 0.0).unwrap();
            let ids_a: Vec<u64> = single.iter().map(|m| m.paper.paper_id).collect();
            let ids_b: Vec<u64> = batch_results.iter().map(|m| m.paper.paper_id).collect();
            assert_eq!(ids_a, ids_b);
        }
    }

    #[test]
    fn test_auto_upgrade_to_hnsw() {
        let dir = tempfile::tempdir().unwrap();
        let policy = UpgradePolicy {
            flat_max: 10,
            hnsw_max: 1_000,
            ivf_flat_max: 10_000,
        };
        let index = VectorIndex::with_policy(8, dir.path(), policy);
        let ledger = DedupLedger::new(10_000, 0.01);

        let items: Vec<_> = (0..9).map(|n| (draft(n), sample_vector(n, 8))).collect();
        index.add(items, &ledger).unwrap();
        assert_eq!(index.stats().strategy, "flat");

        let more: Vec<_> = (9..30).map(|n| (draft(n), sample_vector(n, 8))).collect();
        index.add(more, &ledger).unwrap();
        assert_eq!(index.stats().strategy, "hnsw");
        assert!(index.stats().is_approximate);

        // Content survives the migration.
        let matches = index.search(&sample_vector(5, 8), 5, 0.0).unwrap();
        assert_eq!(matches[0].paper.paper_id, 5);
    }

    #[test]
    fn test_auto_upgrade_through_ivf() {
        let dir = tempfile::tempdir().unwrap();
        let policy = UpgradePolicy {
            flat_max: 10,
            hnsw_max: 20,
            ivf_flat_max: 40,
        };
        let index = VectorIndex::with_policy(8, dir.path(), policy);
        let ledger = DedupLedger::new(10_000, 0.01);

        let items: Vec<_> = (0..30).map(|n| (draft(n), sample_vector(n, 8))).collect();
        index.add(items, &ledger).unwrap();
        assert_eq!(index.stats().strategy, "ivf_flat");

        let more: Vec<_> = (30..60).map(|n| (draft(n), sample_vector(n, 8))).collect();
        index.add(more, &ledger).unwrap();
        assert_eq!(index.stats().strategy, "ivf_pq");
        assert!(!index.stats().supports_removal);
    }

    #[test]
    fn test_remove_on_flat() {
        let (index, ledger, _dir) = index(4);
        index
            .add(
                vec![
                    (draft(1), sample_vector(1, 4)),
                    (draft(2), sample_vector(2, 4)),
                ],
                &ledger,
            )
            .unwrap();
        assert_eq!(index.remove(&[0]).unwrap(), 1);
        assert_eq!(index.count(), 1);
        assert!(index.get(0).is_none());
    }

    #[test]
    fn test_remove_rejected_on_hnsw() {
        let dir = tempfile::tempdir().unwrap();
        let policy = UpgradePolicy {
            flat_max: 5,
            hnsw_max: 1_000,
            ivf_flat_max: 10_000,
        };
        let index = VectorIndex::with_policy(8, dir.path(), policy);
        let ledger = DedupLedger::new(10_000, 0.01);
        let items: Vec<_> = (0..20).map(|n| (draft(n), sample_vector(n, 8))).collect();
        index.add(items, &ledger).unwrap();
        assert_eq!(index.stats().strategy, "hnsw");

        let err = index.remove(&[0]).expect_err("hnsw removal must be rejected");
        assert!(matches!(err, CoreError::UnsupportedOperation(_)));
    }

    #[test]
    fn test_remove_duplicates_keeps_lowest_id() {
        let (index, ledger, _dir) = index(4);
        index
            .add(vec![(draft(1), sample_vector(1, 4))], &ledger)
            .unwrap();
        // Force a second copy past the ledger by clearing it.
        ledger.clear();
        index
            .add(vec![(draft(1), sample_vector(1, 4))], &ledger)
            .unwrap();
        assert_eq!(index.count(), 2);

        let removed = index.remove_duplicates();
        assert_eq!(removed, 1);
        assert_eq!(index.count(), 1);
        assert!(index.get(0).is_some(), "lowest paper_id survives");
        assert!(index.get(1).is_none());
    }

    #[test]
    fn test_clear_preserves_id_monotonicity() {
        let (index, ledger, _dir) = index(4);
        index
            .add(vec![(draft(1), sample_vector(1, 4))], &ledger)
            .unwrap();
        index.clear();
        ledger.clear();
        assert_eq!(index.count(), 0);

        index
            .add(vec![(draft(2), sample_vector(2, 4))], &ledger)
            .unwrap();
        assert!(index.get(0).is_none(), "id 0 must not be reused");
        assert!(index.get(1).is_some());
    }

    #[test]
    fn test_save_load_preserves_search_results() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::new(4, dir.path());
        let ledger = DedupLedger::new(10_000, 0.01);
        let items: Vec<_> = (0..12)
            .map(|n| (draft(n), sample_vector(n, 4)))
            .collect();
        index.add(items, &ledger).unwrap();
        let before: Vec<(u64, f32)> = index
            .search(&sample_vector(4, 4), 6, 0.1)
            .unwrap()
            .into_iter()
            .map(|m| (m.paper.paper_id, m.score))
            .collect();
        index.save().unwrap();

        let restored = VectorIndex::new(4, dir.path());
        let restored_ledger = DedupLedger::new(10_000, 0.01);
        restored.load(&restored_ledger);
        assert_eq!(restored.count(), 12);
        assert_eq!(restored_ledger.len(), 12);
        let after: Vec<(u64, f32)> = restored
            .search(&sample_vector(4, 4), 6, 0.1)
            .unwrap()
            .into_iter()
            .map(|m| (m.paper.paper_id, m.score))
            .collect();
        assert_eq!(before, after);
        assert!(!restored.stats().corrupted);
    }

    #[test]
    fn test_load_corrupted_presents_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::new(4, dir.path());
        let ledger = DedupLedger::new(10_000, 0.01);
        index
            .add(vec![(draft(1), sample_vector(1, 4))], &ledger)
            .unwrap();
        index.save().unwrap();

        let meta = dir.path().join(persist::META_FILE);
        let mut raw = std::fs::read(&meta).unwrap();
        raw[0] = b'Z';
        std::fs::write(&meta, raw).unwrap();

        let restored = VectorIndex::new(4, dir.path());
        restored.load(&DedupLedger::new(10_000, 0.01));
        assert_eq!(restored.count(), 0);
        assert!(restored.stats().corrupted);
    }

    #[test]
    fn test_strategy_mismatch_read_only_until_write() {
        let dir = tempfile::tempdir().unwrap();
        // Build under a policy where 12 vectors call for HNSW.
        let grow_policy = UpgradePolicy {
            flat_max: 5,
            hnsw_max: 1_000,
            ivf_flat_max: 10_000,
        };
        let writer = VectorIndex::with_policy(8, dir.path(), grow_policy);
        let ledger = DedupLedger::new(10_000, 0.01);
        let items: Vec<_> = (0..12).map(|n| (draft(n), sample_vector(n, 8))).collect();
        writer.add(items, &ledger).unwrap();
        assert_eq!(writer.stats().strategy, "hnsw");
        writer.save().unwrap();

        // Reload under the default policy where 12 vectors call for Flat.
        let reader = VectorIndex::new(8, dir.path());
        let reload_ledger = DedupLedger::new(10_000, 0.01);
        reader.load(&reload_ledger);
        assert_eq!(reader.stats().strategy, "hnsw", "loaded structure kept");

        // Search works while read-only.
        assert!(!reader.search(&sample_vector(2, 8), 5, 0.0).unwrap().is_empty());

        // First write rebuilds into the target strategy, then inserts.
        reader
            .add(vec![(draft(100), sample_vector(100, 8))], &reload_ledger)
            .unwrap();
        assert_eq!(reader.stats().strategy, "flat");
        assert_eq!(reader.count(), 13);
    }

    #[test]
    fn test_backup_creates_directory() {
        let (index, ledger, dir) = index(4);
        index
            .add(vec![(draft(1), sample_vector(1, 4))], &ledger)
            .unwrap();
        let backup_dir = index.backup().unwrap();
        assert!(backup_dir.starts_with(dir.path()));
        assert!(backup_dir.join(persist::VECTOR_FILE).exists());
        assert!(backup_dir.join(persist::META_FILE).exists());
    }
}
