//! Result cache: fingerprint to match set with TTL.
//!
//! The fingerprint hashes `(theme, language, normalized query, threshold)`
//! and deliberately excludes the execution path (index on or off), so a
//! warmed cache serves both paths. The cache is advisory everywhere: a
//! miss or a backend problem falls through to live computation and is
//! never an error.
//!
//! [`CacheBackend`] is the seam for a shared (cross-worker) store; the
//! in-process map is the default backend. A networked backend must swallow
//! its own errors and answer `None`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::clock::SharedClock;
use crate::config;
use crate::paper::Match;

/// Cache key over the request-shaped inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Deterministic digest of the search inputs. The threshold enters as
    /// its exact bit pattern so 0.70 and 0.7000001 are distinct keys.
    pub fn compute(theme: &str, language: &str, normalized_query: &str, threshold: f32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(theme.as_bytes());
        hasher.update([0u8]);
        hasher.update(language.as_bytes());
        hasher.update([0u8]);
        hasher.update(normalized_query.as_bytes());
        hasher.update([0u8]);
        hasher.update(threshold.to_bits().to_le_bytes());
        Self(hasher.finalize().into())
    }
}

/// Storage seam behind [`ResultCache`].
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &Fingerprint) -> Option<Vec<Match>>;
    fn put(&self, key: Fingerprint, value: Vec<Match>, ttl: Duration);
    fn clear(&self);
    fn len(&self) -> usize;
}

struct Entry {
    matches: Vec<Match>,
    expires_at: Instant,
}

/// Default in-process backend: a mutex-guarded map with lazy expiry.
pub struct InMemoryCache {
    entries: Mutex<HashMap<Fingerprint, Entry>>,
    clock: SharedClock,
}

impl InMemoryCache {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }
}

impl CacheBackend for InMemoryCache {
    fn get(&self, key: &Fingerprint) -> Option<Vec<Match>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.matches.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: Fingerprint, value: Vec<Match>, ttl: Duration) {
        let expires_at = self.clock.now() + ttl;
        self.entries.lock().insert(
            key,
            Entry {
                matches: value,
                expires_at,
            },
        );
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// TTL'd result cache over a pluggable backend.
pub struct ResultCache {
    backend: Box<dyn CacheBackend>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(backend: Box<dyn CacheBackend>) -> Self {
        Self {
            backend,
            ttl: config::RESULT_CACHE_TTL,
        }
    }

    pub fn in_memory(clock: SharedClock) -> Self {
        Self::new(Box::new(InMemoryCache::new(clock)))
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn lookup(&self, key: &Fingerprint) -> Option<Vec<Match>> {
        let hit = self.backend.get(key);
        if hit.is_some() {
            metrics::counter!("paperscan_result_cache_hits").increment(1);
        } else {
            metrics::counter!("paperscan_result_cache_misses").increment(1);
        }
        hit
    }

    pub fn store(&self, key: Fingerprint, matches: Vec<Match>) {
        self.backend.put(key, matches, self.ttl);
    }

    pub fn clear(&self) {
        self.backend.clear();
        tracing::info!("result cache cleared");
    }

    pub fn len(&self) -> usize {
        self.backend.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::paper::{ContentHash, Paper};
    use std::sync::Arc;

    fn sample_match(score: f32) -> Match {
        Match::new(
            Paper {
                paper_id: 1,
                content_hash: ContentHash::digest("x"),
                title: "T".to_string(),
                abstract_text: "A".to_string(),
                authors: vec![],
                source: "test".to_string(),
                document_type: "article".to_string(),
                publication_date: None,
                doi: None,
                url: None,
            },
            score,
        )
        .unwrap()
    }

    fn cache() -> (ResultCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (
            ResultCache::in_memory(clock.clone()).with_ttl(Duration::from_secs(60)),
            clock,
        )
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = Fingerprint::compute("ml", "en", "neural nets", 0.7);
        let b = Fingerprint::compute("ml", "en", "neural nets", 0.7);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_varies_with_inputs() {
        let base = Fingerprint::compute("ml", "en", "neural nets", 0.7);
        assert_ne!(base, Fingerprint::compute("bio", "en", "neural nets", 0.7));
        assert_ne!(base, Fingerprint::compute("ml", "es", "neural nets", 0.7));
        assert_ne!(base, Fingerprint::compute("ml", "en", "other query", 0.7));
        assert_ne!(base, Fingerprint::compute("ml", "en", "neural nets", 0.8));
    }

    #[test]
    fn test_fingerprint_field_boundaries_are_unambiguous() {
        // "ab" + "c" must not collide with "a" + "bc".
        let a = Fingerprint::compute("ab", "c", "q", 0.5);
        let b = Fingerprint::compute("a", "bc", "q", 0.5);
        assert_ne!(a, b);
    }

    #[test]
    fn test_store_then_lookup() {
        let (cache, _clock) = cache();
        let key = Fingerprint::compute("t", "en", "q", 0.7);
        assert!(cache.lookup(&key).is_none());
        cache.store(key, vec![sample_match(0.9)]);
        let hit = cache.lookup(&key).unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].paper.paper_id, 1);
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        let (cache, clock) = cache();
        let key = Fingerprint::compute("t", "en", "q", 0.7);
        cache.store(key, vec![sample_match(0.8)]);
        clock.advance(Duration::from_secs(59));
        assert!(cache.lookup(&key).is_some());
        clock.advance(Duration::from_secs(2));
        assert!(cache.lookup(&key).is_none());
        assert_eq!(cache.len(), 0, "expired entry evicted on read");
    }

    #[test]
    fn test_clear() {
        let (cache, _clock) = cache();
        let key = Fingerprint::compute("t", "en", "q", 0.7);
        cache.store(key, vec![sample_match(0.8)]);
        cache.clear();
        assert!(cache.lookup(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_empty_match_set_is_cacheable() {
        // Negative results are cached too: the query ran and found nothing.
        let (cache, _clock) = cache();
        let key = Fingerprint::compute("t", "en", "q", 0.7);
        cache.store(key, Vec::new());
        assert_eq!(cache.lookup(&key).unwrap().len(), 0);
    }
}
