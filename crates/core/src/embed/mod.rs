//! Embedding generation.
//!
//! [`Embedder`] is the model seam: implementations produce fixed-dimension
//! L2-normalized vectors for batches of normalized strings. The
//! [`EmbeddingService`] wrapper adds what every caller needs: unique-text
//! coalescing, an in-process LRU cache keyed by normalized text, internal
//! batching up to the configured batch size, serialized model access for
//! concurrent callers, and norm verification.
//!
//! The production model (fastembed / AllMiniLM-L6-v2) lives behind the
//! `onnx` feature; [`HashEmbedder`] is the always-available deterministic
//! fallback used by tests and keyless deployments.

#[cfg(feature = "onnx")]
pub mod fastembed;

use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;

use crate::config;
use crate::error::{CoreError, CoreResult};

/// A model producing L2-normalized vectors of a fixed dimension.
///
/// A failing embedder is fatal to the current request; callers must not
/// degrade to partial embeddings.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of normalized strings, one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>>;

    /// Dimension of every produced vector.
    fn dimension(&self) -> usize;

    /// Model identifier for logs and stats.
    fn name(&self) -> &str;
}

/// Batching, caching, serializing front-end over an [`Embedder`].
pub struct EmbeddingService {
    embedder: Arc<dyn Embedder>,
    /// One batch at a time through the underlying model.
    model_gate: tokio::sync::Mutex<()>,
    cache: parking_lot::Mutex<LruCache<String, Arc<Vec<f32>>>>,
    batch_size: usize,
}

impl EmbeddingService {
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            embedder,
            model_gate: tokio::sync::Mutex::new(()),
            cache: parking_lot::Mutex::new(LruCache::new(
                NonZeroUsize::new(config::EMBED_CACHE_CAPACITY).expect("nonzero cache capacity"),
            )),
            batch_size: batch_size.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    pub fn model_name(&self) -> &str {
        self.embedder.name()
    }

    /// Embed `texts`, reusing cached vectors and computing each unique text
    /// once. Returns one vector per input, in input order.
    pub async fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Arc<Vec<f32>>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Coalesce duplicates: unique_of[i] is the position of texts[i] in `unique`.
        let mut unique: Vec<String> = Vec::new();
        let mut unique_of = Vec::with_capacity(texts.len());
        {
            let mut seen = std::collections::HashMap::new();
            for text in texts {
                let slot = *seen.entry(text.as_str()).or_insert_with(|| {
                    unique.push(text.clone());
                    unique.len() - 1
                });
                unique_of.push(slot);
            }
        }

        let mut resolved: Vec<Option<Arc<Vec<f32>>>> = vec![None; unique.len()];
        let mut misses: Vec<usize> = Vec::new();
        {
            let mut cache = self.cache.lock();
            for (slot, text) in unique.iter().enumerate() {
                match cache.get(text.as_str()) {
                    Some(vector) => resolved[slot] = Some(Arc::clone(vector)),
                    None => misses.push(slot),
                }
            }
        }
        metrics::counter!("paperscan_embed_cache_hits")
            .increment((unique.len() - misses.len()) as u64);
        metrics::counter!("paperscan_embed_cache_misses").increment(misses.len() as u64);

        for chunk in misses.chunks(self.batch_size) {
            let batch: Vec<String> = chunk.iter().map(|&slot| unique[slot].clone()).collect();
            let vectors = {
                let _gate = self.model_gate.lock().await;
                self.embedder.embed(&batch).await?
            };
            if vectors.len() != batch.len() {
                return Err(CoreError::Unavailable(format!(
                    "embedder returned {} vectors for {} inputs",
                    vectors.len(),
                    batch.len()
                )));
            }
            let mut cache = self.cache.lock();
            for (&slot, mut vector) in chunk.iter().zip(vectors) {
                if vector.len() != self.dimension() {
                    return Err(CoreError::Unavailable(format!(
                        "embedder produced dimension {} (expected {})",
                        vector.len(),
                        self.dimension()
                    )));
                }
                ensure_unit_norm(&mut vector);
                let shared = Arc::new(vector);
                cache.put(unique[slot].clone(), Arc::clone(&shared));
                resolved[slot] = Some(shared);
            }
        }

        Ok(unique_of
            .into_iter()
            .map(|slot| {
                Arc::clone(
                    resolved[slot]
                        .as_ref()
                        .expect("every unique slot resolved above"),
                )
            })
            .collect())
    }

    /// Embed a single text. Convenience wrapper over [`Self::embed_batch`].
    pub async fn embed_one(&self, text: &str) -> CoreResult<Arc<Vec<f32>>> {
        let texts = [text.to_string()];
        let mut out = self.embed_batch(&texts).await?;
        Ok(out.remove(0))
    }
}

/// Renormalize unless the vector is already unit length within tolerance.
/// All-zero vectors are left untouched (they score 0 against everything).
fn ensure_unit_norm(vector: &mut [f32]) {
    let norm_sq: f32 = vector.iter().map(|x| x * x).sum();
    if norm_sq == 0.0 {
        return;
    }
    let norm = norm_sq.sqrt();
    if (norm - 1.0).abs() > config::NORM_EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Deterministic feature-hashing embedder.
///
/// Each whitespace token hashes to a dimension bucket with a sign bit; the
/// accumulated vector is L2-normalized. Not a transformer, but it satisfies
/// the service contract (fixed dimension, unit norm, deterministic across
/// processes), which is what tests and keyless deployments need: overlapping
/// token sets produce correlated vectors.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.split_whitespace() {
            let hash = splitmix(token);
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        ensure_unit_norm(&mut vector);
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(config::DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "feature-hash"
    }
}

fn splitmix(token: &str) -> u64 {
    let mut state = 0x9e37_79b9_7f4a_7c15u64;
    for &byte in token.as_bytes() {
        state = state.wrapping_add(byte as u64);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        state = z ^ (z >> 31);
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn service() -> EmbeddingService {
        EmbeddingService::new(Arc::new(HashEmbedder::new(64)), 4)
    }

    #[tokio::test]
    async fn test_vectors_are_unit_norm() {
        let svc = service();
        let texts = vec![
            "neural networks".to_string(),
            "deep learning models".to_string(),
        ];
        for vector in svc.embed_batch(&texts).await.unwrap() {
            let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() <= 1e-4, "norm {norm}");
        }
    }

    #[tokio::test]
    async fn test_deterministic_across_calls() {
        let svc = service();
        let texts = vec!["stable embedding".to_string()];
        let a = svc.embed_batch(&texts).await.unwrap();
        let b = svc.embed_batch(&texts).await.unwrap();
        assert_eq!(a[0], b[0]);
    }

    #[tokio::test]
    async fn test_duplicates_share_one_computation() {
        struct Counting {
            inner: HashEmbedder,
            calls: AtomicUsize,
        }
        #[async_trait]
        impl Embedder for Counting {
            async fn embed(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
                self.calls.fetch_add(texts.len(), Ordering::SeqCst);
                self.inner.embed(texts).await
            }
            fn dimension(&self) -> usize {
                self.inner.dimension()
            }
            fn name(&self) -> &str {
                "counting"
            }
        }

        let counting = Arc::new(Counting {
            inner: HashEmbedder::new(32),
            calls: AtomicUsize::new(0),
        });
        let svc = EmbeddingService::new(Arc::clone(&counting) as Arc<dyn Embedder>, 8);
        let texts = vec![
            "same text".to_string(),
            "same text".to_string(),
            "other text".to_string(),
            "same text".to_string(),
        ];
        let out = svc.embed_batch(&texts).await.unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], out[1]);
        assert_eq!(out[1], out[3]);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_short_circuits_repeat_requests() {
        struct Counting {
            inner: HashEmbedder,
            calls: AtomicUsize,
        }
        #[async_trait]
        impl Embedder for Counting {
            async fn embed(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
                self.calls.fetch_add(texts.len(), Ordering::SeqCst);
                self.inner.embed(texts).await
            }
            fn dimension(&self) -> usize {
                self.inner.dimension()
            }
            fn name(&self) -> &str {
                "counting"
            }
        }

        let counting = Arc::new(Counting {
            inner: HashEmbedder::new(32),
            calls: AtomicUsize::new(0),
        });
        let svc = EmbeddingService::new(Arc::clone(&counting) as Arc<dyn Embedder>, 8);
        let texts = vec!["cached text".to_string()];
        svc.embed_batch(&texts).await.unwrap();
        svc.embed_batch(&texts).await.unwrap();
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_batching_splits_large_input() {
        struct MaxBatch {
            inner: HashEmbedder,
            max_seen: AtomicUsize,
        }
        #[async_trait]
        impl Embedder for MaxBatch {
            async fn embed(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
                self.max_seen.fetch_max(texts.len(), Ordering::SeqCst);
                self.inner.embed(texts).await
            }
            fn dimension(&self) -> usize {
                self.inner.dimension()
            }
            fn name(&self) -> &str {
                "max-batch"
            }
        }

        let probe = Arc::new(MaxBatch {
            inner: HashEmbedder::new(16),
            max_seen: AtomicUsize::new(0),
        });
        let svc = EmbeddingService::new(Arc::clone(&probe) as Arc<dyn Embedder>, 3);
        let texts: Vec<String> = (0..10).map(|i| format!("text number {i}")).collect();
        let out = svc.embed_batch(&texts).await.unwrap();
        assert_eq!(out.len(), 10);
        assert!(probe.max_seen.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_embedder_failure_is_fatal() {
        struct Failing;
        #[async_trait]
        impl Embedder for Failing {
            async fn embed(&self, _texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
                Err(CoreError::Unavailable("model offline".to_string()))
            }
            fn dimension(&self) -> usize {
                8
            }
            fn name(&self) -> &str {
                "failing"
            }
        }

        let svc = EmbeddingService::new(Arc::new(Failing), 8);
        let err = svc
            .embed_batch(&["x".to_string()])
            .await
            .expect_err("must fail");
        assert!(matches!(err, CoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_overlapping_texts_correlate() {
        let svc = service();
        let out = svc
            .embed_batch(&[
                "neural networks learn representations".to_string(),
                "neural networks learn features".to_string(),
                "completely unrelated cooking recipe".to_string(),
            ])
            .await
            .unwrap();
        let dot = |a: &[f32], b: &[f32]| -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() };
        assert!(dot(&out[0], &out[1]) > dot(&out[0], &out[2]));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let svc = service();
        assert!(svc.embed_batch(&[]).await.unwrap().is_empty());
    }
}
