//! Parallel fan-out across external source adapters.
//!
//! All permitted adapters run concurrently under one global deadline.
//! Adapters that miss the deadline are cancelled, reported as failed, and
//! charged one circuit-breaker failure. Results are concatenated in adapter
//! declaration order with a per-source cap, then deduplicated by content
//! hash preserving first-seen order, so the merged list is deterministic
//! regardless of completion order.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use crate::breaker::CircuitBreaker;
use crate::config;
use crate::paper::PaperDraft;
use crate::sources::{SourceAdapter, SourceDriver, SourceResponse};

/// Outcome of one federated search.
#[derive(Debug)]
pub struct FederatedResult {
    /// Merged papers: declaration order, per-source cap applied, stable
    /// first-seen dedup by content hash.
    pub papers: Vec<PaperDraft>,
    /// One envelope per consulted adapter, in declaration order.
    pub envelopes: Vec<SourceResponse>,
}

/// Registry of adapters plus the shared driver.
pub struct Federator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    driver: Arc<SourceDriver>,
    breaker: Arc<CircuitBreaker>,
    deadline: Duration,
    per_source_cap: usize,
}

impl Federator {
    pub fn new(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        driver: Arc<SourceDriver>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            adapters,
            driver,
            breaker,
            deadline: config::FEDERATOR_DEADLINE,
            per_source_cap: config::MAX_RESULTS_PER_SOURCE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Tags of every registered adapter, in declaration order.
    pub fn source_tags(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.tag()).collect()
    }

    /// Fan out to all permitted adapters and merge their results.
    pub async fn search(
        &self,
        query: &str,
        theme: &str,
        language: &str,
        allowed_sources: Option<&[String]>,
    ) -> FederatedResult {
        let permitted: Vec<&Arc<dyn SourceAdapter>> = self
            .adapters
            .iter()
            .filter(|adapter| match allowed_sources {
                Some(allowed) => allowed.iter().any(|tag| tag == adapter.tag()),
                None => true,
            })
            .collect();

        let calls = permitted.iter().map(|adapter| {
            let driver = Arc::clone(&self.driver);
            let adapter = Arc::clone(adapter);
            async move {
                let tag = adapter.tag();
                match tokio::time::timeout(
                    self.deadline,
                    driver.fetch(adapter.as_ref(), query, theme, language),
                )
                .await
                {
                    Ok(envelope) => envelope,
                    Err(_) => {
                        // The in-flight call is dropped here; charge the
                        // breaker once for the cancelled attempt.
                        self.breaker.on_failure(tag);
                        tracing::warn!(source = tag, "adapter missed federator deadline");
                        metrics::counter!("paperscan_federator_deadline_misses", "source" => tag)
                            .increment(1);
                        SourceResponse {
                            papers: Vec::new(),
                            source: tag.to_string(),
                            ok: false,
                            latency_ms: self.deadline.as_millis() as u64,
                            error: Some("deadline".to_string()),
                        }
                    }
                }
            }
        });

        let envelopes = join_all(calls).await;

        let mut seen: HashSet<crate::paper::ContentHash> = HashSet::new();
        let mut papers = Vec::new();
        for envelope in &envelopes {
            for draft in envelope.papers.iter().take(self.per_source_cap) {
                if seen.insert(draft.content_hash()) {
                    papers.push(draft.clone());
                }
            }
        }

        let failed = envelopes.iter().filter(|e| !e.ok).count();
        tracing::debug!(
            sources = envelopes.len(),
            failed,
            merged = papers.len(),
            "federated search complete"
        );

        FederatedResult { papers, envelopes }
    }
}
