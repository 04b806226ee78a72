//! Per-source token bucket rate limiter.
//!
//! Each external source gets a bucket with capacity `C_s` refilled at `r_s`
//! tokens per second; refill is computed lazily against the shared [`Clock`]
//! on every acquire. `try_acquire` never blocks and never yields; the only
//! synchronization is one mutex over the bucket table.
//!
//! State is per-process. When the service runs several worker processes,
//! each worker enforces the limit independently, so the effective outbound
//! rate is up to `workers * r_s` per source; a shared-cache backend would
//! tighten this but is not wired in.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;

use crate::clock::SharedClock;
use crate::config;

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    capacity: f64,
    rate: f64,
}

impl TokenBucket {
    fn new(capacity: f64, rate: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            capacity,
            rate,
        }
    }

    fn try_acquire(&mut self, now: Instant) -> bool {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Remaining-token snapshot for diagnostics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LimiterSnapshot {
    pub source: String,
    pub tokens: f64,
    pub capacity: f64,
    pub rate: f64,
}

/// Per-source token buckets behind one mutex.
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    capacity: f64,
    rate: f64,
    clock: SharedClock,
}

impl RateLimiter {
    pub fn new(capacity: f64, rate: f64, clock: SharedClock) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            capacity,
            rate,
            clock,
        }
    }

    pub fn with_defaults(clock: SharedClock) -> Self {
        Self::new(config::LIMITER_CAPACITY, config::LIMITER_REFILL_PER_SEC, clock)
    }

    /// Consume one token for `source` if available.
    pub fn try_acquire(&self, source: &str) -> bool {
        let now = self.clock.now();
        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry(source.to_string())
            .or_insert_with(|| TokenBucket::new(self.capacity, self.rate, now));
        let allowed = bucket.try_acquire(now);
        if !allowed {
            tracing::debug!(source, "rate limit exhausted");
            metrics::counter!("paperscan_rate_limited", "source" => source.to_string())
                .increment(1);
        }
        allowed
    }

    /// Restore every bucket to full.
    pub fn reset(&self) {
        self.buckets.lock().clear();
        tracing::info!("rate limiter reset");
    }

    pub fn snapshot(&self) -> Vec<LimiterSnapshot> {
        let now = self.clock.now();
        let mut buckets = self.buckets.lock();
        let mut out: Vec<LimiterSnapshot> = buckets
            .iter_mut()
            .map(|(source, bucket)| {
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                let tokens = (bucket.tokens + elapsed * bucket.rate).min(bucket.capacity);
                LimiterSnapshot {
                    source: source.clone(),
                    tokens,
                    capacity: bucket.capacity,
                    rate: bucket.rate,
                }
            })
            .collect();
        out.sort_by(|a, b| a.source.cmp(&b.source));
        out
    }
}
