//! Per-source circuit breaker.
//!
//! Classic three-state breaker: `closed` counts consecutive failures and
//! opens at the threshold; `open` rejects until the cool-down elapses;
//! `half_open` admits exactly one probe in flight and closes on its success
//! or re-opens on its failure. Transitions are O(1) under one mutex and
//! never yield.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::clock::SharedClock;
use crate::config;

/// Breaker state for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// True while the single half-open probe is outstanding.
    probe_in_flight: bool,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }
}

/// Point-in-time view of one circuit, for diagnostics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CircuitSnapshot {
    pub source: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

/// Per-source circuits behind one mutex.
pub struct CircuitBreaker {
    circuits: Mutex<HashMap<String, Circuit>>,
    failure_threshold: u32,
    cooldown: Duration,
    clock: SharedClock,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration, clock: SharedClock) -> Self {
        Self {
            circuits: Mutex::new(HashMap::new()),
            failure_threshold,
            cooldown,
            clock,
        }
    }

    pub fn with_defaults(clock: SharedClock) -> Self {
        Self::new(
            config::BREAKER_FAILURE_THRESHOLD,
            config::BREAKER_COOLDOWN,
            clock,
        )
    }

    /// Whether a call to `source` may proceed right now. An `open` circuit
    /// whose cool-down has elapsed moves to `half_open` and grants the one
    /// probe slot to this caller.
    pub fn allow(&self, source: &str) -> bool {
        let now = self.clock.now();
        let mut circuits = self.circuits.lock();
        let circuit = circuits
            .entry(source.to_string())
            .or_insert_with(Circuit::new);
        match circuit.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = circuit
                    .opened_at
                    .map(|at| now.duration_since(at))
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.cooldown {
                    circuit.state = CircuitState::HalfOpen;
                    circuit.probe_in_flight = true;
                    tracing::info!(source, "circuit half-open, probing");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if circuit.probe_in_flight {
                    false
                } else {
                    circuit.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a successful call: resets the failure count and closes the
    /// circuit from any state.
    pub fn on_success(&self, source: &str) {
        let mut circuits = self.circuits.lock();
        let circuit = circuits
            .entry(source.to_string())
            .or_insert_with(Circuit::new);
        if circuit.state != CircuitState::Closed {
            tracing::info!(source, "circuit closed");
        }
        circuit.state = CircuitState::Closed;
        circuit.consecutive_failures = 0;
        circuit.opened_at = None;
        circuit.probe_in_flight = false;
    }

    /// Record a failed call. In `closed`, opens at the threshold; in
    /// `half_open`, re-opens immediately.
    pub fn on_failure(&self, source: &str) {
        let now = self.clock.now();
        let mut circuits = self.circuits.lock();
        let circuit = circuits
            .entry(source.to_string())
            .or_insert_with(Circuit::new);
        match circuit.state {
            CircuitState::Closed => {
                circuit.consecutive_failures += 1;
                if circuit.consecutive_failures >= self.failure_threshold {
                    circuit.state = CircuitState::Open;
                    circuit.opened_at = Some(now);
                    tracing::warn!(
                        source,
                        failures = circuit.consecutive_failures,
                        "circuit opened"
                    );
                    metrics::counter!("paperscan_circuit_opened", "source" => source.to_string())
                        .increment(1);
                }
            }
            CircuitState::HalfOpen => {
                circuit.state = CircuitState::Open;
                circuit.opened_at = Some(now);
                circuit.probe_in_flight = false;
                tracing::warn!(source, "probe failed, circuit re-opened");
                metrics::counter!("paperscan_circuit_opened", "source" => source.to_string())
                    .increment(1);
            }
            CircuitState::Open => {
                circuit.opened_at.get_or_insert(now);
            }
        }
    }

    /// Current state of a source's circuit (defaults to closed).
    pub fn state(&self, source: &str) -> CircuitState {
        self.circuits
            .lock()
            .get(source)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Forget all circuits.
    pub fn reset(&self) {
        self.circuits.lock().clear();
        tracing::info!("circuit breaker reset");
    }

    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let circuits = self.circuits.lock();
        let mut out: Vec<CircuitSnapshot> = circuits
            .iter()
            .map(|(source, circuit)| CircuitSnapshot {
                source: source.clone(),
                state: circuit.state,
                consecutive_failures: circuit.consecutive_failures,
            })
            .collect();
        out.sort_by(|a, b| a.source.cmp(&b.source));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn breaker(threshold: u32, cooldown_secs: u64) -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (
            CircuitBreaker::new(threshold, Duration::from_secs(cooldown_secs), clock.clone()),
            clock,
        )
    }

    #[test]
    fn test_opens_after_threshold_failures() {
        let (breaker, _clock) = breaker(5, 30);
        for _ in 0..4 {
            breaker.on_failure("pubmed");
            assert!(breaker.allow("pubmed"));
        }
        breaker.on_failure("pubmed");
        assert_eq!(breaker.state("pubmed"), CircuitState::Open);
        assert!(!breaker.allow("pubmed"));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let (breaker, _clock) = breaker(3, 30);
        breaker.on_failure("s");
        breaker.on_failure("s");
        breaker.on_success("s");
        breaker.on_failure("s");
        breaker.on_failure("s");
        assert_eq!(breaker.state("s"), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_after_cooldown_allows_one_probe() {
        let (breaker, clock) = breaker(2, 30);
        breaker.on_failure("s");
        breaker.on_failure("s");
        assert!(!breaker.allow("s"));

        clock.advance(Duration::from_secs(30));
        assert!(breaker.allow("s"), "first caller after cool-down probes");
        assert_eq!(breaker.state("s"), CircuitState::HalfOpen);
        assert!(!breaker.allow("s"), "second caller must wait for the probe");
    }

    #[test]
    fn test_probe_success_closes() {
        let (breaker, clock) = breaker(2, 30);
        breaker.on_failure("s");
        breaker.on_failure("s");
        clock.advance(Duration::from_secs(31));
        assert!(breaker.allow("s"));
        breaker.on_success("s");
        assert_eq!(breaker.state("s"), CircuitState::Closed);
        assert!(breaker.allow("s"));
    }

    #[test]
    fn test_probe_failure_reopens() {
        let (breaker, clock) = breaker(2, 30);
        breaker.on_failure("s");
        breaker.on_failure("s");
        clock.advance(Duration::from_secs(30));
        assert!(breaker.allow("s"));
        breaker.on_failure("s");
        assert_eq!(breaker.state("s"), CircuitState::Open);
        assert!(!breaker.allow("s"));

        // A fresh cool-down is required before the next probe.
        clock.advance(Duration::from_secs(29));
        assert!(!breaker.allow("s"));
        clock.advance(Duration::from_secs(1));
        assert!(breaker.allow("s"));
    }

    #[test]
    fn test_sources_are_independent() {
        let (breaker, _clock) = breaker(1, 30);
        breaker.on_failure("down");
        assert!(!breaker.allow("down"));
        assert!(breaker.allow("up"));
    }

    #[test]
    fn test_reset() {
        let (breaker, _clock) = breaker(1, 30);
        breaker.on_failure("s");
        assert!(!breaker.allow("s"));
        breaker.reset();
        assert!(breaker.allow("s"));
        assert_eq!(breaker.state("s"), CircuitState::Closed);
    }

    #[test]
    fn test_snapshot() {
        let (breaker, _clock) = breaker(2, 30);
        breaker.on_failure("b");
        breaker.on_failure("a");
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].source, "a");
        assert_eq!(snapshot[0].consecutive_failures, 1);
    }
}
