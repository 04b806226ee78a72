//! Index strategy selection.
//!
//! The strategy is a state machine keyed on vector count: exact flat scan
//! for small indexes, HNSW in the mid range, inverted-file variants beyond.
//! Upgrades happen post-insert under the write lock; each transition is a
//! pure rebuild from the authoritative `(paper_id -> vector, metadata)` map.

use serde::{Deserialize, Serialize};

use crate::config;

/// Internal structure of the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Exact dot-product scan with an ID map. Supports removal.
    Flat,
    /// Hierarchical navigable small world graph, ~95% recall. No removal.
    Hnsw,
    /// Inverted file over a k-means coarse quantizer, exact scoring inside
    /// probed lists. Limited removal.
    IvfFlat,
    /// Inverted file with product-quantized codes, maximum compression.
    /// No removal.
    IvfPq,
}

/// Count boundaries between strategies. The defaults come from
/// [`crate::config`]; tests shrink them to exercise migrations cheaply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpgradePolicy {
    pub flat_max: u64,
    pub hnsw_max: u64,
    pub ivf_flat_max: u64,
}

impl Default for UpgradePolicy {
    fn default() -> Self {
        Self {
            flat_max: config::FLAT_MAX_VECTORS,
            hnsw_max: config::HNSW_MAX_VECTORS,
            ivf_flat_max: config::IVF_FLAT_MAX_VECTORS,
        }
    }
}

impl UpgradePolicy {
    /// Target strategy for a given vector count.
    pub fn target_for(&self, count: u64) -> Strategy {
        if count <= self.flat_max {
            Strategy::Flat
        } else if count <= self.hnsw_max {
            Strategy::Hnsw
        } else if count <= self.ivf_flat_max {
            Strategy::IvfFlat
        } else {
            Strategy::IvfPq
        }
    }
}

impl Strategy {
    /// Whether `remove` is accepted under this strategy.
    pub fn supports_removal(&self) -> bool {
        matches!(self, Strategy::Flat | Strategy::IvfFlat)
    }

    /// Whether search results are approximate rather than exact.
    pub fn is_approximate(&self) -> bool {
        !matches!(self, Strategy::Flat)
    }

    /// Stable tag used in stats and the persisted header byte.
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Flat => "flat",
            Strategy::Hnsw => "hnsw",
            Strategy::IvfFlat => "ivf_flat",
            Strategy::IvfPq => "ivf_pq",
        }
    }

    /// Header byte for the persisted metadata file.
    pub fn to_tag(self) -> u8 {
        match self {
            Strategy::Flat => 0,
            Strategy::Hnsw => 1,
            Strategy::IvfFlat => 2,
            Strategy::IvfPq => 3,
        }
    }

    /// Inverse of [`Self::to_tag`].
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Strategy::Flat),
            1 => Some(Strategy::Hnsw),
            2 => Some(Strategy::IvfFlat),
            3 => Some(Strategy::IvfPq),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_bands() {
        let policy = UpgradePolicy::default();
        assert_eq!(policy.target_for(0), Strategy::Flat);
        assert_eq!(policy.target_for(10_000), Strategy::Flat);
        assert_eq!(policy.target_for(10_001), Strategy::Hnsw);
        assert_eq!(policy.target_for(100_000), Strategy::Hnsw);
        assert_eq!(policy.target_for(100_001), Strategy::IvfFlat);
        assert_eq!(policy.target_for(1_000_000), Strategy::IvfFlat);
        assert_eq!(policy.target_for(1_000_001), Strategy::IvfPq);
    }

    #[test]
    fn test_capability_flags() {
        assert!(Strategy::Flat.supports_removal());
        assert!(!Strategy::Hnsw.supports_removal());
        assert!(Strategy::IvfFlat.supports_removal());
        assert!(!Strategy::IvfPq.supports_removal());
        assert!(!Strategy::Flat.is_approximate());
        assert!(Strategy::Hnsw.is_approximate());
    }

    #[test]
    fn test_tag_round_trip() {
        for strategy in [
            Strategy::Flat,
            Strategy::Hnsw,
            Strategy::IvfFlat,
            Strategy::IvfPq,
        ] {
            assert_eq!(Strategy::from_tag(strategy.to_tag()), Some(strategy));
        }
        assert_eq!(Strategy::from_tag(9), None);
    }
}
