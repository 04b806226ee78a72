//! Content-hash deduplication ledger.
//!
//! Two layers: a Bloom filter answering "maybe seen" in O(1) with no false
//! negatives, over an authoritative hash set answering "definitely seen".
//! The authoritative set is the source of truth; the filter is a rebuildable
//! accelerator. Both are updated under one write lock, so
//! `h ∈ authoritative ⇒ h ∈ bloom` holds at every observable point.
//!
//! The ledger is not persisted on its own: at startup it is rebuilt from the
//! content hashes recorded in the index metadata file.

use parking_lot::RwLock;

use crate::config;
use crate::paper::ContentHash;

/// Outcome of [`DedupLedger::seen_or_add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seen {
    /// First sighting; the hash has been recorded.
    New,
    /// The hash was already in the authoritative set.
    Duplicate,
}

/// Bit-array Bloom filter sized for a target cardinality and false-positive
/// rate. Index pairs are derived from the content hash itself by double
/// hashing: a SHA-256 digest already carries more entropy than the filter
/// needs, so no re-hashing happens here.
#[derive(Debug)]
struct BloomFilter {
    words: Vec<u64>,
    bits: u64,
    hashes: u32,
}

impl BloomFilter {
    fn new(capacity: usize, false_positive_rate: f64) -> Self {
        let n = capacity.max(1) as f64;
        let ln2 = std::f64::consts::LN_2;
        let bits = ((-n * false_positive_rate.ln()) / (ln2 * ln2)).ceil() as u64;
        let bits = bits.max(64);
        let hashes = ((bits as f64 / n) * ln2).round().max(1.0) as u32;
        Self {
            words: vec![0u64; bits.div_ceil(64) as usize],
            bits,
            hashes,
        }
    }

    fn index_pair(hash: &ContentHash) -> (u64, u64) {
        let bytes = hash.as_bytes();
        let h1 = u64::from_le_bytes(bytes[0..8].try_into().expect("8-byte slice"));
        let h2 = u64::from_le_bytes(bytes[8..16].try_into().expect("8-byte slice"));
        // h2 must be odd so successive probes cover distinct bits.
        (h1, h2 | 1)
    }

    fn insert(&mut self, hash: &ContentHash) {
        let (h1, h2) = Self::index_pair(hash);
        for i in 0..self.hashes as u64 {
            let bit = h1.wrapping_add(i.wrapping_mul(h2)) % self.bits;
            self.words[(bit / 64) as usize] |= 1u64 << (bit % 64);
        }
    }

    fn maybe_contains(&self, hash: &ContentHash) -> bool {
        let (h1, h2) = Self::index_pair(hash);
        (0..self.hashes as u64).all(|i| {
            let bit = h1.wrapping_add(i.wrapping_mul(h2)) % self.bits;
            self.words[(bit / 64) as usize] & (1u64 << (bit % 64)) != 0
        })
    }
}

#[derive(Debug)]
struct LedgerState {
    bloom: BloomFilter,
    authoritative: std::collections::HashSet<ContentHash>,
}

/// Ledger statistics for the admin surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DedupStats {
    pub entries: usize,
    pub bloom_bits: u64,
    pub bloom_hashes: u32,
    pub capacity: usize,
    pub false_positive_rate: f64,
}

/// Thread-safe deduplication ledger. Single writer, concurrent readers.
#[derive(Debug)]
pub struct DedupLedger {
    state: RwLock<LedgerState>,
    capacity: usize,
    false_positive_rate: f64,
}

impl Default for DedupLedger {
    fn default() -> Self {
        Self::new(
            config::DEDUP_TARGET_CARDINALITY,
            config::DEDUP_FALSE_POSITIVE_RATE,
        )
    }
}

impl DedupLedger {
    pub fn new(capacity: usize, false_positive_rate: f64) -> Self {
        Self {
            state: RwLock::new(LedgerState {
                bloom: BloomFilter::new(capacity, false_positive_rate),
                authoritative: std::collections::HashSet::new(),
            }),
            capacity,
            false_positive_rate,
        }
    }

    /// Record a hash, reporting whether it was already known.
    ///
    /// The Bloom layer short-circuits the common "definitely new" case; a
    /// Bloom hit is verified against the authoritative set, so false
    /// positives never misreport `Duplicate`.
    pub fn seen_or_add(&self, hash: ContentHash) -> Seen {
        let mut state = self.state.write();
        if !state.bloom.maybe_contains(&hash) {
            state.bloom.insert(&hash);
            state.authoritative.insert(hash);
            return Seen::New;
        }
        if state.authoritative.contains(&hash) {
            Seen::Duplicate
        } else {
            state.bloom.insert(&hash);
            state.authoritative.insert(hash);
            Seen::New
        }
    }

    /// Authoritative membership check; read lock only.
    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.state.read().authoritative.contains(hash)
    }

    /// Drop every recorded hash and reset the filter.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.bloom = BloomFilter::new(self.capacity, self.false_positive_rate);
        state.authoritative.clear();
    }

    /// Reconstruct the ledger from persisted content hashes (index metadata).
    pub fn rebuild_from<I: IntoIterator<Item = ContentHash>>(&self, hashes: I) {
        let mut state = self.state.write();
        state.bloom = BloomFilter::new(self.capacity, self.false_positive_rate);
        state.authoritative.clear();
        for hash in hashes {
            state.bloom.insert(&hash);
            state.authoritative.insert(hash);
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().authoritative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> DedupStats {
        let state = self.state.read();
        DedupStats {
            entries: state.authoritative.len(),
            bloom_bits: state.bloom.bits,
            bloom_hashes: state.bloom.hashes,
            capacity: self.capacity,
            false_positive_rate: self.false_positive_rate,
        }
    }
}
