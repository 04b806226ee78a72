//! Core paper types.
//!
//! A `Paper` is an indexed or matched academic document. Each paper carries a
//! 32-byte content hash over its normalized title and abstract, which is the
//! deduplication identity, and a monotonically assigned `paper_id`, which is
//! the index identity. The two never substitute for one another.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::normalize;

/// 32-byte digest identifying a paper's content for deduplication.
///
/// Computed as `sha256(normalized_title + "\n" + normalized_abstract)` where
/// normalization is the language-independent pipeline (no stopword removal),
/// so the same paper hashes identically regardless of which request
/// discovered it. Serializes as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash(pub [u8; 32]);

impl Serialize for ContentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(serde::de::Error::custom("content hash must be 64 hex chars"));
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(serde::de::Error::custom)?;
        }
        Ok(Self(bytes))
    }
}

impl ContentHash {
    /// Digest of an arbitrary pre-normalized string.
    pub fn digest(input: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Derive the deduplication hash from a paper's raw title and abstract.
pub fn content_hash_for(title: &str, abstract_text: &str) -> ContentHash {
    let joined = format!(
        "{}\n{}",
        normalize::normalize_for_hash(title),
        normalize::normalize_for_hash(abstract_text)
    );
    ContentHash::digest(&joined)
}

/// A matched or indexed academic document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    /// Stable index-assigned identifier. Never reused, even after `clear`.
    pub paper_id: u64,
    /// Deduplication identity over normalized title+abstract.
    pub content_hash: ContentHash,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Ordered author list as reported by the source.
    pub authors: Vec<String>,
    /// Tag of the adapter that produced this paper (e.g. `"arxiv"`).
    pub source: String,
    pub document_type: String,
    pub publication_date: Option<String>,
    pub doi: Option<String>,
    pub url: Option<String>,
}

/// A paper as returned by a source adapter, before it has an id or embedding.
///
/// Drafts become [`Paper`]s when the orchestrator hashes, embeds, and adds
/// them to the index.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperDraft {
    pub title: String,
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub source: String,
    pub document_type: String,
    pub publication_date: Option<String>,
    pub doi: Option<String>,
    pub url: Option<String>,
}

impl PaperDraft {
    /// Deduplication hash for this draft.
    pub fn content_hash(&self) -> ContentHash {
        content_hash_for(&self.title, &self.abstract_text)
    }
}

/// Plagiarism severity band derived from a cosine score.
///
/// Band thresholds are closed intervals on the lower bound; scores below
/// 0.50 are not reported at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlagiarismBand {
    Minimal,
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl PlagiarismBand {
    /// Classify a cosine score. Returns `None` below the reporting floor.
    pub fn from_score(score: f32) -> Option<Self> {
        if score >= 0.90 {
            Some(Self::VeryHigh)
        } else if score >= 0.80 {
            Some(Self::High)
        } else if score >= 0.70 {
            Some(Self::Moderate)
        } else if score >= 0.60 {
            Some(Self::Low)
        } else if score >= 0.50 {
            Some(Self::Minimal)
        } else {
            None
        }
    }

    /// Stable lowercase tag used in API payloads and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }
}

/// A scored match between a query and a paper, with its severity band.
///
/// This is the unit the result cache stores and the orchestrator
/// rebroadcasts per fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub paper: Paper,
    pub score: f32,
    pub band: PlagiarismBand,
}

impl Match {
    /// Build a match from a score, or `None` below the reporting floor.
    pub fn new(paper: Paper, score: f32) -> Option<Self> {
        PlagiarismBand::from_score(score).map(|band| Self { paper, score, band })
    }
}
