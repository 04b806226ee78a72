//! Crash-safe persistence for the vector index.
//!
//! Two files under the data directory:
//!
//! - `vector_index.bin` holds the ANN/flat structure plus the authoritative
//!   vectors: `[magic "PSVX" 4B][version u16 LE][bincode payload][CRC32 BE]`.
//! - `vector_index_meta.bin` is a length-prefixed record stream:
//!   header `{magic "PSMD" 4B, version u16, strategy u8, dimension u16,
//!   count u64, next_paper_id u64}` followed by `count` records of
//!   `{paper_id u64, content_hash 32B, eight length-prefixed strings}`.
//!
//! All writes go through a temp file, fsync, and rename, so a crash leaves
//! either the old state or the new one. Records are written in ascending
//! `paper_id` order and the file body carries no timestamps, so saving the
//! same state twice produces identical bytes.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::index::strategy::Strategy;
use crate::index::AnnStructure;
use crate::paper::{ContentHash, Paper};

const META_MAGIC: &[u8; 4] = b"PSMD";
const VECTOR_MAGIC: &[u8; 4] = b"PSVX";
const FORMAT_VERSION: u16 = 1;

/// Upper bound on any single length-prefixed string, to reject garbage
/// lengths from a damaged file before allocating.
const MAX_STRING_BYTES: u32 = 16 * 1024 * 1024;

pub const VECTOR_FILE: &str = "vector_index.bin";
pub const META_FILE: &str = "vector_index_meta.bin";

/// Everything needed to reconstruct an index, captured under its read lock.
#[derive(Debug)]
pub struct IndexSnapshot {
    pub strategy: Strategy,
    pub dimension: usize,
    pub next_paper_id: u64,
    /// Sorted by ascending `paper_id`.
    pub papers: Vec<Paper>,
    /// Sorted by ascending paper id, parallel in content to `papers`.
    pub vectors: Vec<(u64, Vec<f32>)>,
    pub ann: AnnStructure,
}

/// Serialized body of `vector_index.bin`.
#[derive(serde::Serialize, serde::Deserialize)]
struct VectorPayload {
    dimension: u64,
    vectors: Vec<(u64, Vec<f32>)>,
    ann: AnnStructure,
}

/// Result of reading persisted state.
#[derive(Debug)]
pub enum LoadOutcome {
    /// No persisted files; start empty.
    Empty,
    /// State restored.
    Loaded(IndexSnapshot),
    /// Files present but unusable; the caller presents an empty index with
    /// `corrupted=true` instead of crashing.
    Corrupted(String),
}

/// Write both files atomically. The metadata file is written second so a
/// crash between the two renames is detected as a count mismatch at load.
pub fn save_snapshot(dir: &Path, snapshot: &IndexSnapshot) -> io::Result<()> {
    fs::create_dir_all(dir)?;

    let payload = VectorPayload {
        dimension: snapshot.dimension as u64,
        vectors: snapshot.vectors.clone(),
        ann: snapshot.ann.clone(),
    };
    let body = bincode::serialize(&payload).map_err(|e| io::Error::other(e.to_string()))?;
    let mut vector_bytes = Vec::with_capacity(body.len() + 10);
    vector_bytes.extend_from_slice(VECTOR_MAGIC);
    vector_bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    vector_bytes.extend_from_slice(&body);
    vector_bytes.extend_from_slice(&crc32fast::hash(&body).to_be_bytes());
    atomic_write(&dir.join(VECTOR_FILE), &vector_bytes)?;

    let mut meta = Vec::new();
    meta.extend_from_slice(META_MAGIC);
    meta.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    meta.push(snapshot.strategy.to_tag());
    meta.extend_from_slice(&(snapshot.dimension as u16).to_le_bytes());
    meta.extend_from_slice(&(snapshot.papers.len() as u64).to_le_bytes());
    meta.extend_from_slice(&snapshot.next_paper_id.to_le_bytes());
    for paper in &snapshot.papers {
        meta.extend_from_slice(&paper.paper_id.to_le_bytes());
        meta.extend_from_slice(paper.content_hash.as_bytes());
        write_string(&mut meta, &paper.title);
        write_string(&mut meta, &paper.abstract_text);
        write_string(&mut meta, &paper.authors.join("; "));
        write_string(&mut meta, &paper.source);
        write_string(&mut meta, &paper.document_type);
        write_string(&mut meta, paper.publication_date.as_deref().unwrap_or(""));
        write_string(&mut meta, paper.doi.as_deref().unwrap_or(""));
        write_string(&mut meta, paper.url.as_deref().unwrap_or(""));
    }
    atomic_write(&dir.join(META_FILE), &meta)?;

    tracing::info!(
        count = snapshot.papers.len(),
        strategy = snapshot.strategy.as_str(),
        "index saved"
    );
    Ok(())
}

/// Read persisted state, verifying magic, version, CRC, and cross-file
/// consistency. Never panics on malformed input.
pub fn load_snapshot(dir: &Path, expected_dimension: usize) -> LoadOutcome {
    let vector_path = dir.join(VECTOR_FILE);
    let meta_path = dir.join(META_FILE);

    match (vector_path.exists(), meta_path.exists()) {
        (false, false) => return LoadOutcome::Empty,
        (true, true) => {}
        _ => {
            return LoadOutcome::Corrupted(
                "one of the two index files is missing".to_string(),
            )
        }
    }

    let meta_raw = match fs::read(&meta_path) {
        Ok(bytes) => bytes,
        Err(e) => return LoadOutcome::Corrupted(format!("metadata unreadable: {e}")),
    };
    let (header, mut cursor) = match read_meta_header(&meta_raw) {
        Ok(parsed) => parsed,
        Err(reason) => return LoadOutcome::Corrupted(reason),
    };
    if header.dimension as usize != expected_dimension {
        return LoadOutcome::Corrupted(format!(
            "dimension mismatch: file has {}, configured {}",
            header.dimension, expected_dimension
        ));
    }

    let mut papers = Vec::with_capacity(header.count as usize);
    for _ in 0..header.count {
        match read_record(&meta_raw, &mut cursor) {
            Ok(paper) => papers.push(paper),
            Err(reason) => return LoadOutcome::Corrupted(reason),
        }
    }
    if cursor != meta_raw.len() {
        return LoadOutcome::Corrupted("trailing bytes after last record".to_string());
    }

    let vector_raw = match fs::read(&vector_path) {
        Ok(bytes) => bytes,
        Err(e) => return LoadOutcome::Corrupted(format!("vector file unreadable: {e}")),
    };
    if vector_raw.len() < 10 || &vector_raw[..4] != VECTOR_MAGIC {
        return LoadOutcome::Corrupted("vector file magic mismatch".to_string());
    }
    let version = u16::from_le_bytes([vector_raw[4], vector_raw[5]]);
    if version != FORMAT_VERSION {
        return LoadOutcome::Corrupted(format!("vector file version {version} unsupported"));
    }
    let body = &vector_raw[6..vector_raw.len() - 4];
    let stored_crc = u32::from_be_bytes(
        vector_raw[vector_raw.len() - 4..]
            .try_into()
            .expect("4-byte slice"),
    );
    if crc32fast::hash(body) != stored_crc {
        return LoadOutcome::Corrupted("vector file CRC mismatch".to_string());
    }
    let payload: VectorPayload = match bincode::deserialize(body) {
        Ok(payload) => payload,
        Err(e) => return LoadOutcome::Corrupted(format!("vector payload undecodable: {e}")),
    };
    if payload.dimension != header.dimension as u64 {
        return LoadOutcome::Corrupted("vector/metadata dimension disagree".to_string());
    }
    if payload.vectors.len() != papers.len() {
        return LoadOutcome::Corrupted(format!(
            "metadata has {} records but vector file has {}",
            papers.len(),
            payload.vectors.len()
        ));
    }

    LoadOutcome::Loaded(IndexSnapshot {
        strategy: header.strategy,
        dimension: header.dimension as usize,
        next_paper_id: header.next_paper_id,
        papers,
        vectors: payload.vectors,
        ann: payload.ann,
    })
}

/// Copy both files into `backup_<UTCstamp>/` under the data directory.
/// Returns the backup directory path.
pub fn backup(dir: &Path) -> io::Result<PathBuf> {
    let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let backup_dir = dir.join(format!("backup_{stamp}"));
    fs::create_dir_all(&backup_dir)?;
    for name in [VECTOR_FILE, META_FILE] {
        let source = dir.join(name);
        if source.exists() {
            fs::copy(&source, backup_dir.join(name))?;
        }
    }
    tracing::info!(dir = %backup_dir.display(), "index backup written");
    Ok(backup_dir)
}

fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp_path = path.with_extension("bin.tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)
}

struct MetaHeader {
    strategy: Strategy,
    dimension: u16,
    count: u64,
    next_paper_id: u64,
}

fn read_meta_header(raw: &[u8]) -> Result<(MetaHeader, usize), String> {
    if raw.len() < 25 {
        return Err("metadata file truncated".to_string());
    }
    if &raw[..4] != META_MAGIC {
        return Err("metadata magic mismatch".to_string());
    }
    let version = u16::from_le_bytes([raw[4], raw[5]]);
    if version != FORMAT_VERSION {
        return Err(format!("metadata version {version} unsupported"));
    }
    let strategy = Strategy::from_tag(raw[6])
        .ok_or_else(|| format!("unknown strategy tag {}", raw[6]))?;
    let dimension = u16::from_le_bytes([raw[7], raw[8]]);
    let count = u64::from_le_bytes(raw[9..17].try_into().expect("8-byte slice"));
    let next_paper_id = u64::from_le_bytes(raw[17..25].try_into().expect("8-byte slice"));
    Ok((
        MetaHeader {
            strategy,
            dimension,
            count,
            next_paper_id,
        },
        25,
    ))
}

fn read_record(raw: &[u8], cursor: &mut usize) -> Result<Paper, String> {
    let paper_id = read_u64(raw, cursor)?;
    if raw.len() < *cursor + 32 {
        return Err("record truncated in content hash".to_string());
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&raw[*cursor..*cursor + 32]);
    *cursor += 32;

    let title = read_string(raw, cursor)?;
    let abstract_text = read_string(raw, cursor)?;
    let authors_joined = read_string(raw, cursor)?;
    let source = read_string(raw, cursor)?;
    let document_type = read_string(raw, cursor)?;
    let publication_date = read_string(raw, cursor)?;
    let doi = read_string(raw, cursor)?;
    let url = read_string(raw, cursor)?;

    let authors = if authors_joined.is_empty() {
        Vec::new()
    } else {
        authors_joined
            .split(';')
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect()
    };

    Ok(Paper {
        paper_id,
        content_hash: ContentHash(hash),
        title,
        abstract_text,
        authors,
        source,
        document_type,
        publication_date: (!publication_date.is_empty()).then_some(publication_date),
        doi: (!doi.is_empty()).then_some(doi),
        url: (!url.is_empty()).then_some(url),
    })
}

fn read_u64(raw: &[u8], cursor: &mut usize) -> Result<u64, String> {
    if raw.len() < *cursor + 8 {
        return Err("record truncated in u64 field".to_string());
    }
    let value = u64::from_le_bytes(raw[*cursor..*cursor + 8].try_into().expect("8-byte slice"));
    *cursor += 8;
    Ok(value)
}

fn write_string(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
}

fn read_string(raw: &[u8], cursor: &mut usize) -> Result<String, String> {
    if raw.len() < *cursor + 4 {
        return Err("record truncated in string length".to_string());
    }
    let len = u32::from_le_bytes(raw[*cursor..*cursor + 4].try_into().expect("4-byte slice"));
    *cursor += 4;
    if len > MAX_STRING_BYTES {
        return Err(format!("string length {len} exceeds limit"));
    }
    let end = *cursor + len as usize;
    if raw.len() < end {
        return Err("record truncated in string body".to_string());
    }
    let value = std::str::from_utf8(&raw[*cursor..end])
        .map_err(|_| "string is not valid UTF-8".to_string())?
        .to_string();
    *cursor = end;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::flat::FlatIndex;

    fn unit(mut v: Vec<f32>) -> Vec<f32> {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        for x in v.iter_mut() {
            *x /= norm;
        }
        v
    }

    fn sample_paper(id: u64) -> Paper {
        Paper {
            paper_id: id,
            content_hash: ContentHash::digest(&format!("paper-{id}")),
            title: format!("Title {id}"),
            abstract_text: format!("Abstract body for paper {id}."),
            authors: vec!["Ada Lovelace".to_string(), "Alan Turing".to_string()],
            source: "arxiv".to_string(),
            document_type: "preprint".to_string(),
            publication_date: Some("2023".to_string()),
            doi: (id % 2 == 0).then(|| format!("10.1234/{id}")),
            url: None,
        }
    }

    fn sample_snapshot(count: u64) -> IndexSnapshot {
        let mut flat = FlatIndex::new(4);
        let mut papers = Vec::new();
        let mut vectors = Vec::new();
        for id in 0..count {
            let v = unit(vec![1.0, id as f32, 0.5, 0.1]);
            flat.insert(id, &v);
            papers.push(sample_paper(id));
            vectors.push((id, v));
        }
        IndexSnapshot {
            strategy: Strategy::Flat,
            dimension: 4,
            next_paper_id: count,
            papers,
            vectors,
            ann: AnnStructure::Flat(flat),
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = sample_snapshot(5);
        save_snapshot(dir.path(), &snapshot).unwrap();

        match load_snapshot(dir.path(), 4) {
            LoadOutcome::Loaded(loaded) => {
                assert_eq!(loaded.papers.len(), 5);
                assert_eq!(loaded.next_paper_id, 5);
                assert_eq!(loaded.strategy, Strategy::Flat);
                assert_eq!(loaded.papers[3].title, "Title 3");
                assert_eq!(loaded.papers[3].authors.len(), 2);
                assert_eq!(loaded.papers[3].doi, None);
                assert_eq!(loaded.papers[2].doi.as_deref(), Some("10.1234/2"));
                assert_eq!(loaded.vectors.len(), 5);
            }
            other => panic!("expected Loaded, got {other:?}"),
        }
    }

    #[test]
    fn test_second_save_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = sample_snapshot(7);
        save_snapshot(dir.path(), &snapshot).unwrap();
        let meta_a = fs::read(dir.path().join(META_FILE)).unwrap();
        let vector_a = fs::read(dir.path().join(VECTOR_FILE)).unwrap();

        let reloaded = match load_snapshot(dir.path(), 4) {
            LoadOutcome::Loaded(snapshot) => snapshot,
            other => panic!("expected Loaded, got {other:?}"),
        };
        save_snapshot(dir.path(), &reloaded).unwrap();
        assert_eq!(meta_a, fs::read(dir.path().join(META_FILE)).unwrap());
        assert_eq!(vector_a, fs::read(dir.path().join(VECTOR_FILE)).unwrap());
    }

    #[test]
    fn test_missing_files_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_snapshot(dir.path(), 4), LoadOutcome::Empty));
    }

    #[test]
    fn test_one_missing_file_is_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        save_snapshot(dir.path(), &sample_snapshot(2)).unwrap();
        fs::remove_file(dir.path().join(VECTOR_FILE)).unwrap();
        assert!(matches!(
            load_snapshot(dir.path(), 4),
            LoadOutcome::Corrupted(_)
        ));
    }

    #[test]
    fn test_bad_magic_is_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        save_snapshot(dir.path(), &sample_snapshot(2)).unwrap();
        let mut meta = fs::read(dir.path().join(META_FILE)).unwrap();
        meta[0] = b'X';
        fs::write(dir.path().join(META_FILE), &meta).unwrap();
        assert!(matches!(
            load_snapshot(dir.path(), 4),
            LoadOutcome::Corrupted(_)
        ));
    }

    #[test]
    fn test_vector_bit_flip_is_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        save_snapshot(dir.path(), &sample_snapshot(3)).unwrap();
        let mut raw = fs::read(dir.path().join(VECTOR_FILE)).unwrap();
        let mid = raw.len() / 2;
        raw[mid] ^= 0xFF;
        fs::write(dir.path().join(VECTOR_FILE), &raw).unwrap();
        assert!(matches!(
            load_snapshot(dir.path(), 4),
            LoadOutcome::Corrupted(_)
        ));
    }

    #[test]
    fn test_dimension_mismatch_refused() {
        let dir = tempfile::tempdir().unwrap();
        save_snapshot(dir.path(), &sample_snapshot(2)).unwrap();
        match load_snapshot(dir.path(), 8) {
            LoadOutcome::Corrupted(reason) => assert!(reason.contains("dimension")),
            other => panic!("expected Corrupted, got {other:?}"),
        }
    }

    #[test]
    fn test_backup_copies_both_files() {
        let dir = tempfile::tempdir().unwrap();
        save_snapshot(dir.path(), &sample_snapshot(2)).unwrap();
        let backup_dir = backup(dir.path()).unwrap();
        assert!(backup_dir.join(VECTOR_FILE).exists());
        assert!(backup_dir.join(META_FILE).exists());
        assert_eq!(
            fs::read(backup_dir.join(META_FILE)).unwrap(),
            fs::read(dir.path().join(META_FILE)).unwrap()
        );
    }
}
