//! Inverted-file strategies for the large bands.
//!
//! A k-means coarse quantizer partitions vectors into `nlist` cells; search
//! probes the `nprobe` nearest cells. The flat variant keeps exact f32
//! vectors per cell; the PQ variant keeps product-quantized codes (48 bytes
//! per vector at the default dimension) and scores through a per-query
//! lookup table. K-means seeding is a fixed-seed xorshift, so training the
//! same vectors yields the same structure on every run.

use serde::{Deserialize, Serialize};

use crate::config;
use crate::index::flat::dot;

const KMEANS_SEED: u64 = 0x5ca1_ab1e_c0ff_ee11;

/// Product quantization codebook: `subspaces` x 256 centroids x `sub_dim`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PqCodebook {
    pub subspaces: usize,
    pub sub_dim: usize,
    /// Flat centroid array: `centroids[sub * 256 * sub_dim + c * sub_dim ..]`.
    pub centroids: Vec<f32>,
}

impl PqCodebook {
    /// Train one k-means per subspace over a contiguous vector arena.
    pub fn train(vectors: &[f32], dimension: usize, subspaces: usize) -> Self {
        let sub_dim = dimension / subspaces;
        debug_assert_eq!(sub_dim * subspaces, dimension, "dimension must divide evenly");
        let n = vectors.len() / dimension;
        let mut centroids = vec![0.0f32; subspaces * 256 * sub_dim];

        for sub in 0..subspaces {
            let mut sub_vectors = vec![0.0f32; n * sub_dim];
            for i in 0..n {
                let src = i * dimension + sub * sub_dim;
                sub_vectors[i * sub_dim..(i + 1) * sub_dim]
                    .copy_from_slice(&vectors[src..src + sub_dim]);
            }
            let k = 256.min(n.max(1));
            let trained = kmeans(&sub_vectors, sub_dim, k, KMEANS_SEED ^ sub as u64);
            let out = sub * 256 * sub_dim;
            centroids[out..out + trained.len()].copy_from_slice(&trained);
        }

        Self {
            subspaces,
            sub_dim,
            centroids,
        }
    }

    /// Encode a vector as one centroid id per subspace.
    pub fn encode(&self, vector: &[f32]) -> Vec<u8> {
        (0..self.subspaces)
            .map(|sub| {
                let piece = &vector[sub * self.sub_dim..(sub + 1) * self.sub_dim];
                self.nearest_centroid(sub, piece)
            })
            .collect()
    }

    /// Per-query dot-product table: `table[sub * 256 + c]` is the partial
    /// dot of the query subvector against centroid `c`.
    pub fn dot_table(&self, query: &[f32]) -> Vec<f32> {
        let mut table = vec![0.0f32; self.subspaces * 256];
        for sub in 0..self.subspaces {
            let piece = &query[sub * self.sub_dim..(sub + 1) * self.sub_dim];
            for c in 0..256 {
                let start = sub * 256 * self.sub_dim + c * self.sub_dim;
                table[sub * 256 + c] = dot(piece, &self.centroids[start..start + self.sub_dim]);
            }
        }
        table
    }

    fn nearest_centroid(&self, sub: usize, piece: &[f32]) -> u8 {
        let mut best = 0u8;
        let mut best_dist = f32::MAX;
        for c in 0..256 {
            let start = sub * 256 * self.sub_dim + c * self.sub_dim;
            let centroid = &self.centroids[start..start + self.sub_dim];
            let mut dist = 0.0f32;
            for d in 0..self.sub_dim {
                let diff = piece[d] - centroid[d];
                dist += diff * diff;
            }
            if dist < best_dist {
                best_dist = dist;
                best = c as u8;
            }
        }
        best
    }
}

/// Vector payload per cell: exact f32 or PQ codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum CellStorage {
    /// Contiguous arena of f32 vectors, parallel to the id list.
    Flat(Vec<f32>),
    /// PQ codes, `subspaces` bytes per vector, parallel to the id list.
    Codes(Vec<u8>),
}

/// Inverted-file index. `pq` is `Some` for the IVF+PQ strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IvfIndex {
    dimension: usize,
    nprobe: usize,
    /// Coarse centroids: `nlist * dimension` floats.
    centroids: Vec<f32>,
    /// Per-cell paper ids.
    cell_ids: Vec<Vec<u64>>,
    /// Per-cell vector payloads.
    cells: Vec<CellStorage>,
    pq: Option<PqCodebook>,
    len: usize,
}

impl IvfIndex {
    /// Build from the authoritative vector map, training the coarse
    /// quantizer (and the PQ codebook when `use_pq`) on the given vectors.
    /// `entries` must be sorted by paper id for reproducible builds.
    pub fn build(dimension: usize, entries: &[(u64, &[f32])], use_pq: bool) -> Self {
        let n = entries.len();
        let (max_nlist, nprobe) = if use_pq {
            (config::IVF_PQ_MAX_NLIST, config::IVF_PQ_NPROBE)
        } else {
            (config::IVF_FLAT_MAX_NLIST, config::IVF_FLAT_NPROBE)
        };
        let nlist = ((n as f64).sqrt() as usize).clamp(1, max_nlist);

        let mut arena = Vec::with_capacity(n * dimension);
        for (_, vector) in entries {
            arena.extend_from_slice(vector);
        }

        let centroids = kmeans(&arena, dimension, nlist, KMEANS_SEED);
        let pq = use_pq.then(|| {
            let subspaces = if dimension % config::PQ_SUBSPACES == 0 {
                config::PQ_SUBSPACES
            } else {
                // Fall back to the largest divisor not exceeding the default.
                (1..=config::PQ_SUBSPACES.min(dimension))
                    .rev()
                    .find(|s| dimension % s == 0)
                    .unwrap_or(1)
            };
            PqCodebook::train(&arena, dimension, subspaces)
        });

        let cells: Vec<CellStorage> = (0..nlist)
            .map(|_| {
                if use_pq {
                    CellStorage::Codes(Vec::new())
                } else {
                    CellStorage::Flat(Vec::new())
                }
            })
            .collect();

        let mut index = Self {
            dimension,
            nprobe,
            centroids,
            cell_ids: vec![Vec::new(); nlist],
            cells,
            pq,
            len: 0,
        };
        for (paper_id, vector) in entries {
            index.insert(*paper_id, vector);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn nlist(&self) -> usize {
        self.cell_ids.len()
    }

    fn nearest_cell(&self, vector: &[f32]) -> usize {
        let mut best = 0usize;
        let mut best_dot = f32::MIN;
        for cell in 0..self.nlist() {
            let start = cell * self.dimension;
            let score = dot(vector, &self.centroids[start..start + self.dimension]);
            if score > best_dot {
                best_dot = score;
                best = cell;
            }
        }
        best
    }

    /// Append a vector to its nearest cell.
    pub fn insert(&mut self, paper_id: u64, vector: &[f32]) {
        debug_assert_eq!(vector.len(), self.dimension);
        let cell = self.nearest_cell(vector);
        self.cell_ids[cell].push(paper_id);
        match &mut self.cells[cell] {
            CellStorage::Flat(arena) => arena.extend_from_slice(vector),
            CellStorage::Codes(codes) => {
                let encoded = self
                    .pq
                    .as_ref()
                    .expect("codes storage implies a trained codebook")
                    .encode(vector);
                codes.extend_from_slice(&encoded);
            }
        }
        self.len += 1;
    }

    /// Remove by paper id. Only meaningful for the flat variant; the caller
    /// gates on strategy capability. Returns `true` when found.
    pub fn remove(&mut self, paper_id: u64) -> bool {
        for cell in 0..self.nlist() {
            if let Some(pos) = self.cell_ids[cell].iter().position(|&id| id == paper_id) {
                let last = self.cell_ids[cell].len() - 1;
                self.cell_ids[cell].swap_remove(pos);
                match &mut self.cells[cell] {
                    CellStorage::Flat(arena) => {
                        let dim = self.dimension;
                        if pos != last {
                            let (head, tail) = arena.split_at_mut(last * dim);
                            head[pos * dim..(pos + 1) * dim].copy_from_slice(&tail[..dim]);
                        }
                        arena.truncate(last * dim);
                    }
                    CellStorage::Codes(codes) => {
                        let width = self
                            .pq
                            .as_ref()
                            .expect("codes storage implies a trained codebook")
                            .subspaces;
                        if pos != last {
                            let (head, tail) = codes.split_at_mut(last * width);
                            head[pos * width..(pos + 1) * width].copy_from_slice(&tail[..width]);
                        }
                        codes.truncate(last * width);
                    }
                }
                self.len -= 1;
                return true;
            }
        }
        false
    }

    /// Top-`k` across the `nprobe` nearest cells: `(score, paper_id)` sorted
    /// by descending score, ties broken by lower paper id.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(f32, u64)> {
        if self.is_empty() {
            return Vec::new();
        }

        // Rank cells by centroid dot product.
        let mut cell_scores: Vec<(f32, usize)> = (0..self.nlist())
            .map(|cell| {
                let start = cell * self.dimension;
                (
                    dot(query, &self.centroids[start..start + self.dimension]),
                    cell,
                )
            })
            .collect();
        cell_scores.sort_unstable_by(|a, b| b.0.total_cmp(&a.0));

        let table = self.pq.as_ref().map(|codebook| codebook.dot_table(query));

        let mut scored: Vec<(f32, u64)> = Vec::new();
        for &(_, cell) in cell_scores.iter().take(self.nprobe) {
            match &self.cells[cell] {
                CellStorage::Flat(arena) => {
                    for (slot, &paper_id) in self.cell_ids[cell].iter().enumerate() {
                        let start = slot * self.dimension;
                        scored.push((
                            dot(query, &arena[start..start + self.dimension]),
                            paper_id,
                        ));
                    }
                }
                CellStorage::Codes(codes) => {
                    let codebook = self.pq.as_ref().expect("codes storage implies a codebook");
                    let table = table.as_ref().expect("table built when pq is present");
                    let width = codebook.subspaces;
                    for (slot, &paper_id) in self.cell_ids[cell].iter().enumerate() {
                        let code = &codes[slot * width..(slot + 1) * width];
                        let mut score = 0.0f32;
                        for (sub, &c) in code.iter().enumerate() {
                            score += table[sub * 256 + c as usize];
                        }
                        scored.push((score, paper_id));
                    }
                }
            }
        }

        scored.sort_unstable_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.truncate(k);
        scored
    }
}

/// K-means with deterministic xorshift seeding: k-means++ initialization,
/// then a fixed number of Lloyd iterations.
fn kmeans(data: &[f32], dimension: usize, k: usize, seed: u64) -> Vec<f32> {
    let n = data.len() / dimension;
    if n <= k {
        let mut centroids = vec![0.0f32; k * dimension];
        centroids[..n * dimension].copy_from_slice(&data[..n * dimension]);
        return centroids;
    }

    let mut rng = XorShift64::new(seed);
    let mut centroids = vec![0.0f32; k * dimension];

    let first = rng.next_usize() % n;
    centroids[..dimension].copy_from_slice(&data[first * dimension..(first + 1) * dimension]);

    let mut min_dists = vec![f32::MAX; n];
    for ci in 1..k {
        let previous = &centroids[(ci - 1) * dimension..ci * dimension];
        let mut total = 0.0f64;
        for i in 0..n {
            let point = &data[i * dimension..(i + 1) * dimension];
            let d = sq_dist(point, previous);
            if d < min_dists[i] {
                min_dists[i] = d;
            }
            total += min_dists[i] as f64;
        }

        let chosen = if total < 1e-30 {
            rng.next_usize() % n
        } else {
            let threshold = rng.next_f64() * total;
            let mut cumulative = 0.0f64;
            let mut pick = n - 1;
            for (i, &d) in min_dists.iter().enumerate() {
                cumulative += d as f64;
                if cumulative >= threshold {
                    pick = i;
                    break;
                }
            }
            pick
        };
        centroids[ci * dimension..(ci + 1) * dimension]
            .copy_from_slice(&data[chosen * dimension..(chosen + 1) * dimension]);
    }

    let mut assignments = vec![0usize; n];
    for _ in 0..config::PQ_KMEANS_ITERATIONS {
        for i in 0..n {
            let point = &data[i * dimension..(i + 1) * dimension];
            let mut best = 0usize;
            let mut best_dist = f32::MAX;
            for ci in 0..k {
                let centroid = &centroids[ci * dimension..(ci + 1) * dimension];
                let d = sq_dist(point, centroid);
                if d < best_dist {
                    best_dist = d;
                    best = ci;
                }
            }
            assignments[i] = best;
        }

        let mut counts = vec![0u32; k];
        centroids.fill(0.0);
        for i in 0..n {
            let ci = assignments[i];
            counts[ci] += 1;
            let point = &data[i * dimension..(i + 1) * dimension];
            let centroid = &mut centroids[ci * dimension..(ci + 1) * dimension];
            for d in 0..dimension {
                centroid[d] += point[d];
            }
        }
        for ci in 0..k {
            if counts[ci] > 0 {
                let inv = 1.0 / counts[ci] as f32;
                for value in &mut centroids[ci * dimension..(ci + 1) * dimension] {
                    *value *= inv;
                }
            }
        }
    }

    centroids
}

#[inline]
fn sq_dist(a: &[f32], b: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    for i in 0..a.len() {
        let d = a[i] - b[i];
        sum += d * d;
    }
    sum
}

struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self {
            state: seed.max(1),
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn next_usize(&mut self) -> usize {
        self.next_u64() as usize
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}
