//! HNSW graph for the mid-size strategy band.
//!
//! Hierarchical navigable small world graph over the L2-normalized vector
//! arena, struct-of-arrays layout. Scoring is the dot product; internally
//! the graph minimizes cosine distance `1 - dot`. Node levels derive from a
//! hash of the paper id rather than a PRNG, so rebuilding the graph from
//! the same vectors in the same order reproduces it byte for byte.

use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::index::flat::dot;

/// Generation-based visited set: O(1) amortized clear, no per-search
/// allocation beyond the first.
#[derive(Debug)]
struct VisitedSet {
    data: Vec<u16>,
    generation: u16,
}

impl VisitedSet {
    fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u16; capacity],
            generation: 1,
        }
    }

    fn clear(&mut self) {
        if self.generation == u16::MAX {
            self.data.fill(0);
            self.generation = 1;
        } else {
            self.generation += 1;
        }
    }

    /// Returns `true` when `id` was not previously visited.
    #[inline]
    fn insert(&mut self, id: u32) -> bool {
        let idx = id as usize;
        if self.data[idx] == self.generation {
            false
        } else {
            self.data[idx] = self.generation;
            true
        }
    }
}

/// Min-heap candidate keyed on negated distance.
#[derive(Debug, PartialEq)]
struct Candidate {
    neg_distance: f32,
    id: u32,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.neg_distance.total_cmp(&other.neg_distance)
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Max-heap result entry keyed on distance, for pruning the worst.
#[derive(Debug, PartialEq)]
struct ResultEntry {
    distance: f32,
    id: u32,
}

impl Eq for ResultEntry {}

impl Ord for ResultEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance.total_cmp(&other.distance)
    }
}

impl PartialOrd for ResultEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// HNSW index in struct-of-arrays layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswGraph {
    dimension: usize,
    m: usize,
    m_max0: usize,
    ef_construction: usize,
    ef_search: usize,
    max_layers: usize,
    /// Contiguous arena: `node_count * dimension` floats.
    vectors: Vec<f32>,
    /// Node slot -> paper id.
    ids: Vec<u64>,
    /// `neighbors[node][layer]` -> neighbor node slots.
    neighbors: Vec<Vec<Vec<u32>>>,
    layers: Vec<u8>,
    entry_point: Option<u32>,
    max_layer: usize,
}

impl HnswGraph {
    pub fn new(dimension: usize) -> Self {
        Self::with_params(
            dimension,
            crate::config::HNSW_M,
            crate::config::HNSW_EF_CONSTRUCTION,
            crate::config::HNSW_EF_SEARCH,
            crate::config::HNSW_MAX_LAYERS,
        )
    }

    pub fn with_params(
        dimension: usize,
        m: usize,
        ef_construction: usize,
        ef_search: usize,
        max_layers: usize,
    ) -> Self {
        Self {
            dimension,
            m,
            m_max0: m * 2,
            ef_construction,
            ef_search,
            max_layers,
            vectors: Vec::new(),
            ids: Vec::new(),
            neighbors: Vec::new(),
            layers: Vec::new(),
            entry_point: None,
            max_layer: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[inline]
    fn vector_of(&self, node: u32) -> &[f32] {
        let start = node as usize * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    /// Cosine distance to a node; vectors are unit length so `1 - dot`.
    #[inline]
    fn distance(&self, query: &[f32], node: u32) -> f32 {
        1.0 - dot(query, self.vector_of(node))
    }

    /// Level assignment from a hash of the paper id: exponential
    /// distribution with multiplier `1/ln(M)`, as in the HNSW paper, but
    /// reproducible across rebuilds.
    fn level_for(&self, paper_id: u64) -> usize {
        let hash = splitmix64(paper_id ^ 0x9e37_79b9_7f4a_7c15);
        // Uniform in (0, 1].
        let unit = ((hash >> 11) + 1) as f64 / (1u64 << 53) as f64;
        let ml = 1.0 / (self.m as f64).ln();
        let level = (-unit.ln() * ml).floor() as usize;
        level.min(self.max_layers - 1)
    }

    /// Insert a vector. The caller guarantees `vector.len() == dimension`
    /// and that `paper_id` is not already present.
    pub fn insert(&mut self, paper_id: u64, vector: &[f32]) {
        debug_assert_eq!(vector.len(), self.dimension);
        let node = self.ids.len() as u32;
        let level = self.level_for(paper_id);

        self.vectors.extend_from_slice(vector);
        self.ids.push(paper_id);
        self.layers.push(level as u8);

        let Some(entry) = self.entry_point else {
            self.neighbors.push(vec![Vec::new(); level + 1]);
            self.entry_point = Some(node);
            self.max_layer = level;
            return;
        };

        let mut visited = VisitedSet::new(self.ids.len());

        // Phase 1: greedy descent from the top layer to level+1.
        let mut current = entry;
        for layer in (level + 1..=self.max_layer).rev() {
            let found = self.search_layer(vector, &[current], 1, layer, &mut visited);
            if let Some(&(_, nearest)) = found.first() {
                current = nearest;
            }
        }

        // Phase 2: collect neighbors for each of the node's layers.
        let top = level.min(self.max_layer);
        let mut node_neighbors: Vec<Vec<u32>> = vec![Vec::new(); level + 1];
        let mut entry_points = vec![current];
        for layer in (0..=top).rev() {
            let candidates =
                self.search_layer(vector, &entry_points, self.ef_construction, layer, &mut visited);
            let m_max = if layer == 0 { self.m_max0 } else { self.m };
            let selected = self.select_neighbors(&candidates, m_max);
            node_neighbors[layer] = selected.iter().map(|&(_, id)| id).collect();
            entry_points.clear();
            entry_points.extend(candidates.iter().map(|&(_, id)| id));
            if entry_points.is_empty() {
                entry_points.push(entry);
            }
        }
        self.neighbors.push(node_neighbors);

        // Phase 3: backlinks with pruning where a neighbor overflows.
        for layer in 0..=top {
            let m_max = if layer == 0 { self.m_max0 } else { self.m };
            let links: Vec<u32> = self.neighbors[node as usize][layer].clone();
            for neighbor in links {
                let slot = neighbor as usize;
                while self.neighbors[slot].len() <= layer {
                    self.neighbors[slot].push(Vec::new());
                }
                self.neighbors[slot][layer].push(node);
                if self.neighbors[slot][layer].len() > m_max {
                    let base = self.vector_of(neighbor).to_vec();
                    let over: Vec<(f32, u32)> = self.neighbors[slot][layer]
                        .iter()
                        .map(|&cand| (self.distance(&base, cand), cand))
                        .collect();
                    let pruned = self.select_neighbors(&over, m_max);
                    self.neighbors[slot][layer] = pruned.iter().map(|&(_, id)| id).collect();
                }
            }
        }

        if level > self.max_layer {
            self.max_layer = level;
            self.entry_point = Some(node);
        }
    }

    /// Top-`k` nearest by dot product: `(score, paper_id)` sorted by
    /// descending score, ties broken by lower paper id.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(f32, u64)> {
        let Some(entry) = self.entry_point else {
            return Vec::new();
        };
        let mut visited = VisitedSet::new(self.ids.len());

        let mut current = entry;
        for layer in (1..=self.max_layer).rev() {
            let found = self.search_layer(query, &[current], 1, layer, &mut visited);
            if let Some(&(_, nearest)) = found.first() {
                current = nearest;
            }
        }

        let ef = self.ef_search.max(k);
        let found = self.search_layer(query, &[current], ef, 0, &mut visited);

        let mut results: Vec<(f32, u64)> = found
            .into_iter()
            .map(|(distance, node)| (1.0 - distance, self.ids[node as usize]))
            .collect();
        results.sort_unstable_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        results.truncate(k);
        results
    }

    /// Greedy beam search within one layer. Returns up to `ef` nodes as
    /// `(distance, node)` sorted by ascending distance.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[u32],
        ef: usize,
        layer: usize,
        visited: &mut VisitedSet,
    ) -> Vec<(f32, u32)> {
        visited.clear();
        let mut candidates: BinaryHeap<Candidate> = BinaryHeap::with_capacity(ef * 2);
        let mut results: BinaryHeap<ResultEntry> = BinaryHeap::with_capacity(ef + 1);
        let mut worst = f32::MAX;

        for &ep in entry_points {
            if visited.insert(ep) {
                let distance = self.distance(query, ep);
                candidates.push(Candidate {
                    neg_distance: -distance,
                    id: ep,
                });
                results.push(ResultEntry { distance, id: ep });
                if results.len() >= ef {
                    worst = results.peek().map_or(f32::MAX, |r| r.distance);
                }
            }
        }

        while let Some(candidate) = candidates.pop() {
            let c_distance = -candidate.neg_distance;
            if results.len() >= ef && c_distance > worst {
                break;
            }
            let slot = candidate.id as usize;
            if layer >= self.neighbors[slot].len() {
                continue;
            }
            for i in 0..self.neighbors[slot][layer].len() {
                let neighbor = self.neighbors[slot][layer][i];
                if !visited.insert(neighbor) {
                    continue;
                }
                let distance = self.distance(query, neighbor);
                if results.len() < ef || distance < worst {
                    candidates.push(Candidate {
                        neg_distance: -distance,
                        id: neighbor,
                    });
                    results.push(ResultEntry {
                        distance,
                        id: neighbor,
                    });
                    if results.len() > ef {
                        results.pop();
                    }
                    worst = results.peek().map_or(f32::MAX, |r| r.distance);
                }
            }
        }

        results
            .into_sorted_vec()
            .into_iter()
            .map(|r| (r.distance, r.id))
            .collect()
    }

    /// Heuristic neighbor selection (HNSW paper, Algorithm 4): keep a
    /// candidate only when it is closer to the base than to any already
    /// selected neighbor, then backfill with nearest leftovers.
    fn select_neighbors(&self, candidates: &[(f32, u32)], m: usize) -> Vec<(f32, u32)> {
        let mut sorted = candidates.to_vec();
        sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let mut selected: Vec<(f32, u32)> = Vec::with_capacity(m);
        for &(distance, cand) in &sorted {
            if selected.len() >= m {
                break;
            }
            let cand_vector = self.vector_of(cand);
            let diverse = selected.iter().all(|&(_, kept)| {
                distance <= 1.0 - dot(cand_vector, self.vector_of(kept))
            });
            if diverse {
                selected.push((distance, cand));
            }
        }

        if selected.len() < m {
            let kept: std::collections::HashSet<u32> =
                selected.iter().map(|&(_, id)| id).collect();
            for &(distance, cand) in &sorted {
                if selected.len() >= m {
                    break;
                }
                if !kept.contains(&cand) {
                    selected.push((distance, cand));
                }
            }
        }

        selected
    }
}

fn splitmix64(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(mut v: Vec<f32>) -> Vec<f32> {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        for x in v.iter_mut() {
            *x /= norm;
        }
        v
    }

    /// Deterministic spread of unit vectors across 8 dimensions.
    fn sample_vector(n: u64) -> Vec<f32> {
        let mut v = vec![0.0f32; 8];
        let mut h = splitmix64(n);
        for x in v.iter_mut() {
            h = splitmix64(h);
            *x = ((h >> 40) as f32 / (1u64 << 24) as f32) - 0.5;
        }
        unit(v)
    }

    #[test]
    fn test_single_node() {
        let mut graph = HnswGraph::with_params(8, 4, 16, 8, 4);
        let v = sample_vector(1);
        graph.insert(1, &v);
        let results = graph.search(&v, 3);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1, 1);
        assert!((results[0].0 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_finds_exact_match_among_many() {
        let mut graph = HnswGraph::with_params(8, 8, 32, 32, 8);
        for n in 0..200 {
            graph.insert(n, &sample_vector(n));
        }
        // Query with a stored vector: it must come back first.
        for probe in [0u64, 17, 99, 180] {
            let results = graph.search(&sample_vector(probe), 5);
            assert_eq!(results[0].1, probe, "probe {probe}");
        }
    }

    #[test]
    fn test_scores_non_increasing() {
        let mut graph = HnswGraph::with_params(8, 8, 32, 32, 8);
        for n in 0..100 {
            graph.insert(n, &sample_vector(n));
        }
        let results = graph.search(&sample_vector(3), 10);
        for pair in results.windows(2) {
            assert!(pair[0].0 >= pair[1].0);
        }
    }

    #[test]
    fn test_k_bound() {
        let mut graph = HnswGraph::with_params(8, 4, 16, 16, 4);
        for n in 0..50 {
            graph.insert(n, &sample_vector(n));
        }
        assert!(graph.search(&sample_vector(0), 7).len() <= 7);
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let build = || {
            let mut graph = HnswGraph::with_params(8, 4, 16, 8, 4);
            for n in 0..60 {
                graph.insert(n, &sample_vector(n));
            }
            graph
        };
        let a = build();
        let b = build();
        assert_eq!(
            bincode::serialize(&a).unwrap(),
            bincode::serialize(&b).unwrap()
        );
    }

    #[test]
    fn test_empty_search() {
        let graph = HnswGraph::with_params(8, 4, 16, 8, 4);
        assert!(graph.search(&sample_vector(0), 5).is_empty());
    }
}
