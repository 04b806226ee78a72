//! Exact flat index: contiguous vector arena with an ID map.
//!
//! All vectors are L2-normalized, so the dot product is the cosine score.
//! Search scans the whole arena; this is the strategy for small indexes
//! where exactness beats graph overhead.

use serde::{Deserialize, Serialize};

/// Flat arena of vectors with parallel paper IDs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    dimension: usize,
    ids: Vec<u64>,
    /// Contiguous arena: `ids.len() * dimension` floats.
    vectors: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ids: Vec::new(),
            vectors: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn insert(&mut self, paper_id: u64, vector: &[f32]) {
        debug_assert_eq!(vector.len(), self.dimension);
        self.ids.push(paper_id);
        self.vectors.extend_from_slice(vector);
    }

    /// Remove by paper id. Swap-removes the arena slot; order is not
    /// preserved, which search does not rely on. Returns `true` when found.
    pub fn remove(&mut self, paper_id: u64) -> bool {
        let Some(pos) = self.ids.iter().position(|&id| id == paper_id) else {
            return false;
        };
        let last = self.ids.len() - 1;
        self.ids.swap_remove(pos);
        if pos != last {
            let (head, tail) = self.vectors.split_at_mut(last * self.dimension);
            head[pos * self.dimension..(pos + 1) * self.dimension]
                .copy_from_slice(&tail[..self.dimension]);
        }
        self.vectors.truncate(last * self.dimension);
        true
    }

    /// Exact top-`k` by dot product. Results are sorted by descending score,
    /// ties broken by lower paper id.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(f32, u64)> {
        let mut scored: Vec<(f32, u64)> = self
            .ids
            .iter()
            .enumerate()
            .map(|(slot, &id)| {
                let start = slot * self.dimension;
                let vector = &self.vectors[start..start + self.dimension];
                (dot(query, vector), id)
            })
            .collect();
        scored.sort_unstable_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.truncate(k);
        scored
    }
}

#[inline]
pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
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

    #[test]
    fn test_search_orders_by_score() {
        let mut index = FlatIndex::new(3);
        index.insert(1, &unit(vec![1.0, 0.0, 0.0]));
        index.insert(2, &unit(vec![0.0, 1.0, 0.0]));
        index.insert(3, &unit(vec![0.9, 0.1, 0.0]));

        let results = index.search(&unit(vec![1.0, 0.0, 0.0]), 3);
        assert_eq!(results[0].1, 1);
        assert_eq!(results[1].1, 3);
        assert_eq!(results[2].1, 2);
        assert!(results[0].0 >= results[1].0 && results[1].0 >= results[2].0);
    }

    #[test]
    fn test_tie_broken_by_lower_id() {
        let mut index = FlatIndex::new(2);
        let v = unit(vec![1.0, 1.0]);
        index.insert(7, &v);
        index.insert(3, &v);
        let results = index.search(&v, 2);
        assert_eq!(results[0].1, 3);
        assert_eq!(results[1].1, 7);
    }

    #[test]
    fn test_k_truncation() {
        let mut index = FlatIndex::new(2);
        for id in 0..10 {
            index.insert(id, &unit(vec![1.0, id as f32 * 0.1]));
        }
        assert_eq!(index.search(&unit(vec![1.0, 0.0]), 4).len(), 4);
    }

    #[test]
    fn test_remove_middle() {
        let mut index = FlatIndex::new(2);
        index.insert(1, &unit(vec![1.0, 0.0]));
        index.insert(2, &unit(vec![0.0, 1.0]));
        index.insert(3, &unit(vec![1.0, 1.0]));
        assert!(index.remove(2));
        assert!(!index.remove(2));
        assert_eq!(index.len(), 2);

        let results = index.search(&unit(vec![0.0, 1.0]), 3);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|&(_, id)| id != 2));
    }

    #[test]
    fn test_remove_last() {
        let mut index = FlatIndex::new(2);
        index.insert(1, &unit(vec![1.0, 0.0]));
        index.insert(2, &unit(vec![0.0, 1.0]));
        assert!(index.remove(2));
        assert_eq!(index.len(), 1);
        assert_eq!(index.search(&unit(vec![1.0, 0.0]), 2).len(), 1);
    }

    #[test]
    fn test_empty_search() {
        let index = FlatIndex::new(4);
        assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 5).is_empty());
    }
}
