//! Exact inner-product index.
//!
//! Vectors are stored row-major in one flat buffer. Search scans every row;
//! with L2-normalized inputs the inner product equals cosine similarity.

use std::cmp::Ordering;

/// One result slot. `position` is `None` when the index had fewer vectors
/// than requested slots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub score: f32,
    pub position: Option<usize>,
}

impl Neighbor {
    fn empty() -> Self {
        Self {
            score: f32::NEG_INFINITY,
            position: None,
        }
    }
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v
        .iter()
        .map(|x| f64::from(*x) * f64::from(*x))
        .sum::<f64>()
        .sqrt();
    if norm <= f64::EPSILON {
        return;
    }
    for x in v.iter_mut() {
        *x = (f64::from(*x) / norm) as f32;
    }
}

pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatIpIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIpIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Wrap a row-major buffer. `None` when it is not a whole number of rows.
    pub fn from_raw(dimension: usize, data: Vec<f32>) -> Option<Self> {
        if dimension == 0 || data.len() % dimension != 0 {
            return None;
        }
        Some(Self { dimension, data })
    }

    /// Append one vector. Returns false (and stores nothing) on a dimension mismatch.
    pub fn add(&mut self, vector: &[f32]) -> bool {
        if vector.len() != self.dimension {
            return false;
        }
        self.data.extend_from_slice(vector);
        true
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Exactly `k` slots: the best matches by descending inner product
    /// (ties by ascending position), then empty slots.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        let mut scored: Vec<Neighbor> = if query.len() == self.dimension {
            self.data
                .chunks_exact(self.dimension)
                .enumerate()
                .map(|(i, row)| Neighbor {
                    score: inner_product(query, row),
                    position: Some(i),
                })
                .collect()
        } else {
            Vec::new()
        };

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.position.cmp(&b.position))
        });
        scored.truncate(k);
        scored.resize(k, Neighbor::empty());
        scored
    }
}
