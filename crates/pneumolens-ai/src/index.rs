//! Exact (brute-force) nearest-neighbour index under squared Euclidean distance.

use crate::error::PipelineError;

/// One search hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Insertion position of the stored vector.
    pub index: usize,
    /// Squared Euclidean distance to the query.
    pub distance: f32,
}

/// Vectors stored contiguously, searched by full scan.
#[derive(Debug, Clone)]
pub struct FlatL2Index {
    dim: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
        }
    }

    /// Build an index from vectors, all of which must have length `dim`.
    pub fn build(dim: usize, vectors: &[Vec<f32>]) -> Result<Self, PipelineError> {
        let mut index = Self::new(dim);
        for v in vectors {
            index.add(v)?;
        }
        Ok(index)
    }

    /// Append a vector, returning its index.
    pub fn add(&mut self, vector: &[f32]) -> Result<usize, PipelineError> {
        self.check_dim(vector)?;
        let id = self.len();
        self.data.extend_from_slice(vector);
        Ok(id)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `min(k, len)` nearest vectors, closest first.
    ///
    /// Ordering among equal distances is not part of the contract.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, PipelineError> {
        self.check_dim(query)?;
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(index, v)| Neighbor {
                index,
                distance: squared_l2(query, v),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }

    fn check_dim(&self, v: &[f32]) -> Result<(), PipelineError> {
        if v.len() != self.dim {
            return Err(PipelineError::ShapeMismatch(format!(
                "vector has {} dimensions, index expects {}",
                v.len(),
                self.dim
            )));
        }
        Ok(())
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
