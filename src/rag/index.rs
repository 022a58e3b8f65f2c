//! Nearest-neighbour index abstraction and the exhaustive L2 implementation.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// One search hit: a row of the index and its distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub row: usize,
    pub distance: f32,
}

/// Append-only vector index. Row numbers follow insertion order.
pub trait VectorIndex: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector width, or `None` until the first row is added.
    fn dimension(&self) -> Option<usize>;

    /// Appends every vector or none of them.
    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), ApiError>;

    /// Up to `k` rows, nearest first. An empty index returns no rows.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, ApiError>;

    /// Drops rows past `len`. Only used to repair a store whose blobs disagree.
    fn truncate(&mut self, len: usize);

    /// Serialised form read back by the implementation's loader.
    fn to_blob(&self) -> Result<Vec<u8>, ApiError>;
}

/// Brute-force squared-L2 index stored as one flat row-major buffer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlatL2Index {
    dimension: Option<usize>,
    data: Vec<f32>,
}

impl FlatL2Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            data: Vec::new(),
        }
    }

    /// Reads a blob produced by [`VectorIndex::to_blob`]. A missing file is an error.
    pub fn load(path: &Path) -> Result<Self, ApiError> {
        let bytes = fs::read(path).map_err(|e| {
            ApiError::Internal(format!("Failed to read index {}: {}", path.display(), e))
        })?;
        let index: FlatL2Index = serde_json::from_slice(&bytes).map_err(|e| {
            ApiError::Internal(format!("Corrupt index {}: {}", path.display(), e))
        })?;

        if let Some(dim) = index.dimension {
            if dim == 0 || index.data.len() % dim != 0 {
                return Err(ApiError::Internal(format!(
                    "Corrupt index {}: {} values do not divide into rows of {}",
                    path.display(),
                    index.data.len(),
                    dim
                )));
            }
        } else if !index.data.is_empty() {
            return Err(ApiError::Internal(format!(
                "Corrupt index {}: rows present without a dimension",
                path.display()
            )));
        }

        Ok(index)
    }

    fn rows(&self) -> impl Iterator<Item = &[f32]> {
        let dim = self.dimension.unwrap_or(1).max(1);
        self.data.chunks_exact(dim)
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

impl VectorIndex for FlatL2Index {
    fn len(&self) -> usize {
        match self.dimension {
            Some(dim) if dim > 0 => self.data.len() / dim,
            _ => 0,
        }
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), ApiError> {
        let Some(first) = vectors.first() else {
            return Ok(());
        };
        let dim = self.dimension.unwrap_or(first.len());
        if dim == 0 {
            return Err(ApiError::Internal("Vectors must not be empty".to_string()));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(ApiError::Internal(format!(
                "Vector length mismatch: {} != {}",
                bad.len(),
                dim
            )));
        }

        self.dimension = Some(dim);
        self.data.reserve(vectors.len() * dim);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, ApiError> {
        let Some(dim) = self.dimension else {
            return Ok(Vec::new());
        };
        if self.data.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != dim {
            return Err(ApiError::Internal(format!(
                "Query vector length mismatch: {} != {}",
                query.len(),
                dim
            )));
        }

        let mut scored: Vec<Neighbor> = self
            .rows()
            .enumerate()
            .map(|(row, vector)| Neighbor {
                row,
                distance: squared_l2(query, vector),
            })
            .collect();

        // Stable sort keeps insertion order among equal distances.
        scored.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    fn truncate(&mut self, len: usize) {
        if let Some(dim) = self.dimension {
            self.data.truncate(len * dim);
        }
    }

    fn to_blob(&self) -> Result<Vec<u8>, ApiError> {
        serde_json::to_vec(self).map_err(ApiError::internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_index_returns_no_rows() {
        let index = FlatL2Index::new();
        assert!(index.is_empty());
        assert_eq!(index.dimension(), None);
        assert!(index.search(&[1.0, 2.0], 10).unwrap().is_empty());
    }

    #[test]
    fn first_add_fixes_dimension() {
        let mut index = FlatL2Index::new();
        index.add(&[vec![0.0, 1.0, 2.0]]).unwrap();
        assert_eq!(index.dimension(), Some(3));

        let err = index.add(&[vec![1.0, 1.0]]).unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn add_is_all_or_nothing() {
        let mut index = FlatL2Index::with_dimension(2);
        let result = index.add(&[vec![0.0, 0.0], vec![1.0, 1.0, 1.0]]);
        assert!(result.is_err());
        assert!(index.is_empty());
    }

    #[test]
    fn search_ranks_nearest_first_and_caps_at_k() {
        let mut index = FlatL2Index::new();
        index
            .add(&[vec![10.0, 0.0], vec![1.0, 0.0], vec![0.0, 0.0], vec![5.0, 5.0]])
            .unwrap();

        let hits = index.search(&[0.0, 0.0], 3).unwrap();
        let rows: Vec<usize> = hits.iter().map(|n| n.row).collect();
        assert_eq!(rows, vec![2, 1, 3]);
        assert_eq!(hits[0].distance, 0.0);
        assert_eq!(hits[1].distance, 1.0);
    }

    #[test]
    fn k_larger_than_index_returns_every_row() {
        let mut index = FlatL2Index::new();
        index.add(&[vec![1.0], vec![2.0]]).unwrap();
        assert_eq!(index.search(&[0.0], 10).unwrap().len(), 2);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut index = FlatL2Index::new();
        index.add(&[vec![1.0], vec![-1.0], vec![1.0]]).unwrap();
        let rows: Vec<usize> = index.search(&[0.0], 3).unwrap().iter().map(|n| n.row).collect();
        assert_eq!(rows, vec![0, 1, 2]);
    }

    #[test]
    fn mismatched_query_is_an_error() {
        let mut index = FlatL2Index::new();
        index.add(&[vec![1.0, 2.0]]).unwrap();
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn blob_round_trip_preserves_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.json");

        let mut index = FlatL2Index::new();
        index.add(&[vec![0.5, 0.5], vec![1.0, 0.0]]).unwrap();
        fs::write(&path, index.to_blob().unwrap()).unwrap();

        let loaded = FlatL2Index::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.dimension(), Some(2));
        assert_eq!(loaded.search(&[1.0, 0.0], 1).unwrap()[0].row, 1);
    }

    #[test]
    fn load_rejects_ragged_blob() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.json");
        fs::write(&path, r#"{"dimension":2,"data":[1.0,2.0,3.0]}"#).unwrap();
        assert!(FlatL2Index::load(&path).is_err());
    }

    #[test]
    fn truncate_drops_trailing_rows() {
        let mut index = FlatL2Index::new();
        index.add(&[vec![1.0], vec![2.0], vec![3.0]]).unwrap();
        index.truncate(1);
        assert_eq!(index.len(), 1);
    }
}
