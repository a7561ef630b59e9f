//! Trainable node vectors and their sparse gradients

use crate::error::{PathEmbedError, Result};
use crate::graph::NodeId;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeMap;

/// One vector per node plus a trailing padding row
///
/// Row `num_nodes` is the sentinel/padding row: it exists so that padded walk
/// positions can be looked up, but the loss never produces a gradient for it.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingStore {
    num_nodes: usize,
    vectors: Array2<f32>,
}

impl EmbeddingStore {
    /// Create a store with entries drawn from `Normal(0, init_std)`
    pub fn new<R: Rng + ?Sized>(
        num_nodes: usize,
        dimensions: usize,
        init_std: f32,
        rng: &mut R,
    ) -> Result<Self> {
        if dimensions == 0 {
            return Err(PathEmbedError::config("embedding_dim", "must be > 0"));
        }
        let normal = Normal::new(0.0f32, init_std)
            .map_err(|e| PathEmbedError::config("init_std", e.to_string()))?;

        let mut vectors = Array2::zeros((num_nodes + 1, dimensions));
        for elem in vectors.iter_mut() {
            *elem = normal.sample(rng);
        }
        Ok(Self { num_nodes, vectors })
    }

    /// Wrap an existing `(num_nodes + 1) x D` matrix
    pub fn from_matrix(num_nodes: usize, vectors: Array2<f32>) -> Result<Self> {
        if vectors.nrows() != num_nodes + 1 || vectors.ncols() == 0 {
            return Err(PathEmbedError::ShapeMismatch {
                expected: format!("{} x D (D > 0)", num_nodes + 1),
                actual: format!("{} x {}", vectors.nrows(), vectors.ncols()),
            });
        }
        Ok(Self { num_nodes, vectors })
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn dimensions(&self) -> usize {
        self.vectors.ncols()
    }

    /// Number of rows, padding row included
    pub fn vocab_size(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn padding_id(&self) -> NodeId {
        self.num_nodes
    }

    fn check(&self, id: NodeId) -> Result<()> {
        if id < self.vocab_size() {
            Ok(())
        } else {
            Err(PathEmbedError::InvalidNode {
                node: id,
                num_nodes: self.num_nodes,
            })
        }
    }

    /// Vector of `id`; panics when `id` is past the padding row
    pub fn row(&self, id: NodeId) -> ArrayView1<'_, f32> {
        self.vectors.row(id)
    }

    /// Add `delta[row]` to every row listed in `delta`; other rows stay untouched
    pub fn apply_sparse_update(&mut self, delta: &SparseGradient) -> Result<()> {
        if delta.dimensions() != self.dimensions() {
            return Err(PathEmbedError::ShapeMismatch {
                expected: format!("update of dimension {}", self.dimensions()),
                actual: format!("dimension {}", delta.dimensions()),
            });
        }
        for (row, values) in delta.iter() {
            self.check(row)?;
            let mut target = self.vectors.row_mut(row);
            target += values;
        }
        Ok(())
    }

    /// Gather the vectors of `ids` into a new `len(ids) x D` matrix
    pub fn lookup(&self, ids: &[NodeId]) -> Result<Array2<f32>> {
        for &id in ids {
            self.check(id)?;
        }
        Ok(self.vectors.select(Axis(0), ids))
    }

    /// The full matrix, padding row included
    pub fn all(&self) -> &Array2<f32> {
        &self.vectors
    }

    pub fn into_matrix(self) -> Array2<f32> {
        self.vectors
    }

    pub fn dot(&self, u: NodeId, v: NodeId) -> f32 {
        self.vectors.row(u).dot(&self.vectors.row(v))
    }
}

/// Gradient rows accumulated for the nodes touched by one batch
#[derive(Debug, Clone, PartialEq)]
pub struct SparseGradient {
    dimensions: usize,
    rows: BTreeMap<NodeId, Array1<f32>>,
}

impl SparseGradient {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            rows: BTreeMap::new(),
        }
    }

    /// `grad[row] += scale * vector`
    pub fn accumulate(&mut self, row: NodeId, scale: f32, vector: ArrayView1<'_, f32>) {
        let dimensions = self.dimensions;
        let entry = self
            .rows
            .entry(row)
            .or_insert_with(|| Array1::zeros(dimensions));
        entry.scaled_add(scale, &vector);
    }

    pub fn get(&self, row: NodeId) -> Option<&Array1<f32>> {
        self.rows.get(&row)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Array1<f32>)> {
        self.rows.iter().map(|(&row, grad)| (row, grad))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_store_has_padding_row() {
        let mut rng = StdRng::seed_from_u64(1);
        let store = EmbeddingStore::new(5, 3, 1.0, &mut rng).unwrap();
        assert_eq!(store.num_nodes(), 5);
        assert_eq!(store.vocab_size(), 6);
        assert_eq!(store.dimensions(), 3);
        assert_eq!(store.padding_id(), 5);
        assert_eq!(store.all().dim(), (6, 3));
    }

    #[test]
    fn test_initialisation_is_seeded() {
        let a = EmbeddingStore::new(4, 4, 0.5, &mut StdRng::seed_from_u64(3)).unwrap();
        let b = EmbeddingStore::new(4, 4, 0.5, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_lookup_and_dot() {
        let matrix = array![[1.0, 0.0], [0.0, 2.0], [1.0, 1.0], [0.0, 0.0]];
        let store = EmbeddingStore::from_matrix(3, matrix).unwrap();
        let rows = store.lookup(&[2, 0, 2]).unwrap();
        assert_eq!(rows, array![[1.0, 1.0], [1.0, 0.0], [1.0, 1.0]]);
        assert_eq!(store.dot(1, 2), 2.0);
        assert!(store.lookup(&[4]).is_err());
        assert!(store.lookup(&[3]).is_ok());
    }

    #[test]
    fn test_from_matrix_checks_shape() {
        assert!(EmbeddingStore::from_matrix(3, Array2::zeros((3, 2))).is_err());
        assert!(EmbeddingStore::from_matrix(3, Array2::zeros((4, 0))).is_err());
    }

    #[test]
    fn test_sparse_update_touches_only_listed_rows() {
        let mut store = EmbeddingStore::from_matrix(2, Array2::ones((3, 2))).unwrap();
        let mut delta = SparseGradient::new(2);
        delta.accumulate(1, 1.0, array![0.5f32, -1.0].view());
        store.apply_sparse_update(&delta).unwrap();
        assert_eq!(store.row(0).to_vec(), vec![1.0, 1.0]);
        assert_eq!(store.row(1).to_vec(), vec![1.5, 0.0]);
        assert_eq!(store.row(2).to_vec(), vec![1.0, 1.0]);

        let mut out_of_range = SparseGradient::new(2);
        out_of_range.accumulate(7, 1.0, array![1.0f32, 1.0].view());
        assert!(store.apply_sparse_update(&out_of_range).is_err());
        assert!(store.apply_sparse_update(&SparseGradient::new(3)).is_err());
    }

    #[test]
    fn test_sparse_gradient_accumulates() {
        let mut grad = SparseGradient::new(2);
        let v = array![1.0f32, 2.0];
        grad.accumulate(3, 0.5, v.view());
        grad.accumulate(3, 1.0, v.view());
        grad.accumulate(1, -1.0, v.view());
        assert_eq!(grad.len(), 2);
        assert_eq!(grad.get(3).unwrap(), &array![1.5, 3.0]);
        let rows: Vec<NodeId> = grad.iter().map(|(row, _)| row).collect();
        assert_eq!(rows, vec![1, 3]);
    }
}
