//! Two-term training objective with analytic gradients
//!
//! For a window `w` the start node `w[0]` is paired with every other node of
//! the window. With `s = sigmoid(e_start . e_other)`:
//!
//! * positive pairs are regressed onto the calibrated target
//!   `t = c / (c + d)` with a mean squared error;
//! * negative pairs are pushed apart with `-ln(1 - s + eps)`.
//!
//! The total loss is the plain sum of both means. Gradients are accumulated
//! per embedding row from the values the store held when the loss was
//! computed, so a node appearing on both sides of a pair receives both
//! contributions.

use crate::decoder::{sigmoid, DistanceDecoder};
use crate::embedding::{EmbeddingStore, SparseGradient};
use crate::error::{PathEmbedError, Result};
use crate::graph::NodeId;
use crate::sampler::SampleBatch;
use ndarray::ArrayView2;

/// Guard inside the negative log term
pub const LOG_EPS: f64 = 1e-15;

/// Squared error between a predicted and a target similarity
pub fn positive_pair_loss(similarity: f64, target: f64) -> f64 {
    let diff = similarity - target;
    diff * diff
}

/// Repulsion applied to a negative pair
pub fn negative_pair_loss(similarity: f64) -> f64 {
    -(1.0 - similarity + LOG_EPS).ln()
}

/// Loss value and gradients of one batch
#[derive(Debug, Clone)]
pub struct LossOutput {
    /// `positive + negative`
    pub total: f64,
    pub positive: f64,
    pub negative: f64,
    /// Pairs contributing to the positive mean
    pub positive_pairs: usize,
    /// Pairs contributing to the negative mean
    pub negative_pairs: usize,
    /// Positive windows dropped because they contain the sentinel id
    pub masked_windows: usize,
    /// Gradient of `total` for every touched embedding row
    pub grads: SparseGradient,
    /// Gradient of `total` with respect to the decoder scale `c`
    pub grad_c: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LossEngine;

impl LossEngine {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate the loss of `batch` and its gradients
    pub fn loss(
        &self,
        store: &EmbeddingStore,
        decoder: &DistanceDecoder,
        batch: &SampleBatch,
    ) -> Result<LossOutput> {
        self.check_batch(store, batch)?;
        let sentinel = store.padding_id();
        let masked = batch.masked_positive(sentinel);
        let masked_windows = masked.iter().filter(|&&m| m).count();

        let pair_count = |windows: ArrayView2<'_, NodeId>, kept: usize| {
            kept * windows.ncols().saturating_sub(1)
        };
        let positive_pairs = pair_count(
            batch.pos_windows.view(),
            batch.num_positive() - masked_windows,
        );
        let negative_pairs = pair_count(batch.neg_windows.view(), batch.num_negative());

        let mut grads = SparseGradient::new(store.dimensions());
        let mut grad_c = 0.0f64;

        let mut positive = 0.0f64;
        if positive_pairs > 0 {
            let scale = 1.0 / positive_pairs as f64;
            let rows = batch.pos_windows.rows().into_iter();
            let dists = batch.pos_distances.rows().into_iter();
            for ((window, distances), skip) in rows.zip(dists).zip(&masked) {
                if *skip {
                    continue;
                }
                let start = window[0];
                for (&other, &distance) in window.iter().skip(1).zip(distances.iter()) {
                    let s = sigmoid(store.dot(start, other)) as f64;
                    let t = decoder.target_similarity(distance) as f64;
                    positive += positive_pair_loss(s, t);

                    let g = (2.0 * scale * (s - t) * s * (1.0 - s)) as f32;
                    accumulate_pair(&mut grads, store, start, other, g);
                    grad_c -= 2.0 * scale * (s - t) * decoder.target_grad_c(distance) as f64;
                }
            }
            positive *= scale;
        }

        let mut negative = 0.0f64;
        if negative_pairs > 0 {
            let scale = 1.0 / negative_pairs as f64;
            for window in batch.neg_windows.rows() {
                let start = window[0];
                for &other in window.iter().skip(1) {
                    let s = sigmoid(store.dot(start, other)) as f64;
                    negative += negative_pair_loss(s);

                    let g = (scale * s * (1.0 - s) / (1.0 - s + LOG_EPS)) as f32;
                    accumulate_pair(&mut grads, store, start, other, g);
                }
            }
            negative *= scale;
        }

        Ok(LossOutput {
            total: positive + negative,
            positive,
            negative,
            positive_pairs,
            negative_pairs,
            masked_windows,
            grads,
            grad_c: grad_c as f32,
        })
    }

    fn check_batch(&self, store: &EmbeddingStore, batch: &SampleBatch) -> Result<()> {
        let (p, w) = batch.pos_windows.dim();
        if batch.pos_distances.dim() != (p, w.saturating_sub(1)) {
            return Err(PathEmbedError::ShapeMismatch {
                expected: format!("{p}x{}", w.saturating_sub(1)),
                actual: format!("{:?}", batch.pos_distances.dim()),
            });
        }
        let vocab = store.vocab_size();
        let out_of_range = batch
            .pos_windows
            .iter()
            .chain(batch.neg_windows.iter())
            .find(|&&id| id >= vocab);
        if let Some(&node) = out_of_range {
            return Err(PathEmbedError::InvalidNode {
                node,
                num_nodes: store.num_nodes(),
            });
        }
        Ok(())
    }
}

/// `grad[a] += g * e_b` and `grad[b] += g * e_a`
fn accumulate_pair(grads: &mut SparseGradient, store: &EmbeddingStore, a: NodeId, b: NodeId, g: f32) {
    grads.accumulate(a, g, store.row(b));
    grads.accumulate(b, g, store.row(a));
}
