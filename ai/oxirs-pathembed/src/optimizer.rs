//! Optimizers for the embedding rows and the decoder scale, plus the
//! learning-rate schedule

use crate::config::{DecayMode, OptimizerKind};
use crate::embedding::{EmbeddingStore, SparseGradient};
use crate::error::{PathEmbedError, Result};
use ndarray::{Array2, Zip};

/// Updates embedding rows from a sparse gradient
pub trait EmbeddingOptimizer: Send {
    /// Apply one update with learning rate `lr`; rows absent from `grads` are untouched
    fn step(&mut self, store: &mut EmbeddingStore, grads: &SparseGradient, lr: f32) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Build the optimizer selected in the configuration for a `vocab_size x dimensions` store
pub fn build_optimizer(
    kind: OptimizerKind,
    vocab_size: usize,
    dimensions: usize,
) -> Box<dyn EmbeddingOptimizer> {
    match kind {
        OptimizerKind::SparseAdam => Box::new(SparseAdam::new(vocab_size, dimensions)),
        OptimizerKind::Sgd => Box::new(Sgd),
    }
}

/// Adam whose moment estimates are only updated for the rows present in a gradient
///
/// The bias correction uses the global step count, so a row that is rarely
/// touched keeps stale moments until it shows up again.
#[derive(Debug, Clone)]
pub struct SparseAdam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    m: Array2<f32>,
    v: Array2<f32>,
    t: u64,
}

impl SparseAdam {
    pub fn new(vocab_size: usize, dimensions: usize) -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            m: Array2::zeros((vocab_size, dimensions)),
            v: Array2::zeros((vocab_size, dimensions)),
            t: 0,
        }
    }

    /// Steps taken so far
    pub fn steps(&self) -> u64 {
        self.t
    }
}

impl EmbeddingOptimizer for SparseAdam {
    fn step(&mut self, store: &mut EmbeddingStore, grads: &SparseGradient, lr: f32) -> Result<()> {
        if self.m.dim() != store.all().dim() {
            return Err(PathEmbedError::ShapeMismatch {
                expected: format!("{:?}", self.m.dim()),
                actual: format!("{:?}", store.all().dim()),
            });
        }
        if grads.is_empty() {
            return Ok(());
        }

        self.t += 1;
        let t = self.t as i32;
        let bias1 = 1.0 - self.beta1.powi(t);
        let bias2 = 1.0 - self.beta2.powi(t);
        let step_size = lr * bias2.sqrt() / bias1;

        let mut delta = SparseGradient::new(grads.dimensions());
        for (row, grad) in grads.iter() {
            if row >= self.m.nrows() {
                return Err(PathEmbedError::InvalidNode {
                    node: row,
                    num_nodes: store.num_nodes(),
                });
            }
            let mut m = self.m.row_mut(row);
            let mut v = self.v.row_mut(row);
            m.zip_mut_with(grad, |m, &g| *m = self.beta1 * *m + (1.0 - self.beta1) * g);
            v.zip_mut_with(grad, |v, &g| *v = self.beta2 * *v + (1.0 - self.beta2) * g * g);

            let eps = self.epsilon;
            let update = Zip::from(m.view())
                .and(v.view())
                .map_collect(|&m, &v| m / (v.sqrt() + eps));
            delta.accumulate(row, -step_size, update.view());
        }
        store.apply_sparse_update(&delta)
    }

    fn name(&self) -> &'static str {
        "sparse_adam"
    }
}

/// Plain gradient descent
#[derive(Debug, Clone, Copy, Default)]
pub struct Sgd;

impl EmbeddingOptimizer for Sgd {
    fn step(&mut self, store: &mut EmbeddingStore, grads: &SparseGradient, lr: f32) -> Result<()> {
        let mut delta = SparseGradient::new(grads.dimensions());
        for (row, grad) in grads.iter() {
            delta.accumulate(row, -lr, grad.view());
        }
        store.apply_sparse_update(&delta)
    }

    fn name(&self) -> &'static str {
        "sgd"
    }
}

/// Adam on a single scalar, used for the decoder scale `c`
#[derive(Debug, Clone, Copy)]
pub struct ScalarAdam {
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    m: f32,
    v: f32,
    t: i32,
}

impl Default for ScalarAdam {
    fn default() -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            m: 0.0,
            v: 0.0,
            t: 0,
        }
    }
}

impl ScalarAdam {
    /// Return `value` moved against `grad`
    pub fn step(&mut self, value: f32, grad: f32, lr: f32) -> f32 {
        self.t += 1;
        self.m = self.beta1 * self.m + (1.0 - self.beta1) * grad;
        self.v = self.beta2 * self.v + (1.0 - self.beta2) * grad * grad;
        let m_hat = self.m / (1.0 - self.beta1.powi(self.t));
        let v_hat = self.v / (1.0 - self.beta2.powi(self.t));
        value - lr * m_hat / (v_hat.sqrt() + self.epsilon)
    }
}

/// Per-epoch learning-rate schedule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LrScheduler {
    mode: DecayMode,
    lr: f32,
}

impl LrScheduler {
    pub fn new(mode: DecayMode, initial: f32) -> Self {
        Self { mode, lr: initial }
    }

    pub fn current(&self) -> f32 {
        self.lr
    }

    /// Advance by one epoch and return the new learning rate
    pub fn step(&mut self) -> f32 {
        if let DecayMode::Exponential { gamma } = self.mode {
            self.lr *= gamma;
        }
        self.lr
    }
}
