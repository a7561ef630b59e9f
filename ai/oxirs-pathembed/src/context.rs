//! Per-run training state
//!
//! Everything that used to be process-wide in a training run (random source,
//! current learning rate, step counters) lives in a [`TrainingContext`] that
//! the trainer threads through every component call. Two contexts never share
//! state, so runs are independently reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TrainingContext {
    run_id: Uuid,
    seed: u64,
    rng: StdRng,
    /// Learning rate used by the next optimizer step
    pub learning_rate: f32,
    /// Zero-based index of the epoch in progress
    pub epoch: usize,
    /// Optimizer steps taken so far
    pub step: u64,
}

impl TrainingContext {
    pub fn new(seed: u64, learning_rate: f32) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            seed,
            rng: StdRng::seed_from_u64(seed),
            learning_rate,
            epoch: 0,
            step: 0,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Draw a seed for an independent child generator
    pub fn fork_seed(&mut self) -> u64 {
        self.rng.gen()
    }
}
