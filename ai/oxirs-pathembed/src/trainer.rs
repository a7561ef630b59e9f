//! Epoch loop tying sampler, loss and optimizers together

use crate::config::PathEmbedConfig;
use crate::context::TrainingContext;
use crate::decoder::DistanceDecoder;
use crate::embedding::EmbeddingStore;
use crate::error::{PathEmbedError, Result};
use crate::graph::{Graph, NodeId};
use crate::heuristic::EmbeddingHeuristic;
use crate::loss::LossEngine;
use crate::optimizer::{build_optimizer, EmbeddingOptimizer, LrScheduler, ScalarAdam};
use crate::persistence::{CheckpointManager, EmbeddingSnapshot, SnapshotMetadata};
use crate::probe::{ClassificationProbe, EvalSet};
use crate::sampler::WalkSampler;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle of a [`Trainer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainerState {
    Idle,
    Training { epoch: usize },
    Done,
}

/// Cooperative cancellation flag, checked between epochs
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Summary of one epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    pub epoch: usize,
    /// Mean total loss over the epoch's batches
    pub loss: f64,
    pub positive_loss: f64,
    pub negative_loss: f64,
    /// Learning rate used during the epoch
    pub learning_rate: f32,
    /// Decoder scale at the end of the epoch
    pub c: f32,
    pub batches: usize,
    pub masked_windows: usize,
    pub dead_end_walks: usize,
    pub probe_accuracy: Option<f64>,
    pub duration_secs: f64,
}

/// Statistics from a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingStats {
    pub run_id: Uuid,
    pub epochs_completed: usize,
    pub loss_history: Vec<f64>,
    pub epochs: Vec<EpochStats>,
    pub final_loss: f64,
    pub final_c: f32,
    pub training_time_secs: f64,
    /// `(epoch, validation accuracy)` of every successful probe
    pub probe_history: Vec<(usize, f64)>,
    /// Whether the run ended through a [`StopHandle`]
    pub cancelled: bool,
}

/// Trains node embeddings on one graph
pub struct Trainer {
    config: PathEmbedConfig,
    sampler: WalkSampler,
    store: EmbeddingStore,
    decoder: DistanceDecoder,
    loss: LossEngine,
    optimizer: Box<dyn EmbeddingOptimizer>,
    c_optimizer: ScalarAdam,
    scheduler: LrScheduler,
    ctx: TrainingContext,
    state: TrainerState,
    epochs_completed: usize,
    stop: StopHandle,
    eval_set: Option<EvalSet>,
    probe: ClassificationProbe,
    checkpoints: Option<CheckpointManager>,
}

impl Trainer {
    /// Create a trainer with freshly initialised embeddings
    pub fn new(graph: Arc<Graph>, config: PathEmbedConfig) -> Result<Self> {
        config.validate()?;
        let mut ctx = TrainingContext::new(config.seed, config.learning_rate);
        let store = EmbeddingStore::new(
            graph.num_nodes(),
            config.embedding_dim,
            config.init_std,
            ctx.rng(),
        )?;
        let decoder = DistanceDecoder::new(config.init_c, config.train_c);
        Self::assemble(graph, config, ctx, store, decoder)
    }

    /// Start a new run from the vectors and `c` of a saved snapshot
    pub fn from_snapshot(
        graph: Arc<Graph>,
        config: PathEmbedConfig,
        snapshot: &EmbeddingSnapshot,
    ) -> Result<Self> {
        config.validate()?;
        let (store, decoder) = snapshot.restore()?;
        if store.num_nodes() != graph.num_nodes() {
            return Err(PathEmbedError::ShapeMismatch {
                expected: format!("{} nodes", graph.num_nodes()),
                actual: format!("snapshot with {} nodes", store.num_nodes()),
            });
        }
        if store.dimensions() != config.embedding_dim {
            return Err(PathEmbedError::ShapeMismatch {
                expected: format!("embedding_dim {}", config.embedding_dim),
                actual: format!("snapshot dimension {}", store.dimensions()),
            });
        }
        let decoder = DistanceDecoder::new(decoder.c(), config.train_c);
        let ctx = TrainingContext::new(config.seed, config.learning_rate);
        Self::assemble(graph, config, ctx, store, decoder)
    }

    fn assemble(
        graph: Arc<Graph>,
        config: PathEmbedConfig,
        ctx: TrainingContext,
        store: EmbeddingStore,
        decoder: DistanceDecoder,
    ) -> Result<Self> {
        let sampler = WalkSampler::new(graph, &config)?;
        let optimizer = build_optimizer(config.optimizer, store.vocab_size(), store.dimensions());
        let checkpoints = match &config.checkpoint {
            Some(policy) => Some(CheckpointManager::new(&policy.dir, policy.max_checkpoints)?),
            None => None,
        };

        Ok(Self {
            scheduler: LrScheduler::new(config.decay, config.learning_rate),
            sampler,
            store,
            decoder,
            loss: LossEngine::new(),
            optimizer,
            c_optimizer: ScalarAdam::default(),
            ctx,
            state: TrainerState::Idle,
            epochs_completed: 0,
            stop: StopHandle::default(),
            eval_set: None,
            probe: ClassificationProbe::default(),
            checkpoints,
            config,
        })
    }

    /// Attach the labelled splits used by the periodic probe
    pub fn with_eval_set(mut self, eval_set: EvalSet) -> Self {
        self.eval_set = Some(eval_set);
        self
    }

    pub fn with_probe(mut self, probe: ClassificationProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    pub fn config(&self) -> &PathEmbedConfig {
        &self.config
    }

    pub fn context(&self) -> &TrainingContext {
        &self.ctx
    }

    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    pub fn decoder(&self) -> &DistanceDecoder {
        &self.decoder
    }

    pub fn graph(&self) -> &Arc<Graph> {
        self.sampler.graph()
    }

    /// Run all configured epochs
    pub fn train(&mut self) -> Result<TrainingStats> {
        if self.state != TrainerState::Idle {
            return Err(PathEmbedError::InvalidState(format!(
                "train() requires an idle trainer, state is {:?}",
                self.state
            )));
        }

        let start = Instant::now();
        let graph = self.sampler.graph();
        info!(
            run_id = %self.ctx.run_id(),
            "Training path embedding on {} nodes / {} edges: dim={}, epochs={}, batch_size={}, optimizer={}",
            graph.num_nodes(),
            graph.num_edges(),
            self.config.embedding_dim,
            self.config.epochs,
            self.config.batch_size,
            self.optimizer.name()
        );

        let mut epochs = Vec::with_capacity(self.config.epochs);
        let mut probe_history = Vec::new();
        let mut cancelled = false;

        for epoch in 0..self.config.epochs {
            if self.stop.is_stopped() {
                info!("Stop requested, ending training before epoch {}", epoch);
                cancelled = true;
                break;
            }
            self.state = TrainerState::Training { epoch };
            self.ctx.epoch = epoch;

            let mut stats = self.train_epoch()?;
            self.epochs_completed += 1;
            stats.probe_accuracy = self.maybe_probe(epoch);
            if let Some(accuracy) = stats.probe_accuracy {
                probe_history.push((epoch, accuracy));
            }

            info!(
                "Epoch {}: loss={:.6} (pos={:.6}, neg={:.6}), lr={:.6}, c={:.4}",
                epoch,
                stats.loss,
                stats.positive_loss,
                stats.negative_loss,
                stats.learning_rate,
                stats.c
            );
            if stats.dead_end_walks > 0 {
                warn!(
                    "Epoch {}: {} walks hit a dead end, {} positive windows masked",
                    epoch, stats.dead_end_walks, stats.masked_windows
                );
            }

            self.maybe_checkpoint(epoch, stats.loss)?;
            epochs.push(stats);
        }

        self.state = TrainerState::Done;
        let loss_history: Vec<f64> = epochs.iter().map(|e| e.loss).collect();
        let final_loss = loss_history.last().copied().unwrap_or(f64::NAN);
        let training_time_secs = start.elapsed().as_secs_f64();

        info!(
            "Training finished after {} epochs in {:.2}s, final loss {:.6}",
            epochs.len(),
            training_time_secs,
            final_loss
        );

        Ok(TrainingStats {
            run_id: self.ctx.run_id(),
            epochs_completed: epochs.len(),
            loss_history,
            epochs,
            final_loss,
            final_c: self.decoder.c(),
            training_time_secs,
            probe_history,
            cancelled,
        })
    }

    /// One pass over all nodes in shuffled batches, followed by one learning-rate decay step
    fn train_epoch(&mut self) -> Result<EpochStats> {
        let start = Instant::now();
        let epoch = self.ctx.epoch;
        let learning_rate = self.scheduler.current();
        self.ctx.learning_rate = learning_rate;

        let mut nodes: Vec<NodeId> = (0..self.sampler.graph().num_nodes()).collect();
        nodes.shuffle(self.ctx.rng());

        let mut total = 0.0;
        let mut positive = 0.0;
        let mut negative = 0.0;
        let mut batches = 0usize;
        let mut masked_windows = 0usize;
        let mut dead_end_walks = 0usize;

        for batch in nodes.chunks(self.config.batch_size) {
            let sample = self.sampler.sample(batch, &mut self.ctx)?;
            let output = self.loss.loss(&self.store, &self.decoder, &sample)?;

            self.optimizer
                .step(&mut self.store, &output.grads, learning_rate)?;
            if self.decoder.is_trainable() {
                let c = self
                    .c_optimizer
                    .step(self.decoder.c(), output.grad_c, learning_rate);
                self.decoder.set_c(c);
            }
            self.ctx.step += 1;

            debug!(
                "Epoch {} batch {}: loss={:.6}, rows updated={}",
                epoch,
                batches,
                output.total,
                output.grads.len()
            );

            total += output.total;
            positive += output.positive;
            negative += output.negative;
            batches += 1;
            masked_windows += output.masked_windows;
            dead_end_walks += sample.dead_end_walks;
        }

        self.scheduler.step();

        let denom = batches.max(1) as f64;
        Ok(EpochStats {
            epoch,
            loss: total / denom,
            positive_loss: positive / denom,
            negative_loss: negative / denom,
            learning_rate,
            c: self.decoder.c(),
            batches,
            masked_windows,
            dead_end_walks,
            probe_accuracy: None,
            duration_secs: start.elapsed().as_secs_f64(),
        })
    }

    fn maybe_probe(&self, epoch: usize) -> Option<f64> {
        let interval = self.config.eval_interval;
        if interval <= 0 || (epoch as i64 + 1) % interval != 0 {
            return None;
        }
        let eval_set = self.eval_set.as_ref()?;
        match self.probe.evaluate(&self.store, eval_set) {
            Ok(accuracy) => {
                info!("Epoch {}: probe accuracy {:.4}", epoch, accuracy);
                Some(accuracy)
            }
            Err(e) => {
                warn!("Epoch {}: probe skipped: {}", epoch, e);
                None
            }
        }
    }

    fn maybe_checkpoint(&self, epoch: usize, loss: f64) -> Result<()> {
        let (Some(manager), Some(policy)) = (&self.checkpoints, &self.config.checkpoint) else {
            return Ok(());
        };
        if (epoch + 1) % policy.interval != 0 {
            return Ok(());
        }
        let snapshot = self.snapshot_with(self.epochs_completed, Some(loss));
        let path = manager.save_checkpoint(&snapshot, epoch + 1, loss)?;
        debug!("Checkpoint for epoch {} written to {}", epoch, path.display());
        Ok(())
    }

    fn snapshot_with(&self, epochs_trained: usize, final_loss: Option<f64>) -> EmbeddingSnapshot {
        let metadata = SnapshotMetadata::new(self.ctx.run_id(), epochs_trained, final_loss);
        EmbeddingSnapshot::new(&self.store, &self.decoder, metadata)
    }

    /// Snapshot of the current vectors and `c`
    pub fn snapshot(&self) -> EmbeddingSnapshot {
        self.snapshot_with(self.epochs_completed, None)
    }

    pub fn into_parts(self) -> (EmbeddingStore, DistanceDecoder) {
        (self.store, self.decoder)
    }

    /// Turn the trained embedding into a search heuristic
    pub fn into_heuristic(self) -> EmbeddingHeuristic {
        EmbeddingHeuristic::new(self.store, self.decoder)
    }
}
