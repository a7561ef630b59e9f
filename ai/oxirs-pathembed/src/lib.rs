//! # OxiRS PathEmbed
//!
//! Distance-calibrated node embeddings for approximating shortest-path
//! distances on large weighted graphs such as road networks.
//!
//! ## Architecture
//!
//! ```text
//! Graph → WalkSampler → (positive windows, edge lengths, negative windows)
//!       → LossEngine ← EmbeddingStore + DistanceDecoder ← Trainer (SparseAdam)
//!       → EmbeddingSnapshot → EmbeddingHeuristic → best-first search
//! ```
//!
//! Training pulls the dot product of two node vectors towards
//! `c / (c + d)`, where `d` is the length of the edges separating them on a
//! biased random walk. The learned similarity is decoded back into a distance
//! estimate and exposed through the [`DistanceHeuristic`] capability.
//!
//! ## Key Features
//!
//! - **Second-order walks**: node2vec return/in-out parameters, weighted edges,
//!   dead ends padded and masked
//! - **Calibrated loss**: MSE against the distance target plus a log
//!   repulsion term for uniform negatives
//! - **Sparse optimisation**: lazy Adam touching only the rows of a batch,
//!   optional training of `c`
//! - **Persistence**: JSON snapshots, CSV export, rotating checkpoints
//!
//! ## Example
//!
//! ```rust,ignore
//! use oxirs_pathembed::{DistanceHeuristic, GraphBuilder, PathEmbedConfig, Trainer};
//! use std::sync::Arc;
//!
//! let mut builder = GraphBuilder::new(4);
//! builder.add_undirected_edge(0, 1, 1.0).add_undirected_edge(1, 2, 1.0);
//! let graph = Arc::new(builder.build()?);
//!
//! let mut trainer = Trainer::new(graph, PathEmbedConfig::default().with_embedding_dim(16))?;
//! let stats = trainer.train()?;
//! let heuristic = trainer.into_heuristic();
//! println!("h(0, 2) = {} after {} epochs", heuristic.distance(0, 2), stats.epochs_completed);
//! ```

pub mod config;
pub mod context;
pub mod decoder;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod heuristic;
pub mod loss;
pub mod optimizer;
pub mod persistence;
pub mod probe;
pub mod sampler;
pub mod trainer;

// Re-exports
pub use config::{CheckpointConfig, DecayMode, OptimizerKind, PathEmbedConfig};
pub use context::TrainingContext;
pub use decoder::DistanceDecoder;
pub use embedding::{EmbeddingStore, SparseGradient};
pub use error::PathEmbedError;
pub use graph::{EdgeSpec, Graph, GraphBuilder, NodeId};
pub use heuristic::{
    DistanceHeuristic, EmbeddingHeuristic, GeographicHeuristic, ZeroHeuristic,
    ZeroSimilarityPolicy,
};
pub use loss::{LossEngine, LossOutput};
pub use optimizer::{EmbeddingOptimizer, LrScheduler, ScalarAdam, Sgd, SparseAdam};
pub use persistence::{CheckpointManager, EmbeddingSnapshot, SnapshotMetadata};
pub use probe::{ClassificationProbe, EvalSet, LabeledNodes};
pub use sampler::{SampleBatch, Walk, WalkSampler};
pub use trainer::{EpochStats, StopHandle, Trainer, TrainerState, TrainingStats};
