//! Configuration for distance-calibrated embedding training
//!
//! Configurations are plain serde structs so they can be embedded in a larger
//! TOML document or loaded on their own with [`PathEmbedConfig::from_toml_file`].
//! Every entry point that accepts a configuration calls
//! [`PathEmbedConfig::validate`] first, so an invalid run never starts.

use crate::error::{PathEmbedError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Learning-rate schedule applied once per epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DecayMode {
    /// `lr <- lr * gamma` after every epoch
    Exponential { gamma: f32 },
    /// Keep the initial learning rate
    Constant,
}

impl Default for DecayMode {
    fn default() -> Self {
        DecayMode::Exponential { gamma: 0.995 }
    }
}

/// Optimizer applied to the embedding rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    /// Lazy Adam that only updates the moments of rows touched by a batch
    SparseAdam,
    /// Plain stochastic gradient descent
    Sgd,
}

impl Default for OptimizerKind {
    fn default() -> Self {
        OptimizerKind::SparseAdam
    }
}

/// Where and how often snapshots are written during training
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckpointConfig {
    /// Directory receiving the checkpoint files
    pub dir: PathBuf,
    /// Write a checkpoint every `interval` epochs
    pub interval: usize,
    /// Number of newest checkpoints to keep
    pub max_checkpoints: usize,
}

/// Configuration of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathEmbedConfig {
    /// Dimension of each node vector
    pub embedding_dim: usize,
    /// Number of steps of every random walk
    pub walk_length: usize,
    /// Return parameter of the second-order walk
    pub p: f64,
    /// In-out parameter of the second-order walk
    pub q: f64,
    /// Walks started from every node of a batch
    pub num_walks: usize,
    /// Nodes per training window (start node included)
    pub window_size: usize,
    /// Negative traces drawn per positive walk
    pub num_negatives: usize,
    /// Initial value of the decoder scale `c`
    pub init_c: f32,
    /// Whether `c` is optimized alongside the embeddings
    pub train_c: bool,
    /// Standard deviation of the normal initialisation of the embeddings
    pub init_std: f32,
    /// Number of passes over all nodes
    pub epochs: usize,
    /// Start nodes per optimizer step
    pub batch_size: usize,
    /// Initial learning rate
    pub learning_rate: f32,
    pub optimizer: OptimizerKind,
    /// Seed of the run's random source
    pub seed: u64,
    /// Generate the walks of a batch on the rayon pool
    pub parallel_sampling: bool,
    /// Epochs between classification probes, `<= 0` disables the probe
    pub eval_interval: i64,
    pub decay: DecayMode,
    pub checkpoint: Option<CheckpointConfig>,
}

impl Default for PathEmbedConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 64,
            walk_length: 20,
            p: 1.0,
            q: 1.0,
            num_walks: 1,
            window_size: 5,
            num_negatives: 5,
            init_c: 10.0,
            train_c: false,
            init_std: 1.0,
            epochs: 10,
            batch_size: 128,
            learning_rate: 0.01,
            optimizer: OptimizerKind::default(),
            seed: 42,
            parallel_sampling: true,
            eval_interval: -1,
            decay: DecayMode::default(),
            checkpoint: None,
        }
    }
}

impl PathEmbedConfig {
    /// Parse a configuration from a TOML document and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PathEmbedConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file and validate it
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PathEmbedError::Serialization(format!(
                "Failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Serialize the configuration back to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PathEmbedError::Serialization(e.to_string()))
    }

    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }

    pub fn with_walk(mut self, walk_length: usize, window_size: usize) -> Self {
        self.walk_length = walk_length;
        self.window_size = window_size;
        self
    }

    pub fn with_bias(mut self, p: f64, q: f64) -> Self {
        self.p = p;
        self.q = q;
        self
    }

    pub fn with_sampling(mut self, num_walks: usize, num_negatives: usize) -> Self {
        self.num_walks = num_walks;
        self.num_negatives = num_negatives;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_eval_interval(mut self, interval: i64) -> Self {
        self.eval_interval = interval;
        self
    }

    /// Number of windows cut from one walk (or one negative trace)
    pub fn windows_per_walk(&self) -> usize {
        self.walk_length + 2 - self.window_size
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.embedding_dim == 0 {
            return Err(PathEmbedError::config("embedding_dim", "must be > 0"));
        }
        if self.window_size < 2 {
            return Err(PathEmbedError::config("window_size", "must be >= 2"));
        }
        if self.walk_length < self.window_size {
            return Err(PathEmbedError::config(
                "walk_length",
                format!(
                    "must be >= window_size ({}), got {}",
                    self.window_size, self.walk_length
                ),
            ));
        }
        if !(self.p.is_finite() && self.p > 0.0) {
            return Err(PathEmbedError::config("p", "must be a positive finite number"));
        }
        if !(self.q.is_finite() && self.q > 0.0) {
            return Err(PathEmbedError::config("q", "must be a positive finite number"));
        }
        if self.num_walks == 0 {
            return Err(PathEmbedError::config("num_walks", "must be >= 1"));
        }
        if self.num_negatives == 0 {
            return Err(PathEmbedError::config("num_negatives", "must be >= 1"));
        }
        if !(self.init_c.is_finite() && self.init_c > 0.0) {
            return Err(PathEmbedError::config("init_c", "must be a positive finite number"));
        }
        if !(self.init_std.is_finite() && self.init_std > 0.0) {
            return Err(PathEmbedError::config("init_std", "must be a positive finite number"));
        }
        if self.batch_size == 0 {
            return Err(PathEmbedError::config("batch_size", "must be > 0"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(PathEmbedError::config(
                "learning_rate",
                "must be a positive finite number",
            ));
        }
        if let DecayMode::Exponential { gamma } = self.decay {
            if !(gamma > 0.0 && gamma <= 1.0) {
                return Err(PathEmbedError::config("decay.gamma", "must be in (0, 1]"));
            }
        }
        if let Some(checkpoint) = &self.checkpoint {
            if checkpoint.interval == 0 {
                return Err(PathEmbedError::config("checkpoint.interval", "must be > 0"));
            }
            if checkpoint.max_checkpoints == 0 {
                return Err(PathEmbedError::config(
                    "checkpoint.max_checkpoints",
                    "must be > 0",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PathEmbedConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.decay, DecayMode::Exponential { gamma: 0.995 });
        assert_eq!(config.optimizer, OptimizerKind::SparseAdam);
    }

    #[test]
    fn test_walk_shorter_than_window_is_rejected() {
        let config = PathEmbedConfig::default().with_walk(3, 4);
        let err = config.validate().unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("walk_length"));
    }

    #[test]
    fn test_non_positive_values_are_rejected() {
        let mut config = PathEmbedConfig::default();
        config.embedding_dim = 0;
        assert!(config.validate().is_err());

        let config = PathEmbedConfig::default().with_bias(0.0, 1.0);
        assert!(config.validate().is_err());

        let config = PathEmbedConfig::default().with_bias(1.0, f64::INFINITY);
        assert!(config.validate().is_err());

        let mut config = PathEmbedConfig::default();
        config.window_size = 1;
        assert!(config.validate().is_err());

        let mut config = PathEmbedConfig::default();
        config.decay = DecayMode::Exponential { gamma: 1.5 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let toml = r#"
            embedding_dim = 16
            walk_length = 8
            window_size = 3
            p = 0.5
            q = 2.0
            epochs = 3
            optimizer = "sgd"

            [decay]
            mode = "constant"
        "#;
        let config = PathEmbedConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.embedding_dim, 16);
        assert_eq!(config.window_size, 3);
        assert_eq!(config.decay, DecayMode::Constant);
        assert_eq!(config.optimizer, OptimizerKind::Sgd);
        // unspecified fields keep their defaults
        assert_eq!(config.num_negatives, 5);

        let text = config.to_toml_string().unwrap();
        let parsed = PathEmbedConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_unknown_decay_mode_fails_fast() {
        let toml = r#"
            [decay]
            mode = "cosine"
        "#;
        assert!(PathEmbedConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_invalid_toml_values_fail_validation() {
        let toml = r#"
            walk_length = 2
            window_size = 5
        "#;
        let err = PathEmbedConfig::from_toml_str(toml).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_windows_per_walk() {
        let config = PathEmbedConfig::default().with_walk(4, 2);
        assert_eq!(config.windows_per_walk(), 4);
    }
}
