//! Error types for path-embedding training and inference

use thiserror::Error;

/// Result type for path-embedding operations
pub type Result<T> = std::result::Result<T, PathEmbedError>;

/// Errors that can occur while building, training or querying a path embedding
#[derive(Debug, Error)]
pub enum PathEmbedError {
    /// A configuration value is out of its valid range
    #[error("Invalid configuration for '{field}': {message}")]
    InvalidConfig { field: String, message: String },

    /// The input graph violates a structural invariant
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// A node id outside `0..num_nodes` was referenced
    #[error("Node {node} out of range (graph has {num_nodes} nodes)")]
    InvalidNode { node: usize, num_nodes: usize },

    /// Array shapes do not line up
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// An operation was called in a trainer state that does not allow it
    #[error("Invalid trainer state: {0}")]
    InvalidState(String),

    /// The held-out classification probe could not run
    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PathEmbedError {
    pub fn config(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Whether the error stems from configuration and should abort the run
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }
}

impl From<serde_json::Error> for PathEmbedError {
    fn from(err: serde_json::Error) -> Self {
        PathEmbedError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for PathEmbedError {
    fn from(err: toml::de::Error) -> Self {
        PathEmbedError::Serialization(err.to_string())
    }
}
