//! Snapshot persistence, CSV export and checkpoint rotation

use crate::decoder::DistanceDecoder;
use crate::embedding::EmbeddingStore;
use crate::error::{PathEmbedError, Result};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Format version written into every snapshot
pub const SNAPSHOT_VERSION: &str = "1.0.0";

/// Descriptive data stored next to the vectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub version: String,
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub epochs_trained: usize,
    pub final_loss: Option<f64>,
    pub description: Option<String>,
}

impl SnapshotMetadata {
    pub fn new(run_id: Uuid, epochs_trained: usize, final_loss: Option<f64>) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            run_id,
            created_at: Utc::now(),
            epochs_trained,
            final_loss,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Everything needed to restore a trained embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSnapshot {
    pub metadata: SnapshotMetadata,
    pub num_nodes: usize,
    pub dimensions: usize,
    pub c: f32,
    pub train_c: bool,
    /// All `num_nodes + 1` rows, padding row included
    pub vectors: Array2<f32>,
}

impl EmbeddingSnapshot {
    pub fn new(store: &EmbeddingStore, decoder: &DistanceDecoder, metadata: SnapshotMetadata) -> Self {
        Self {
            metadata,
            num_nodes: store.num_nodes(),
            dimensions: store.dimensions(),
            c: decoder.c(),
            train_c: decoder.is_trainable(),
            vectors: store.all().clone(),
        }
    }

    /// Rebuild the store and decoder, validating the stored shape
    pub fn restore(&self) -> Result<(EmbeddingStore, DistanceDecoder)> {
        if self.vectors.ncols() != self.dimensions {
            return Err(PathEmbedError::ShapeMismatch {
                expected: format!("{} columns", self.dimensions),
                actual: format!("{} columns", self.vectors.ncols()),
            });
        }
        let store = EmbeddingStore::from_matrix(self.num_nodes, self.vectors.clone())?;
        Ok((store, DistanceDecoder::new(self.c, self.train_c)))
    }

    /// Write the snapshot as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut writer = BufWriter::new(fs::File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        debug!("Saved embedding snapshot to {}", path.display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let snapshot: EmbeddingSnapshot = serde_json::from_str(&content)?;
        snapshot.restore()?;
        debug!("Loaded embedding snapshot from {}", path.display());
        Ok(snapshot)
    }

    /// Export node vectors as `node_id,v0,..,v{D-1}`; the padding row is skipped
    pub fn export_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut file = BufWriter::new(fs::File::create(path)?);

        let header: Vec<String> = (0..self.dimensions).map(|i| format!("v{i}")).collect();
        writeln!(file, "node_id,{}", header.join(","))?;

        for (node, row) in self.vectors.rows().into_iter().take(self.num_nodes).enumerate() {
            let values: Vec<String> = row.iter().map(|x| x.to_string()).collect();
            writeln!(file, "{},{}", node, values.join(","))?;
        }
        file.flush()?;

        info!("Exported {} node embeddings to CSV: {}", self.num_nodes, path.display());
        Ok(())
    }
}

/// Writes epoch checkpoints into a directory and keeps only the newest ones
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    checkpoint_dir: PathBuf,
    max_checkpoints: usize,
}

impl CheckpointManager {
    pub fn new<P: AsRef<Path>>(checkpoint_dir: P, max_checkpoints: usize) -> Result<Self> {
        if max_checkpoints == 0 {
            return Err(PathEmbedError::config(
                "checkpoint.max_checkpoints",
                "must be > 0",
            ));
        }
        let checkpoint_dir = checkpoint_dir.as_ref().to_path_buf();
        fs::create_dir_all(&checkpoint_dir)?;

        Ok(Self {
            checkpoint_dir,
            max_checkpoints,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    /// Save `snapshot` as the checkpoint of `epoch` and rotate old ones
    pub fn save_checkpoint(
        &self,
        snapshot: &EmbeddingSnapshot,
        epoch: usize,
        loss: f64,
    ) -> Result<PathBuf> {
        let checkpoint_path = self
            .checkpoint_dir
            .join(format!("checkpoint_epoch_{epoch:06}.json"));
        snapshot.save(&checkpoint_path)?;

        self.cleanup_old_checkpoints()?;

        debug!(
            "Saved checkpoint: {} (loss {:.6})",
            checkpoint_path.display(),
            loss
        );
        Ok(checkpoint_path)
    }

    /// Remove the oldest checkpoints beyond `max_checkpoints`
    fn cleanup_old_checkpoints(&self) -> Result<()> {
        let checkpoints = self.list_checkpoints()?;
        if checkpoints.len() > self.max_checkpoints {
            let to_remove = checkpoints.len() - self.max_checkpoints;
            for path in checkpoints.iter().take(to_remove) {
                fs::remove_file(path)?;
                debug!("Removed old checkpoint: {}", path.display());
            }
        }
        Ok(())
    }

    /// Checkpoint files, oldest epoch first
    pub fn list_checkpoints(&self) -> Result<Vec<PathBuf>> {
        let mut checkpoints = Vec::new();
        for entry in fs::read_dir(&self.checkpoint_dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with("checkpoint_epoch_") && name.ends_with(".json") {
                    checkpoints.push(entry.path());
                }
            }
        }
        checkpoints.sort();
        Ok(checkpoints)
    }

    pub fn latest_checkpoint(&self) -> Result<Option<EmbeddingSnapshot>> {
        match self.list_checkpoints()?.last() {
            Some(path) => EmbeddingSnapshot::load(path).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use ndarray::array;
    use tempfile::TempDir;

    fn snapshot() -> EmbeddingSnapshot {
        let store =
            EmbeddingStore::from_matrix(2, array![[0.5, -1.0], [2.0, 0.25], [0.0, 0.0]]).unwrap();
        let decoder = DistanceDecoder::new(4.0, true);
        let metadata = SnapshotMetadata::new(Uuid::new_v4(), 3, Some(0.125)).with_description("unit");
        EmbeddingSnapshot::new(&store, &decoder, metadata)
    }

    #[test]
    fn test_snapshot_round_trip() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("nested").join("snapshot.json");
        let original = snapshot();
        original.save(&path)?;

        let loaded = EmbeddingSnapshot::load(&path)?;
        assert_eq!(loaded, original);
        let (store, decoder) = loaded.restore()?;
        assert_eq!(store.num_nodes(), 2);
        assert_eq!(store.row(1).to_vec(), vec![2.0, 0.25]);
        assert_eq!(decoder.c(), 4.0);
        assert!(decoder.is_trainable());
        Ok(())
    }

    #[test]
    fn test_corrupt_snapshot_is_rejected() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("bad.json");

        let mut bad = snapshot();
        bad.num_nodes = 5;
        bad.save(&path)?;
        assert!(EmbeddingSnapshot::load(&path).is_err());

        fs::write(&path, "{ not json")?;
        assert!(matches!(
            EmbeddingSnapshot::load(&path),
            Err(PathEmbedError::Serialization(_))
        ));
        Ok(())
    }

    #[test]
    fn test_csv_export_skips_padding_row() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("vectors.csv");
        snapshot().export_csv(&path)?;

        let content = fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["node_id,v0,v1", "0,0.5,-1", "1,2,0.25"]);
        Ok(())
    }

    #[test]
    fn test_checkpoint_rotation() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let manager = CheckpointManager::new(temp_dir.path().join("ckpt"), 2)?;
        assert!(manager.list_checkpoints()?.is_empty());
        assert!(manager.latest_checkpoint()?.is_none());

        let mut snap = snapshot();
        for epoch in 1..=4 {
            snap.metadata.epochs_trained = epoch;
            manager.save_checkpoint(&snap, epoch, 1.0 / epoch as f64)?;
        }

        let names: Vec<String> = manager
            .list_checkpoints()?
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect();
        assert_eq!(
            names,
            vec!["checkpoint_epoch_000003.json", "checkpoint_epoch_000004.json"]
        );
        let latest = manager.latest_checkpoint()?.expect("checkpoint present");
        assert_eq!(latest.metadata.epochs_trained, 4);
        Ok(())
    }

    #[test]
    fn test_zero_max_checkpoints_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        assert!(CheckpointManager::new(temp_dir.path(), 0).is_err());
    }
}
