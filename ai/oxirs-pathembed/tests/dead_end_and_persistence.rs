//! Training on graphs with sinks, and persisting the result

use anyhow::Result;
use oxirs_pathembed::*;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

/// A one-way chain `0 -> 1 -> .. -> n-1`; every walk runs into the last node
fn chain(n: usize) -> Arc<Graph> {
    let mut builder = GraphBuilder::new(n);
    for i in 0..n - 1 {
        builder.add_edge(i, i + 1, 1.0 + i as f32);
    }
    Arc::new(builder.build().expect("valid chain"))
}

fn config() -> PathEmbedConfig {
    PathEmbedConfig::default()
        .with_embedding_dim(8)
        .with_walk(6, 3)
        .with_sampling(2, 3)
        .with_batch_size(3)
        .with_epochs(4)
}

#[test]
fn test_dead_end_graph_trains_and_reports_masking() {
    let mut trainer = Trainer::new(chain(6), config()).unwrap();
    let stats = trainer.train().unwrap();

    assert_eq!(stats.epochs_completed, 4);
    for epoch in &stats.epochs {
        assert!(epoch.loss.is_finite());
        assert!(epoch.dead_end_walks > 0);
        assert!(epoch.masked_windows > 0);
    }

    // the padding row never receives an update
    let store = trainer.store();
    let fresh = Trainer::new(chain(6), config()).unwrap();
    assert_eq!(
        store.row(store.padding_id()),
        fresh.store().row(store.padding_id())
    );
}

#[test]
fn test_isolated_nodes_do_not_break_training() {
    let mut builder = GraphBuilder::new(5);
    builder.add_undirected_edge(0, 1, 2.0);
    let graph = Arc::new(builder.build().unwrap());

    let mut trainer = Trainer::new(graph, config().with_walk(3, 2)).unwrap();
    let stats = trainer.train().unwrap();
    assert!(stats.final_loss.is_finite());
    assert!(stats.epochs.iter().all(|e| e.dead_end_walks > 0));
}

#[test]
fn test_snapshot_feeds_the_heuristic() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let graph = chain(5);
    let mut trainer = Trainer::new(graph.clone(), config())?;
    let stats = trainer.train()?;

    let path = temp_dir.path().join("embedding.json");
    let mut snapshot = trainer.snapshot();
    snapshot.metadata.final_loss = Some(stats.final_loss);
    snapshot.save(&path)?;

    let loaded = EmbeddingSnapshot::load(&path)?;
    assert_eq!(loaded.metadata.run_id, stats.run_id);
    assert_eq!(loaded.metadata.epochs_trained, 4);
    assert_eq!(loaded.num_nodes, 5);

    let restored = EmbeddingHeuristic::from_snapshot(&loaded)?;
    let live = trainer.into_heuristic();
    for u in 0..5 {
        for v in 0..5 {
            let (a, b) = (restored.distance(u, v), live.distance(u, v));
            assert!(a == b || (a.is_infinite() && b.is_infinite()), "{u},{v}: {a} vs {b}");
        }
    }

    let csv_path = temp_dir.path().join("embedding.csv");
    loaded.export_csv(&csv_path)?;
    let csv = fs::read_to_string(&csv_path)?;
    assert_eq!(csv.lines().count(), 6);
    assert!(csv.starts_with("node_id,v0,v1,"));
    Ok(())
}

#[test]
fn test_config_file_drives_training() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let checkpoint_dir = temp_dir.path().join("checkpoints");
    let config_path = temp_dir.path().join("pathembed.toml");
    fs::write(
        &config_path,
        format!(
            r#"
embedding_dim = 4
walk_length = 5
window_size = 3
num_walks = 1
num_negatives = 2
epochs = 3
batch_size = 2
seed = 5
train_c = true

[decay]
mode = "exponential"
gamma = 0.9

[checkpoint]
dir = "{}"
interval = 1
max_checkpoints = 2
"#,
            checkpoint_dir.display()
        ),
    )?;

    let config = PathEmbedConfig::from_toml_file(&config_path)?;
    assert_eq!(config.decay, DecayMode::Exponential { gamma: 0.9 });

    let mut builder = GraphBuilder::new(4);
    builder
        .add_undirected_edge(0, 1, 1.0)
        .add_undirected_edge(1, 2, 1.0)
        .add_undirected_edge(2, 3, 1.0);
    let mut trainer = Trainer::new(Arc::new(builder.build()?), config)?;
    let stats = trainer.train()?;
    assert_eq!(stats.epochs_completed, 3);

    let manager = CheckpointManager::new(&checkpoint_dir, 2)?;
    assert_eq!(manager.list_checkpoints()?.len(), 2);
    let latest = manager.latest_checkpoint()?.expect("latest checkpoint");
    assert_eq!(latest.metadata.epochs_trained, 3);
    assert_eq!(latest.c, stats.final_c);
    Ok(())
}

#[test]
fn test_missing_config_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let result = PathEmbedConfig::from_toml_file(temp_dir.path().join("absent.toml"));
    assert!(matches!(result, Err(PathEmbedError::Serialization(_))));
}
