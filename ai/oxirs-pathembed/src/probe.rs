//! Held-out classification probe over the learned embeddings
//!
//! The probe fits a multinomial logistic regression on the vectors of a
//! labelled training split and reports its accuracy on a validation split.
//! It only reads the embedding store.

use crate::embedding::EmbeddingStore;
use crate::error::{PathEmbedError, Result};
use crate::graph::NodeId;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Node ids with one class label each
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabeledNodes {
    pub nodes: Vec<NodeId>,
    pub labels: Vec<usize>,
}

impl LabeledNodes {
    pub fn new(nodes: Vec<NodeId>, labels: Vec<usize>) -> Self {
        Self { nodes, labels }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalSet {
    pub train: LabeledNodes,
    pub validation: LabeledNodes,
}

impl EvalSet {
    pub fn new(train: LabeledNodes, validation: LabeledNodes) -> Self {
        Self { train, validation }
    }
}

/// Softmax regression fitted by batch gradient descent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationProbe {
    pub max_iter: usize,
    pub learning_rate: f64,
}

impl Default for ClassificationProbe {
    fn default() -> Self {
        Self {
            max_iter: 150,
            learning_rate: 0.5,
        }
    }
}

impl ClassificationProbe {
    /// Validation accuracy in `[0, 1]`
    pub fn evaluate(&self, store: &EmbeddingStore, eval_set: &EvalSet) -> Result<f64> {
        check_split("train", &eval_set.train, store)?;
        check_split("validation", &eval_set.validation, store)?;

        let classes: BTreeMap<usize, usize> = eval_set
            .train
            .labels
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .enumerate()
            .map(|(index, label)| (label, index))
            .collect();
        if classes.len() < 2 {
            return Err(PathEmbedError::Probe(format!(
                "training split needs at least two classes, found {}",
                classes.len()
            )));
        }

        let x_train = features(store, &eval_set.train.nodes);
        let x_val = features(store, &eval_set.validation.nodes);
        let (mean, std) = standardisation(&x_train);
        let x_train = (x_train - &mean) / &std;
        let x_val = (x_val - &mean) / &std;

        let y_train: Vec<usize> = eval_set.train.labels.iter().map(|l| classes[l]).collect();
        let (weights, bias) = self.fit(&x_train, &y_train, classes.len());

        let logits = x_val.dot(&weights) + &bias;
        let correct = logits
            .rows()
            .into_iter()
            .zip(&eval_set.validation.labels)
            .filter(|(row, label)| classes.get(*label) == Some(&argmax(row.iter())))
            .count();
        Ok(correct as f64 / eval_set.validation.len() as f64)
    }

    fn fit(&self, x: &Array2<f64>, y: &[usize], num_classes: usize) -> (Array2<f64>, Array1<f64>) {
        let (n, d) = x.dim();
        let l2 = 1.0 / n as f64;
        let mut targets = Array2::<f64>::zeros((n, num_classes));
        for (i, &class) in y.iter().enumerate() {
            targets[[i, class]] = 1.0;
        }

        let mut weights = Array2::<f64>::zeros((d, num_classes));
        let mut bias = Array1::<f64>::zeros(num_classes);
        for _ in 0..self.max_iter {
            let mut probs = x.dot(&weights) + &bias;
            softmax_rows(&mut probs);
            let residual = probs - &targets;

            let grad_w = x.t().dot(&residual) / n as f64 + &weights * l2;
            let grad_b = residual.sum_axis(Axis(0)) / n as f64;
            weights.scaled_add(-self.learning_rate, &grad_w);
            bias.scaled_add(-self.learning_rate, &grad_b);
        }
        (weights, bias)
    }
}

/// Run the default probe
pub fn evaluate(store: &EmbeddingStore, eval_set: &EvalSet) -> Result<f64> {
    ClassificationProbe::default().evaluate(store, eval_set)
}

fn check_split(name: &str, split: &LabeledNodes, store: &EmbeddingStore) -> Result<()> {
    if split.is_empty() {
        return Err(PathEmbedError::Probe(format!("{name} split is empty")));
    }
    if split.nodes.len() != split.labels.len() {
        return Err(PathEmbedError::Probe(format!(
            "{name} split has {} nodes but {} labels",
            split.nodes.len(),
            split.labels.len()
        )));
    }
    if let Some(&node) = split.nodes.iter().find(|&&n| n >= store.num_nodes()) {
        return Err(PathEmbedError::Probe(format!(
            "{name} split references node {node}, graph has {} nodes",
            store.num_nodes()
        )));
    }
    Ok(())
}

fn features(store: &EmbeddingStore, nodes: &[NodeId]) -> Array2<f64> {
    store.all().select(Axis(0), nodes).mapv(f64::from)
}

fn standardisation(x: &Array2<f64>) -> (Array1<f64>, Array1<f64>) {
    let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
    let std = x.std_axis(Axis(0), 0.0).mapv(|s| if s > 1e-12 { s } else { 1.0 });
    (mean, std)
}

fn softmax_rows(logits: &mut Array2<f64>) {
    for mut row in logits.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }
}

fn argmax<'a>(values: impl Iterator<Item = &'a f64>) -> usize {
    values
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, best_v), (i, &v)| {
            if v > best_v {
                (i, v)
            } else {
                (best, best_v)
            }
        })
        .0
}
