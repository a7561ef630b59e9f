//! Biased random-walk sampling of positive and negative training windows
//!
//! Positive examples come from second-order (node2vec-style) random walks:
//! given the previous node `prev` and the current node `cur`, the next node
//! `nxt` is drawn with probability proportional to
//!
//! ```text
//! weight(cur, nxt) * { 1/p  if nxt == prev
//!                    { 1    if nxt is a neighbour of prev
//!                    { 1/q  otherwise
//! ```
//!
//! Every walk of `walk_length` steps visits `walk_length + 1` nodes and records
//! the length of each traversed edge. Walks are cut into sliding windows of
//! `window_size` nodes; the distance vector of a window holds the per-step
//! lengths of the `window_size - 1` edges inside it.
//!
//! Negative examples are traces of the same shape made of a start node
//! followed by uniformly random node ids, windowed the same way so that every
//! batch carries exactly `num_negatives` negative windows per positive window.

use crate::config::PathEmbedConfig;
use crate::context::TrainingContext;
use crate::error::{PathEmbedError, Result};
use crate::graph::{Graph, NodeId};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::Arc;

/// One random-walk rollout
#[derive(Debug, Clone, PartialEq)]
pub struct Walk {
    /// Visited nodes, start included; padded with the sentinel after a dead end
    pub nodes: Vec<NodeId>,
    /// `lengths[i]` is the length of the edge `nodes[i] -> nodes[i + 1]`
    pub lengths: Vec<f32>,
    /// Whether the walk stopped early at a node without usable out-edges
    pub dead_end: bool,
}

impl Walk {
    /// Sliding windows of `window_size` nodes paired with the edge lengths inside them
    pub fn windows(&self, window_size: usize) -> impl Iterator<Item = (&[NodeId], &[f32])> + '_ {
        self.nodes
            .windows(window_size)
            .zip(self.lengths.windows(window_size - 1))
    }
}

/// Materialised training examples for one batch of start nodes
#[derive(Debug, Clone)]
pub struct SampleBatch {
    /// `P x W` positive windows
    pub pos_windows: Array2<NodeId>,
    /// `P x (W - 1)` per-step edge lengths of the positive windows
    pub pos_distances: Array2<f32>,
    /// `Q x W` negative windows, `Q = num_negatives * P`
    pub neg_windows: Array2<NodeId>,
    /// Walks that hit a dead end and were padded with the sentinel
    pub dead_end_walks: usize,
}

impl SampleBatch {
    pub fn num_positive(&self) -> usize {
        self.pos_windows.nrows()
    }

    pub fn num_negative(&self) -> usize {
        self.neg_windows.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.num_positive() == 0 && self.num_negative() == 0
    }

    /// Positive windows that contain the sentinel id
    pub fn masked_positive(&self, sentinel: NodeId) -> Vec<bool> {
        self.pos_windows
            .rows()
            .into_iter()
            .map(|row| row.iter().any(|&n| n == sentinel))
            .collect()
    }
}

/// Second-order biased random-walk sampler over an immutable graph
#[derive(Debug, Clone)]
pub struct WalkSampler {
    graph: Arc<Graph>,
    walk_length: usize,
    window_size: usize,
    num_walks: usize,
    num_negatives: usize,
    inv_p: f64,
    inv_q: f64,
    parallel: bool,
}

impl WalkSampler {
    pub fn new(graph: Arc<Graph>, config: &PathEmbedConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            graph,
            walk_length: config.walk_length,
            window_size: config.window_size,
            num_walks: config.num_walks,
            num_negatives: config.num_negatives,
            inv_p: 1.0 / config.p,
            inv_q: 1.0 / config.q,
            parallel: config.parallel_sampling,
        })
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Windows cut from a single walk or negative trace
    pub fn windows_per_walk(&self) -> usize {
        self.walk_length + 2 - self.window_size
    }

    /// Draw positive windows, their edge lengths and negative windows for a batch
    pub fn sample(&self, batch: &[NodeId], ctx: &mut TrainingContext) -> Result<SampleBatch> {
        for &node in batch {
            self.graph.check_node(node)?;
        }

        // Tile the batch `num_walks` times: b0 b1 .. bn b0 b1 .. bn ..
        let starts: Vec<NodeId> = (0..self.num_walks)
            .flat_map(|_| batch.iter().copied())
            .collect();
        let seeds: Vec<u64> = starts.iter().map(|_| ctx.fork_seed()).collect();

        let walks: Vec<Walk> = if self.parallel {
            starts
                .par_iter()
                .zip(seeds.par_iter())
                .map(|(&start, &seed)| self.walk(start, &mut StdRng::seed_from_u64(seed)))
                .collect()
        } else {
            starts
                .iter()
                .zip(seeds.iter())
                .map(|(&start, &seed)| self.walk(start, &mut StdRng::seed_from_u64(seed)))
                .collect()
        };

        let dead_end_walks = walks.iter().filter(|w| w.dead_end).count();
        let (pos_windows, pos_distances) = self.window_walks(&walks)?;

        let neg_starts: Vec<NodeId> = (0..self.num_negatives)
            .flat_map(|_| starts.iter().copied())
            .collect();
        let neg_windows = self.negative_windows(&neg_starts, ctx.rng())?;

        Ok(SampleBatch {
            pos_windows,
            pos_distances,
            neg_windows,
            dead_end_walks,
        })
    }

    /// Roll out one walk of `walk_length` steps from `start`
    pub fn walk<R: Rng + ?Sized>(&self, start: NodeId, rng: &mut R) -> Walk {
        let sentinel = self.graph.sentinel();
        let mut nodes = Vec::with_capacity(self.walk_length + 1);
        let mut lengths = Vec::with_capacity(self.walk_length);
        let mut scratch = Vec::new();
        nodes.push(start);

        let mut prev: Option<NodeId> = None;
        let mut cur = start;
        let mut dead_end = false;

        for _ in 0..self.walk_length {
            if !dead_end {
                match self.step(prev, cur, rng, &mut scratch) {
                    Some((next, length)) => {
                        nodes.push(next);
                        lengths.push(length);
                        prev = Some(cur);
                        cur = next;
                        continue;
                    }
                    None => dead_end = true,
                }
            }
            nodes.push(sentinel);
            lengths.push(0.0);
        }

        Walk {
            nodes,
            lengths,
            dead_end,
        }
    }

    /// Pick the successor of `cur`; `None` when `cur` has no usable out-edge
    fn step<R: Rng + ?Sized>(
        &self,
        prev: Option<NodeId>,
        cur: NodeId,
        rng: &mut R,
        scratch: &mut Vec<f64>,
    ) -> Option<(NodeId, f32)> {
        let neighbors = self.graph.neighbors(cur);
        if neighbors.is_empty() {
            return None;
        }
        let weights = self.graph.edge_weights(cur);

        scratch.clear();
        let mut total = 0.0f64;
        for (i, &next) in neighbors.iter().enumerate() {
            let weight = weights.map_or(1.0, |w| w[i] as f64);
            let bias = match prev {
                None => 1.0,
                Some(prev) if next == prev => self.inv_p,
                Some(prev) if self.graph.has_edge(prev, next) => 1.0,
                Some(_) => self.inv_q,
            };
            total += weight * bias;
            scratch.push(total);
        }
        if total <= 0.0 {
            return None;
        }

        let target = rng.gen::<f64>() * total;
        let idx = scratch
            .iter()
            .position(|&cum| target < cum)
            .unwrap_or(neighbors.len() - 1);
        Some((neighbors[idx], self.graph.edge_lengths(cur)[idx]))
    }

    /// Build the trace `[start, r_1, .., r_walk_length]` of uniformly random ids
    pub fn negative_trace<R: Rng + ?Sized>(&self, start: NodeId, rng: &mut R) -> Vec<NodeId> {
        let n = self.graph.num_nodes();
        let mut trace = Vec::with_capacity(self.walk_length + 1);
        trace.push(start);
        trace.extend((0..self.walk_length).map(|_| rng.gen_range(0..n)));
        trace
    }

    fn window_walks(&self, walks: &[Walk]) -> Result<(Array2<NodeId>, Array2<f32>)> {
        let w = self.window_size;
        let rows = walks.len() * self.windows_per_walk();
        let mut nodes = Vec::with_capacity(rows * w);
        let mut dists = Vec::with_capacity(rows * (w - 1));

        for walk in walks {
            for (window, lengths) in walk.windows(w) {
                nodes.extend_from_slice(window);
                dists.extend_from_slice(lengths);
            }
        }

        let pos_windows = to_matrix(nodes, rows, w)?;
        let pos_distances = to_matrix(dists, rows, w - 1)?;
        Ok((pos_windows, pos_distances))
    }

    fn negative_windows<R: Rng + ?Sized>(
        &self,
        starts: &[NodeId],
        rng: &mut R,
    ) -> Result<Array2<NodeId>> {
        let w = self.window_size;
        let rows = starts.len() * self.windows_per_walk();
        let mut nodes = Vec::with_capacity(rows * w);

        for &start in starts {
            let trace = self.negative_trace(start, rng);
            for window in trace.windows(w) {
                nodes.extend_from_slice(window);
            }
        }

        to_matrix(nodes, rows, w)
    }
}

fn to_matrix<T>(data: Vec<T>, rows: usize, cols: usize) -> Result<Array2<T>> {
    let actual = data.len();
    Array2::from_shape_vec((rows, cols), data).map_err(|_| PathEmbedError::ShapeMismatch {
        expected: format!("{rows}x{cols}"),
        actual: format!("{actual} elements"),
    })
}
