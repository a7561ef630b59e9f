//! Immutable weighted graph consumed by the walk sampler
//!
//! The graph is stored in compressed sparse row form: the outgoing edges of
//! node `u` occupy `offsets[u]..offsets[u + 1]` of the edge arrays and are
//! sorted by target, which keeps the "is `x` adjacent to `y`" test of the
//! second-order walk a binary search.

use crate::error::{PathEmbedError, Result};
use serde::{Deserialize, Serialize};

/// Dense node identifier in `0..num_nodes`
pub type NodeId = usize;

/// A directed edge as handed in by a graph loader
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub source: NodeId,
    pub target: NodeId,
    /// Travel cost of the edge
    pub length: f32,
    /// Unnormalised transition weight, `None` means uniform
    pub weight: Option<f32>,
}

/// Incremental builder for [`Graph`]
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    num_nodes: usize,
    edges: Vec<EdgeSpec>,
}

impl GraphBuilder {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            num_nodes,
            edges: Vec::new(),
        }
    }

    /// Add a directed edge with uniform transition weight
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, length: f32) -> &mut Self {
        self.edges.push(EdgeSpec {
            source,
            target,
            length,
            weight: None,
        });
        self
    }

    /// Add a directed edge with an explicit transition weight
    pub fn add_weighted_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        length: f32,
        weight: f32,
    ) -> &mut Self {
        self.edges.push(EdgeSpec {
            source,
            target,
            length,
            weight: Some(weight),
        });
        self
    }

    /// Add both directions of an edge
    pub fn add_undirected_edge(&mut self, u: NodeId, v: NodeId, length: f32) -> &mut Self {
        self.add_edge(u, v, length);
        self.add_edge(v, u, length)
    }

    pub fn extend<I: IntoIterator<Item = EdgeSpec>>(&mut self, edges: I) -> &mut Self {
        self.edges.extend(edges);
        self
    }

    pub fn build(&self) -> Result<Graph> {
        Graph::from_edges(self.num_nodes, &self.edges)
    }
}

/// Immutable directed graph with per-edge lengths and optional weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    num_nodes: usize,
    offsets: Vec<usize>,
    targets: Vec<NodeId>,
    lengths: Vec<f32>,
    weights: Option<Vec<f32>>,
}

impl Graph {
    /// Build a graph from a list of directed edges
    ///
    /// Lengths must be finite and non-negative; weights, when present, must be
    /// finite and non-negative. Edges without a weight count as weight `1.0`
    /// as soon as any other edge carries one.
    pub fn from_edges(num_nodes: usize, edges: &[EdgeSpec]) -> Result<Self> {
        if num_nodes == 0 {
            return Err(PathEmbedError::InvalidGraph(
                "graph must contain at least one node".to_string(),
            ));
        }

        for edge in edges {
            for node in [edge.source, edge.target] {
                if node >= num_nodes {
                    return Err(PathEmbedError::InvalidNode { node, num_nodes });
                }
            }
            if !(edge.length.is_finite() && edge.length >= 0.0) {
                return Err(PathEmbedError::InvalidGraph(format!(
                    "edge {} -> {} has invalid length {}",
                    edge.source, edge.target, edge.length
                )));
            }
            if let Some(weight) = edge.weight {
                if !(weight.is_finite() && weight >= 0.0) {
                    return Err(PathEmbedError::InvalidGraph(format!(
                        "edge {} -> {} has invalid weight {}",
                        edge.source, edge.target, weight
                    )));
                }
            }
        }

        let weighted = edges.iter().any(|e| e.weight.is_some());

        let mut sorted: Vec<&EdgeSpec> = edges.iter().collect();
        sorted.sort_by_key(|e| (e.source, e.target));

        let mut offsets = vec![0usize; num_nodes + 1];
        for edge in &sorted {
            offsets[edge.source + 1] += 1;
        }
        for i in 0..num_nodes {
            offsets[i + 1] += offsets[i];
        }

        let targets = sorted.iter().map(|e| e.target).collect();
        let lengths = sorted.iter().map(|e| e.length).collect();
        let weights = weighted.then(|| sorted.iter().map(|e| e.weight.unwrap_or(1.0)).collect());

        Ok(Self {
            num_nodes,
            offsets,
            targets,
            lengths,
            weights,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_edges(&self) -> usize {
        self.targets.len()
    }

    /// Id used to pad walks that hit a dead end; equals `num_nodes`
    pub fn sentinel(&self) -> NodeId {
        self.num_nodes
    }

    pub fn is_weighted(&self) -> bool {
        self.weights.is_some()
    }

    fn range(&self, node: NodeId) -> std::ops::Range<usize> {
        self.offsets[node]..self.offsets[node + 1]
    }

    /// Sorted outgoing neighbours of `node`
    pub fn neighbors(&self, node: NodeId) -> &[NodeId] {
        &self.targets[self.range(node)]
    }

    /// Lengths of the outgoing edges of `node`, aligned with [`Graph::neighbors`]
    pub fn edge_lengths(&self, node: NodeId) -> &[f32] {
        &self.lengths[self.range(node)]
    }

    /// Transition weights of the outgoing edges of `node`, if the graph has any
    pub fn edge_weights(&self, node: NodeId) -> Option<&[f32]> {
        let range = self.range(node);
        self.weights.as_ref().map(|w| &w[range])
    }

    pub fn out_degree(&self, node: NodeId) -> usize {
        self.offsets[node + 1] - self.offsets[node]
    }

    /// Whether a directed edge `source -> target` exists
    pub fn has_edge(&self, source: NodeId, target: NodeId) -> bool {
        source < self.num_nodes && self.neighbors(source).binary_search(&target).is_ok()
    }

    /// Length of the shortest parallel edge `source -> target`
    pub fn edge_length(&self, source: NodeId, target: NodeId) -> Option<f32> {
        if source >= self.num_nodes {
            return None;
        }
        self.neighbors(source)
            .iter()
            .zip(self.edge_lengths(source))
            .filter(|(t, _)| **t == target)
            .map(|(_, l)| *l)
            .reduce(f32::min)
    }

    /// Mean edge length, or `0.0` for an edgeless graph
    pub fn mean_edge_length(&self) -> f32 {
        if self.lengths.is_empty() {
            return 0.0;
        }
        self.lengths.iter().sum::<f32>() / self.lengths.len() as f32
    }

    pub fn check_node(&self, node: NodeId) -> Result<()> {
        if node < self.num_nodes {
            Ok(())
        } else {
            Err(PathEmbedError::InvalidNode {
                node,
                num_nodes: self.num_nodes,
            })
        }
    }
}
