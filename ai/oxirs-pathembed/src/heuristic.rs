//! Distance heuristics for best-first search
//!
//! A search engine only needs an estimate `h(u, v)` of the remaining travel
//! cost between two nodes. [`DistanceHeuristic`] is that capability; the
//! learned [`EmbeddingHeuristic`] sits next to the classic geographic and zero
//! estimates so callers can swap them freely.

use crate::decoder::{sigmoid, DistanceDecoder};
use crate::embedding::EmbeddingStore;
use crate::error::{PathEmbedError, Result};
use crate::graph::NodeId;
use crate::persistence::EmbeddingSnapshot;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Mean earth radius in metres
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Default bound on memoised pairs of an [`EmbeddingHeuristic`]
pub const DEFAULT_CACHE_CAPACITY: usize = 1 << 20;

pub trait DistanceHeuristic: Send + Sync {
    /// Estimated travel cost from `u` to `v`
    fn distance(&self, u: NodeId, v: NodeId) -> f64;

    fn name(&self) -> &'static str;
}

/// What an embedding heuristic reports for a pair whose similarity carries no distance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroSimilarityPolicy {
    /// Report `f64::INFINITY`
    #[default]
    Unknown,
    /// Report `0.0`
    Zero,
}

/// Heuristic decoded from the dot product of two learned node vectors
///
/// Estimates are memoised per `(u, v)` pair. The memo holds at most
/// `cache_capacity` pairs and is emptied when it fills up; call
/// [`EmbeddingHeuristic::clear_cache`] between unrelated searches to keep it small.
#[derive(Debug)]
pub struct EmbeddingHeuristic {
    store: EmbeddingStore,
    decoder: DistanceDecoder,
    policy: ZeroSimilarityPolicy,
    cache_capacity: usize,
    cache: RwLock<HashMap<(NodeId, NodeId), f64>>,
}

impl EmbeddingHeuristic {
    pub fn new(store: EmbeddingStore, decoder: DistanceDecoder) -> Self {
        Self {
            store,
            decoder,
            policy: ZeroSimilarityPolicy::default(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_snapshot(snapshot: &EmbeddingSnapshot) -> Result<Self> {
        let (store, decoder) = snapshot.restore()?;
        Ok(Self::new(store, decoder))
    }

    pub fn with_policy(mut self, policy: ZeroSimilarityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ZeroSimilarityPolicy {
        self.policy
    }

    /// Bound the memo to `capacity` pairs; `0` disables memoisation
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self.cache.get_mut().clear();
        self
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache_capacity
    }

    /// Estimate with a range check on both node ids
    pub fn try_distance(&self, u: NodeId, v: NodeId) -> Result<f64> {
        let num_nodes = self.store.num_nodes();
        for node in [u, v] {
            if node >= num_nodes {
                return Err(PathEmbedError::InvalidNode { node, num_nodes });
            }
        }
        Ok(self.distance(u, v))
    }

    /// Pairs currently memoised
    pub fn cached_pairs(&self) -> usize {
        self.cache.read().len()
    }

    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    fn no_distance(&self) -> f64 {
        match self.policy {
            ZeroSimilarityPolicy::Unknown => f64::INFINITY,
            ZeroSimilarityPolicy::Zero => 0.0,
        }
    }

    fn estimate(&self, u: NodeId, v: NodeId) -> f64 {
        let similarity = sigmoid(self.store.dot(u, v)) as f64;
        self.decoder
            .implied_distance(similarity)
            .unwrap_or_else(|| self.no_distance())
    }
}

impl DistanceHeuristic for EmbeddingHeuristic {
    /// Ids outside `0..num_nodes`, the padding row included, carry no distance
    fn distance(&self, u: NodeId, v: NodeId) -> f64 {
        let num_nodes = self.store.num_nodes();
        if u >= num_nodes || v >= num_nodes {
            return self.no_distance();
        }
        if let Some(&cached) = self.cache.read().get(&(u, v)) {
            return cached;
        }
        let estimate = self.estimate(u, v);
        if self.cache_capacity > 0 {
            let mut cache = self.cache.write();
            if cache.len() >= self.cache_capacity {
                cache.clear();
            }
            cache.insert((u, v), estimate);
        }
        estimate
    }

    fn name(&self) -> &'static str {
        "embedding"
    }
}

/// Great-circle distance between node coordinates
#[derive(Debug, Clone)]
pub struct GeographicHeuristic {
    /// `(latitude, longitude)` in degrees per node
    coordinates: Vec<(f64, f64)>,
}

impl GeographicHeuristic {
    pub fn new(coordinates: Vec<(f64, f64)>) -> Self {
        Self { coordinates }
    }

    /// Haversine distance in metres between two `(lat, lon)` points in degrees
    pub fn haversine(a: (f64, f64), b: (f64, f64)) -> f64 {
        let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
        let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
        let dlat = lat2 - lat1;
        let dlon = lon2 - lon1;
        let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
    }
}

impl DistanceHeuristic for GeographicHeuristic {
    /// Unknown nodes are estimated as `0.0`, which keeps the estimate admissible
    fn distance(&self, u: NodeId, v: NodeId) -> f64 {
        match (self.coordinates.get(u), self.coordinates.get(v)) {
            (Some(&a), Some(&b)) => Self::haversine(a, b),
            _ => 0.0,
        }
    }

    fn name(&self) -> &'static str {
        "geographic"
    }
}

/// Always zero; reduces A* to Dijkstra
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroHeuristic;

impl DistanceHeuristic for ZeroHeuristic {
    fn distance(&self, _u: NodeId, _v: NodeId) -> f64 {
        0.0
    }

    fn name(&self) -> &'static str {
        "zero"
    }
}
