//! Mapping between embedding similarity and travel distance
//!
//! A pair at distance `d` is trained towards the similarity `c / (c + d)`,
//! which is `1` for coincident nodes and decays towards `0` as `d` grows. The
//! inverse `c * (1 - s) / s` turns a learned similarity back into a distance.

use serde::{Deserialize, Serialize};

/// Smallest value `c` may take
pub const MIN_C: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceDecoder {
    c: f32,
    trainable: bool,
}

impl DistanceDecoder {
    pub fn new(c: f32, trainable: bool) -> Self {
        Self {
            c: c.max(MIN_C),
            trainable,
        }
    }

    pub fn c(&self) -> f32 {
        self.c
    }

    pub fn is_trainable(&self) -> bool {
        self.trainable
    }

    /// Set `c`, clamped to [`MIN_C`]
    pub fn set_c(&mut self, c: f32) {
        self.c = if c.is_nan() { MIN_C } else { c.max(MIN_C) };
    }

    /// `c / (c + d)`
    pub fn target_similarity(&self, distance: f32) -> f32 {
        self.c / (self.c + distance)
    }

    /// Derivative of [`DistanceDecoder::target_similarity`] with respect to `c`
    pub fn target_grad_c(&self, distance: f32) -> f32 {
        let denom = self.c + distance;
        distance / (denom * denom)
    }

    /// `c * (1 - s) / s`, or `None` when the similarity carries no distance
    pub fn implied_distance(&self, similarity: f64) -> Option<f64> {
        if similarity <= 0.0 || similarity.is_nan() {
            return None;
        }
        let c = self.c as f64;
        Some(c * (1.0 - similarity) / similarity)
    }
}

#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_similarity_range() {
        let decoder = DistanceDecoder::new(10.0, false);
        assert_eq!(decoder.target_similarity(0.0), 1.0);
        assert!((decoder.target_similarity(10.0) - 0.5).abs() < 1e-6);
        let mut last = 1.0;
        for d in [0.5, 1.0, 5.0, 50.0, 5000.0] {
            let s = decoder.target_similarity(d);
            assert!(s > 0.0 && s < last);
            last = s;
        }
    }

    #[test]
    fn test_round_trip() {
        let decoder = DistanceDecoder::new(3.0, false);
        for d in [0.0f32, 0.25, 1.0, 7.5, 120.0] {
            let s = decoder.target_similarity(d) as f64;
            let back = decoder.implied_distance(s).unwrap();
            assert!((back - d as f64).abs() < 1e-3 * (1.0 + d as f64), "{d} -> {back}");
        }
        assert_eq!(decoder.implied_distance(1.0), Some(0.0));
    }

    #[test]
    fn test_zero_similarity_is_unknown() {
        let decoder = DistanceDecoder::new(3.0, false);
        assert_eq!(decoder.implied_distance(0.0), None);
        assert_eq!(decoder.implied_distance(-0.1), None);
    }

    #[test]
    fn test_c_is_clamped() {
        let mut decoder = DistanceDecoder::new(1.0, true);
        decoder.set_c(-5.0);
        assert_eq!(decoder.c(), MIN_C);
        decoder.set_c(f32::NAN);
        assert_eq!(decoder.c(), MIN_C);
        assert_eq!(DistanceDecoder::new(0.0, false).c(), MIN_C);
    }

    #[test]
    fn test_grad_c_matches_finite_difference() {
        let d = 4.0f32;
        let h = 1e-3f32;
        let decoder = DistanceDecoder::new(2.0, true);
        let numeric = (DistanceDecoder::new(2.0 + h, true).target_similarity(d)
            - DistanceDecoder::new(2.0 - h, true).target_similarity(d))
            / (2.0 * h);
        assert!((numeric - decoder.target_grad_c(d)).abs() < 1e-3);
    }

    #[test]
    fn test_sigmoid() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(20.0) > 0.999);
        assert!(sigmoid(-20.0) < 0.001);
    }
}
