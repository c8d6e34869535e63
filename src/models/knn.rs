//! K-Nearest Neighbors classifier (inference only)
//!
//! Holds the scaled training set recorded in the artifact and votes among
//! the k closest stored samples.

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::Classifier;
use crate::error::{ExoError, Result};

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Euclidean distance (L2)
    #[default]
    Euclidean,
    /// Manhattan distance (L1)
    Manhattan,
    /// Minkowski distance with parameter p
    Minkowski(f64),
}

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeightScheme {
    /// All neighbors have equal weight
    #[default]
    Uniform,
    /// Closer neighbors have more weight (inverse distance)
    Distance,
}

/// K-Nearest Neighbors Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnClassifier {
    n_neighbors: usize,
    #[serde(default)]
    weights: WeightScheme,
    #[serde(default)]
    metric: DistanceMetric,
    n_classes: usize,
    /// Stored training samples, already scaled
    fit_x: Vec<Vec<f64>>,
    /// Encoded class of each training sample
    fit_y: Vec<usize>,
}

impl KnnClassifier {
    pub fn new(
        n_neighbors: usize,
        n_classes: usize,
        fit_x: Vec<Vec<f64>>,
        fit_y: Vec<usize>,
    ) -> Self {
        Self {
            n_neighbors,
            weights: WeightScheme::Uniform,
            metric: DistanceMetric::Euclidean,
            n_classes,
            fit_x,
            fit_y,
        }
    }

    pub fn with_weights(mut self, weights: WeightScheme) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Check the stored training set is usable
    pub fn validate(&self) -> Result<()> {
        if self.n_neighbors == 0 {
            return Err(ExoError::InvalidArtifact("n_neighbors must be at least 1".to_string()));
        }
        if self.fit_x.is_empty() {
            return Err(ExoError::InvalidArtifact("KNN training set is empty".to_string()));
        }
        if self.fit_x.len() != self.fit_y.len() {
            return Err(ExoError::InvalidArtifact(format!(
                "KNN has {} samples but {} labels",
                self.fit_x.len(),
                self.fit_y.len()
            )));
        }
        let width = self.fit_x[0].len();
        if self.fit_x.iter().any(|row| row.len() != width) {
            return Err(ExoError::InvalidArtifact("KNN samples have unequal widths".to_string()));
        }
        if let Some(&bad) = self.fit_y.iter().find(|&&y| y >= self.n_classes) {
            return Err(ExoError::InvalidArtifact(format!(
                "KNN label {} out of range for {} classes",
                bad, self.n_classes
            )));
        }
        if let DistanceMetric::Minkowski(p) = self.metric {
            if p.is_nan() || p < 1.0 {
                return Err(ExoError::InvalidArtifact(format!("invalid Minkowski p = {}", p)));
            }
        }
        Ok(())
    }

    fn class_probs(&self, point: &[f64]) -> Vec<f64> {
        let neighbors = find_k_nearest(point, &self.fit_x, &self.fit_y, self.n_neighbors, self.metric);
        class_probs_from(&neighbors, self.n_classes, self.weights)
    }
}

impl Classifier for KnnClassifier {
    fn name(&self) -> &'static str {
        "knn"
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn n_features(&self) -> Option<usize> {
        self.fit_x.first().map(Vec::len)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if let Some(width) = self.n_features() {
            if x.ncols() != width {
                return Err(ExoError::ShapeError {
                    expected: format!("{} features", width),
                    actual: format!("{} features", x.ncols()),
                });
            }
        }

        let probs: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .flat_map_iter(|i| {
                let row: Vec<f64> = x.row(i).to_vec();
                self.class_probs(&row)
            })
            .collect();

        Array2::from_shape_vec((x.nrows(), self.n_classes), probs).map_err(|e| ExoError::ShapeError {
            expected: format!("{} x {}", x.nrows(), self.n_classes),
            actual: e.to_string(),
        })
    }
}

/// Max-heap entry for partial sort (keeps k smallest distances)
#[derive(PartialEq)]
struct DistLabel(f64, usize);

impl Eq for DistLabel {}
impl PartialOrd for DistLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

/// Find k nearest neighbors using a max-heap, O(n log k)
fn find_k_nearest(
    point: &[f64],
    fit_x: &[Vec<f64>],
    fit_y: &[usize],
    k: usize,
    metric: DistanceMetric,
) -> Vec<(f64, usize)> {
    let mut heap = BinaryHeap::with_capacity(k + 1);

    for (row, &label) in fit_x.iter().zip(fit_y) {
        let dist = compute_distance(point, row, metric);
        if heap.len() < k {
            heap.push(DistLabel(dist, label));
        } else if let Some(top) = heap.peek() {
            if dist < top.0 {
                heap.pop();
                heap.push(DistLabel(dist, label));
            }
        }
    }

    heap.into_iter().map(|dl| (dl.0, dl.1)).collect()
}

fn compute_distance(a: &[f64], b: &[f64], metric: DistanceMetric) -> f64 {
    match metric {
        DistanceMetric::Euclidean => a
            .iter()
            .zip(b)
            .map(|(ai, bi)| {
                let d = ai - bi;
                d * d
            })
            .sum::<f64>()
            .sqrt(),
        DistanceMetric::Manhattan => a.iter().zip(b).map(|(ai, bi)| (ai - bi).abs()).sum(),
        DistanceMetric::Minkowski(p) => a
            .iter()
            .zip(b)
            .map(|(ai, bi)| (ai - bi).abs().powf(p))
            .sum::<f64>()
            .powf(1.0 / p),
    }
}

/// Neighbor votes normalized to probabilities.
///
/// With distance weighting, exact matches take all the weight.
fn class_probs_from(neighbors: &[(f64, usize)], n_classes: usize, weights: WeightScheme) -> Vec<f64> {
    let mut counts = vec![0.0; n_classes];
    let exact_match = neighbors.iter().any(|&(dist, _)| dist == 0.0);

    for &(dist, label) in neighbors {
        let weight = match weights {
            WeightScheme::Uniform => 1.0,
            WeightScheme::Distance if exact_match => {
                if dist == 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            WeightScheme::Distance => 1.0 / dist,
        };
        counts[label] += weight;
    }

    let total: f64 = counts.iter().sum();
    if total > 0.0 {
        counts.iter_mut().for_each(|c| *c /= total);
    }
    counts
}
