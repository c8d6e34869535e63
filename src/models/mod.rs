//! Inference-only estimators
//!
//! The estimators here never train; their parameters come from artifacts
//! produced by the external training toolchain.
//! - [`KnnClassifier`] - k-nearest-neighbors over the stored training set
//! - [`RandomForestClassifier`] - averaged leaf distributions of fitted trees
//! - [`Network`] - sequential 1-D convolutional network

mod knn;
mod network;
mod random_forest;

pub use knn::{DistanceMetric, KnnClassifier, WeightScheme};
pub use network::{Activation, LayerSpec, Network, NetworkSpec, Padding};
pub use random_forest::{DecisionTree, RandomForestClassifier, TreeNode};

use crate::error::Result;
use ndarray::Array2;

/// A fitted classifier producing class probabilities.
///
/// Column `i` of the probability matrix belongs to encoded class `i`.
pub trait Classifier: Send + Sync + std::fmt::Debug {
    /// Short algorithm name used in logs
    fn name(&self) -> &'static str;

    /// Number of classes in the probability output
    fn n_classes(&self) -> usize;

    /// Number of input features, when the estimator records it
    fn n_features(&self) -> Option<usize>;

    /// Whether inputs must have exactly `n_features` columns. Estimators
    /// that infer their width from the highest referenced column accept
    /// wider inputs.
    fn exact_width(&self) -> bool {
        true
    }

    /// Predict class probabilities, one row per sample
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Predict encoded class indices
    fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.rows().into_iter().map(|row| argmax(row.iter().copied())).collect())
    }
}

/// Index of the largest value; ties resolve to the lowest index
pub fn argmax(values: impl IntoIterator<Item = f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, v) in values.into_iter().enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}
