//! Fitted feature scalers carried inside model artifacts

use crate::error::{ExoError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// A scaler whose parameters were fitted by the training toolchain.
///
/// Parameters are stored per feature, in the artifact's feature order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedScaler {
    /// Standard scaling (z-score normalization): (x - mean) / scale
    Standard { mean: Vec<f64>, scale: Vec<f64> },
    /// Min-Max scaling: x * scale + min
    MinMax { min: Vec<f64>, scale: Vec<f64> },
    /// Robust scaling using median and IQR: (x - center) / scale
    Robust { center: Vec<f64>, scale: Vec<f64> },
    /// No scaling
    Identity,
}

impl FittedScaler {
    /// Number of features the scaler was fitted on, if it carries parameters
    pub fn n_features(&self) -> Option<usize> {
        match self {
            Self::Standard { mean, .. } => Some(mean.len()),
            Self::MinMax { min, .. } => Some(min.len()),
            Self::Robust { center, .. } => Some(center.len()),
            Self::Identity => None,
        }
    }

    /// Check internal consistency and agreement with the feature count
    pub fn validate(&self, n_features: usize) -> Result<()> {
        let (a, b) = match self {
            Self::Standard { mean, scale } => (mean.len(), scale.len()),
            Self::MinMax { min, scale } => (min.len(), scale.len()),
            Self::Robust { center, scale } => (center.len(), scale.len()),
            Self::Identity => return Ok(()),
        };
        if a != b {
            return Err(ExoError::InvalidArtifact(format!(
                "scaler parameter lengths differ ({} vs {})",
                a, b
            )));
        }
        if a != n_features {
            return Err(ExoError::InvalidArtifact(format!(
                "scaler fitted on {} features but artifact declares {}",
                a, n_features
            )));
        }
        Ok(())
    }

    /// Transform a batch of rows
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if let Some(n) = self.n_features() {
            if x.ncols() != n {
                return Err(ExoError::ShapeError {
                    expected: format!("{} features", n),
                    actual: format!("{} features", x.ncols()),
                });
            }
        }

        let scaled = match self {
            Self::Standard { mean, scale } => centered(x, mean, scale),
            Self::Robust { center, scale } => centered(x, center, scale),
            Self::MinMax { min, scale } => {
                let min = Array1::from_vec(min.clone());
                let scale = Array1::from_vec(scale.clone());
                x * &scale + &min
            }
            Self::Identity => x.clone(),
        };

        Ok(scaled)
    }
}

fn centered(x: &Array2<f64>, center: &[f64], scale: &[f64]) -> Array2<f64> {
    let center = Array1::from_vec(center.to_vec());
    // zero-variance features are stored with unit scale
    let scale = Array1::from_iter(scale.iter().map(|&s| if s == 0.0 { 1.0 } else { s }));
    (x - &center) / &scale
}
