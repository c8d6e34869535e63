//! Preprocessing objects bundled with every model artifact
//!
//! - Fitted feature scalers (standard, min-max, robust)
//! - Label encoder for decoding class indices
//! - The feature alignment step turning a name → value mapping into a row

mod encoder;
mod scaler;

pub use encoder::LabelEncoder;
pub use scaler::FittedScaler;

use crate::error::{ExoError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Preprocessing state shared by all artifact kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preprocessing {
    /// Feature order the estimator was fitted on
    pub feature_names: Vec<String>,
    /// Training-set mean of each feature, offered to clients as defaults
    #[serde(default)]
    pub feature_means: BTreeMap<String, f64>,
    pub scaler: FittedScaler,
    pub label_encoder: LabelEncoder,
}

impl Preprocessing {
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.feature_names.is_empty() {
            return Err(ExoError::InvalidArtifact("feature_names is empty".to_string()));
        }
        if self.label_encoder.is_empty() {
            return Err(ExoError::InvalidArtifact("label encoder has no classes".to_string()));
        }
        self.scaler.validate(self.n_features())
    }

    /// Default value for a feature: its training mean, or 0.0
    pub fn default_value(&self, feature: &str) -> f64 {
        self.feature_means.get(feature).copied().unwrap_or(0.0)
    }

    /// Align a feature mapping with the declared feature order.
    ///
    /// Every declared feature must be present; unknown keys are ignored.
    pub fn align(&self, features: &serde_json::Map<String, serde_json::Value>) -> Result<Vec<f64>> {
        let missing: Vec<String> = self
            .feature_names
            .iter()
            .filter(|name| !features.contains_key(name.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ExoError::MissingFeatures(missing));
        }

        self.feature_names
            .iter()
            .map(|name| feature_value(name, &features[name.as_str()]))
            .collect()
    }

    /// Align, then scale a single feature mapping into a 1 x n matrix
    pub fn transform(&self, features: &serde_json::Map<String, serde_json::Value>) -> Result<Array2<f64>> {
        let row = self.align(features)?;
        let x = Array2::from_shape_vec((1, row.len()), row).map_err(|e| ExoError::ShapeError {
            expected: format!("1 x {}", self.n_features()),
            actual: e.to_string(),
        })?;
        self.scaler.transform(&x)
    }
}

fn feature_value(name: &str, value: &serde_json::Value) -> Result<f64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        Some(_) => Err(ExoError::InvalidFeature {
            name: name.to_string(),
            reason: "value must be finite".to_string(),
        }),
        None => Err(ExoError::InvalidFeature {
            name: name.to_string(),
            reason: format!("expected a number, got {}", value),
        }),
    }
}
