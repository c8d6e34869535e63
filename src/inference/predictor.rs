//! Single and batch prediction

use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

use crate::artifact::{self, LoadedModel};
use crate::config::ModelSource;
use crate::error::{ExoError, Result};
use crate::models::argmax;
use crate::preprocessing::Preprocessing;

/// Predicted label with a confidence percentage for every known class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub prediction: String,
    pub confidence_scores: BTreeMap<String, f64>,
}

/// A loaded model ready to answer prediction requests
#[derive(Debug)]
pub struct Predictor {
    model: LoadedModel,
}

impl Predictor {
    pub fn new(model: LoadedModel) -> Self {
        Self { model }
    }

    /// Load the model's artifacts from disk
    pub fn load(source: &ModelSource) -> Result<Self> {
        Ok(Self::new(artifact::load_model(source)?))
    }

    pub fn preprocessing(&self) -> &Preprocessing {
        &self.model.preprocessing
    }

    /// Predict one feature mapping
    pub fn predict(&self, features: &serde_json::Map<String, serde_json::Value>) -> Result<Prediction> {
        let start = Instant::now();
        let prep = &self.model.preprocessing;

        let x = prep.transform(features)?;
        let proba = self.model.classifier.predict_proba(&x)?;
        let row = proba.row(0);

        let best = argmax(row.iter().copied());
        let label = prep.label_encoder.inverse_transform(best)?.to_string();

        let confidence_scores = prep
            .label_encoder
            .classes()
            .iter()
            .zip(row.iter())
            .map(|(class, p)| (class.clone(), p * 100.0))
            .collect();

        debug!(
            model = self.model.classifier.name(),
            prediction = %label,
            latency_us = start.elapsed().as_micros() as u64,
            "Prediction complete"
        );

        Ok(Prediction { prediction: label, confidence_scores })
    }

    /// Predict many samples; each sample succeeds or fails on its own
    pub fn predict_batch(&self, samples: &[serde_json::Value]) -> Vec<Result<Prediction>> {
        samples
            .par_iter()
            .map(|sample| {
                let features = sample.as_object().ok_or_else(|| {
                    ExoError::InvalidInput("sample must be an object of feature values".to_string())
                })?;
                self.predict(features)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Classifier, DecisionTree, RandomForestClassifier, TreeNode};
    use crate::preprocessing::{FittedScaler, LabelEncoder};
    use serde_json::json;

    fn predictor() -> Predictor {
        let preprocessing = Preprocessing {
            feature_names: vec!["koi_score".into()],
            feature_means: BTreeMap::new(),
            scaler: FittedScaler::Standard { mean: vec![0.5], scale: vec![0.5] },
            label_encoder: LabelEncoder::new(vec!["FALSE POSITIVE".into(), "CONFIRMED".into()]),
        };
        // scaled koi_score <= 0 → mostly false positive
        let mut forest = RandomForestClassifier::new(
            2,
            vec![DecisionTree::new(vec![
                TreeNode::Split { feature: 0, threshold: 0.0, left: 1, right: 2 },
                TreeNode::Leaf { value: vec![9.0, 1.0] },
                TreeNode::Leaf { value: vec![1.0, 3.0] },
            ])],
        );
        forest.validate().unwrap();
        let classifier: Box<dyn Classifier> = Box::new(forest);
        Predictor::new(LoadedModel { preprocessing, classifier })
    }

    #[test]
    fn test_predict_formats_percentages() {
        let p = predictor();
        let features = json!({"koi_score": 0.9});
        let result = p.predict(features.as_object().unwrap()).unwrap();

        assert_eq!(result.prediction, "CONFIRMED");
        assert!((result.confidence_scores["CONFIRMED"] - 75.0).abs() < 1e-9);
        let total: f64 = result.confidence_scores.values().sum();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_batch_reports_each_sample() {
        let p = predictor();
        let samples = vec![json!({"koi_score": 0.1}), json!({"other": 1.0}), json!(42)];
        let results = p.predict_batch(&samples);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().prediction, "FALSE POSITIVE");
        assert!(matches!(results[1], Err(ExoError::MissingFeatures(_))));
        assert!(matches!(results[2], Err(ExoError::InvalidInput(_))));
    }
}
