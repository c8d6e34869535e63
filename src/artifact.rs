//! Model artifact loading
//!
//! Artifacts are JSON files written by the training toolchain. Estimator
//! bundles (`knn`, `rf`) carry preprocessing and the fitted model in one
//! file; the neural variant keeps its layers in a network file next to a
//! preprocessing-only bundle. Every load re-reads the files from disk.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

use crate::config::ModelSource;
use crate::error::{ExoError, Result};
use crate::models::{Classifier, KnnClassifier, Network, NetworkSpec, RandomForestClassifier};
use crate::preprocessing::Preprocessing;

/// Fitted estimator stored in a bundle
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum EstimatorSpec {
    Knn(KnnClassifier),
    RandomForest(RandomForestClassifier),
}

#[derive(Debug, Deserialize)]
struct EstimatorBundle {
    #[serde(flatten)]
    preprocessing: Preprocessing,
    model: EstimatorSpec,
}

/// Preprocessing plus a ready-to-run classifier
#[derive(Debug)]
pub struct LoadedModel {
    pub preprocessing: Preprocessing,
    pub classifier: Box<dyn Classifier>,
}

impl LoadedModel {
    fn new(preprocessing: Preprocessing, classifier: Box<dyn Classifier>) -> Result<Self> {
        preprocessing.validate()?;

        if classifier.n_classes() != preprocessing.label_encoder.len() {
            return Err(ExoError::InvalidArtifact(format!(
                "{} model predicts {} classes but the label encoder has {}",
                classifier.name(),
                classifier.n_classes(),
                preprocessing.label_encoder.len()
            )));
        }
        if let Some(n) = classifier.n_features() {
            let declared = preprocessing.n_features();
            let fits = if classifier.exact_width() { n == declared } else { n <= declared };
            if !fits {
                return Err(ExoError::InvalidArtifact(format!(
                    "{} model expects {} features but the artifact declares {}",
                    classifier.name(),
                    n,
                    preprocessing.n_features()
                )));
            }
        }

        Ok(Self { preprocessing, classifier })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let artifact_error = |reason: String| ExoError::Artifact {
        path: path.display().to_string(),
        reason,
    };
    let bytes = std::fs::read(path).map_err(|e| artifact_error(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| artifact_error(e.to_string()))
}

/// Load only the preprocessing state of a model (feature names, means, encoders)
pub fn load_preprocessing(source: &ModelSource) -> Result<Preprocessing> {
    let preprocessing: Preprocessing = read_json(source.preprocessing_path())?;
    preprocessing.validate()?;
    Ok(preprocessing)
}

/// Load a model and its preprocessing from disk
pub fn load_model(source: &ModelSource) -> Result<LoadedModel> {
    match source {
        ModelSource::Bundle(path) => {
            let bundle: EstimatorBundle = read_json(path)?;
            let classifier: Box<dyn Classifier> = match bundle.model {
                EstimatorSpec::Knn(knn) => {
                    knn.validate()?;
                    Box::new(knn)
                }
                EstimatorSpec::RandomForest(mut forest) => {
                    forest.validate()?;
                    debug!(trees = forest.n_estimators(), "Validated forest");
                    Box::new(forest)
                }
            };
            debug!(path = %path.display(), model = classifier.name(), "Loaded estimator bundle");
            LoadedModel::new(bundle.preprocessing, classifier)
        }
        ModelSource::Network { model, preprocessing } => {
            let prep: Preprocessing = read_json(preprocessing)?;
            let spec: NetworkSpec = read_json(model)?;
            let network = Network::from_spec(spec, prep.n_features())?;
            debug!(
                path = %model.display(),
                layers = network.n_layers(),
                "Loaded network"
            );
            LoadedModel::new(prep, Box::new(network))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn write(dir: &Path, name: &str, value: serde_json::Value) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
        path
    }

    fn preprocessing_json() -> serde_json::Value {
        json!({
            "feature_names": ["a", "b"],
            "feature_means": {"a": 0.5, "b": 1.5},
            "scaler": {"kind": "identity"},
            "label_encoder": {"classes": ["no", "yes"]}
        })
    }

    #[test]
    fn test_load_knn_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let mut bundle = preprocessing_json();
        bundle["model"] = json!({
            "kind": "knn", "n_neighbors": 1, "n_classes": 2,
            "fit_x": [[0.0, 0.0], [1.0, 1.0]], "fit_y": [0, 1]
        });
        let path = write(dir.path(), "knn.json", bundle);

        let loaded = load_model(&ModelSource::Bundle(path.clone())).unwrap();
        assert_eq!(loaded.classifier.name(), "knn");
        assert_eq!(loaded.preprocessing.feature_names, vec!["a", "b"]);

        let prep = load_preprocessing(&ModelSource::Bundle(path)).unwrap();
        assert_eq!(prep.default_value("b"), 1.5);
    }

    #[test]
    fn test_class_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut bundle = preprocessing_json();
        bundle["model"] = json!({
            "kind": "random_forest", "n_classes": 3,
            "trees": [{"nodes": [{"kind": "leaf", "value": [1, 1, 1]}]}]
        });
        let path = write(dir.path(), "rf.json", bundle);

        let err = load_model(&ModelSource::Bundle(path)).unwrap_err();
        assert!(err.to_string().contains("label encoder has 2"));
    }

    #[test]
    fn test_knn_width_must_match_declared_features() {
        let dir = tempfile::tempdir().unwrap();
        let mut bundle = preprocessing_json();
        bundle["model"] = json!({
            "kind": "knn", "n_neighbors": 1, "n_classes": 2,
            "fit_x": [[0.0], [1.0]], "fit_y": [0, 1]
        });
        let path = write(dir.path(), "knn.json", bundle);

        let err = load_model(&ModelSource::Bundle(path)).unwrap_err();
        assert!(matches!(err, ExoError::InvalidArtifact(_)));
        assert!(err.to_string().contains("expects 1 features but the artifact declares 2"));
    }

    #[test]
    fn test_forest_may_use_fewer_features() {
        let dir = tempfile::tempdir().unwrap();
        let mut bundle = preprocessing_json();
        bundle["model"] = json!({
            "kind": "random_forest", "n_classes": 2,
            "trees": [{"nodes": [
                {"kind": "split", "feature": 0, "threshold": 0.5, "left": 1, "right": 2},
                {"kind": "leaf", "value": [1, 0]},
                {"kind": "leaf", "value": [0, 1]}
            ]}]
        });
        let path = write(dir.path(), "rf.json", bundle);

        let loaded = load_model(&ModelSource::Bundle(path)).unwrap();
        assert_eq!(loaded.classifier.n_features(), Some(1));
        assert!(!loaded.classifier.exact_width());
    }

    #[test]
    fn test_load_network() {
        let dir = tempfile::tempdir().unwrap();
        let prep = write(dir.path(), "prep.json", preprocessing_json());
        let model = write(
            dir.path(),
            "net.json",
            json!({"layers": [
                {"kind": "flatten"},
                {"kind": "dense", "kernel": [[1.0, 0.0], [0.0, 1.0]], "bias": [0.0, 0.0], "activation": "softmax"}
            ]}),
        );

        let loaded = load_model(&ModelSource::Network { model, preprocessing: prep }).unwrap();
        assert_eq!(loaded.classifier.name(), "cnn");
        assert_eq!(loaded.classifier.n_classes(), 2);
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = load_model(&ModelSource::Bundle(PathBuf::from("/nonexistent/knn.json"))).unwrap_err();
        assert!(matches!(err, ExoError::Artifact { .. }));
        assert!(err.to_string().contains("/nonexistent/knn.json"));
    }
}
