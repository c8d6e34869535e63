//! Model registry configuration
//!
//! Maps each dataset key to the artifacts of its models and to an optional
//! feature-mapping CSV. The registry is read from a TOML file:
//!
//! ```toml
//! [datasets.cumi]
//! feature_mapping = "cumi_feature_mapping.csv"
//!
//! [datasets.cumi.models]
//! knn = "knn_cumi_model.json"
//! rf = "rf_cumi_model.json"
//! cnn = { model = "best_model_cumi.json", preprocessing = "cnn_preprocessing_cumi.json" }
//! ```
//!
//! Relative paths resolve against the models directory.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ExoError, Result};

/// Where a model's artifacts live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelSource {
    /// Single bundle holding preprocessing and the fitted estimator
    Bundle(PathBuf),
    /// Network weights plus a separate preprocessing bundle
    Network { model: PathBuf, preprocessing: PathBuf },
}

impl ModelSource {
    fn resolve(self, base: &Path) -> Self {
        match self {
            Self::Bundle(path) => Self::Bundle(base.join(path)),
            Self::Network { model, preprocessing } => Self::Network {
                model: base.join(model),
                preprocessing: base.join(preprocessing),
            },
        }
    }

    /// Path of the file holding the preprocessing state
    pub fn preprocessing_path(&self) -> &Path {
        match self {
            Self::Bundle(path) => path,
            Self::Network { preprocessing, .. } => preprocessing,
        }
    }
}

/// Models available for one dataset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetModels {
    #[serde(default)]
    pub feature_mapping: Option<PathBuf>,
    #[serde(default)]
    pub models: BTreeMap<String, ModelSource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    datasets: BTreeMap<String, DatasetModels>,
}

/// Dataset → model → artifact lookup table
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    datasets: BTreeMap<String, DatasetModels>,
}

impl ModelRegistry {
    /// Parse a registry from TOML, resolving relative paths against `models_dir`
    pub fn from_toml(content: &str, models_dir: &Path) -> Result<Self> {
        let file: RegistryFile = toml::from_str(content)?;
        Ok(Self::from_datasets(file.datasets, models_dir))
    }

    /// Load a registry file
    pub fn load(path: &Path, models_dir: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExoError::Config(format!("cannot read model registry {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content, models_dir)
    }

    /// Built-in registry for the `k2pandc` and `cumi` datasets
    pub fn builtin(models_dir: &Path) -> Self {
        let dataset = |knn: &str, rf: &str, cnn: (&str, &str), mapping: &str| DatasetModels {
            feature_mapping: Some(PathBuf::from(mapping)),
            models: BTreeMap::from([
                ("knn".to_string(), ModelSource::Bundle(knn.into())),
                ("rf".to_string(), ModelSource::Bundle(rf.into())),
                (
                    "cnn".to_string(),
                    ModelSource::Network {
                        model: cnn.0.into(),
                        preprocessing: cnn.1.into(),
                    },
                ),
            ]),
        };

        let datasets = BTreeMap::from([
            (
                "k2pandc".to_string(),
                dataset(
                    "knn_model_k2_dispo.json",
                    "rf_model_k2_dispo.json",
                    ("best_model_k2_dispo.json", "cnn_preprocessing_k2_dispo.json"),
                    "k2pandc_feature_mapping.csv",
                ),
            ),
            (
                "cumi".to_string(),
                dataset(
                    "knn_cumi_model.json",
                    "rf_cumi_model.json",
                    ("best_model_cumi.json", "cnn_preprocessing_cumi.json"),
                    "cumi_feature_mapping.csv",
                ),
            ),
        ]);

        Self::from_datasets(datasets, models_dir)
    }

    fn from_datasets(datasets: BTreeMap<String, DatasetModels>, models_dir: &Path) -> Self {
        let datasets = datasets
            .into_iter()
            .map(|(name, entry)| {
                let resolved = DatasetModels {
                    feature_mapping: entry.feature_mapping.map(|p| models_dir.join(p)),
                    models: entry
                        .models
                        .into_iter()
                        .map(|(model, source)| (model, source.resolve(models_dir)))
                        .collect(),
                };
                (name, resolved)
            })
            .collect();
        Self { datasets }
    }

    pub fn dataset_names(&self) -> Vec<&str> {
        self.datasets.keys().map(String::as_str).collect()
    }

    /// Look up a dataset, failing with the list of valid choices
    pub fn dataset(&self, dataset: &str) -> Result<&DatasetModels> {
        self.datasets.get(dataset).ok_or_else(|| {
            ExoError::InvalidInput(format!(
                "Invalid dataset. Choose from: {:?}",
                self.dataset_names()
            ))
        })
    }

    /// Look up a model for a dataset, failing with the list of valid choices
    pub fn resolve(&self, dataset: &str, model: &str) -> Result<&ModelSource> {
        let entry = self.dataset(dataset)?;
        entry.models.get(model).ok_or_else(|| {
            let choices: Vec<&str> = entry.models.keys().map(String::as_str).collect();
            ExoError::InvalidInput(format!(
                "Invalid model for {}. Choose from: {:?}",
                dataset, choices
            ))
        })
    }

    pub fn feature_mapping_path(&self, dataset: &str) -> Result<Option<&Path>> {
        Ok(self.dataset(dataset)?.feature_mapping.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let registry = ModelRegistry::builtin(Path::new("/models"));
        assert_eq!(registry.dataset_names(), vec!["cumi", "k2pandc"]);

        let source = registry.resolve("cumi", "rf").unwrap();
        assert_eq!(source, &ModelSource::Bundle(PathBuf::from("/models/rf_cumi_model.json")));

        let cnn = registry.resolve("k2pandc", "cnn").unwrap();
        assert_eq!(
            cnn.preprocessing_path(),
            Path::new("/models/cnn_preprocessing_k2_dispo.json")
        );
    }

    #[test]
    fn test_invalid_choices_are_listed() {
        let registry = ModelRegistry::builtin(Path::new("models"));
        let err = registry.resolve("kepler", "knn").unwrap_err();
        assert!(err.to_string().contains("Invalid dataset"));
        assert!(err.to_string().contains("k2pandc"));

        let err = registry.resolve("cumi", "svm").unwrap_err();
        assert!(err.to_string().contains("Invalid model for cumi"));
        assert!(err.to_string().contains("knn"));
    }

    #[test]
    fn test_from_toml() {
        let registry = ModelRegistry::from_toml(
            r#"
            [datasets.toi]
            feature_mapping = "/abs/toi_mapping.csv"

            [datasets.toi.models]
            knn = "knn_toi.json"
            cnn = { model = "net.json", preprocessing = "prep.json" }
            "#,
            Path::new("/srv/models"),
        )
        .unwrap();

        assert_eq!(
            registry.resolve("toi", "knn").unwrap(),
            &ModelSource::Bundle(PathBuf::from("/srv/models/knn_toi.json"))
        );
        assert_eq!(
            registry.resolve("toi", "cnn").unwrap(),
            &ModelSource::Network {
                model: PathBuf::from("/srv/models/net.json"),
                preprocessing: PathBuf::from("/srv/models/prep.json"),
            }
        );
        // absolute paths are kept as-is
        assert_eq!(
            registry.feature_mapping_path("toi").unwrap(),
            Some(Path::new("/abs/toi_mapping.csv"))
        );
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = ModelRegistry::from_toml("datasets = 3", Path::new(".")).unwrap_err();
        assert!(matches!(err, ExoError::Config(_)));
    }
}
