//! Shared fixtures: a models directory with small hand-written artifacts

#![allow(dead_code)]

use axum::body::Body;
use axum::http::Response;
use exoserve::config::ModelRegistry;
use exoserve::server::{create_router, AppState, ServerConfig};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestEnv {
    pub models: TempDir,
    pub uploads: TempDir,
    pub config: ServerConfig,
    pub registry: ModelRegistry,
}

impl TestEnv {
    pub fn app(&self) -> axum::Router {
        let state = Arc::new(AppState::new(&self.config, self.registry.clone()).unwrap());
        create_router(state, &self.config)
    }
}

const REGISTRY: &str = r#"
[datasets.koi]
feature_mapping = "koi_feature_mapping.csv"

[datasets.koi.models]
knn = "knn_koi.json"
rf = "rf_koi.json"
cnn = { model = "cnn_koi.json", preprocessing = "cnn_preprocessing_koi.json" }

[datasets.toi.models]
knn = "knn_toi.json"
"#;

const MAPPING: &str = "feature_name,display_name,description,type\n\
    koi_period,Orbital Period,Days between transits,numeric\n";

fn preprocessing() -> Value {
    json!({
        "feature_names": ["koi_period", "koi_depth"],
        "feature_means": {"koi_period": 10.0, "koi_depth": 500.0},
        "scaler": {"kind": "identity"},
        "label_encoder": {"classes": ["CONFIRMED", "FALSE POSITIVE"]}
    })
}

fn write_json(dir: &Path, name: &str, value: &Value) {
    std::fs::write(dir.join(name), serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

pub fn setup() -> TestEnv {
    let models = tempfile::tempdir().unwrap();
    let uploads = tempfile::tempdir().unwrap();
    let dir = models.path();

    let mut knn = preprocessing();
    knn["model"] = json!({
        "kind": "knn",
        "n_neighbors": 1,
        "n_classes": 2,
        "fit_x": [[10.0, 100.0], [1.0, 1000.0]],
        "fit_y": [0, 1]
    });
    write_json(dir, "knn_koi.json", &knn);

    let mut rf = preprocessing();
    rf["model"] = json!({
        "kind": "random_forest",
        "n_classes": 2,
        "trees": [{"nodes": [
            {"kind": "split", "feature": 0, "threshold": 5.0, "left": 1, "right": 2},
            {"kind": "leaf", "value": [0.0, 4.0]},
            {"kind": "leaf", "value": [3.0, 1.0]}
        ]}]
    });
    write_json(dir, "rf_koi.json", &rf);

    write_json(dir, "cnn_preprocessing_koi.json", &preprocessing());
    write_json(
        dir,
        "cnn_koi.json",
        &json!({"layers": [
            {"kind": "conv1d", "kernel": [[[0.01, -0.01]]], "bias": [0.0, 0.0], "activation": "relu"},
            {"kind": "global_average_pooling1d"},
            {"kind": "dropout", "rate": 0.2},
            {"kind": "dense", "kernel": [[1.0, 0.0], [0.0, 1.0]], "bias": [0.0, 0.0], "activation": "softmax"}
        ]}),
    );

    std::fs::write(dir.join("koi_feature_mapping.csv"), MAPPING).unwrap();

    let registry = ModelRegistry::from_toml(REGISTRY, dir).unwrap();
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        uploads_dir: uploads.path().to_path_buf(),
        models_dir: dir.to_path_buf(),
        registry_path: None,
        max_upload_size: 1024 * 1024,
        cors_origin: None,
    };

    TestEnv { models, uploads, config, registry }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 64).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
