//! HTTP request handlers

use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::artifact;
use crate::catalog::model_catalog;
use crate::datasets::{parse_preview_rows, UploadRequest};
use crate::features::{feature_details, FeatureMapping};
use crate::inference::Predictor;

use super::error::{Result, ServerError};
use super::state::AppState;

fn default_dataset() -> String {
    "k2pandc".to_string()
}

fn default_model() -> String {
    "knn".to_string()
}

/// Run file I/O and inference on the blocking pool
async fn blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ServerError::Internal(format!("Worker task failed: {}", e)))?
}

fn json_rejection(rejection: JsonRejection) -> ServerError {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => ServerError::BadRequest("No JSON data provided".to_string()),
        other => ServerError::BadRequest(format!("Invalid JSON data: {}", other.body_text())),
    }
}

/// `{"success": true, ..payload}`
fn success(payload: impl Serialize) -> Result<Json<Value>> {
    let mut body = Map::new();
    body.insert("success".to_string(), Value::Bool(true));
    match serde_json::to_value(payload).map_err(|e| ServerError::Internal(e.to_string()))? {
        Value::Object(fields) => body.extend(fields),
        other => {
            body.insert("data".to_string(), other);
        }
    }
    Ok(Json(Value::Object(body)))
}

// ============================================================================
// Service Handlers
// ============================================================================

pub async fn index() -> Json<Value> {
    Json(json!({
        "message": "Exoplanet Prediction API",
        "endpoints": {
            "/predict": "POST - Make predictions",
            "/batch_predict": "POST - Make predictions for multiple samples",
            "/get_features": "GET - Get required features for a dataset",
            "/get_feature_mapping/<dataset>": "GET - Get feature display names and descriptions",
            "/models": "GET - List available models",
            "/upload_dataset": "POST - Upload custom dataset",
            "/list_datasets": "GET - List all uploaded datasets",
            "/dataset_info/<name>": "GET - Get dataset information",
            "/preview_dataset/<name>": "GET - Preview dataset rows",
            "/download_dataset/<name>": "GET - Download dataset",
            "/delete_dataset/<name>": "DELETE - Delete dataset",
            "/health": "GET - Health check",
        }
    }))
}

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn list_models() -> Json<Value> {
    Json(json!({
        "success": true,
        "models": model_catalog(),
    }))
}

// ============================================================================
// Prediction Handlers
// ============================================================================

#[derive(Deserialize)]
pub struct FeaturesQuery {
    dataset: Option<String>,
    model: Option<String>,
}

/// Feature names, display metadata and defaults for one model.
/// Every failure is reported with HTTP 200.
pub async fn get_features(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeaturesQuery>,
) -> Result<Json<Value>> {
    let dataset = query.dataset.unwrap_or_else(default_dataset);
    let model = query.model.unwrap_or_else(default_model);

    let source = state
        .registry
        .resolve(&dataset, &model)
        .map_err(ServerError::reported)?
        .clone();
    let mapping_path = state
        .registry
        .feature_mapping_path(&dataset)
        .map_err(ServerError::reported)?
        .map(|p| p.to_path_buf());

    let (prep, mapping) = blocking(move || {
        let prep = artifact::load_preprocessing(&source).map_err(ServerError::reported)?;
        Ok((prep, FeatureMapping::load_optional(mapping_path.as_deref())))
    })
    .await?;

    let details = feature_details(&prep, mapping.as_ref());
    Ok(Json(json!({
        "success": true,
        "dataset": dataset,
        "model": model,
        "features": prep.feature_names,
        "feature_details": details,
        "feature_defaults": prep.feature_means,
    })))
}

#[derive(Deserialize)]
pub struct PredictRequest {
    #[serde(default = "default_dataset")]
    dataset: String,
    #[serde(default = "default_model")]
    model: String,
    #[serde(default)]
    features: Map<String, Value>,
}

/// Display metadata for each submitted feature name
fn describe_inputs(mapping: &FeatureMapping, features: &Map<String, Value>) -> Map<String, Value> {
    features
        .keys()
        .map(|name| {
            let info = mapping
                .get(name)
                .and_then(|info| serde_json::to_value(info).ok())
                .unwrap_or_else(|| json!({ "display_name": name }));
            (name.clone(), info)
        })
        .collect()
}

pub async fn predict(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(request) = payload.map_err(json_rejection)?;

    if request.features.is_empty() {
        return Err(ServerError::BadRequest("No features provided".to_string()));
    }

    let source = state.registry.resolve(&request.dataset, &request.model)?.clone();
    let mapping_path = state
        .registry
        .feature_mapping_path(&request.dataset)?
        .map(|p| p.to_path_buf());

    let features = request.features;
    let (prediction, feature_info) = blocking(move || {
        let predictor = Predictor::load(&source)?;
        let prediction = predictor.predict(&features).map_err(ServerError::reported)?;
        let feature_info = FeatureMapping::load_optional(mapping_path.as_deref())
            .map(|mapping| describe_inputs(&mapping, &features));
        Ok((prediction, feature_info))
    })
    .await?;

    info!(
        dataset = %request.dataset,
        model = %request.model,
        prediction = %prediction.prediction,
        "Prediction served"
    );

    let mut body = json!({
        "success": true,
        "prediction": prediction.prediction,
        "confidence_scores": prediction.confidence_scores,
    });
    if let Some(info) = feature_info {
        body["feature_info"] = Value::Object(info);
    }
    Ok(Json(body))
}

#[derive(Deserialize)]
pub struct BatchPredictRequest {
    #[serde(default = "default_dataset")]
    dataset: String,
    #[serde(default = "default_model")]
    model: String,
    #[serde(default)]
    samples: Vec<Value>,
}

pub async fn batch_predict(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<BatchPredictRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(request) = payload.map_err(json_rejection)?;

    if request.samples.is_empty() {
        return Err(ServerError::BadRequest("No samples provided".to_string()));
    }

    let source = state.registry.resolve(&request.dataset, &request.model)?.clone();
    let samples = request.samples;
    let results = blocking(move || {
        let predictor = Predictor::load(&source)?;
        Ok(predictor.predict_batch(&samples))
    })
    .await?;

    let predictions: Vec<Value> = results
        .into_iter()
        .enumerate()
        .map(|(idx, result)| match result {
            Ok(p) => json!({
                "sample": idx,
                "prediction": p.prediction,
                "confidence_scores": p.confidence_scores,
            }),
            Err(e) => json!({
                "sample": idx,
                "prediction": null,
                "confidence_scores": null,
                "error": e.to_string(),
            }),
        })
        .collect();

    info!(
        dataset = %request.dataset,
        model = %request.model,
        samples = predictions.len(),
        "Batch prediction served"
    );

    Ok(Json(json!({
        "success": true,
        "total_predictions": predictions.len(),
        "predictions": predictions,
    })))
}

pub async fn get_feature_mapping(
    State(state): State<Arc<AppState>>,
    Path(dataset): Path<String>,
) -> Result<Json<Value>> {
    let path = state.registry.feature_mapping_path(&dataset)?.map(|p| p.to_path_buf());

    let mapping = blocking(move || Ok(FeatureMapping::load_optional(path.as_deref())))
        .await?
        .ok_or_else(|| {
            ServerError::NotFound(format!("Feature mapping file not found for dataset: {}", dataset))
        })?;

    Ok(Json(json!({
        "success": true,
        "dataset": dataset,
        "feature_mapping": mapping,
    })))
}

// ============================================================================
// Dataset Handlers
// ============================================================================

fn required_field(fields: &HashMap<String, String>, name: &str) -> Result<String> {
    fields
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ServerError::BadRequest(format!("{} is required", name)))
}

/// Multipart upload: `file`, `dataset_name`, `target_column` and an optional
/// comma-separated `feature_columns`
pub async fn upload_dataset(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut fields = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await.map_err(|e| ServerError::BadRequest(e.to_string()))?;
            file = Some((file_name, data.to_vec()));
        } else {
            let text = field.text().await.map_err(|e| ServerError::BadRequest(e.to_string()))?;
            fields.insert(name, text);
        }
    }

    let (file_name, content) = file.ok_or_else(|| ServerError::BadRequest("No file provided".to_string()))?;
    // keep only the final path component of client-supplied names
    let file_name = file_name.rsplit(['/', '\\']).next().unwrap_or_default().to_string();
    if file_name.is_empty() {
        return Err(ServerError::BadRequest("No file selected".to_string()));
    }
    if !file_name.to_lowercase().ends_with(".csv") {
        return Err(ServerError::BadRequest("Only CSV files are allowed".to_string()));
    }

    let dataset_name = required_field(&fields, "dataset_name")?;
    let target_column = required_field(&fields, "target_column")?;
    let feature_columns = fields
        .get("feature_columns")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|cols| !cols.is_empty());

    info!(file = %file_name, bytes = content.len(), dataset = %dataset_name, "Received dataset upload");

    let request = UploadRequest {
        dataset_name,
        filename: file_name,
        target_column,
        feature_columns,
        content,
    };
    let store = state.datasets.clone();
    let metadata = blocking(move || Ok(store.upload(request)?)).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Dataset \"{}\" uploaded successfully", metadata.dataset_name),
        "dataset_info": metadata,
    })))
}

pub async fn list_datasets(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let store = state.datasets.clone();
    let datasets = blocking(move || Ok(store.list()?)).await?;

    Ok(Json(json!({
        "success": true,
        "total_datasets": datasets.len(),
        "datasets": datasets,
    })))
}

pub async fn dataset_info(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    let store = state.datasets.clone();
    let metadata = blocking(move || Ok(store.info(&name)?)).await?;

    Ok(Json(json!({
        "success": true,
        "dataset_info": metadata,
    })))
}

#[derive(Deserialize)]
pub struct PreviewQuery {
    rows: Option<String>,
}

pub async fn preview_dataset(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<Value>> {
    let rows = parse_preview_rows(query.rows.as_deref());
    let store = state.datasets.clone();
    let preview = blocking(move || Ok(store.preview(&name, rows)?)).await?;

    success(preview)
}

pub async fn delete_dataset(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    let store = state.datasets.clone();
    let target = name.clone();
    let deleted_files = blocking(move || Ok(store.delete(&target)?)).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Dataset \"{}\" deleted successfully", name),
        "deleted_files": deleted_files,
    })))
}

pub async fn download_dataset(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse> {
    let store = state.datasets.clone();
    let (file_name, bytes) = blocking(move || Ok(store.download(&name)?)).await?;

    let disposition = format!("attachment; filename=\"{}\"", file_name);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/csv")),
            (
                header::CONTENT_DISPOSITION,
                HeaderValue::from_str(&disposition)
                    .map_err(|e| ServerError::Internal(format!("Invalid header: {}", e)))?,
            ),
        ],
        bytes,
    ))
}
