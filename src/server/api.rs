//! API route definitions

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use super::{handlers, state::AppState, ServerConfig};

async fn handle_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "error": "Not found. Visit / for the list of endpoints.",
        })),
    )
}

async fn handle_405() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "success": false,
            "error": "Method not allowed. Visit / for the list of endpoints.",
        })),
    )
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let open = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    match origin {
        Some(origin) if origin != "*" => match origin.parse::<HeaderValue>() {
            Ok(value) => CorsLayer::new()
                .allow_origin(value)
                .allow_methods(Any)
                .allow_headers(Any),
            Err(_) => {
                warn!(origin = %origin, "Invalid CORS_ORIGIN, allowing all origins");
                open
            }
        },
        _ => open,
    }
}

/// Create the main application router
pub fn create_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health_check))
        .route("/models", get(handlers::list_models))
        // Prediction
        .route("/get_features", get(handlers::get_features))
        .route("/predict", post(handlers::predict))
        .route("/batch_predict", post(handlers::batch_predict))
        .route("/get_feature_mapping/:dataset", get(handlers::get_feature_mapping))
        // Datasets
        .route("/upload_dataset", post(handlers::upload_dataset))
        .route("/list_datasets", get(handlers::list_datasets))
        .route("/dataset_info/:name", get(handlers::dataset_info))
        .route("/preview_dataset/:name", get(handlers::preview_dataset))
        .route("/delete_dataset/:name", delete(handlers::delete_dataset))
        .route("/download_dataset/:name", get(handlers::download_dataset))
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405)
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_upload_size))
        .layer(CompressionLayer::new())
        .layer(cors_layer(config.cors_origin.as_deref()))
        .layer(TraceLayer::new_for_http())
}
