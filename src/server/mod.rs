//! HTTP server for the prediction and dataset API
//!
//! Exposes model predictions over the artifacts listed in the model
//! registry, plus upload/inspect/preview/delete operations on the datasets
//! kept in the uploads directory.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use state::AppState;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ModelRegistry;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub uploads_dir: PathBuf,
    pub models_dir: PathBuf,
    /// TOML registry file; the built-in registry is used when unset
    pub registry_path: Option<PathBuf>,
    pub max_upload_size: usize,
    pub cors_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5000),
            uploads_dir: std::env::var("UPLOADS_DIR")
                .unwrap_or_else(|_| "uploads".to_string())
                .into(),
            models_dir: std::env::var("MODELS_DIR")
                .unwrap_or_else(|_| "models".to_string())
                .into(),
            registry_path: std::env::var("MODEL_REGISTRY")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            max_upload_size: std::env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16 * 1024 * 1024), // 16MB
            cors_origin: std::env::var("CORS_ORIGIN").ok().filter(|o| !o.is_empty()),
        }
    }
}

impl ServerConfig {
    /// Read the configured registry file, or fall back to the built-in one
    pub fn load_registry(&self) -> crate::Result<ModelRegistry> {
        match &self.registry_path {
            Some(path) => ModelRegistry::load(path, &self.models_dir),
            None => Ok(ModelRegistry::builtin(&self.models_dir)),
        }
    }
}

/// Start the server with the given configuration
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();
    info!(
        uploads_dir = %config.uploads_dir.display(),
        models_dir = %config.models_dir.display(),
        started_at = %start_time.to_rfc3339(),
        "Initializing server directories"
    );

    if !config.models_dir.exists() {
        warn!(models_dir = %config.models_dir.display(), "Models directory not found, predictions will fail");
    }

    let registry = config.load_registry()?;
    info!(datasets = ?registry.dataset_names(), "Model registry loaded");

    let state = Arc::new(AppState::new(&config, registry)?);
    let app = create_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(
        address = %addr,
        max_upload_size_mb = config.max_upload_size / 1024 / 1024,
        started_at = %start_time.to_rfc3339(),
        "Exoplanet prediction API starting"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, pid = std::process::id(), "Server listening");

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
        let stop_time = chrono::Utc::now();
        let uptime = stop_time.signed_duration_since(start_time);
        info!(
            stopped_at = %stop_time.to_rfc3339(),
            uptime_secs = uptime.num_seconds(),
            "Shutdown signal received, stopping server gracefully"
        );
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}
