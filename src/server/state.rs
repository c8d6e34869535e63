//! Application state shared across handlers

use crate::config::ModelRegistry;
use crate::datasets::DatasetStore;

use super::ServerConfig;

/// Read-only state; artifacts are loaded per request and datasets live on disk
#[derive(Debug)]
pub struct AppState {
    pub registry: ModelRegistry,
    pub datasets: DatasetStore,
}

impl AppState {
    /// Build the state, creating the uploads directory if needed
    pub fn new(config: &ServerConfig, registry: ModelRegistry) -> crate::Result<Self> {
        let datasets = DatasetStore::open(&config.uploads_dir)?;
        Ok(Self { registry, datasets })
    }
}
