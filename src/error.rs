//! Error types for exoserve

use thiserror::Error;

/// Result type alias for exoserve operations
pub type Result<T> = std::result::Result<T, ExoError>;

/// Main error type for artifact loading, inference and dataset management
#[derive(Error, Debug)]
pub enum ExoError {
    #[error("Failed to load artifact {path}: {reason}")]
    Artifact { path: String, reason: String },

    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("Missing features: {0:?}")]
    MissingFeatures(Vec<String>),

    #[error("Invalid value for feature '{name}': {reason}")]
    InvalidFeature { name: String, reason: String },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<polars::error::PolarsError> for ExoError {
    fn from(err: polars::error::PolarsError) -> Self {
        ExoError::Data(err.to_string())
    }
}

impl From<serde_json::Error> for ExoError {
    fn from(err: serde_json::Error) -> Self {
        ExoError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ExoError {
    fn from(err: toml::de::Error) -> Self {
        ExoError::Config(err.to_string())
    }
}
