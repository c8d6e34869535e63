//! exoserve - Exoplanet classification prediction API
//!
//! Serves predictions from pre-trained classifiers (k-nearest neighbors,
//! random forest and a 1-D convolutional network) over HTTP, and manages
//! user-uploaded CSV datasets with summary statistics.
//!
//! # Modules
//!
//! ## Inference
//! - [`config`] - Dataset → model → artifact registry
//! - [`artifact`] - Artifact loading and validation
//! - [`preprocessing`] - Feature alignment, scaling, label decoding
//! - [`models`] - Classifier implementations
//! - [`inference`] - Single and batch prediction
//! - [`features`] - Feature display metadata
//! - [`catalog`] - Model family descriptions
//!
//! ## Datasets
//! - [`datasets`] - Upload store and column statistics
//!
//! ## Services
//! - [`server`] - HTTP server with REST API
//! - [`cli`] - Command-line interface

pub mod error;

pub mod config;
pub mod artifact;
pub mod preprocessing;
pub mod models;
pub mod inference;
pub mod features;
pub mod catalog;

pub mod datasets;

pub mod server;
pub mod cli;

pub use error::{ExoError, Result};
pub use inference::{Prediction, Predictor};
