//! Error types for the server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::ExoError;

/// Handler failure; every variant renders as `{"success": false, "error": ...}`
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Failure reported in a normal 200 response
    #[error("{0}")]
    Reported(String),

    #[error("{0}")]
    Internal(String),
}

impl ServerError {
    /// Report any error with `success: false` under HTTP 200
    pub fn reported(err: impl std::fmt::Display) -> Self {
        Self::Reported(err.to_string())
    }
}

impl From<ExoError> for ServerError {
    fn from(err: ExoError) -> Self {
        match err {
            ExoError::NotFound(msg) => Self::NotFound(msg),
            ExoError::InvalidInput(msg) => Self::BadRequest(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Reported(_) => StatusCode::OK,
            ServerError::Internal(msg) => {
                tracing::error!(detail = %msg, "Internal server error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
