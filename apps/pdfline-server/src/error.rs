//! Error types for the pdfline server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pdfline_core::ShapeError;
use serde_json::json;
use thiserror::Error;

/// Server error types
///
/// Client mistakes map to 400, everything else to 500 with the underlying
/// message. The body is always `{"error": "<message>"}`.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("No file part in the request")]
    MissingFilePart,

    #[error("No selected file")]
    NoSelectedFile,

    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("{0}")]
    Internal(String),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::MissingFilePart
            | ServerError::NoSelectedFile
            | ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Shape(
                ShapeError::NoShapes | ShapeError::NoValidGeometry | ShapeError::InvalidName(_),
            ) => StatusCode::BAD_REQUEST,
            ServerError::Shape(_) | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!("Request failed: {}", message);
        } else {
            tracing::debug!("Rejected request: {}", message);
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServerError::Internal(format!("Worker task failed: {}", err))
    }
}
