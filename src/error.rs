//! Error taxonomy surfaced by the HTTP handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::validation::InvalidInput;

/// JSON body returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable reason.
    pub error: String,
}

/// Failure of an ingestion or chat request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request body, caught before any upstream call.
    #[error(transparent)]
    InvalidInput(#[from] InvalidInput),
    /// Embedding, index, or completion call failed. The message reaches the
    /// caller unchanged.
    #[error("{0:#}")]
    Upstream(#[from] anyhow::Error),
}

impl ApiError {
    /// Status code the error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Upstream(err) = &self {
            error!(error = ?err, "upstream call failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
