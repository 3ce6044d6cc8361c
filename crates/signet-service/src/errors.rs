use crate::storage::StorageError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Error taxonomy for the backend.
///
/// Callers need to distinguish "bad request" from "nothing there" from
/// "something broke underneath", so each class is its own variant with a
/// stable error-kind string in the HTTP mapping below. Storage failures are
/// never folded into not-found: an I/O error and a genuine absence are
/// different outcomes.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid parameters: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    /// Persist failure mid-rotation or mid-prune. The in-memory state has
    /// been rolled back; the operation is retried on the next tick.
    #[error("key lifecycle error: {0}")]
    Lifecycle(String),

    #[error("role registry error: {0}")]
    Registry(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            BackendError::Validation(detail) => (
                StatusCode::BAD_REQUEST,
                "invalid_parameters",
                detail.clone(),
            ),
            BackendError::NotFound(what) => {
                (StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
            }
            BackendError::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                "A storage error occurred".to_string(),
            ),
            BackendError::Crypto(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "crypto_error",
                "An internal cryptographic error occurred".to_string(),
            ),
            BackendError::Lifecycle(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "lifecycle_error",
                "A key lifecycle error occurred".to_string(),
            ),
            BackendError::Registry(detail) => (
                StatusCode::BAD_GATEWAY,
                "registry_error",
                detail.clone(),
            ),
            BackendError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}
