use crate::services::error::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::EmptyPayload
            | StorageError::SizeMismatch { .. }
            | StorageError::ConstraintViolation(_)
            | StorageError::UploadAborted(_)
            | StorageError::InvalidAddress(_) => AppError::bad_request(err.to_string()),
            StorageError::PayloadTooLarge { .. } => {
                AppError::new(StatusCode::PAYLOAD_TOO_LARGE, err.to_string())
            }
            StorageError::RecordNotFound(_) | StorageError::BlobNotFound(_) => {
                AppError::not_found(err.to_string())
            }
            // Already reported as an integrity fault where it was detected.
            StorageError::CorruptState { .. } => {
                AppError::internal("stored recording is unavailable")
            }
            StorageError::WriteFailure(_) | StorageError::Sqlx(_) | StorageError::Io(_) => {
                tracing::error!("storage failure: {}", err);
                AppError::internal("internal storage error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content_address::ContentAddress;
    use std::io;

    #[test]
    fn storage_errors_map_to_distinct_statuses() {
        let cases = [
            (StorageError::EmptyPayload, StatusCode::BAD_REQUEST),
            (
                StorageError::SizeMismatch {
                    declared: 2,
                    observed: 1,
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                StorageError::ConstraintViolation("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                StorageError::PayloadTooLarge { limit: 1 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (StorageError::RecordNotFound(1), StatusCode::NOT_FOUND),
            (
                StorageError::CorruptState {
                    id: 1,
                    address: ContentAddress::of(b"x"),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                StorageError::WriteFailure(io::Error::other("disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }
}
