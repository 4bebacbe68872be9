//! API error types.

use crate::tokens::TokenError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Absent, malformed, expired or already used download token. The cases
    /// are deliberately indistinguishable to callers.
    #[error("download link is invalid or has expired")]
    TokenInvalid,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] coffer_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] coffer_metadata::MetadataError),

    #[error("core error: {0}")]
    Core(#[from] coffer_core::Error),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::TokenInvalid => "token_invalid",
            Self::Internal(_) => "internal_error",
            Self::Storage(_) => "storage_error",
            Self::Metadata(_) => "metadata_error",
            Self::Core(_) => "core_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::TokenInvalid => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) => match e {
                coffer_storage::StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Metadata(e) => match e {
                coffer_metadata::MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                coffer_metadata::MetadataError::AlreadyExists(_)
                | coffer_metadata::MetadataError::Constraint(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => ApiError::TokenInvalid,
            TokenError::TtlOutOfRange { .. } => ApiError::BadRequest(err.to_string()),
            TokenError::Metadata(e) => ApiError::Metadata(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_errors_map_to_status() {
        let invalid = ApiError::from(TokenError::Invalid);
        assert_eq!(invalid.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(invalid.code(), "token_invalid");

        let ttl = ApiError::from(TokenError::TtlOutOfRange {
            requested: 0,
            max: 60,
        });
        assert_eq!(ttl.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_metadata_conflicts() {
        let err = ApiError::from(coffer_metadata::MetadataError::Constraint("fk".to_string()));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "metadata_error");
    }
}
