//! Metadata store error types.

use sqlx::error::ErrorKind;
use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for MetadataError {
    fn from(e: std::io::Error) -> Self {
        MetadataError::Config(e.to_string())
    }
}

/// Map constraint failures of a write to typed errors; anything else stays a
/// database error.
pub(crate) fn classify_write_error(err: sqlx::Error, what: &str) -> MetadataError {
    if let sqlx::Error::Database(ref db_err) = err {
        match db_err.kind() {
            ErrorKind::UniqueViolation => {
                return MetadataError::AlreadyExists(what.to_string());
            }
            ErrorKind::ForeignKeyViolation | ErrorKind::NotNullViolation | ErrorKind::CheckViolation => {
                return MetadataError::Constraint(format!("{what}: {}", db_err.message()));
            }
            _ => {}
        }
    }
    MetadataError::Database(err)
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
