//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use time::{OffsetDateTime, UtcOffset};
use uuid::Uuid;

/// A downloadable resource (one archive).
#[derive(Debug, Clone, FromRow)]
pub struct ResourceRow {
    pub resource_id: Uuid,
    /// Human title, used for the archive file name.
    pub title: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// One file of a resource, in archive order.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ResourceFileRow {
    pub resource_id: Uuid,
    pub position: i32,
    pub display_name: String,
    pub storage_key: String,
}

/// Issued, not yet consumed download token.
///
/// Only the SHA-256 of the verifier is stored; the plaintext secret never
/// reaches the database.
#[derive(Debug, Clone, FromRow)]
pub struct DownloadTokenRow {
    pub selector: String,
    pub token_hash: String,
    pub resource_id: Uuid,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

/// Normalize a timestamp for storage: UTC, whole seconds.
///
/// SQLite compares timestamps as text, which is only ordered correctly when
/// every value has the same offset and precision.
pub fn db_timestamp(at: OffsetDateTime) -> OffsetDateTime {
    at.to_offset(UtcOffset::UTC)
        .replace_nanosecond(0)
        .unwrap_or(at)
}
