//! Archive error types.

use thiserror::Error;

/// Errors that stop an entry from being added or an archive from completing.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The entry name cannot be encoded (empty or longer than 65535 bytes).
    /// Nothing was written.
    #[error("invalid entry name: {0}")]
    InvalidEntryName(String),

    /// A classic ZIP limit (entry count or 4 GiB offsets) would be exceeded.
    /// Nothing was written.
    #[error("archive limit exceeded: {0}")]
    LimitExceeded(String),

    /// The output sink rejected a write. The archive is unusable.
    #[error("sink write failed: {0}")]
    SinkWrite(#[source] std::io::Error),
}

/// Why a source could not be opened.
///
/// Storage errors are mapped onto these two cases so that backend types never
/// leak into the archive layer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("source not found: {0}")]
    NotFound(String),

    #[error("source unavailable: {0}")]
    Unavailable(String),
}

pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;
