//! Feeds resource files from storage into a [`ZipStreamWriter`].

use crate::error::{ArchiveError, ArchiveResult, SourceError};
use crate::writer::{ArchiveSummary, ZipStreamWriter};
use async_trait::async_trait;
use coffer_core::{ResourceFile, sanitize_entry_name};
use coffer_storage::{ByteStream, ObjectStore, StorageError};
use std::collections::HashSet;
use tokio::io::AsyncWrite;
use tracing::{debug, warn};

/// Read capability the orchestrator needs from storage.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Open the object behind `key` as a read-once byte stream.
    async fn open(&self, key: &str) -> Result<ByteStream, SourceError>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> SourceProvider for T {
    async fn open(&self, key: &str) -> Result<ByteStream, SourceError> {
        self.get_stream(key).await.map_err(|err| match err {
            StorageError::NotFound(key) => SourceError::NotFound(key),
            other => SourceError::Unavailable(other.to_string()),
        })
    }
}

/// Why a file was left out of the archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The display name could not be turned into a safe entry name.
    InvalidName(String),
    /// The storage key could not be opened.
    Source(SourceError),
    /// The writer refused the entry (entry count or offset limit).
    Limit(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::InvalidName(msg) => write!(f, "invalid name: {msg}"),
            SkipReason::Source(err) => write!(f, "{err}"),
            SkipReason::Limit(msg) => write!(f, "limit: {msg}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedFile {
    pub display_name: String,
    pub storage_key: String,
    pub reason: SkipReason,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TruncatedFile {
    /// Entry name inside the archive.
    pub name: String,
    /// Bytes that made it into the entry.
    pub size: u64,
    pub reason: String,
}

/// What ended up in an archive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    /// Entry names in archive order, truncated entries included.
    pub written: Vec<String>,
    pub skipped: Vec<SkippedFile>,
    pub truncated: Vec<TruncatedFile>,
    /// Total archive size in bytes.
    pub bytes: u64,
}

impl ArchiveReport {
    /// Whether every requested file made it into the archive intact.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.truncated.is_empty()
    }
}

/// Stream `files` into a new archive on `sink`, in order.
///
/// Files that cannot be named or opened are skipped and reported; a partial
/// archive is preferred over none. Only a sink failure aborts, in which case
/// whatever was written so far is the final (truncated) output.
pub async fn write_archive<W, P>(
    sink: W,
    provider: &P,
    files: &[ResourceFile],
) -> ArchiveResult<(W, ArchiveReport)>
where
    W: AsyncWrite + Unpin,
    P: SourceProvider + ?Sized,
{
    write_with(ZipStreamWriter::new(sink), provider, files).await
}

/// [`write_archive`] with a preconfigured writer.
pub async fn write_with<W, P>(
    mut writer: ZipStreamWriter<W>,
    provider: &P,
    files: &[ResourceFile],
) -> ArchiveResult<(W, ArchiveReport)>
where
    W: AsyncWrite + Unpin,
    P: SourceProvider + ?Sized,
{
    let mut report = ArchiveReport::default();
    let mut used_names = HashSet::new();

    for file in files {
        let skip = |reason: SkipReason| {
            warn!(
                display_name = %file.display_name,
                storage_key = %file.storage_key,
                reason = %reason,
                "skipping archive entry"
            );
            SkippedFile {
                display_name: file.display_name.clone(),
                storage_key: file.storage_key.clone(),
                reason,
            }
        };

        let name = match sanitize_entry_name(&file.display_name) {
            Ok(name) => name,
            Err(err) => {
                report.skipped.push(skip(SkipReason::InvalidName(err.to_string())));
                continue;
            }
        };

        let source = match provider.open(&file.storage_key).await {
            Ok(stream) => stream,
            Err(err) => {
                report.skipped.push(skip(SkipReason::Source(err)));
                continue;
            }
        };

        let name = unique_name(&name, &used_names);
        // The stream moves into add_entry and is dropped when it returns,
        // on success and on error alike.
        match writer.add_entry(&name, source).await {
            Ok(outcome) => {
                if let Some(reason) = outcome.truncated {
                    warn!(entry = %outcome.name, size = outcome.size, reason = %reason, "archive entry truncated");
                    report.truncated.push(TruncatedFile {
                        name: outcome.name.clone(),
                        size: outcome.size,
                        reason,
                    });
                }
                used_names.insert(outcome.name.clone());
                report.written.push(outcome.name);
            }
            Err(ArchiveError::LimitExceeded(msg)) => {
                debug!(
                    entries = writer.entry_count(),
                    bytes = writer.bytes_written(),
                    "archive limit reached"
                );
                report.skipped.push(skip(SkipReason::Limit(msg)));
            }
            Err(ArchiveError::InvalidEntryName(msg)) => {
                report.skipped.push(skip(SkipReason::InvalidName(msg)));
            }
            Err(err) => return Err(err),
        }
    }

    let (sink, ArchiveSummary { entries, bytes }) = writer.finish().await?;
    report.bytes = bytes;
    debug!(
        entries,
        bytes,
        skipped = report.skipped.len(),
        truncated = report.truncated.len(),
        "archive finished"
    );
    Ok((sink, report))
}

/// First of `name`, `stem (1).ext`, `stem (2).ext`, ... not in `used`.
fn unique_name(name: &str, used: &HashSet<String>) -> String {
    if !used.contains(name) {
        return name.to_string();
    }

    let file_start = name.rfind('/').map_or(0, |i| i + 1);
    // A leading dot marks a hidden file, not an extension.
    let (stem, ext) = match name[file_start..].rfind('.') {
        Some(dot) if dot > 0 => name.split_at(file_start + dot),
        _ => (name, ""),
    };

    (1u32..)
        .map(|n| format!("{stem} ({n}){ext}"))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}
