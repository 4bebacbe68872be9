//! Streaming ZIP writer.
//!
//! Entries are written as they are read: a local header with zeroed CRC and
//! sizes, the payload, then a data descriptor carrying the real values. The
//! central directory is emitted by [`ZipStreamWriter::finish`]. The sink is
//! never seeked and no entry is buffered in full.

use crate::dos_time::dos_timestamp;
use crate::error::{ArchiveError, ArchiveResult};
use crate::format::{self, ArchiveEntry};
use bytes::Bytes;
use crc32fast::Hasher as Crc32Hasher;
use futures::{Stream, StreamExt};
use time::OffsetDateTime;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Largest single write to the sink (8 KiB).
pub const SINK_WRITE_SIZE: usize = 8 * 1024;

/// Classic ZIP entry count limit.
pub const MAX_ENTRIES: usize = u16::MAX as usize;

const MAX_NAME_LEN: usize = u16::MAX as usize;
const MAX_OFFSET: u64 = u32::MAX as u64;

/// Result of streaming one entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryOutcome {
    /// Name as written into the archive.
    pub name: String,
    /// Payload bytes written.
    pub size: u64,
    pub crc32: u32,
    /// Set when the entry was closed before its source was exhausted, either
    /// because the source failed or because the 4 GiB entry limit was hit.
    pub truncated: Option<String>,
}

/// Totals for a finished archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub entries: usize,
    /// Total bytes written to the sink, central directory included.
    pub bytes: u64,
}

/// Writes one ZIP archive to an async sink.
///
/// One writer produces exactly one archive: [`finish`](Self::finish)
/// consumes it.
pub struct ZipStreamWriter<W> {
    sink: W,
    offset: u64,
    entries: Vec<ArchiveEntry>,
    modified: Option<OffsetDateTime>,
    max_entry_size: u64,
    max_offset: u64,
}

impl<W: AsyncWrite + Unpin> ZipStreamWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            offset: 0,
            entries: Vec::new(),
            modified: None,
            max_entry_size: u32::MAX as u64,
            max_offset: MAX_OFFSET,
        }
    }

    /// Stamp every entry with a fixed modification time instead of the
    /// wall clock at the moment the entry starts.
    pub fn with_modified_time(mut self, at: OffsetDateTime) -> Self {
        self.modified = Some(at);
        self
    }

    /// Number of completed entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Bytes written to the sink so far.
    pub fn bytes_written(&self) -> u64 {
        self.offset
    }

    /// Append one entry, streaming `source` to the sink until it ends.
    ///
    /// Backslashes in `name` become forward slashes. Invalid names and
    /// exceeded limits are rejected before anything is written. A source
    /// error ends the entry early but still closes it correctly; only sink
    /// failures are fatal.
    pub async fn add_entry<S, E>(&mut self, name: &str, mut source: S) -> ArchiveResult<EntryOutcome>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: std::fmt::Display,
    {
        let name = name.replace('\\', "/");
        if name.is_empty() {
            return Err(ArchiveError::InvalidEntryName("empty name".to_string()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(ArchiveError::InvalidEntryName(format!(
                "name is {} bytes (max {MAX_NAME_LEN})",
                name.len()
            )));
        }
        if self.entries.len() >= MAX_ENTRIES {
            return Err(ArchiveError::LimitExceeded(format!(
                "archive already holds {MAX_ENTRIES} entries"
            )));
        }
        let flags = format::entry_flags(&name);
        let dos_time = dos_timestamp(self.modified.unwrap_or_else(OffsetDateTime::now_utc));
        let header = format::local_header(&name, flags, dos_time);

        // An empty entry must fit below the offset limit so the central
        // directory always starts at an addressable offset.
        let empty_entry_end = self.offset + (header.len() + format::DATA_DESCRIPTOR_LEN) as u64;
        if empty_entry_end > self.max_offset {
            return Err(ArchiveError::LimitExceeded(format!(
                "entry would start at offset {} (max {})",
                self.offset, self.max_offset
            )));
        }
        // offset < max_offset <= u32::MAX
        let header_offset = self.offset as u32;
        self.emit(&header).await?;

        let mut crc = Crc32Hasher::new();
        let mut size: u64 = 0;
        let mut truncated = None;

        'read: while let Some(item) = source.next().await {
            let mut chunk = match item {
                Ok(chunk) => chunk,
                Err(err) => {
                    truncated = Some(err.to_string());
                    break;
                }
            };

            while !chunk.is_empty() {
                let entry_room = self.max_entry_size - size;
                if entry_room == 0 {
                    truncated = Some(format!(
                        "entry exceeds {} bytes",
                        self.max_entry_size
                    ));
                    break 'read;
                }
                // Keep room for the data descriptor below the offset limit.
                let offset_room = self
                    .max_offset
                    .saturating_sub(self.offset + format::DATA_DESCRIPTOR_LEN as u64);
                if offset_room == 0 {
                    truncated = Some(format!("archive reached offset {}", self.max_offset));
                    break 'read;
                }
                let room = entry_room.min(offset_room);
                let take = chunk.len().min(SINK_WRITE_SIZE).min(room as usize);
                let piece = chunk.split_to(take);
                crc.update(&piece);
                self.emit(&piece).await?;
                size += take as u64;
            }
        }

        let crc32 = crc.finalize();
        // size never exceeds max_entry_size, which is at most u32::MAX
        let size32 = size as u32;
        self.emit(&format::data_descriptor(crc32, size32)).await?;

        debug!(entry = %name, size, crc32, truncated = truncated.is_some(), "archive entry written");

        self.entries.push(ArchiveEntry {
            name: name.clone(),
            header_offset,
            size: size32,
            crc32,
            dos_time,
            flags,
        });

        Ok(EntryOutcome {
            name,
            size,
            crc32,
            truncated,
        })
    }

    /// Write the central directory and end record, flush, and hand back the
    /// sink.
    pub async fn finish(mut self) -> ArchiveResult<(W, ArchiveSummary)> {
        let cd_offset = u32::try_from(self.offset).map_err(|_| {
            ArchiveError::LimitExceeded(format!(
                "central directory would start at offset {} (max {MAX_OFFSET})",
                self.offset
            ))
        })?;
        let entries = std::mem::take(&mut self.entries);
        for entry in &entries {
            self.emit(&format::central_header(entry)).await?;
        }
        let cd_size = u32::try_from(self.offset - u64::from(cd_offset)).map_err(|_| {
            ArchiveError::LimitExceeded("central directory exceeds 4 GiB".to_string())
        })?;

        // entries.len() <= MAX_ENTRIES, enforced by add_entry
        let count = entries.len() as u16;
        self.emit(&format::end_of_central_directory(count, cd_size, cd_offset))
            .await?;
        self.sink.flush().await.map_err(ArchiveError::SinkWrite)?;

        let summary = ArchiveSummary {
            entries: entries.len(),
            bytes: self.offset,
        };
        Ok((self.sink, summary))
    }

    async fn emit(&mut self, bytes: &[u8]) -> ArchiveResult<()> {
        self.sink
            .write_all(bytes)
            .await
            .map_err(ArchiveError::SinkWrite)?;
        self.offset += bytes.len() as u64;
        Ok(())
    }

    #[cfg(test)]
    fn with_max_entry_size(mut self, limit: u64) -> Self {
        self.max_entry_size = limit;
        self
    }

    #[cfg(test)]
    fn with_max_offset(mut self, limit: u64) -> Self {
        self.max_offset = limit;
        self
    }
}
