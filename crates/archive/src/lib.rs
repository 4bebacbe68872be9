//! Streaming ZIP archives for coffer.
//!
//! - [`ZipStreamWriter`] serializes named byte streams into a ZIP container
//!   (stored entries, data descriptors) without seeking or buffering entries.
//! - [`write_archive`] pulls a resource's files from storage and feeds them to
//!   the writer, skipping files that cannot be opened.

pub mod dos_time;
pub mod error;
pub mod format;
pub mod orchestrator;
pub mod writer;

pub use error::{ArchiveError, ArchiveResult, SourceError};
pub use orchestrator::{
    ArchiveReport, SkipReason, SkippedFile, SourceProvider, TruncatedFile, write_archive,
    write_with,
};
pub use writer::{ArchiveSummary, EntryOutcome, ZipStreamWriter};
