//! Downloadable resources.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum number of files in one resource (classic ZIP entry limit).
pub const MAX_RESOURCE_FILES: usize = u16::MAX as usize;

/// Unique identifier for a downloadable resource.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(Uuid);

impl ResourceId {
    /// Generate a new random resource ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidResourceId(e.to_string()))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ResourceId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self.0)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One file of a resource: the name shown inside the archive and the key it
/// is read from in object storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFile {
    pub display_name: String,
    pub storage_key: String,
}

impl ResourceFile {
    pub fn new(display_name: impl Into<String>, storage_key: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            storage_key: storage_key.into(),
        }
    }
}

/// Attachment file name for a resource archive.
///
/// Characters that would break a quoted `Content-Disposition` value or act as
/// path separators are replaced by `_`.
fn archive_file_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '"' | '\\' | '/' | ':' | ';' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.');
    if cleaned.is_empty() {
        "download.zip".to_string()
    } else {
        format!("{cleaned}.zip")
    }
}

/// RFC 5987 `attr-char`: everything else in an extended value is
/// percent-encoded.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// `Content-Disposition` value for downloading a resource archive.
///
/// The quoted `filename` is ASCII only. Titles with other characters also
/// get a UTF-8 `filename*` parameter, which clients prefer when present.
pub fn content_disposition(title: &str) -> String {
    let name = archive_file_name(title);
    if name.is_ascii() {
        return format!("attachment; filename=\"{name}\"");
    }
    let fallback: String = name
        .chars()
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        utf8_percent_encode(&name, ATTR_CHAR)
    )
}
