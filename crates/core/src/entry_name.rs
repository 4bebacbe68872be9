//! Archive entry name sanitization.

/// Maximum encoded length of an entry name (u16 length field).
pub const MAX_ENTRY_NAME_LEN: usize = u16::MAX as usize;

/// Turn a display name into a safe relative archive path.
///
/// Backslashes become forward slashes, a leading drive prefix (`C:`) and
/// leading slashes are dropped, empty and `.` segments are removed. Names
/// containing `..` segments or NUL bytes are rejected rather than rewritten.
pub fn sanitize_entry_name(raw: &str) -> crate::Result<String> {
    if raw.contains('\0') {
        return Err(crate::Error::InvalidEntryName(
            "contains NUL byte".to_string(),
        ));
    }

    let normalized = raw.replace('\\', "/");
    let mut rest = normalized.as_str();
    let bytes = rest.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        rest = &rest[2..];
    }

    let mut segments = Vec::new();
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                return Err(crate::Error::InvalidEntryName(format!(
                    "parent directory segment not allowed: {raw}"
                )));
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(crate::Error::InvalidEntryName(format!(
            "empty after sanitization: {raw:?}"
        )));
    }

    let name = segments.join("/");
    if name.len() > MAX_ENTRY_NAME_LEN {
        return Err(crate::Error::InvalidEntryName(format!(
            "name is {} bytes (max {MAX_ENTRY_NAME_LEN})",
            name.len()
        )));
    }
    Ok(name)
}
