//! ZIP record encoding (stored entries, data-descriptor variant, no ZIP64).
//!
//! All multi-byte fields are little endian.

pub const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x0807_4b50;
pub const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
pub const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0605_4b50;

/// ZIP version 2.0: stored entries and data descriptors.
pub const VERSION: u16 = 20;
/// CRC and sizes follow the payload in a data descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
/// Entry name is UTF-8.
pub const FLAG_UTF8_NAME: u16 = 0x0800;
pub const METHOD_STORED: u16 = 0;
/// MS-DOS "archive" attribute.
pub const EXTERNAL_ATTR_ARCHIVE: u32 = 0x20;

pub const LOCAL_HEADER_LEN: usize = 30;
pub const DATA_DESCRIPTOR_LEN: usize = 16;
pub const CENTRAL_HEADER_LEN: usize = 46;
pub const END_OF_CENTRAL_DIRECTORY_LEN: usize = 22;

/// A finished entry, as recorded for the central directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub header_offset: u32,
    pub size: u32,
    pub crc32: u32,
    pub dos_time: u32,
    pub flags: u16,
}

/// General purpose flags for an entry name.
pub fn entry_flags(name: &str) -> u16 {
    if name.is_ascii() {
        FLAG_DATA_DESCRIPTOR
    } else {
        FLAG_DATA_DESCRIPTOR | FLAG_UTF8_NAME
    }
}

/// Local file header with CRC and sizes zeroed (they follow in the descriptor).
///
/// `name` must be at most `u16::MAX` bytes; the writer checks this.
pub fn local_header(name: &str, flags: u16, dos_time: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(LOCAL_HEADER_LEN + name.len());
    buf.extend_from_slice(&LOCAL_HEADER_SIGNATURE.to_le_bytes());
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.extend_from_slice(&flags.to_le_bytes());
    buf.extend_from_slice(&METHOD_STORED.to_le_bytes());
    buf.extend_from_slice(&dos_time.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // crc-32
    buf.extend_from_slice(&0u32.to_le_bytes()); // compressed size
    buf.extend_from_slice(&0u32.to_le_bytes()); // uncompressed size
    buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // extra field length
    buf.extend_from_slice(name.as_bytes());
    buf
}

/// Data descriptor closing a streamed entry. Stored, so both sizes are equal.
pub fn data_descriptor(crc32: u32, size: u32) -> [u8; DATA_DESCRIPTOR_LEN] {
    let mut buf = [0u8; DATA_DESCRIPTOR_LEN];
    buf[0..4].copy_from_slice(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
    buf[4..8].copy_from_slice(&crc32.to_le_bytes());
    buf[8..12].copy_from_slice(&size.to_le_bytes());
    buf[12..16].copy_from_slice(&size.to_le_bytes());
    buf
}

/// Central directory file header for a finished entry.
pub fn central_header(entry: &ArchiveEntry) -> Vec<u8> {
    let mut buf = Vec::with_capacity(CENTRAL_HEADER_LEN + entry.name.len());
    buf.extend_from_slice(&CENTRAL_HEADER_SIGNATURE.to_le_bytes());
    buf.extend_from_slice(&VERSION.to_le_bytes()); // made by
    buf.extend_from_slice(&VERSION.to_le_bytes()); // needed
    buf.extend_from_slice(&entry.flags.to_le_bytes());
    buf.extend_from_slice(&METHOD_STORED.to_le_bytes());
    buf.extend_from_slice(&entry.dos_time.to_le_bytes());
    buf.extend_from_slice(&entry.crc32.to_le_bytes());
    buf.extend_from_slice(&entry.size.to_le_bytes());
    buf.extend_from_slice(&entry.size.to_le_bytes());
    buf.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // extra field length
    buf.extend_from_slice(&0u16.to_le_bytes()); // comment length
    buf.extend_from_slice(&0u16.to_le_bytes()); // disk number start
    buf.extend_from_slice(&0u16.to_le_bytes()); // internal attributes
    buf.extend_from_slice(&EXTERNAL_ATTR_ARCHIVE.to_le_bytes());
    buf.extend_from_slice(&entry.header_offset.to_le_bytes());
    buf.extend_from_slice(entry.name.as_bytes());
    buf
}

/// End of central directory record. Single disk, no comment.
pub fn end_of_central_directory(
    entries: u16,
    cd_size: u32,
    cd_offset: u32,
) -> [u8; END_OF_CENTRAL_DIRECTORY_LEN] {
    let mut buf = [0u8; END_OF_CENTRAL_DIRECTORY_LEN];
    buf[0..4].copy_from_slice(&END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
    // bytes 4..8: this disk and central directory disk, both 0
    buf[8..10].copy_from_slice(&entries.to_le_bytes());
    buf[10..12].copy_from_slice(&entries.to_le_bytes());
    buf[12..16].copy_from_slice(&cd_size.to_le_bytes());
    buf[16..20].copy_from_slice(&cd_offset.to_le_bytes());
    // bytes 20..22: comment length 0
    buf
}
