//! Core domain types and shared logic for coffer.
//!
//! This crate defines the data model used across all other crates:
//! - Download token secrets, selectors and hashing
//! - Resource identifiers and file lists
//! - Archive entry name sanitization
//! - Service configuration

pub mod config;
pub mod entry_name;
pub mod error;
pub mod resource;
pub mod token;

pub use entry_name::sanitize_entry_name;
pub use error::{Error, Result};
pub use resource::{MAX_RESOURCE_FILES, ResourceFile, ResourceId, content_disposition};
pub use token::{DownloadSecret, Selector, hash_secret};

/// Default download link lifetime: 10 minutes.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 600;

/// Upper bound for a requested download link lifetime: 24 hours.
pub const MAX_TOKEN_TTL_SECS: u64 = 86_400;
