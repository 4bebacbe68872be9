//! Repository traits for metadata operations.

pub mod downloads;
pub mod resources;

pub use downloads::DownloadTokenRepo;
pub use resources::ResourceRepo;
