//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
///
/// An `Err` item ends the object early; consumers keep whatever arrived
/// before it.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Object store holding resource files, addressed by storage key.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Get an object as a byte stream.
    ///
    /// A missing object is reported here as `StorageError::NotFound`, before
    /// any byte is produced.
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Put an object atomically, replacing any previous content.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Static identifier of the backend ("s3", "filesystem") for metrics and logs.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// Called at startup and by the health endpoint. The default suits
    /// backends with nothing to probe.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
