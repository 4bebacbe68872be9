//! Resource repository.

use crate::error::MetadataResult;
use crate::models::{ResourceFileRow, ResourceRow};
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for resources and their file lists.
#[async_trait]
pub trait ResourceRepo: Send + Sync {
    /// Create or replace a resource and its complete file list in one
    /// transaction. `created_at` of an existing resource is kept.
    async fn upsert_resource(
        &self,
        resource: &ResourceRow,
        files: &[ResourceFileRow],
    ) -> MetadataResult<()>;

    /// Get a resource by ID.
    async fn get_resource(&self, resource_id: Uuid) -> MetadataResult<Option<ResourceRow>>;

    /// Files of a resource ordered by position.
    async fn list_resource_files(&self, resource_id: Uuid) -> MetadataResult<Vec<ResourceFileRow>>;

    /// Delete a resource, its files and its outstanding tokens.
    /// Returns false if it did not exist.
    async fn delete_resource(&self, resource_id: Uuid) -> MetadataResult<bool>;
}
