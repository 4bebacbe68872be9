//! Resource management endpoints (issuer only).

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use coffer_core::{MAX_RESOURCE_FILES, ResourceFile, ResourceId, sanitize_entry_name};
use coffer_metadata::{ResourceFileRow, ResourceRow};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Body of `PUT /v1/resources/{resource_id}`.
#[derive(Debug, Deserialize)]
pub struct PutResourceRequest {
    pub title: String,
    #[serde(default)]
    pub files: Vec<ResourceFile>,
}

#[derive(Debug, Serialize)]
pub struct ResourceResponse {
    pub resource_id: ResourceId,
    pub title: String,
    pub files: Vec<ResourceFile>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ResourceResponse {
    fn from_rows(resource: ResourceRow, files: Vec<ResourceFileRow>) -> Self {
        Self {
            resource_id: ResourceId::from(resource.resource_id),
            title: resource.title,
            files: files
                .into_iter()
                .map(|f| ResourceFile::new(f.display_name, f.storage_key))
                .collect(),
            created_at: resource.created_at,
            updated_at: resource.updated_at,
        }
    }
}

fn validate_resource(req: &PutResourceRequest) -> ApiResult<()> {
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }
    if req.files.len() > MAX_RESOURCE_FILES {
        return Err(ApiError::BadRequest(format!(
            "a resource holds at most {MAX_RESOURCE_FILES} files, got {}",
            req.files.len()
        )));
    }
    for file in &req.files {
        if file.storage_key.is_empty() {
            return Err(ApiError::BadRequest(format!(
                "file {:?} has an empty storage_key",
                file.display_name
            )));
        }
        sanitize_entry_name(&file.display_name)?;
    }
    Ok(())
}

/// PUT /v1/resources/{resource_id}
///
/// Creates the resource or replaces its title and complete file list.
/// Outstanding download tokens stay valid and serve the new list.
pub async fn put_resource(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
    Json(req): Json<PutResourceRequest>,
) -> ApiResult<Json<ResourceResponse>> {
    let resource_id = ResourceId::parse(&resource_id)?;
    validate_resource(&req)?;

    let now = coffer_metadata::db_timestamp(OffsetDateTime::now_utc());
    let created_at = state
        .metadata
        .get_resource(*resource_id.as_uuid())
        .await?
        .map_or(now, |existing| existing.created_at);

    let row = ResourceRow {
        resource_id: *resource_id.as_uuid(),
        title: req.title.trim().to_string(),
        created_at,
        updated_at: now,
    };
    let files: Vec<ResourceFileRow> = req
        .files
        .into_iter()
        .enumerate()
        .map(|(position, file)| ResourceFileRow {
            resource_id: row.resource_id,
            // Bounded by MAX_RESOURCE_FILES above.
            position: position as i32,
            display_name: file.display_name,
            storage_key: file.storage_key,
        })
        .collect();

    state.metadata.upsert_resource(&row, &files).await?;
    tracing::info!(
        resource_id = %resource_id,
        files = files.len(),
        "resource stored"
    );

    Ok(Json(ResourceResponse::from_rows(row, files)))
}

/// GET /v1/resources/{resource_id}
pub async fn get_resource(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
) -> ApiResult<Json<ResourceResponse>> {
    let resource_id = ResourceId::parse(&resource_id)?;
    let resource = state
        .metadata
        .get_resource(*resource_id.as_uuid())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("resource {resource_id}")))?;
    let files = state
        .metadata
        .list_resource_files(*resource_id.as_uuid())
        .await?;

    Ok(Json(ResourceResponse::from_rows(resource, files)))
}

/// DELETE /v1/resources/{resource_id}
///
/// Also revokes every outstanding download token for the resource.
pub async fn delete_resource(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
) -> ApiResult<StatusCode> {
    let resource_id = ResourceId::parse(&resource_id)?;
    if !state
        .metadata
        .delete_resource(*resource_id.as_uuid())
        .await?
    {
        return Err(ApiError::NotFound(format!("resource {resource_id}")));
    }

    tracing::info!(resource_id = %resource_id, "resource deleted");
    Ok(StatusCode::NO_CONTENT)
}
