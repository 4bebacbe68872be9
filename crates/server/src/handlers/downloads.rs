//! Download link issuance and archive streaming.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use coffer_core::{ResourceFile, ResourceId, content_disposition};
use coffer_storage::ObjectStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio_util::io::ReaderStream;
use tracing::Instrument;

/// Capacity of the in-memory pipe between the archive writer and the
/// response body. A slow client fills it and thereby throttles storage reads.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Body of `POST /v1/downloads`.
#[derive(Debug, Deserialize)]
pub struct CreateDownloadRequest {
    pub resource_id: ResourceId,
    /// Link lifetime in seconds; the configured default when absent.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct CreateDownloadResponse {
    /// Plaintext token. Returned exactly once and never stored.
    pub token: String,
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// POST /v1/downloads
pub async fn create_download(
    State(state): State<AppState>,
    Json(req): Json<CreateDownloadRequest>,
) -> ApiResult<(StatusCode, Json<CreateDownloadResponse>)> {
    if state
        .metadata
        .get_resource(*req.resource_id.as_uuid())
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound(format!("resource {}", req.resource_id)));
    }

    let issued = state.tokens.issue(req.resource_id, req.ttl_secs).await?;
    let token = issued.secret.expose();
    let url = state.download_url(&token);

    Ok((
        StatusCode::CREATED,
        Json(CreateDownloadResponse {
            token,
            url,
            expires_at: issued.expires_at,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub token: Option<String>,
}

/// GET /v1/downloads/stream?token=...
///
/// Redeems the token and streams the resource as a ZIP archive. Every
/// failure before the first byte is a `token_invalid` 404; once streaming
/// has begun the only possible failure is a truncated body.
pub async fn stream_download(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> ApiResult<Response> {
    let presented = query.token.ok_or(ApiError::TokenInvalid)?;
    let resource_id = state.tokens.redeem(&presented).await?;

    // The resource may have been deleted after the token was issued; its
    // tokens cascade away, but a redemption can still race the delete.
    let resource = state
        .metadata
        .get_resource(*resource_id.as_uuid())
        .await?
        .ok_or(ApiError::TokenInvalid)?;
    let files: Vec<ResourceFile> = state
        .metadata
        .list_resource_files(*resource_id.as_uuid())
        .await?
        .into_iter()
        .map(|f| ResourceFile::new(f.display_name, f.storage_key))
        .collect();

    let disposition = HeaderValue::from_str(&content_disposition(&resource.title))
        .map_err(|e| ApiError::Internal(format!("invalid content-disposition: {e}")))?;

    let (reader, writer) = tokio::io::duplex(PIPE_CAPACITY);
    tokio::spawn(
        stream_archive(writer, state.storage.clone(), files, resource_id)
            .instrument(tracing::Span::current()),
    );

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response())
}

async fn stream_archive(
    sink: DuplexStream,
    storage: Arc<dyn ObjectStore>,
    files: Vec<ResourceFile>,
    resource_id: ResourceId,
) {
    metrics::ARCHIVES_STARTED.inc();
    let started = Instant::now();

    match coffer_archive::write_archive(sink, storage.as_ref(), &files).await {
        Ok((mut sink, report)) => {
            // EOF for the response body; a failure here means the client is gone.
            let _ = sink.shutdown().await;
            metrics::record_archive(&report, started.elapsed());
            tracing::info!(
                resource_id = %resource_id,
                entries = report.written.len(),
                skipped = report.skipped.len(),
                truncated = report.truncated.len(),
                bytes = report.bytes,
                complete = report.is_complete(),
                "archive streamed"
            );
        }
        Err(e) => {
            metrics::ARCHIVES_ABORTED.inc();
            tracing::warn!(
                resource_id = %resource_id,
                error = %e,
                "archive stream aborted"
            );
        }
    }
}
