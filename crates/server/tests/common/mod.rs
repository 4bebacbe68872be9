//! Common test utilities for the HTTP service.
//!
//! Each test file compiles this module separately, hence the dead code allowances.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use bytes::Bytes;
use coffer_core::config::{AppConfig, MetadataConfig, StorageConfig};
use coffer_metadata::{MetadataStore, SqliteStore};
use coffer_server::{AppState, IssuerKeys, create_router};
use coffer_storage::{FilesystemBackend, ObjectStore};
use serde_json::Value;
use std::io::{Cursor, Read};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Bearer secret matching `IssuerConfig::for_testing()`.
pub const ISSUER_TOKEN: &str = "test-issuer-token";

/// Router plus the stores behind it, in a temp directory.
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig::Filesystem { path: storage_path };
        config.metadata = MetadataConfig::Sqlite {
            path: db_path,
            query_timeout_secs: None,
        };
        modifier(&mut config);

        let issuers = IssuerKeys::from_config(&config.issuer).expect("invalid issuer config");
        let state = AppState::new(config, storage, metadata, issuers);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Store an object directly in the backing storage.
    pub async fn put_object(&self, key: &str, data: impl Into<Bytes>) {
        self.state
            .storage
            .put(key, data.into())
            .await
            .expect("Failed to store object");
    }

    /// Send a request and return status, headers and the full body.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Bytes) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, body)
    }

    /// JSON request with an optional bearer token.
    pub async fn json(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(v) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };

        let (status, _, bytes) = self.send(builder.body(body).unwrap()).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Create or replace a resource as the test issuer.
    pub async fn put_resource(&self, resource_id: &str, title: &str, files: &[(&str, &str)]) -> Value {
        let files: Vec<Value> = files
            .iter()
            .map(|(name, key)| serde_json::json!({ "display_name": name, "storage_key": key }))
            .collect();
        let (status, body) = self
            .json(
                "PUT",
                &format!("/v1/resources/{resource_id}"),
                Some(serde_json::json!({ "title": title, "files": files })),
                Some(ISSUER_TOKEN),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "put_resource failed: {body}");
        body
    }

    /// Issue a download link as the test issuer; returns the plaintext token.
    pub async fn issue(&self, resource_id: &str, ttl_secs: Option<u64>) -> String {
        let mut body = serde_json::json!({ "resource_id": resource_id });
        if let Some(ttl) = ttl_secs {
            body["ttl_secs"] = ttl.into();
        }
        let (status, body) = self
            .json("POST", "/v1/downloads", Some(body), Some(ISSUER_TOKEN))
            .await;
        assert_eq!(status, StatusCode::CREATED, "issue failed: {body}");
        body["token"].as_str().unwrap().to_string()
    }

    /// Redeem a token through the streaming endpoint.
    pub async fn download(&self, token: &str) -> (StatusCode, axum::http::HeaderMap, Bytes) {
        let request = Request::builder()
            .uri(format!("/v1/downloads/stream?token={token}"))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }
}

/// Entry names and contents of a ZIP archive, in archive order.
pub fn read_zip(data: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data)).expect("not a valid zip archive");
    (0..archive.len())
        .map(|i| {
            let mut entry = archive.by_index(i).unwrap();
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).unwrap();
            (entry.name().to_string(), contents)
        })
        .collect()
}
