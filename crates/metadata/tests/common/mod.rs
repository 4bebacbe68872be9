//! Shared fixtures and backend-independent scenarios for metadata tests.

#![allow(dead_code)]

use coffer_metadata::{
    DownloadTokenRow, MetadataError, MetadataResult, MetadataStore, PostgresStore,
    ResourceFileRow, ResourceRow, SqliteStore,
};
use std::sync::Arc;
use tempfile::TempDir;
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Marker for container startup failures; only those cause a skip.
pub const POSTGRES_CONTAINER_START_ERR_PREFIX: &str = "postgres-container-start:";

/// SQLite store in a temp directory that is removed on drop.
pub struct TestMetadata {
    pub store: Arc<dyn MetadataStore>,
    _temp_dir: TempDir,
}

impl TestMetadata {
    pub async fn new() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir()?;
        let store = SqliteStore::new(temp_dir.path().join("test.db"), None).await?;
        Ok(Self {
            store: Arc::new(store),
            _temp_dir: temp_dir,
        })
    }
}

/// PostgreSQL store backed by a throwaway container.
pub struct PostgresTestMetadata {
    pub store: Arc<dyn MetadataStore>,
    _container: ContainerAsync<Postgres>,
}

impl PostgresTestMetadata {
    pub async fn new() -> MetadataResult<Self> {
        let container = Postgres::default()
            .with_tag("15-alpine")
            .start()
            .await
            .map_err(|e| {
                MetadataError::Internal(format!(
                    "{POSTGRES_CONTAINER_START_ERR_PREFIX} failed to start PostgreSQL container: {e}"
                ))
            })?;

        let host = container
            .get_host()
            .await
            .map_err(|e| MetadataError::Internal(e.to_string()))?;
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .map_err(|e| MetadataError::Internal(e.to_string()))?;
        let url = format!("postgres://postgres:postgres@{host}:{port}/postgres");

        let store = PostgresStore::from_url(&url, 5, Some(30_000)).await?;
        Ok(Self {
            store: Arc::new(store),
            _container: container,
        })
    }
}

pub fn resource(title: &str) -> ResourceRow {
    let now = OffsetDateTime::now_utc();
    ResourceRow {
        resource_id: Uuid::new_v4(),
        title: title.to_string(),
        created_at: now,
        updated_at: now,
    }
}

pub fn files(resource_id: Uuid, entries: &[(&str, &str)]) -> Vec<ResourceFileRow> {
    entries
        .iter()
        .enumerate()
        .map(|(i, (name, key))| ResourceFileRow {
            resource_id,
            position: i as i32,
            display_name: name.to_string(),
            storage_key: key.to_string(),
        })
        .collect()
}

pub fn token(selector: &str, resource_id: Uuid, expires_in: Duration) -> DownloadTokenRow {
    let now = OffsetDateTime::now_utc();
    DownloadTokenRow {
        selector: selector.to_string(),
        token_hash: format!("hash-of-{selector}"),
        resource_id,
        created_at: now,
        expires_at: now + expires_in,
    }
}

async fn seeded_resource(store: &Arc<dyn MetadataStore>) -> ResourceRow {
    let res = resource("Holiday photos");
    store
        .upsert_resource(&res, &files(res.resource_id, &[("a.jpg", "k/a"), ("b.jpg", "k/b")]))
        .await
        .unwrap();
    res
}

pub async fn token_is_consumed_once(store: Arc<dyn MetadataStore>) {
    let res = seeded_resource(&store).await;
    let row = token("sel-once", res.resource_id, Duration::minutes(10));
    store.create_download_token(&row).await.unwrap();

    let fetched = store.get_download_token("sel-once").await.unwrap().unwrap();
    assert_eq!(fetched.resource_id, res.resource_id);
    assert_eq!(fetched.token_hash, row.token_hash);

    let now = OffsetDateTime::now_utc();
    assert!(store.consume_download_token("sel-once", &row.token_hash, now).await.unwrap());
    assert!(!store.consume_download_token("sel-once", &row.token_hash, now).await.unwrap());
    assert!(store.get_download_token("sel-once").await.unwrap().is_none());
}

pub async fn wrong_hash_leaves_token(store: Arc<dyn MetadataStore>) {
    let res = seeded_resource(&store).await;
    let row = token("sel-hash", res.resource_id, Duration::minutes(10));
    store.create_download_token(&row).await.unwrap();

    let now = OffsetDateTime::now_utc();
    assert!(!store.consume_download_token("sel-hash", "not-the-hash", now).await.unwrap());
    assert!(store.get_download_token("sel-hash").await.unwrap().is_some());
    assert!(store.consume_download_token("sel-hash", &row.token_hash, now).await.unwrap());
}

pub async fn expired_token_is_refused_and_purged(store: Arc<dyn MetadataStore>) {
    let res = seeded_resource(&store).await;
    let expired = token("sel-expired", res.resource_id, Duration::seconds(-5));
    let live = token("sel-live", res.resource_id, Duration::minutes(10));
    store.create_download_token(&expired).await.unwrap();
    store.create_download_token(&live).await.unwrap();

    let now = OffsetDateTime::now_utc();
    assert!(
        !store
            .consume_download_token("sel-expired", &expired.token_hash, now)
            .await
            .unwrap()
    );

    assert_eq!(store.purge_expired_download_tokens(now).await.unwrap(), 1);
    assert!(store.get_download_token("sel-expired").await.unwrap().is_none());
    assert!(store.get_download_token("sel-live").await.unwrap().is_some());

    // Expiry is exclusive: a token is dead at its expiry instant.
    let at_expiry = live.expires_at;
    assert!(
        !store
            .consume_download_token("sel-live", &live.token_hash, at_expiry)
            .await
            .unwrap()
    );
}

pub async fn concurrent_consume_succeeds_once(store: Arc<dyn MetadataStore>) {
    let res = seeded_resource(&store).await;
    let row = token("sel-race", res.resource_id, Duration::minutes(10));
    store.create_download_token(&row).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let hash = row.token_hash.clone();
        handles.push(tokio::spawn(async move {
            store
                .consume_download_token("sel-race", &hash, OffsetDateTime::now_utc())
                .await
                .unwrap()
        }));
    }

    let mut wins = 0;
    for handle in handles {
        if handle.await.unwrap() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);
}

pub async fn token_rules(store: Arc<dyn MetadataStore>) {
    let missing = token("sel-orphan", Uuid::new_v4(), Duration::minutes(10));
    assert!(matches!(
        store.create_download_token(&missing).await,
        Err(MetadataError::Constraint(_))
    ));

    let res = seeded_resource(&store).await;
    let row = token("sel-dup", res.resource_id, Duration::minutes(10));
    store.create_download_token(&row).await.unwrap();
    assert!(matches!(
        store.create_download_token(&row).await,
        Err(MetadataError::AlreadyExists(_))
    ));
}

pub async fn resource_upsert_replaces_files(store: Arc<dyn MetadataStore>) {
    let res = seeded_resource(&store).await;
    let first = store.get_resource(res.resource_id).await.unwrap().unwrap();
    assert_eq!(first.title, "Holiday photos");

    let mut renamed = res.clone();
    renamed.title = "Holiday photos (final)".to_string();
    renamed.created_at = res.created_at + Duration::days(1);
    renamed.updated_at = res.updated_at + Duration::days(1);
    let new_files = files(
        res.resource_id,
        &[("c.jpg", "k/c"), ("a.jpg", "k/a"), ("notes.txt", "k/n")],
    );
    store.upsert_resource(&renamed, &new_files).await.unwrap();

    let stored = store.get_resource(res.resource_id).await.unwrap().unwrap();
    assert_eq!(stored.title, "Holiday photos (final)");
    assert_eq!(stored.created_at, first.created_at);
    assert!(stored.updated_at > first.updated_at);

    let listed = store.list_resource_files(res.resource_id).await.unwrap();
    assert_eq!(listed, new_files);
}

pub async fn resource_upsert_rejects_foreign_files(store: Arc<dyn MetadataStore>) {
    let res = resource("Mixed");
    let stray = files(Uuid::new_v4(), &[("a.jpg", "k/a")]);
    assert!(matches!(
        store.upsert_resource(&res, &stray).await,
        Err(MetadataError::Constraint(_))
    ));
    assert!(store.get_resource(res.resource_id).await.unwrap().is_none());
}

pub async fn delete_resource_cascades(store: Arc<dyn MetadataStore>) {
    let res = seeded_resource(&store).await;
    store
        .create_download_token(&token("sel-cascade", res.resource_id, Duration::minutes(10)))
        .await
        .unwrap();

    assert!(store.delete_resource(res.resource_id).await.unwrap());
    assert!(!store.delete_resource(res.resource_id).await.unwrap());
    assert!(store.get_resource(res.resource_id).await.unwrap().is_none());
    assert!(store.list_resource_files(res.resource_id).await.unwrap().is_empty());
    assert!(store.get_download_token("sel-cascade").await.unwrap().is_none());
}
