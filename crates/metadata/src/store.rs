//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{DownloadTokenRepo, ResourceRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: DownloadTokenRepo + ResourceRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite schema. Timestamps are RFC 3339 text in UTC with whole seconds,
/// so text comparison orders them.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS resources (
    resource_id BLOB PRIMARY KEY,
    title TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS resource_files (
    resource_id BLOB NOT NULL REFERENCES resources(resource_id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    display_name TEXT NOT NULL,
    storage_key TEXT NOT NULL,
    PRIMARY KEY (resource_id, position)
);

CREATE TABLE IF NOT EXISTS download_tokens (
    selector TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,
    resource_id BLOB NOT NULL REFERENCES resources(resource_id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_download_tokens_expires ON download_tokens(expires_at);
CREATE INDEX IF NOT EXISTS idx_download_tokens_resource ON download_tokens(resource_id);
"#;

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // One connection: SQLite serializes writers anyway, and a single
        // connection avoids "database is locked" under concurrent requests.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        if let Some(secs) = query_timeout_secs {
            tracing::warn!(
                query_timeout_secs = secs,
                "SQLite query timeout is advisory only; use PostgreSQL when \
                 several server processes share download tokens"
            );
        }

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

mod sqlite_impl {
    use super::*;
    use crate::error::classify_write_error;
    use crate::models::{DownloadTokenRow, ResourceFileRow, ResourceRow, db_timestamp};
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl DownloadTokenRepo for SqliteStore {
        async fn create_download_token(&self, token: &DownloadTokenRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO download_tokens (selector, token_hash, resource_id, created_at, expires_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&token.selector)
            .bind(&token.token_hash)
            .bind(token.resource_id)
            .bind(db_timestamp(token.created_at))
            .bind(db_timestamp(token.expires_at))
            .execute(&self.pool)
            .await
            .map_err(|e| classify_write_error(e, &format!("download token {}", token.selector)))?;
            Ok(())
        }

        async fn get_download_token(
            &self,
            selector: &str,
        ) -> MetadataResult<Option<DownloadTokenRow>> {
            let row = sqlx::query_as::<_, DownloadTokenRow>(
                "SELECT selector, token_hash, resource_id, created_at, expires_at \
                 FROM download_tokens WHERE selector = ?",
            )
            .bind(selector)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn consume_download_token(
            &self,
            selector: &str,
            token_hash: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                "DELETE FROM download_tokens \
                 WHERE selector = ? AND token_hash = ? AND expires_at > ?",
            )
            .bind(selector)
            .bind(token_hash)
            .bind(db_timestamp(now))
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        }

        async fn purge_expired_download_tokens(&self, now: OffsetDateTime) -> MetadataResult<u64> {
            let result = sqlx::query("DELETE FROM download_tokens WHERE expires_at <= ?")
                .bind(db_timestamp(now))
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        }
    }

    #[async_trait]
    impl ResourceRepo for SqliteStore {
        async fn upsert_resource(
            &self,
            resource: &ResourceRow,
            files: &[ResourceFileRow],
        ) -> MetadataResult<()> {
            let what = format!("resource {}", resource.resource_id);
            if let Some(stray) = files.iter().find(|f| f.resource_id != resource.resource_id) {
                return Err(MetadataError::Constraint(format!(
                    "{what}: file {} belongs to resource {}",
                    stray.position, stray.resource_id
                )));
            }

            let mut tx = self.pool.begin().await?;

            sqlx::query(
                r#"
                INSERT INTO resources (resource_id, title, created_at, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(resource_id) DO UPDATE
                SET title = excluded.title, updated_at = excluded.updated_at
                "#,
            )
            .bind(resource.resource_id)
            .bind(&resource.title)
            .bind(db_timestamp(resource.created_at))
            .bind(db_timestamp(resource.updated_at))
            .execute(&mut *tx)
            .await
            .map_err(|e| classify_write_error(e, &what))?;

            sqlx::query("DELETE FROM resource_files WHERE resource_id = ?")
                .bind(resource.resource_id)
                .execute(&mut *tx)
                .await?;

            for file in files {
                sqlx::query(
                    r#"
                    INSERT INTO resource_files (resource_id, position, display_name, storage_key)
                    VALUES (?, ?, ?, ?)
                    "#,
                )
                .bind(file.resource_id)
                .bind(file.position)
                .bind(&file.display_name)
                .bind(&file.storage_key)
                .execute(&mut *tx)
                .await
                .map_err(|e| classify_write_error(e, &format!("{what} file {}", file.position)))?;
            }

            tx.commit().await?;
            Ok(())
        }

        async fn get_resource(&self, resource_id: Uuid) -> MetadataResult<Option<ResourceRow>> {
            let row = sqlx::query_as::<_, ResourceRow>(
                "SELECT resource_id, title, created_at, updated_at FROM resources WHERE resource_id = ?",
            )
            .bind(resource_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_resource_files(
            &self,
            resource_id: Uuid,
        ) -> MetadataResult<Vec<ResourceFileRow>> {
            let rows = sqlx::query_as::<_, ResourceFileRow>(
                "SELECT resource_id, position, display_name, storage_key \
                 FROM resource_files WHERE resource_id = ? ORDER BY position",
            )
            .bind(resource_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn delete_resource(&self, resource_id: Uuid) -> MetadataResult<bool> {
            let result = sqlx::query("DELETE FROM resources WHERE resource_id = ?")
                .bind(resource_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }
    }
}
