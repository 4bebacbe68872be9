//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult, classify_write_error};
use crate::models::{DownloadTokenRow, ResourceFileRow, ResourceRow, db_timestamp};
use crate::repos::{DownloadTokenRepo, ResourceRepo};
use crate::store::MetadataStore;
use async_trait::async_trait;
use coffer_core::config::PgSslMode;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
///
/// Required when several server processes redeem the same tokens; the
/// conditional delete in [`DownloadTokenRepo::consume_download_token`] is
/// atomic across connections.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Connect using a full connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Connect using individual parameters, so the password can come from
    /// its own environment variable.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }
        if let Some(pass) = password {
            opts = opts.password(pass);
        }
        if let Some(mode) = ssl_mode {
            opts = opts.ssl_mode(match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            });
        }

        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
            tracing::info!(timeout_ms, "PostgreSQL statement_timeout set");
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements cannot hold several commands.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl DownloadTokenRepo for PostgresStore {
    async fn create_download_token(&self, token: &DownloadTokenRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO download_tokens (selector, token_hash, resource_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
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

    async fn get_download_token(&self, selector: &str) -> MetadataResult<Option<DownloadTokenRow>> {
        let row = sqlx::query_as::<_, DownloadTokenRow>(
            "SELECT selector, token_hash, resource_id, created_at, expires_at \
             FROM download_tokens WHERE selector = $1",
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
             WHERE selector = $1 AND token_hash = $2 AND expires_at > $3",
        )
        .bind(selector)
        .bind(token_hash)
        .bind(db_timestamp(now))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn purge_expired_download_tokens(&self, now: OffsetDateTime) -> MetadataResult<u64> {
        let result = sqlx::query("DELETE FROM download_tokens WHERE expires_at <= $1")
            .bind(db_timestamp(now))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ResourceRepo for PostgresStore {
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
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (resource_id) DO UPDATE
            SET title = EXCLUDED.title, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(resource.resource_id)
        .bind(&resource.title)
        .bind(db_timestamp(resource.created_at))
        .bind(db_timestamp(resource.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| classify_write_error(e, &what))?;

        sqlx::query("DELETE FROM resource_files WHERE resource_id = $1")
            .bind(resource.resource_id)
            .execute(&mut *tx)
            .await?;

        for file in files {
            sqlx::query(
                r#"
                INSERT INTO resource_files (resource_id, position, display_name, storage_key)
                VALUES ($1, $2, $3, $4)
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
            "SELECT resource_id, title, created_at, updated_at FROM resources WHERE resource_id = $1",
        )
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_resource_files(&self, resource_id: Uuid) -> MetadataResult<Vec<ResourceFileRow>> {
        let rows = sqlx::query_as::<_, ResourceFileRow>(
            "SELECT resource_id, position, display_name, storage_key \
             FROM resource_files WHERE resource_id = $1 ORDER BY position",
        )
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_resource(&self, resource_id: Uuid) -> MetadataResult<bool> {
        let result = sqlx::query("DELETE FROM resources WHERE resource_id = $1")
            .bind(resource_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
