//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Externally visible base URL used when building download links
    /// (e.g., "https://downloads.example.com"). Links are relative when unset.
    #[serde(default)]
    pub public_base_url: Option<String>,
    /// Expose `/metrics` for Prometheus scraping (default: true).
    /// The endpoint is unauthenticated; restrict it at the network level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_base_url: None,
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Download link configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Lifetime of a download link when the issuer does not ask for one.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    /// Longest lifetime an issuer may request.
    #[serde(default = "default_max_ttl_secs")]
    pub max_ttl_secs: u64,
    /// Interval of the expired-token sweep. Zero disables the sweep; expiry is
    /// still enforced at redemption time.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_ttl_secs() -> u64 {
    crate::DEFAULT_TOKEN_TTL_SECS
}

fn default_max_ttl_secs() -> u64 {
    crate::MAX_TOKEN_TTL_SECS
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            max_ttl_secs: default_max_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl DownloadConfig {
    /// Default link lifetime as a Duration.
    pub fn default_ttl(&self) -> Duration {
        seconds(self.default_ttl_secs)
    }

    /// Sweep interval, or None when the sweep is disabled.
    pub fn sweep_interval(&self) -> Option<std::time::Duration> {
        (self.sweep_interval_secs > 0)
            .then(|| std::time::Duration::from_secs(self.sweep_interval_secs))
    }

    /// Validate download configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_ttl_secs == 0 {
            return Err("download.default_ttl_secs must be at least 1".to_string());
        }
        if self.default_ttl_secs > self.max_ttl_secs {
            return Err(format!(
                "download.default_ttl_secs ({}) exceeds download.max_ttl_secs ({})",
                self.default_ttl_secs, self.max_ttl_secs
            ));
        }
        Ok(())
    }
}

fn seconds(secs: u64) -> Duration {
    // Saturate instead of wrapping into a negative duration.
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}

/// Issuer authorization.
///
/// Issuers are the trusted callers (the storefront or CMS) that decide
/// whether someone may download a resource and then request a link for it.
/// Only SHA-256 digests of their bearer secrets are configured.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IssuerConfig {
    /// SHA-256 hex digests (64 chars, optional "sha256:" prefix).
    /// Generate with: `echo -n "your-secret" | sha256sum`
    #[serde(default)]
    pub token_hashes: Vec<String>,
}

impl IssuerConfig {
    /// Configuration accepting the bearer secret "test-issuer-token".
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            token_hashes: vec![
                "ce9dba91803c415998307c617f92f1c1db608ec6b9e748fd52a8e1985d8b8224".to_string(),
            ],
        }
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Files below a local directory.
    Filesystem {
        /// Root directory; storage keys are paths relative to it.
        path: PathBuf,
    },
    /// S3-compatible object storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (MinIO and other S3-compatible services).
        endpoint: Option<String>,
        /// Region (default: us-east-1).
        region: Option<String>,
        /// Optional prefix prepended to every storage key.
        prefix: Option<String>,
        /// Access key ID. The ambient AWS credential chain is used when unset.
        /// Prefer COFFER_STORAGE__ACCESS_KEY_ID or IAM roles over config files.
        access_key_id: Option<String>,
        /// Secret access key, required together with `access_key_id`.
        secret_access_key: Option<String>,
        /// Use path-style URLs (`endpoint/bucket/key`), needed by MinIO.
        /// AWS S3 itself expects virtual-hosted style (the default).
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/files"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                bucket,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if bucket.trim().is_empty() {
                    return Err("s3 config requires a bucket name".to_string());
                }
                match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                    (Some(_), Some(_)) | (None, None) => Ok(()),
                    _ => Err(
                        "s3 config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ),
                }
            }
            StorageConfig::Filesystem { .. } => Ok(()),
        }
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Never use TLS.
    Disable,
    /// Use TLS when the server offers it (default).
    #[default]
    Prefer,
    /// Refuse unencrypted connections.
    Require,
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database file (single node deployments and tests).
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Advisory query timeout in seconds. SQLite cannot cancel running
        /// statements; slow queries are only reported.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
    /// PostgreSQL database. Required when several server processes share
    /// download tokens.
    Postgres {
        /// Connection URL; takes precedence over the individual fields.
        url: Option<String>,
        /// Database host.
        host: Option<String>,
        /// Database port (default: 5432).
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        /// Database username.
        username: Option<String>,
        /// Database password. Prefer COFFER_METADATA__PASSWORD.
        password: Option<String>,
        /// Database name.
        database: Option<String>,
        /// SSL mode for connections.
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds, enforced by the server.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(30_000)
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(30)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) | (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => Err(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ),
                (None, Some(_), None) => Err(
                    "postgres config requires 'database' when using individual fields"
                        .to_string(),
                ),
            },
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub issuer: IssuerConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage, SQLite metadata and the
    /// "test-issuer-token" issuer secret.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            metadata: MetadataConfig::default(),
            download: DownloadConfig::default(),
            issuer: IssuerConfig::for_testing(),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.storage.validate()?;
        self.metadata.validate()?;
        self.download.validate()?;
        Ok(())
    }
}
