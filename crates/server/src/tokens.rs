//! Single-use download tokens.
//!
//! A token moves from issued to consumed on its first successful redemption,
//! or silently to expired when its lifetime passes. Expiry is enforced at
//! redemption; the sweeper only keeps the table small.

use crate::metrics;
use coffer_core::config::DownloadConfig;
use coffer_core::{DownloadSecret, ResourceId};
use coffer_metadata::{DownloadTokenRow, MetadataError, MetadataStore};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tokio::task::JoinHandle;

/// Token operation errors.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Absent, malformed, expired or already consumed.
    #[error("download token is invalid")]
    Invalid,

    #[error("requested ttl of {requested}s is outside 1..={max}s")]
    TtlOutOfRange { requested: u64, max: u64 },

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// A freshly issued token. `secret` is the only copy of the plaintext.
#[derive(Debug)]
pub struct IssuedToken {
    pub secret: DownloadSecret,
    pub resource_id: ResourceId,
    pub expires_at: OffsetDateTime,
}

/// Issues and redeems download tokens against the metadata store.
pub struct TokenManager {
    metadata: Arc<dyn MetadataStore>,
    default_ttl: Duration,
    max_ttl_secs: u64,
}

impl TokenManager {
    pub fn new(metadata: Arc<dyn MetadataStore>, config: &DownloadConfig) -> Self {
        Self {
            metadata,
            default_ttl: config.default_ttl(),
            max_ttl_secs: config.max_ttl_secs,
        }
    }

    /// Issue a token for `resource_id`, valid for `ttl_secs` or the default.
    pub async fn issue(
        &self,
        resource_id: ResourceId,
        ttl_secs: Option<u64>,
    ) -> Result<IssuedToken, TokenError> {
        self.issue_at(resource_id, ttl_secs, OffsetDateTime::now_utc())
            .await
    }

    /// [`Self::issue`] with an explicit issue time.
    pub async fn issue_at(
        &self,
        resource_id: ResourceId,
        ttl_secs: Option<u64>,
        now: OffsetDateTime,
    ) -> Result<IssuedToken, TokenError> {
        let out_of_range = |requested| TokenError::TtlOutOfRange {
            requested,
            max: self.max_ttl_secs,
        };
        let ttl = match ttl_secs {
            None => self.default_ttl,
            Some(secs) if (1..=self.max_ttl_secs).contains(&secs) => {
                Duration::seconds(i64::try_from(secs).map_err(|_| out_of_range(secs))?)
            }
            Some(secs) => return Err(out_of_range(secs)),
        };

        let now = coffer_metadata::db_timestamp(now);
        let expires_at = now
            .checked_add(ttl)
            .ok_or_else(|| out_of_range(ttl.whole_seconds().unsigned_abs()))?;
        let secret = DownloadSecret::generate();
        let row = DownloadTokenRow {
            selector: secret.selector().to_string(),
            token_hash: secret.verifier_hash(),
            resource_id: *resource_id.as_uuid(),
            created_at: now,
            expires_at,
        };
        self.metadata.create_download_token(&row).await?;

        metrics::TOKENS_ISSUED.inc();
        tracing::info!(
            selector = %secret.selector(),
            resource_id = %resource_id,
            expires_at = %row.expires_at,
            "download token issued"
        );

        Ok(IssuedToken {
            secret,
            resource_id,
            expires_at: row.expires_at,
        })
    }

    /// Consume a presented token and return the resource it grants.
    pub async fn redeem(&self, presented: &str) -> Result<ResourceId, TokenError> {
        self.redeem_at(presented, OffsetDateTime::now_utc()).await
    }

    /// [`Self::redeem`] evaluated at `now`.
    pub async fn redeem_at(
        &self,
        presented: &str,
        now: OffsetDateTime,
    ) -> Result<ResourceId, TokenError> {
        let result = self.try_redeem(presented, now).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(TokenError::Invalid) => "invalid",
            Err(_) => "error",
        };
        metrics::TOKEN_REDEMPTIONS
            .with_label_values(&[outcome])
            .inc();
        result
    }

    async fn try_redeem(
        &self,
        presented: &str,
        now: OffsetDateTime,
    ) -> Result<ResourceId, TokenError> {
        let secret = DownloadSecret::parse(presented).map_err(|_| TokenError::Invalid)?;
        let selector = secret.selector().as_str();

        let row = self
            .metadata
            .get_download_token(selector)
            .await?
            .ok_or(TokenError::Invalid)?;

        if !secret.matches(&row.token_hash) {
            tracing::debug!(selector, "download token verifier mismatch");
            return Err(TokenError::Invalid);
        }
        if row.expires_at <= now {
            tracing::debug!(selector, expires_at = %row.expires_at, "download token expired");
            return Err(TokenError::Invalid);
        }

        // The conditional delete is the actual redemption; the reads above
        // only decide whether attempting it makes sense.
        if !self
            .metadata
            .consume_download_token(selector, &row.token_hash, now)
            .await?
        {
            tracing::debug!(selector, "download token already consumed");
            return Err(TokenError::Invalid);
        }

        tracing::info!(selector, resource_id = %row.resource_id, "download token redeemed");
        Ok(ResourceId::from(row.resource_id))
    }

    /// Delete tokens expired at `now`.
    pub async fn purge_expired(&self, now: OffsetDateTime) -> Result<u64, TokenError> {
        let purged = self.metadata.purge_expired_download_tokens(now).await?;
        metrics::TOKENS_PURGED.inc_by(purged);
        Ok(purged)
    }
}

/// Periodically purge expired tokens until the runtime shuts down.
pub fn spawn_sweeper(tokens: Arc<TokenManager>, interval: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match tokens.purge_expired(OffsetDateTime::now_utc()).await {
                Ok(0) => tracing::debug!("no expired download tokens"),
                Ok(purged) => tracing::info!(purged, "expired download tokens purged"),
                Err(e) => tracing::warn!(error = %e, "download token sweep failed"),
            }
        }
    })
}
