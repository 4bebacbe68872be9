//! Download token repository.

use crate::error::MetadataResult;
use crate::models::DownloadTokenRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for single-use download tokens.
#[async_trait]
pub trait DownloadTokenRepo: Send + Sync {
    /// Persist a newly issued token. Fails with `Constraint` if the resource
    /// does not exist and `AlreadyExists` on a selector collision.
    async fn create_download_token(&self, token: &DownloadTokenRow) -> MetadataResult<()>;

    /// Get a token by selector, expired or not.
    async fn get_download_token(&self, selector: &str) -> MetadataResult<Option<DownloadTokenRow>>;

    /// Atomically delete the token if it matches `token_hash` and has not
    /// expired at `now`.
    ///
    /// Returns true for exactly one caller per token, however many race.
    async fn consume_download_token(
        &self,
        selector: &str,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// Delete every token expired at `now`. Returns the number removed.
    async fn purge_expired_download_tokens(&self, now: OffsetDateTime) -> MetadataResult<u64>;
}
