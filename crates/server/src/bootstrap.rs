//! Issuer credential initialization.

use anyhow::{Context, Result};
use coffer_core::config::IssuerConfig;
use coffer_core::token::{constant_time_eq, hash_secret, normalize_sha256_hex};

/// Digests of the bearer secrets allowed to manage resources and issue
/// download links.
#[derive(Clone, Debug, Default)]
pub struct IssuerKeys {
    hashes: Vec<String>,
}

impl IssuerKeys {
    /// Load and normalize the configured digests.
    ///
    /// An empty list is allowed; every issuer request is then rejected.
    pub fn from_config(config: &IssuerConfig) -> Result<Self> {
        let hashes = config
            .token_hashes
            .iter()
            .enumerate()
            .map(|(i, hash)| {
                normalize_sha256_hex(hash)
                    .with_context(|| format!("invalid issuer.token_hashes[{i}]"))
            })
            .collect::<Result<Vec<_>>>()?;

        if hashes.is_empty() {
            tracing::warn!("No issuer token hashes configured; issuer endpoints will reject all requests");
        } else {
            tracing::info!(count = hashes.len(), "Issuer credentials loaded");
        }
        Ok(Self { hashes })
    }

    /// Whether `secret` hashes to one of the configured digests.
    ///
    /// Every digest is compared so the time taken does not depend on which
    /// one matched.
    pub fn verify(&self, secret: &str) -> bool {
        let presented = hash_secret(secret);
        self.hashes
            .iter()
            .fold(false, |found, hash| constant_time_eq(&presented, hash) | found)
    }
}
