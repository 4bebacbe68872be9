//! Application state shared across handlers.

use crate::bootstrap::IssuerKeys;
use crate::tokens::TokenManager;
use coffer_core::config::AppConfig;
use coffer_metadata::MetadataStore;
use coffer_storage::ObjectStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Object storage the archive entries are read from.
    pub storage: Arc<dyn ObjectStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Download token issuance and redemption.
    pub tokens: Arc<TokenManager>,
    /// Accepted issuer secrets.
    pub issuers: Arc<IssuerKeys>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        issuers: IssuerKeys,
    ) -> Self {
        let tokens = Arc::new(TokenManager::new(metadata.clone(), &config.download));
        Self {
            config: Arc::new(config),
            storage,
            metadata,
            tokens,
            issuers: Arc::new(issuers),
        }
    }

    /// Download URL for a token, absolute when a public base URL is set.
    pub fn download_url(&self, token: &str) -> String {
        let base = self
            .config
            .server
            .public_base_url
            .as_deref()
            .unwrap_or("")
            .trim_end_matches('/');
        format!("{base}/v1/downloads/stream?token={token}")
    }
}
