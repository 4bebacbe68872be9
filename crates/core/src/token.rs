//! Download token secrets.
//!
//! A download token handed to a caller has the shape `<selector>.<verifier>`:
//! - the selector (hex of 12 random bytes) is persisted in clear and used to
//!   find the token row;
//! - the verifier (URL-safe base64 of 32 random bytes) is only ever persisted
//!   as its SHA-256 hex digest and is compared in constant time.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;

/// Random bytes in a selector.
pub const SELECTOR_BYTES: usize = 12;

/// Random bytes in a verifier.
pub const VERIFIER_BYTES: usize = 32;

const SELECTOR_HEX_LEN: usize = SELECTOR_BYTES * 2;
const SHA256_HEX_LEN: usize = 64;

/// Lookup half of a download token.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selector(String);

impl Selector {
    /// Parse a selector, accepting only lowercase hex of the expected length.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.len() != SELECTOR_HEX_LEN
            || !s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(crate::Error::InvalidToken("malformed selector".to_string()));
        }
        Ok(Self(s.to_string()))
    }

    fn random() -> Self {
        let mut bytes = [0u8; SELECTOR_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Get the selector as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({})", self.0)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Plaintext download secret.
///
/// Only exists in memory between generation and the response that hands it
/// to the caller, or between parsing a presented token and its verification.
#[derive(Clone)]
pub struct DownloadSecret {
    selector: Selector,
    verifier: String,
}

impl DownloadSecret {
    /// Generate a fresh secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; VERIFIER_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self {
            selector: Selector::random(),
            verifier: URL_SAFE_NO_PAD.encode(bytes),
        }
    }

    /// Parse a presented `<selector>.<verifier>` token.
    pub fn parse(token: &str) -> crate::Result<Self> {
        let (selector, verifier) = token
            .split_once('.')
            .ok_or_else(|| crate::Error::InvalidToken("missing separator".to_string()))?;
        let selector = Selector::parse(selector)?;

        let decoded = URL_SAFE_NO_PAD
            .decode(verifier)
            .map_err(|_| crate::Error::InvalidToken("malformed verifier".to_string()))?;
        if decoded.len() != VERIFIER_BYTES {
            return Err(crate::Error::InvalidToken(
                "verifier has wrong length".to_string(),
            ));
        }

        Ok(Self {
            selector,
            verifier: verifier.to_string(),
        })
    }

    /// Lookup half.
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// SHA-256 hex digest of the verifier, the only form that is persisted.
    pub fn verifier_hash(&self) -> String {
        hash_secret(&self.verifier)
    }

    /// Compare the verifier against a stored digest in constant time.
    pub fn matches(&self, stored_hash: &str) -> bool {
        constant_time_eq(&self.verifier_hash(), stored_hash)
    }

    /// The full token string for the caller.
    pub fn expose(&self) -> String {
        format!("{}.{}", self.selector, self.verifier)
    }
}

impl fmt::Debug for DownloadSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadSecret")
            .field("selector", &self.selector)
            .field("verifier", &"<redacted>")
            .finish()
    }
}

/// SHA-256 hex digest of a secret.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time string comparison. Only the length is allowed to leak.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

/// Normalize a configured SHA-256 digest.
///
/// Accepts an optional `sha256:` prefix and either case; returns lowercase hex.
pub fn normalize_sha256_hex(input: &str) -> crate::Result<String> {
    let hash = input.trim();
    let hash = hash.strip_prefix("sha256:").unwrap_or(hash).to_lowercase();
    if hash.len() != SHA256_HEX_LEN || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(crate::Error::InvalidHash(
            "expected 64 hex chars".to_string(),
        ));
    }
    Ok(hash)
}
