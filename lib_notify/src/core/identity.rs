//! # Identity Hasher
//!
//! Derives the content-identity token used as the only deduplication key.
//! The token is the lowercase hex SHA-256 digest of `"{title}:{link}"`.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex digest identifying one real-world notice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityToken(String);

impl IdentityToken {
    /// Length in characters of every derived token.
    pub const HEX_LEN: usize = 64;

    /// Hashes the identifying fields of a notice.
    pub fn derive(title: &str, link: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update(b":");
        hasher.update(link.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps a token previously read back from storage.
    pub fn from_stored(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
