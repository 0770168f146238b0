//! Content-addressed artifact identifiers.
//!
//! An artifact is referenced on chain by an `ipfs://<cid>` URI. Everything
//! downstream (dedup, persisted state, archive URLs) works on the normalized
//! identifier with the scheme prefix removed.

use std::fmt;

use serde::{Deserialize, Serialize};

/// URI scheme prefix for content-addressed artifacts
pub const IPFS_SCHEME: &str = "ipfs://";

/// Normalized content identifier (scheme prefix stripped)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Normalize a raw identifier, accepting it with or without the scheme prefix.
    ///
    /// Returns `None` for identifiers that are empty once normalized.
    pub fn normalize(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let id = trimmed.strip_prefix(IPFS_SCHEME).unwrap_or(trimmed).trim();

        if id.is_empty() {
            None
        } else {
            Some(Self(id.to_string()))
        }
    }

    /// Extract an identifier from a token's artifact URI.
    ///
    /// Only `ipfs://` URIs name content-addressed artifacts; anything else
    /// (http links, data URIs, ...) yields `None`.
    pub fn from_artifact_uri(uri: &str) -> Option<Self> {
        if !uri.trim_start().starts_with(IPFS_SCHEME) {
            return None;
        }
        Self::normalize(uri)
    }

    /// The normalized identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Externally resolvable locator for this artifact on the given gateway
    pub fn gateway_url(&self, gateway: &str) -> String {
        format!("{}/{}", gateway.trim_end_matches('/'), self.0)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArtifactId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
