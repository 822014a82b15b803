//! Content fingerprints.
//!
//! A fingerprint is the lowercase hex SHA-256 of a canonical view's bytes.
//! Equal fingerprints are treated as equal content.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::canonical::CanonicalView;

/// A 64-char lowercase hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Digest arbitrary bytes.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 16 hex chars, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..16]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint a canonical view.
pub fn fingerprint(view: &CanonicalView<'_>) -> serde_json::Result<Fingerprint> {
    Ok(Fingerprint::of_bytes(&view.to_bytes()?))
}
