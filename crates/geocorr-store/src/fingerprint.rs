//! Deterministic cache keys.

use geocorr_core::table::ContentDigest;
use geocorr_core::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex-encoded SHA-256 fingerprint of a stage, its inputs and its parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a key from its hex form, e.g. a disk tier file stem
    pub fn from_hex(hex: &str) -> Option<Self> {
        let valid = hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| CacheKey(hex.to_string()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builder for a [`CacheKey`].
///
/// Every component is length-prefixed so that no two different component
/// sequences hash the same byte stream.
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    pub fn stage(name: &str) -> Self {
        let mut fingerprint = Self { hasher: Sha256::new() };
        fingerprint.component(b"stage", name.as_bytes());
        fingerprint
    }

    /// Add the content digest of an input table
    pub fn input(mut self, digest: &ContentDigest) -> Self {
        self.component(b"input", digest.as_bytes());
        self
    }

    /// Add several input digests; order matters
    pub fn inputs<'a, I>(self, digests: I) -> Self
    where
        I: IntoIterator<Item = &'a ContentDigest>,
    {
        digests.into_iter().fold(self, |fingerprint, digest| fingerprint.input(digest))
    }

    /// Add a named parameter set, hashed through its JSON form
    pub fn params<T: Serialize>(mut self, name: &str, params: &T) -> Result<Self> {
        let encoded = serde_json::to_vec(params)?;
        self.component(b"param", name.as_bytes());
        self.component(b"value", &encoded);
        Ok(self)
    }

    pub fn finish(self) -> CacheKey {
        CacheKey(to_hex(&self.hasher.finalize()))
    }

    fn component(&mut self, tag: &[u8], bytes: &[u8]) {
        self.hasher.update(tag);
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }
}

/// SHA-256 of a payload, hex encoded
pub fn checksum(payload: &[u8]) -> String {
    to_hex(&Sha256::digest(payload))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
