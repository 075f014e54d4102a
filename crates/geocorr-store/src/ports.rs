use crate::fingerprint::{checksum, CacheKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geocorr_core::error::{GeocorrError, Result};
use serde::{Deserialize, Serialize};

/// A cached stage output with its integrity checksum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub created_at: DateTime<Utc>,

    /// Hex SHA-256 of `payload`
    pub checksum: String,

    /// Serialized stage output (JSON)
    pub payload: String,
}

impl CacheEntry {
    pub fn new(key: CacheKey, payload: String) -> Self {
        Self { checksum: checksum(payload.as_bytes()), key, created_at: Utc::now(), payload }
    }

    /// Check the entry belongs to `expected` and its payload is intact
    pub fn verify(&self, expected: &CacheKey) -> Result<()> {
        if &self.key != expected {
            return Err(GeocorrError::CacheCorruption {
                key: expected.to_string(),
                reason: format!("entry is stored under key {}", self.key),
            });
        }
        if checksum(self.payload.as_bytes()) != self.checksum {
            return Err(GeocorrError::CacheCorruption {
                key: expected.to_string(),
                reason: "payload checksum mismatch".to_string(),
            });
        }
        Ok(())
    }

    /// Approximate size in bytes
    pub fn size(&self) -> u64 {
        (self.payload.len() + self.checksum.len() + self.key.as_str().len()) as u64
    }
}

/// Port for one cache tier
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Fetch an entry. Integrity failures surface as `CacheCorruption`.
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Store an entry, replacing any entry under the same key
    async fn put(&self, entry: CacheEntry) -> Result<()>;

    /// Remove an entry; returns whether one existed
    async fn remove(&self, key: &CacheKey) -> Result<bool>;

    /// Remove every entry; returns how many were removed
    async fn clear(&self) -> Result<usize>;

    /// Number of stored entries
    async fn len(&self) -> usize;

    /// Total size of stored entries in bytes
    async fn size_bytes(&self) -> u64;
}
