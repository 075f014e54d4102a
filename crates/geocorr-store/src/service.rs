//! Explicit cache service over a memory tier and an optional disk tier.

use crate::disk::DiskTier;
use crate::fingerprint::CacheKey;
use crate::memory::MemoryTier;
use crate::ports::{CacheEntry, CacheTier};
use geocorr_core::error::{GeocorrError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Counters and tier sizes for reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheReport {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub computations: u64,
    pub corruptions: u64,
    pub memory_entries: usize,
    pub disk_entries: usize,
    pub disk_bytes: u64,
}

impl CacheReport {
    pub fn hits(&self) -> u64 {
        self.memory_hits + self.disk_hits
    }
}

#[derive(Debug, Default)]
struct CacheMetrics {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
    corruptions: AtomicU64,
}

impl CacheMetrics {
    fn record(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// A freshly computed stage output
#[derive(Debug, Clone, PartialEq)]
pub enum Computed<T> {
    /// Deterministic for its key; stored
    Complete(T),
    /// Missing parts that a rerun may recover; handed back but never stored
    Partial(T),
}

/// Fingerprint-keyed store for stage outputs.
///
/// Payloads are kept as the exact JSON text produced on first computation,
/// so a key always yields byte-identical output. Concurrent requests for one
/// key are serialized by a per-key gate; different keys never wait on each
/// other.
#[derive(Debug)]
pub struct CacheService {
    memory: MemoryTier,
    disk: Option<DiskTier>,
    gates: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    metrics: CacheMetrics,
}

impl Default for CacheService {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl CacheService {
    /// Session-only cache
    pub fn in_memory() -> Self {
        Self {
            memory: MemoryTier::new(),
            disk: None,
            gates: Mutex::new(HashMap::new()),
            metrics: CacheMetrics::default(),
        }
    }

    /// Cache backed by a persistent tier
    pub fn with_disk(disk: DiskTier) -> Self {
        Self { disk: Some(disk), ..Self::in_memory() }
    }

    pub fn disk(&self) -> Option<&DiskTier> {
        self.disk.as_ref()
    }

    /// Raw payload lookup, memory first. A corrupt disk entry is logged,
    /// invalidated and reported as a miss.
    ///
    /// Only disk entries are checked against their checksum; memory entries
    /// never leave the process and are returned as stored.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<String>> {
        if let Some(entry) = self.memory.get(key).await? {
            CacheMetrics::record(&self.metrics.memory_hits);
            tracing::debug!("Cache hit ({}) for {}", self.memory.name(), key);
            return Ok(Some(entry.payload));
        }

        if let Some(disk) = &self.disk {
            match disk.get(key).await {
                Ok(Some(entry)) => {
                    CacheMetrics::record(&self.metrics.disk_hits);
                    tracing::debug!("Cache hit ({}) for {}", disk.name(), key);
                    let payload = entry.payload.clone();
                    self.memory.put(entry).await?;
                    return Ok(Some(payload));
                }
                Ok(None) => {}
                Err(e @ GeocorrError::CacheCorruption { .. }) => {
                    CacheMetrics::record(&self.metrics.corruptions);
                    tracing::warn!("{}; discarding entry", e);
                    disk.remove(key).await?;
                }
                Err(e) => return Err(e),
            }
        }

        CacheMetrics::record(&self.metrics.misses);
        tracing::debug!("Cache miss for {}", key);
        Ok(None)
    }

    /// Store a payload in every tier. A failed disk write only loses
    /// persistence and is logged.
    pub async fn put(&self, key: &CacheKey, payload: String) -> Result<()> {
        let entry = CacheEntry::new(key.clone(), payload);
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.put(entry.clone()).await {
                tracing::warn!("Failed to persist cache entry {}: {}", key, e);
            }
        }
        self.memory.put(entry).await
    }

    /// Remove a key from every tier; returns whether any tier held it
    pub async fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        let mut removed = self.memory.remove(key).await?;
        if let Some(disk) = &self.disk {
            removed |= disk.remove(key).await?;
        }
        Ok(removed)
    }

    /// Empty every tier; returns the number of entries removed
    pub async fn clear(&self) -> Result<usize> {
        let mut removed = self.memory.clear().await?;
        if let Some(disk) = &self.disk {
            removed += disk.clear().await?;
        }
        tracing::info!("Cleared {} cache entries", removed);
        Ok(removed)
    }

    /// Typed lookup. An undecodable payload is treated like a corrupt entry.
    pub async fn get_typed<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>> {
        let Some(payload) = self.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&payload) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                CacheMetrics::record(&self.metrics.corruptions);
                tracing::warn!("Cache entry {} does not decode ({}); discarding entry", key, e);
                self.invalidate(key).await?;
                Ok(None)
            }
        }
    }

    pub async fn put_typed<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<()> {
        self.put(key, serde_json::to_string(value)?).await
    }

    /// Return the cached value for `key`, computing and storing it on a miss.
    ///
    /// At most one computation per key runs at a time; concurrent callers
    /// wait for it and then read its result. Failed computations are not
    /// stored.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &CacheKey, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.get_or_compute_partial(key, move || async move { compute().await.map(Computed::Complete) }).await
    }

    /// Like [`CacheService::get_or_compute`], but the computation decides
    /// whether its output may be stored. A [`Computed::Partial`] value is
    /// returned to the caller and the next request for the key computes again.
    pub async fn get_or_compute_partial<T, F, Fut>(&self, key: &CacheKey, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Computed<T>>>,
    {
        let gate = self.gate(key).await;
        let result = {
            let _guard = gate.lock().await;
            self.get_or_compute_locked(key, compute).await
        };
        self.release_gate(key, gate).await;
        result
    }

    async fn get_or_compute_locked<T, F, Fut>(&self, key: &CacheKey, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Computed<T>>>,
    {
        if let Some(cached) = self.get_typed(key).await? {
            return Ok(cached);
        }

        CacheMetrics::record(&self.metrics.computations);
        let value = match compute().await? {
            Computed::Complete(value) => value,
            Computed::Partial(value) => {
                tracing::debug!("Partial result for {} is not cached", key);
                return Ok(value);
            }
        };

        let payload = serde_json::to_string(&value)?;
        self.put(key, payload.clone()).await?;

        // Hand back the decoded payload so first and cached runs agree exactly
        Ok(serde_json::from_str(&payload)?)
    }

    async fn gate(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut gates = self.gates.lock().await;
        gates.entry(key.clone()).or_default().clone()
    }

    async fn release_gate(&self, key: &CacheKey, gate: Arc<Mutex<()>>) {
        let mut gates = self.gates.lock().await;
        // Only the map and this caller still hold the gate
        if Arc::strong_count(&gate) <= 2 {
            gates.remove(key);
        }
    }

    /// Number of keys with a computation in flight or waiting
    pub async fn pending_keys(&self) -> usize {
        self.gates.lock().await.len()
    }

    pub async fn report(&self) -> CacheReport {
        let (disk_entries, disk_bytes) = match &self.disk {
            Some(disk) => (disk.len().await, disk.size_bytes().await),
            None => (0, 0),
        };
        CacheReport {
            memory_hits: self.metrics.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.metrics.disk_hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            computations: self.metrics.computations.load(Ordering::Relaxed),
            corruptions: self.metrics.corruptions.load(Ordering::Relaxed),
            memory_entries: self.memory.len().await,
            disk_entries,
            disk_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;

    #[tokio::test]
    async fn test_get_put_invalidate() {
        let cache = CacheService::in_memory();
        let key = Fingerprint::stage("parse").finish();

        assert_eq!(cache.get(&key).await.unwrap(), None);
        cache.put(&key, "[1]".into()).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some("[1]".to_string()));

        assert!(cache.invalidate(&key).await.unwrap());
        assert_eq!(cache.get(&key).await.unwrap(), None);

        let report = cache.report().await;
        assert_eq!(report.memory_hits, 1);
        assert_eq!(report.misses, 2);
    }

    #[tokio::test]
    async fn test_compute_once_then_hit() {
        let cache = CacheService::in_memory();
        let key = Fingerprint::stage("merge").finish();

        let first: Vec<f64> = cache.get_or_compute(&key, || async { Ok(vec![0.1, 0.2]) }).await.unwrap();
        let second: Vec<f64> =
            cache.get_or_compute(&key, || async { Ok(vec![9.9]) }).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.report().await.computations, 1);
        assert_eq!(cache.pending_keys().await, 0);
    }

    #[tokio::test]
    async fn test_failed_computation_not_cached() {
        let cache = CacheService::in_memory();
        let key = Fingerprint::stage("lab").finish();

        let failed: Result<u32> = cache
            .get_or_compute(&key, || async {
                Err(GeocorrError::TaskFailed { task: "lab".into(), reason: "boom".into() })
            })
            .await;
        assert!(failed.is_err());
        assert_eq!(cache.get(&key).await.unwrap(), None);

        let value: u32 = cache.get_or_compute(&key, || async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(cache.report().await.computations, 2);
    }

    #[tokio::test]
    async fn test_undecodable_payload_recomputed() {
        let cache = CacheService::in_memory();
        let key = Fingerprint::stage("register").finish();
        cache.put(&key, "not json".into()).await.unwrap();

        let value: Vec<u8> = cache.get_or_compute(&key, || async { Ok(vec![1, 2]) }).await.unwrap();
        assert_eq!(value, vec![1, 2]);

        let report = cache.report().await;
        assert_eq!(report.corruptions, 1);
        assert_eq!(report.computations, 1);
    }

    #[tokio::test]
    async fn test_partial_result_is_returned_but_not_stored() {
        let cache = CacheService::in_memory();
        let key = Fingerprint::stage("register").finish();

        let first: Vec<u32> = cache
            .get_or_compute_partial(&key, || async { Ok(Computed::Partial(vec![1])) })
            .await
            .unwrap();
        assert_eq!(first, vec![1]);
        assert_eq!(cache.get(&key).await.unwrap(), None);

        let second: Vec<u32> = cache
            .get_or_compute_partial(&key, || async { Ok(Computed::Complete(vec![1, 2])) })
            .await
            .unwrap();
        assert_eq!(second, vec![1, 2]);

        let third: Vec<u32> = cache.get_or_compute(&key, || async { Ok(vec![9]) }).await.unwrap();
        assert_eq!(third, vec![1, 2]);
        assert_eq!(cache.report().await.computations, 2);
    }
}
