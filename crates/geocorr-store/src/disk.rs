//! Persistent cache tier: one JSON envelope per key under a directory.
//!
//! Entries survive restarts. Recency starts from file modification times
//! when the tier is opened and is bumped on every read and write; the least
//! recently used entries are evicted while the directory exceeds its byte
//! budget.

use crate::fingerprint::CacheKey;
use crate::ports::{CacheEntry, CacheTier};
use async_trait::async_trait;
use geocorr_core::error::{GeocorrError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::Mutex;

const ENTRY_EXTENSION: &str = "json";

#[derive(Debug, Clone, Copy)]
struct Slot {
    size: u64,
    last_used: u64,
}

#[derive(Debug, Default)]
struct DiskIndex {
    slots: HashMap<CacheKey, Slot>,
    total_bytes: u64,
    clock: u64,
}

impl DiskIndex {
    fn touch(&mut self, key: &CacheKey) {
        self.clock += 1;
        let clock = self.clock;
        if let Some(slot) = self.slots.get_mut(key) {
            slot.last_used = clock;
        }
    }

    fn insert(&mut self, key: CacheKey, size: u64) {
        self.clock += 1;
        if let Some(old) = self.slots.insert(key, Slot { size, last_used: self.clock }) {
            self.total_bytes -= old.size;
        }
        self.total_bytes += size;
    }

    fn remove(&mut self, key: &CacheKey) -> Option<Slot> {
        let slot = self.slots.remove(key)?;
        self.total_bytes -= slot.size;
        Some(slot)
    }

    /// Least recently used key, skipping `except`
    fn least_recent(&self, except: Option<&CacheKey>) -> Option<CacheKey> {
        self.slots
            .iter()
            .filter(|(key, _)| Some(*key) != except)
            .min_by_key(|(_, slot)| slot.last_used)
            .map(|(key, _)| key.clone())
    }
}

/// Disk tier with LRU eviction over a byte budget
#[derive(Debug)]
pub struct DiskTier {
    dir: PathBuf,
    budget_bytes: u64,
    index: Mutex<DiskIndex>,
}

impl DiskTier {
    /// Open (and create if needed) a cache directory, indexing existing entries
    pub async fn open(dir: impl Into<PathBuf>, budget_bytes: u64) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let mut found: Vec<(SystemTime, CacheKey, u64)> = Vec::new();
        let mut reader = tokio::fs::read_dir(&dir).await?;
        while let Some(item) = reader.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).and_then(CacheKey::from_hex) else {
                continue;
            };
            let metadata = item.metadata().await?;
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((modified, key, metadata.len()));
        }

        found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let mut index = DiskIndex::default();
        for (_, key, size) in found {
            index.insert(key, size);
        }

        tracing::debug!(
            "Opened disk cache at {} with {} entries ({} bytes)",
            dir.display(),
            index.slots.len(),
            index.total_bytes
        );

        let tier = Self { dir, budget_bytes, index: Mutex::new(index) };
        {
            let mut index = tier.index.lock().await;
            tier.evict_over_budget(&mut index, None).await?;
        }
        Ok(tier)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.{}", key, ENTRY_EXTENSION))
    }

    /// Evict least recently used entries until the budget holds.
    /// `keep` is evicted last.
    async fn evict_over_budget(&self, index: &mut DiskIndex, keep: Option<&CacheKey>) -> Result<usize> {
        let mut evicted = 0;
        while index.total_bytes > self.budget_bytes {
            let Some(victim) = index.least_recent(keep).or_else(|| keep.cloned()) else {
                break;
            };

            index.remove(&victim);
            remove_file_if_present(&self.entry_path(&victim)).await?;
            tracing::debug!("Evicted cache entry {} from disk tier", victim);
            evicted += 1;
        }
        Ok(evicted)
    }
}

#[async_trait]
impl CacheTier for DiskTier {
    fn name(&self) -> &'static str {
        "disk"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let mut index = self.index.lock().await;
        if !index.slots.contains_key(key) {
            return Ok(None);
        }

        let content = match tokio::fs::read_to_string(self.entry_path(key)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                index.remove(key);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let entry: CacheEntry =
            serde_json::from_str(&content).map_err(|e| GeocorrError::CacheCorruption {
                key: key.to_string(),
                reason: format!("unreadable envelope: {}", e),
            })?;
        entry.verify(key)?;

        index.touch(key);
        Ok(Some(entry))
    }

    async fn put(&self, entry: CacheEntry) -> Result<()> {
        let encoded = serde_json::to_vec(&entry)?;
        let size = encoded.len() as u64;

        if size > self.budget_bytes {
            tracing::warn!(
                "Cache entry {} ({} bytes) exceeds the disk budget of {} bytes; not persisted",
                entry.key,
                size,
                self.budget_bytes
            );
            return Ok(());
        }

        let mut index = self.index.lock().await;

        // Write to disk atomically via temp file
        let path = self.entry_path(&entry.key);
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &encoded).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        index.insert(entry.key.clone(), size);
        self.evict_over_budget(&mut index, Some(&entry.key)).await?;
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool> {
        let mut index = self.index.lock().await;
        let existed = index.remove(key).is_some();
        remove_file_if_present(&self.entry_path(key)).await?;
        Ok(existed)
    }

    async fn clear(&self) -> Result<usize> {
        let mut index = self.index.lock().await;
        let keys: Vec<CacheKey> = index.slots.keys().cloned().collect();
        for key in &keys {
            index.remove(key);
            remove_file_if_present(&self.entry_path(key)).await?;
        }
        Ok(keys.len())
    }

    async fn len(&self) -> usize {
        self.index.lock().await.slots.len()
    }

    async fn size_bytes(&self) -> u64 {
        self.index.lock().await.total_bytes
    }
}

async fn remove_file_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use tempfile::TempDir;

    fn key(name: &str) -> CacheKey {
        Fingerprint::stage(name).finish()
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let k = key("parse");

        {
            let tier = DiskTier::open(dir.path(), 1 << 20).await.unwrap();
            tier.put(CacheEntry::new(k.clone(), "[1,2,3]".into())).await.unwrap();
        }

        let tier = DiskTier::open(dir.path(), 1 << 20).await.unwrap();
        assert_eq!(tier.len().await, 1);
        let entry = tier.get(&k).await.unwrap().unwrap();
        assert_eq!(entry.payload, "[1,2,3]");
    }

    #[tokio::test]
    async fn test_tampered_payload_is_corruption() {
        let dir = TempDir::new().unwrap();
        let tier = DiskTier::open(dir.path(), 1 << 20).await.unwrap();
        let k = key("merge");
        tier.put(CacheEntry::new(k.clone(), "{\"v\":1}".into())).await.unwrap();

        let path = dir.path().join(format!("{}.json", k));
        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, content.replace("{\\\"v\\\":1}", "{\\\"v\\\":2}")).unwrap();

        assert!(matches!(tier.get(&k).await, Err(GeocorrError::CacheCorruption { .. })));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(tier.get(&k).await, Err(GeocorrError::CacheCorruption { .. })));
    }

    #[tokio::test]
    async fn test_lru_eviction_over_budget() {
        let dir = TempDir::new().unwrap();
        let payload = "x".repeat(400);
        let entry_size = serde_json::to_vec(&CacheEntry::new(key("a"), payload.clone())).unwrap().len() as u64;

        // Room for two entries
        let tier = DiskTier::open(dir.path(), entry_size * 2 + entry_size / 2).await.unwrap();
        let (a, b, c) = (key("a"), key("b"), key("c"));

        tier.put(CacheEntry::new(a.clone(), payload.clone())).await.unwrap();
        tier.put(CacheEntry::new(b.clone(), payload.clone())).await.unwrap();

        // Reading `a` makes `b` the least recently used
        assert!(tier.get(&a).await.unwrap().is_some());
        tier.put(CacheEntry::new(c.clone(), payload.clone())).await.unwrap();

        assert_eq!(tier.len().await, 2);
        assert!(tier.get(&a).await.unwrap().is_some());
        assert!(tier.get(&b).await.unwrap().is_none());
        assert!(tier.get(&c).await.unwrap().is_some());
        assert!(!dir.path().join(format!("{}.json", b)).exists());
        assert!(tier.size_bytes().await <= tier.budget_bytes());
    }

    #[tokio::test]
    async fn test_oversized_entry_not_persisted() {
        let dir = TempDir::new().unwrap();
        let tier = DiskTier::open(dir.path(), 16).await.unwrap();
        tier.put(CacheEntry::new(key("big"), "y".repeat(100))).await.unwrap();
        assert_eq!(tier.len().await, 0);
    }

    #[tokio::test]
    async fn test_clear_and_remove() {
        let dir = TempDir::new().unwrap();
        let tier = DiskTier::open(dir.path(), 1 << 20).await.unwrap();
        tier.put(CacheEntry::new(key("a"), "1".into())).await.unwrap();
        tier.put(CacheEntry::new(key("b"), "2".into())).await.unwrap();

        assert!(tier.remove(&key("a")).await.unwrap());
        assert!(!tier.remove(&key("a")).await.unwrap());
        assert_eq!(tier.clear().await.unwrap(), 1);
        assert_eq!(tier.len().await, 0);
        assert_eq!(tier.size_bytes().await, 0);
    }

    #[tokio::test]
    async fn test_open_ignores_foreign_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("short.json"), "{}").unwrap();
        let tier = DiskTier::open(dir.path(), 1 << 20).await.unwrap();
        assert_eq!(tier.len().await, 0);
    }
}
