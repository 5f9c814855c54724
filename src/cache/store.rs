//! Cache Store Module
//!
//! The cache façade: composes the metadata index, disk store, eviction
//! policy and rehydration into the public operations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use tracing::info;

use crate::cache::disk::DiskStore;
use crate::cache::eviction;
use crate::cache::index::{EntryMeta, MetadataIndex};
use crate::cache::record::{current_timestamp_ms, is_expired_at, CacheRecord};
use crate::cache::rehydrate::rehydrate;
use crate::cache::stats::CacheStats;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

// == Cache ==
/// Persistent key-value cache with disk-backed values.
///
/// Metadata lives in an in-memory index; payloads are spilled to
/// locator-addressed files. All methods take `&self`, so the cache can be
/// shared freely across tasks (typically behind an `Arc`).
///
/// The index lock is held only for in-memory updates, never across storage
/// I/O. Writes to a single key are serialized through a per-key lock; reads
/// run concurrently.
#[derive(Debug)]
pub struct Cache {
    /// Record storage
    disk: DiskStore,
    /// Key to descriptor mapping plus byte accounting
    index: Mutex<MetadataIndex>,
    /// Performance counters
    stats: Mutex<CacheStats>,
    /// Per-key write serialization
    key_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Default TTL in seconds for entries without explicit TTL
    default_ttl: u64,
    /// Size budget in bytes (0 = unlimited)
    max_size: u64,
    /// Set once by close(); all operations fail afterwards
    closed: AtomicBool,
}

impl Cache {
    // == Open ==
    /// Opens a cache over the configured storage directory.
    ///
    /// The directory is created if absent. With `rehydrate_on_start`, the
    /// index is rebuilt from records already on disk before the cache is
    /// returned, so no operation can observe a partially rehydrated state.
    pub async fn open(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let disk = DiskStore::open(&config.path).await?;
        let mut index = MetadataIndex::new();
        if config.rehydrate_on_start {
            rehydrate(&disk, &mut index).await?;
        }

        info!(
            "Cache opened at {:?}: {} entries, {} bytes used, budget {} bytes",
            config.path,
            index.len(),
            index.size(),
            config.max_size_bytes
        );

        Ok(Self {
            disk,
            index: Mutex::new(index),
            stats: Mutex::new(CacheStats::new()),
            key_locks: Mutex::new(HashMap::new()),
            default_ttl: config.default_ttl,
            max_size: config.max_size_bytes,
            closed: AtomicBool::new(false),
        })
    }

    // == Set ==
    /// Stores `value` under `key`, replacing any previous entry.
    ///
    /// A `ttl` of zero is honored as an immediately-expiring entry; `None`
    /// falls back to the configured default. Fails with
    /// [`CacheError::EntrySizeExceeded`] before any mutation if the encoded
    /// record cannot fit the budget at all.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> Result<()> {
        self.ensure_open()?;

        let ttl = ttl.unwrap_or(self.default_ttl);
        let record = CacheRecord::new(key, value, ttl);
        let bytes = record.encode()?;
        let size = bytes.len() as u64;

        if self.max_size > 0 && size > self.max_size {
            return Err(CacheError::EntrySizeExceeded {
                size,
                max_size: self.max_size,
            });
        }

        let guard = self.lock_key(key).await;
        let result = self.set_locked(key, record.expires_at, &bytes, size).await;
        drop(guard);
        self.prune_key_lock(key);
        result
    }

    async fn set_locked(
        &self,
        key: &str,
        expires_at: u64,
        bytes: &[u8],
        size: u64,
    ) -> Result<()> {
        // Reclaim the previous entry's space before making room.
        let previous = { self.index.lock().remove(key) };
        if let Some(previous) = previous {
            self.disk.delete(&previous.locator).await?;
        }

        self.free_space(size).await?;

        let locator = DiskStore::new_locator();
        self.disk.write(&locator, bytes).await?;

        // The index is updated only after the record is visible on disk; a
        // failed write must leave no trace of the entry.
        self.index.lock().put(
            key,
            EntryMeta {
                locator,
                expires_at,
                size_bytes: size,
            },
        );
        Ok(())
    }

    // == Get ==
    /// Retrieves the value for `key`, or `None` if unknown or expired.
    ///
    /// An expired entry is removed as a side effect before returning.
    /// Decode failures and I/O failures are returned to the caller.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;

        let meta = { self.index.lock().get(key).cloned() };
        let meta = match meta {
            Some(meta) => meta,
            None => {
                self.stats.lock().record_miss();
                return Ok(None);
            }
        };

        if is_expired_at(meta.expires_at, current_timestamp_ms()) {
            if self.remove_entry_if(key, &meta.locator).await? {
                self.stats.lock().record_expiration();
            }
            self.stats.lock().record_miss();
            return Ok(None);
        }

        match self.disk.read(&meta.locator).await {
            Ok(bytes) => {
                let record = CacheRecord::decode(&bytes)?;
                self.stats.lock().record_hit();
                Ok(Some(record.value))
            }
            // The entry can be evicted between lookup and read; absence is benign.
            Err(CacheError::NotFound(_)) => {
                self.stats.lock().record_miss();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    // == Delete ==
    /// Removes `key` from the cache. Deleting an absent key is a no-op success.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.ensure_open()?;

        let guard = self.lock_key(key).await;
        let result = self.remove_entry(key).await;
        drop(guard);
        self.prune_key_lock(key);
        result.map(|_| ())
    }

    // == Keys ==
    /// Snapshot of all indexed keys.
    ///
    /// May include entries whose expiry has passed but has not been observed
    /// by a `get` or an eviction sweep yet.
    pub fn keys(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(self.index.lock().keys())
    }

    // == Reset ==
    /// With a key, equivalent to [`Cache::delete`]. Without, removes every
    /// entry and additionally sweeps the storage directory for stray records
    /// not present in the index.
    pub async fn reset(&self, key: Option<&str>) -> Result<()> {
        self.ensure_open()?;

        match key {
            Some(key) => self.delete(key).await,
            None => {
                let drained = { self.index.lock().drain() };
                let removed = drained.len();
                for meta in drained {
                    self.disk.delete(&meta.locator).await?;
                }
                for locator in self.disk.list().await? {
                    self.disk.delete(&locator).await?;
                }
                info!("Cache reset: {} entries removed", removed);
                Ok(())
            }
        }
    }

    // == Close ==
    /// Marks the cache closed and releases the in-memory index.
    ///
    /// Records on disk are left in place for the next rehydration. Every
    /// subsequent operation fails with [`CacheError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.index.lock().drain();
        self.key_locks.lock().clear();
        info!("Cache closed");
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.lock().clone();
        let (len, size) = {
            let index = self.index.lock();
            (index.len(), index.size())
        };
        stats.set_usage(len, size);
        stats
    }

    // == Length ==
    /// Returns the current number of entries.
    pub fn len(&self) -> usize {
        self.index.lock().len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.index.lock().is_empty()
    }

    // == Size ==
    /// Total bytes across all persisted live records.
    pub fn size_bytes(&self) -> u64 {
        self.index.lock().size()
    }

    // == Eviction Driver ==
    /// Brings `current_size + incoming` under the budget.
    ///
    /// Already-expired entries are removed unconditionally first; if that is
    /// not enough, live entries are evicted furthest-future expiry first,
    /// re-checking the budget after each removal.
    async fn free_space(&self, incoming: u64) -> Result<()> {
        if self.max_size == 0 {
            return Ok(());
        }
        if self.index.lock().size() + incoming <= self.max_size {
            return Ok(());
        }

        let now = current_timestamp_ms();
        let snapshot = { self.index.lock().snapshot() };
        for key in eviction::expired_keys(&snapshot, now) {
            if self.remove_entry(&key).await? {
                self.stats.lock().record_expiration();
            }
        }

        let snapshot = { self.index.lock().snapshot() };
        for key in eviction::eviction_order(&snapshot, now) {
            if self.index.lock().size() + incoming <= self.max_size {
                break;
            }
            if self.remove_entry(&key).await? {
                self.stats.lock().record_eviction();
            }
        }
        Ok(())
    }

    // == Entry Removal ==
    /// Shared removal path: drop the descriptor from the index, then delete
    /// its record. Used by delete, lazy expiry, eviction and reset.
    ///
    /// Returns whether an entry was actually removed.
    async fn remove_entry(&self, key: &str) -> Result<bool> {
        let meta = { self.index.lock().remove(key) };
        match meta {
            Some(meta) => {
                self.disk.delete(&meta.locator).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes `key` only while it still points at `locator`, so a stale
    /// expiry check never clobbers a concurrent replacement.
    async fn remove_entry_if(&self, key: &str, locator: &str) -> Result<bool> {
        let meta = {
            let mut index = self.index.lock();
            let matches = index.get(key).map_or(false, |m| m.locator == locator);
            if matches {
                index.remove(key)
            } else {
                None
            }
        };
        match meta {
            Some(meta) => {
                self.disk.delete(&meta.locator).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // == Key Locks ==
    /// Serializes read-modify-write sequences on a single key so concurrent
    /// writers cannot both believe they replaced the current record.
    async fn lock_key(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.key_locks.lock();
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drops a key's lock entry once no task holds or awaits it.
    fn prune_key_lock(&self, key: &str) {
        let mut locks = self.key_locks.lock();
        if let Some(lock) = locks.get(key) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(key);
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(CacheError::Closed)
        } else {
            Ok(())
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::time::{sleep, Duration};

    fn config(dir: &TempDir) -> CacheConfig {
        CacheConfig {
            path: dir.path().to_path_buf(),
            default_ttl: 300,
            max_size_bytes: 0,
            rehydrate_on_start: true,
        }
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(config(&dir)).await.unwrap();

        cache.set("key1", b"value1".to_vec(), None).await.unwrap();

        assert_eq!(cache.get("key1").await.unwrap().unwrap(), b"value1");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(config(&dir)).await.unwrap();

        assert!(cache.get("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(config(&dir)).await.unwrap();

        cache.set("key1", b"value1".to_vec(), None).await.unwrap();
        cache.delete("key1").await.unwrap();

        assert!(cache.is_empty());
        assert_eq!(cache.size_bytes(), 0);
        assert!(cache.get("key1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_noop() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(config(&dir)).await.unwrap();

        cache.delete("nonexistent").await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_record() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(config(&dir)).await.unwrap();

        cache.set("key1", b"value1".to_vec(), None).await.unwrap();
        cache.set("key1", b"value2".to_vec(), None).await.unwrap();

        assert_eq!(cache.get("key1").await.unwrap().unwrap(), b"value2");
        assert_eq!(cache.len(), 1);

        // The old record must be gone from disk as well.
        let records = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".cache")
            })
            .count();
        assert_eq!(records, 1);
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(config(&dir)).await.unwrap();

        cache.set("key1", b"value1".to_vec(), Some(1)).await.unwrap();
        assert!(cache.get("key1").await.unwrap().is_some());

        sleep(Duration::from_millis(1100)).await;

        assert!(cache.get("key1").await.unwrap().is_none());
        // Lazy expiry removed the entry entirely.
        assert!(cache.keys().unwrap().is_empty());
        assert_eq!(cache.size_bytes(), 0);
    }

    #[tokio::test]
    async fn test_ttl_zero_expires_immediately() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(config(&dir)).await.unwrap();

        cache.set("key1", b"value1".to_vec(), Some(0)).await.unwrap();
        assert!(cache.get("key1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entry_size_exceeded() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.max_size_bytes = 64;
        let cache = Cache::open(cfg).await.unwrap();

        let result = cache.set("key1", vec![0u8; 256], None).await;
        assert!(matches!(
            result,
            Err(CacheError::EntrySizeExceeded { .. })
        ));

        // Rejected before any mutation: no index entry, no record on disk.
        assert!(cache.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_eviction_keeps_size_under_budget() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.max_size_bytes = 600;
        let cache = Cache::open(cfg).await.unwrap();

        // Distinct TTLs make the eviction order deterministic: the entry
        // with the furthest-future expiry goes first.
        cache.set("e1", vec![7u8; 100], Some(100)).await.unwrap();
        cache.set("e2", vec![7u8; 100], Some(200)).await.unwrap();
        cache.set("e3", vec![7u8; 100], Some(50)).await.unwrap();

        assert!(cache.size_bytes() <= 600);
        assert!(cache.get("e2").await.unwrap().is_none(), "furthest expiry evicted");
        assert!(cache.get("e1").await.unwrap().is_some());
        assert!(cache.get("e3").await.unwrap().is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_eviction_removes_expired_first() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.max_size_bytes = 600;
        let cache = Cache::open(cfg).await.unwrap();

        cache.set("stale", vec![7u8; 100], Some(1)).await.unwrap();
        cache.set("live", vec![7u8; 100], Some(100)).await.unwrap();

        sleep(Duration::from_millis(1100)).await;

        cache.set("new", vec![7u8; 100], Some(100)).await.unwrap();

        assert!(cache.size_bytes() <= 600);
        assert!(cache.get("stale").await.unwrap().is_none());
        assert!(cache.get("live").await.unwrap().is_some(), "live entry survives");
        assert!(cache.get("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unlimited_budget_never_evicts() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(config(&dir)).await.unwrap();

        for i in 0..20 {
            cache
                .set(&format!("key{i}"), vec![0u8; 512], None)
                .await
                .unwrap();
        }

        assert_eq!(cache.len(), 20);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[tokio::test]
    async fn test_reset_without_key_sweeps_strays() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(config(&dir)).await.unwrap();

        cache.set("a", b"1".to_vec(), None).await.unwrap();
        cache.set("b", b"2".to_vec(), None).await.unwrap();
        std::fs::write(dir.path().join("stray.cache"), b"orphan").unwrap();

        cache.reset(None).await.unwrap();

        assert!(cache.is_empty());
        assert_eq!(cache.size_bytes(), 0);
        let leftover = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".cache")
            })
            .count();
        assert_eq!(leftover, 0);
    }

    #[tokio::test]
    async fn test_reset_with_key_is_delete() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(config(&dir)).await.unwrap();

        cache.set("a", b"1".to_vec(), None).await.unwrap();
        cache.set("b", b"2".to_vec(), None).await.unwrap();

        cache.reset(Some("a")).await.unwrap();

        assert!(cache.get("a").await.unwrap().is_none());
        assert!(cache.get("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_close_rejects_further_operations() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(config(&dir)).await.unwrap();

        cache.set("key1", b"value1".to_vec(), None).await.unwrap();
        cache.close();

        assert!(matches!(
            cache.set("key2", b"x".to_vec(), None).await,
            Err(CacheError::Closed)
        ));
        assert!(matches!(cache.get("key1").await, Err(CacheError::Closed)));
        assert!(matches!(cache.delete("key1").await, Err(CacheError::Closed)));
        assert!(matches!(cache.keys(), Err(CacheError::Closed)));
    }

    #[tokio::test]
    async fn test_stats_tracking() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(config(&dir)).await.unwrap();

        cache.set("key1", b"value1".to_vec(), None).await.unwrap();
        cache.get("key1").await.unwrap(); // hit
        cache.get("nonexistent").await.unwrap(); // miss

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.current_size_bytes, cache.size_bytes());
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[tokio::test]
    async fn test_concurrent_sets_on_same_key_leak_no_records() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(Cache::open(config(&dir)).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .set("contended", format!("value{i}").into_bytes(), None)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len(), 1);
        let records = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".cache")
            })
            .count();
        assert_eq!(records, 1, "losing writers must not leak their records");
    }
}
