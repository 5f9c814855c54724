//! Metadata Index Module
//!
//! In-memory mapping from cache key to entry descriptor, with byte accounting.

use std::collections::HashMap;

// == Entry Metadata ==
/// Descriptor for one cached entry; the payload itself lives on disk.
#[derive(Debug, Clone)]
pub struct EntryMeta {
    /// Storage locator of the persisted record
    pub locator: String,
    /// Expiration timestamp (Unix milliseconds)
    pub expires_at: u64,
    /// Encoded record length in bytes
    pub size_bytes: u64,
}

// == Metadata Index ==
/// Single source of truth for what is currently cached.
///
/// Every mutation adjusts `current_size` in the same step, so the counter
/// always equals the sum of `size_bytes` over the indexed entries.
#[derive(Debug, Default)]
pub struct MetadataIndex {
    /// Key to descriptor mapping
    entries: HashMap<String, EntryMeta>,
    /// Total bytes across all indexed entries
    current_size: u64,
}

impl MetadataIndex {
    // == Constructor ==
    /// Creates a new empty index.
    pub fn new() -> Self {
        Self::default()
    }

    // == Put ==
    /// Inserts or replaces the descriptor for `key`, returning the replaced one.
    pub fn put(&mut self, key: impl Into<String>, meta: EntryMeta) -> Option<EntryMeta> {
        self.current_size += meta.size_bytes;
        let replaced = self.entries.insert(key.into(), meta);
        if let Some(old) = &replaced {
            self.current_size -= old.size_bytes;
        }
        replaced
    }

    // == Get ==
    /// Looks up the descriptor for `key`. Absence is not an error.
    pub fn get(&self, key: &str) -> Option<&EntryMeta> {
        self.entries.get(key)
    }

    // == Remove ==
    /// Removes and returns the descriptor for `key`, if present.
    pub fn remove(&mut self, key: &str) -> Option<EntryMeta> {
        let removed = self.entries.remove(key);
        if let Some(meta) = &removed {
            self.current_size -= meta.size_bytes;
        }
        removed
    }

    // == Keys ==
    /// Snapshot of all indexed keys; iteration order is unspecified.
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    // == Snapshot ==
    /// Snapshot of all entries, for eviction decisions.
    pub fn snapshot(&self) -> Vec<(String, EntryMeta)> {
        self.entries
            .iter()
            .map(|(k, m)| (k.clone(), m.clone()))
            .collect()
    }

    // == Drain ==
    /// Removes every entry, returning the descriptors and zeroing the counter.
    pub fn drain(&mut self) -> Vec<EntryMeta> {
        let metas = self.entries.drain().map(|(_, m)| m).collect();
        self.current_size = 0;
        metas
    }

    // == Length ==
    /// Returns the current number of indexed entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Size ==
    /// Total bytes across all indexed entries.
    pub fn size(&self) -> u64 {
        self.current_size
    }
}
