//! Rehydration Module
//!
//! Rebuilds the metadata index from records left on disk at process start.

use tracing::{info, warn};

use crate::cache::disk::DiskStore;
use crate::cache::index::{EntryMeta, MetadataIndex};
use crate::cache::record::{current_timestamp_ms, is_expired_at, CacheRecord};
use crate::error::{CacheError, Result};

/// Scans the storage directory and repopulates `index` from decodable,
/// unexpired records. Payloads are discarded; only metadata is kept.
///
/// Corrupt and expired records are deleted and skipped. Per-record failures
/// never abort the scan; failure to enumerate the directory itself does.
pub async fn rehydrate(disk: &DiskStore, index: &mut MetadataIndex) -> Result<usize> {
    let locators = disk
        .list()
        .await
        .map_err(|e| CacheError::StorageUnavailable(e.to_string()))?;

    let now = current_timestamp_ms();
    let mut dropped = 0usize;

    for locator in locators {
        let bytes = match disk.read(&locator).await {
            Ok(bytes) => bytes,
            // Raced with a concurrent delete of the same directory
            Err(CacheError::NotFound(_)) => continue,
            Err(e) => {
                warn!("Skipping unreadable record {}: {}", locator, e);
                dropped += 1;
                continue;
            }
        };

        let record = match CacheRecord::decode(&bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!("Dropping corrupt record {}: {}", locator, e);
                delete_quietly(disk, &locator).await;
                dropped += 1;
                continue;
            }
        };

        // Size always comes from the actual encoded length; the size stored
        // inside the record may be stale or absent.
        let size_bytes = bytes.len() as u64;

        if is_expired_at(record.expires_at, now) {
            delete_quietly(disk, &locator).await;
            dropped += 1;
            continue;
        }

        // Two records for one key can survive a crash between the write of a
        // replacement and the delete of its predecessor. Latest expiry wins.
        if let Some(existing) = index.get(&record.key) {
            if existing.expires_at >= record.expires_at {
                warn!("Dropping superseded record {} for key {}", locator, record.key);
                delete_quietly(disk, &locator).await;
                dropped += 1;
                continue;
            }
        }

        let meta = EntryMeta {
            locator,
            expires_at: record.expires_at,
            size_bytes,
        };
        if let Some(replaced) = index.put(record.key, meta) {
            delete_quietly(disk, &replaced.locator).await;
            dropped += 1;
        }
    }

    info!(
        "Rehydration complete: {} entries restored ({} bytes), {} records dropped",
        index.len(),
        index.size(),
        dropped
    );
    Ok(index.len())
}

async fn delete_quietly(disk: &DiskStore, locator: &str) {
    if let Err(e) = disk.delete(locator).await {
        warn!("Failed to delete record {}: {}", locator, e);
    }
}
