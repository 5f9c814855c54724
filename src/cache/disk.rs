//! Disk Store Module
//!
//! Persists serialized records as locator-addressed files. Pure I/O; no
//! expiry or budget policy lives here.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CacheError, Result};

// == Constants ==
/// File name suffix carried by every persisted record
pub const RECORD_SUFFIX: &str = ".cache";

/// Suffix for in-flight writes before they are published
const TMP_SUFFIX: &str = ".tmp";

// == Disk Store ==
/// Locator-addressed record storage on the local filesystem.
///
/// Locators are generated per write and never derived from the cache key,
/// so key content cannot produce filesystem-unsafe names.
#[derive(Debug, Clone)]
pub struct DiskStore {
    /// Directory holding the record files
    root: PathBuf,
}

impl DiskStore {
    // == Open ==
    /// Opens the store, creating the directory if absent.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await.map_err(|e| {
            CacheError::StorageUnavailable(format!("{}: {}", root.display(), e))
        })?;

        debug!("Opened disk store at {:?}", root);
        Ok(Self { root })
    }

    // == New Locator ==
    /// Generates a fresh random locator, independent of any cache key.
    pub fn new_locator() -> String {
        format!("{}{}", Uuid::new_v4().simple(), RECORD_SUFFIX)
    }

    fn record_path(&self, locator: &str) -> PathBuf {
        self.root.join(locator)
    }

    // == Write ==
    /// Persists a record under `locator`.
    ///
    /// The bytes land under a temporary name first and are renamed into
    /// place, so a concurrent read never observes a truncated record.
    pub async fn write(&self, locator: &str, bytes: &[u8]) -> Result<()> {
        let path = self.record_path(locator);
        let tmp = self.root.join(format!("{locator}{TMP_SUFFIX}"));
        debug!("Writing {} byte record to {:?}", bytes.len(), path);

        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &path).await?;

        Ok(())
    }

    // == Read ==
    /// Reads the record stored under `locator`.
    pub async fn read(&self, locator: &str) -> Result<Vec<u8>> {
        let path = self.record_path(locator);
        debug!("Reading record from {:?}", path);

        fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CacheError::NotFound(locator.to_string())
            } else {
                CacheError::Io(e)
            }
        })
    }

    // == Delete ==
    /// Deletes the record stored under `locator`.
    ///
    /// Deleting an already-absent locator is not an error: eviction and
    /// rehydration may race with manual deletes.
    pub async fn delete(&self, locator: &str) -> Result<()> {
        let path = self.record_path(locator);
        debug!("Deleting record at {:?}", path);

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Io(e)),
        }
    }

    // == List ==
    /// Lists the locators of all persisted records.
    ///
    /// Temporary files and anything without the record suffix are ignored.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut locators = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;

        while let Some(entry) = dir.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(RECORD_SUFFIX) {
                    locators.push(name.to_string());
                }
            }
        }

        Ok(locators)
    }
}
