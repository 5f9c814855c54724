//! Configuration Module
//!
//! Handles loading and validating cache configuration.

use std::env;
use std::path::PathBuf;

use crate::error::{CacheError, Result};

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Storage directory for persisted records (created if absent)
    pub path: PathBuf,
    /// Default TTL in seconds for entries without explicit TTL
    pub default_ttl: u64,
    /// Maximum total bytes across all persisted records (0 = unlimited)
    pub max_size_bytes: u64,
    /// Whether to rebuild the index from records left on disk at startup
    pub rehydrate_on_start: bool,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_PATH` - Storage directory (default: "cache")
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 60)
    /// - `CACHE_MAX_SIZE_BYTES` - Size budget in bytes, 0 = unlimited (default: 0)
    /// - `CACHE_REHYDRATE` - Rehydrate index at startup (default: true)
    pub fn from_env() -> Self {
        Self {
            path: env::var("CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("cache")),
            default_ttl: env::var("CACHE_DEFAULT_TTL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            max_size_bytes: env::var("CACHE_MAX_SIZE_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            rehydrate_on_start: env::var("CACHE_REHYDRATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
        }
    }

    /// Validates the configuration before a cache is constructed.
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(CacheError::StorageUnavailable(
                "storage path is empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("cache"),
            default_ttl: 60,
            max_size_bytes: 0,
            rehydrate_on_start: true,
        }
    }
}
