//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Record not found in storage
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Entry larger than the configured cache budget
    #[error("Entry of {size} bytes exceeds maximum cache size of {max_size} bytes")]
    EntrySizeExceeded { size: u64, max_size: u64 },

    /// Storage I/O failure
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted record could not be encoded or decoded
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// Storage location cannot be created or enumerated at startup
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Operation attempted after the cache was closed
    #[error("Cache is closed")]
    Closed,
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
