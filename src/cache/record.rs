//! Cache Record Module
//!
//! Defines the persisted record format and expiry timestamp helpers.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

// == Cache Record ==
/// On-disk representation of a single cache entry.
///
/// Serialized as self-describing JSON. The `size` field is advisory only:
/// readers recompute the entry size from the actual encoded byte length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Cache key the record belongs to
    pub key: String,
    /// Opaque payload bytes
    pub value: Vec<u8>,
    /// Expiration timestamp (Unix milliseconds)
    pub expires_at: u64,
    /// Payload length at write time; ignored on read
    #[serde(default)]
    pub size: u64,
}

impl CacheRecord {
    // == Constructor ==
    /// Creates a record expiring `ttl_seconds` from now.
    ///
    /// A TTL of zero is a valid, immediately-expiring value.
    pub fn new(key: impl Into<String>, value: Vec<u8>, ttl_seconds: u64) -> Self {
        let now = current_timestamp_ms();
        let expires_at = now.saturating_add(ttl_seconds.saturating_mul(1000));
        let size = value.len() as u64;

        Self {
            key: key.into(),
            value,
            expires_at,
            size,
        }
    }

    // == Encode ==
    /// Serializes the record for storage.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CacheError::CorruptRecord(e.to_string()))
    }

    // == Decode ==
    /// Deserializes a record read from storage.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::CorruptRecord(e.to_string()))
    }

    // == Is Expired ==
    /// Checks if the record has expired.
    ///
    /// Boundary condition: a record is considered expired once the current
    /// time is greater than or equal to the expiration time.
    pub fn is_expired(&self) -> bool {
        is_expired_at(self.expires_at, current_timestamp_ms())
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}

/// Expiry check shared by records and index descriptors.
pub fn is_expired_at(expires_at: u64, now: u64) -> bool {
    now >= expires_at
}
