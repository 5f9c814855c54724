//! Spillcache - A persistent key-value cache with disk-backed values
//!
//! Keeps an in-memory metadata index while entry payloads live in files,
//! with per-entry TTL expiry and a size budget enforced through eviction.
//! The index is rebuilt from records left on disk at startup.

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{Cache, CacheStats};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
