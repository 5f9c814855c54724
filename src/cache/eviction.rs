//! Eviction Policy Module
//!
//! Decides which entries to remove, and in what order, when an insert would
//! exceed the size budget. Decision only; removals are driven by the cache.

use crate::cache::index::EntryMeta;
use crate::cache::record::is_expired_at;

// == Expired Pass ==
/// Keys whose expiry has already passed.
///
/// These are removed unconditionally before any budget-driven eviction.
pub fn expired_keys(snapshot: &[(String, EntryMeta)], now: u64) -> Vec<String> {
    snapshot
        .iter()
        .filter(|(_, meta)| is_expired_at(meta.expires_at, now))
        .map(|(key, _)| key.clone())
        .collect()
}

// == Candidate Order ==
/// Live entries ordered furthest-future expiry first.
///
/// Entries with equal expiry are ordered by key, so the result is
/// deterministic regardless of snapshot order.
pub fn eviction_order(snapshot: &[(String, EntryMeta)], now: u64) -> Vec<String> {
    let mut candidates: Vec<&(String, EntryMeta)> = snapshot
        .iter()
        .filter(|(_, meta)| !is_expired_at(meta.expires_at, now))
        .collect();

    candidates.sort_by(|a, b| {
        b.1.expires_at
            .cmp(&a.1.expires_at)
            .then_with(|| a.0.cmp(&b.0))
    });

    candidates.into_iter().map(|(key, _)| key.clone()).collect()
}
