//! Caching utilities for sigslice

use moka::future::Cache;
use std::time::Duration;

/// Async cache with per-entry time to live
pub type AsyncCache<K, V> = Cache<K, V>;

/// Create a new async cache with TTL
pub fn new_async_cache<K, V>(ttl: Duration) -> AsyncCache<K, V>
where
    K: std::hash::Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    Cache::builder().time_to_live(ttl).build()
}
