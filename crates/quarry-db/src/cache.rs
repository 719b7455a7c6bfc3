//! Quarry Cache - Fixed-TTL Result Memoization
//!
//! Memoizes read results by operation name and argument tuple. An entry is
//! served until its TTL elapses, then recomputed on the next request. There
//! is no eviction under memory pressure and no invalidation on write; only
//! an explicit refresh drops entries. Failed computations are never stored.
//!
//! Two concurrent misses on the same key may both compute. The later insert
//! replaces the earlier one whole.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use parking_lot::RwLock;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// =============================================================================
// Cache Key
// =============================================================================

/// Identity of a memoized call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub operation: &'static str,
    pub args: Vec<String>,
}

impl CacheKey {
    pub fn new<I, S>(operation: &'static str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            operation,
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

// =============================================================================
// Cache Entry
// =============================================================================

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) < self.ttl
    }
}

/// Cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

// =============================================================================
// TTL Cache
// =============================================================================

/// Process-wide memo shared by every session.
#[derive(Default)]
pub struct TtlCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh cached value for a key, if any.
    pub fn get<T>(&self, key: &CacheKey) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if !entry.is_fresh(Instant::now()) {
            return None;
        }
        entry.value.downcast_ref::<T>().cloned()
    }

    /// Store a value with its TTL, replacing any previous entry.
    pub fn insert<T>(&self, key: CacheKey, value: T, ttl: Duration)
    where
        T: Send + Sync + 'static,
    {
        self.entries.write().insert(
            key,
            CacheEntry {
                value: Arc::new(value),
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Return the cached value or compute, store and return it. Errors are
    /// passed through and not stored.
    pub async fn get_or_try_insert<T, E, F, Fut>(
        &self,
        key: CacheKey,
        ttl: Duration,
        compute: F,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get::<T>(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("cache hit: {} {:?}", key.operation, key.args);
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("cache miss: {} {:?}", key.operation, key.args);
        let value = compute().await?;
        self.insert(key, value.clone(), ttl);
        Ok(value)
    }

    /// Drop every entry.
    pub fn invalidate_all(&self) -> usize {
        let mut entries = self.entries.write();
        let dropped = entries.len();
        entries.clear();
        dropped
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hit_within_ttl() {
        let cache = TtlCache::new();
        let key = CacheKey::new("list_tables", ["public"]);
        let mut calls = 0;

        for _ in 0..3 {
            let value: Result<Vec<String>, String> = cache
                .get_or_try_insert(key.clone(), Duration::from_secs(60), || {
                    calls += 1;
                    async { Ok(vec!["users".to_string()]) }
                })
                .await;
            assert_eq!(value.unwrap(), vec!["users".to_string()]);
        }

        assert_eq!(calls, 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (2, 1, 1));
    }

    #[tokio::test]
    async fn test_errors_not_cached() {
        let cache = TtlCache::new();
        let key = CacheKey::new("get_table_count", ["public", "users"]);

        let first: Result<u64, String> = cache
            .get_or_try_insert(key.clone(), Duration::from_secs(60), || async {
                Err("connection refused".to_string())
            })
            .await;
        assert!(first.is_err());

        let second: Result<u64, String> = cache
            .get_or_try_insert(key, Duration::from_secs(60), || async { Ok(7) })
            .await;
        assert_eq!(second, Ok(7));
    }

    #[tokio::test]
    async fn test_expired_entry_recomputed() {
        let cache = TtlCache::new();
        let key = CacheKey::new("get_table_data", ["public", "users", "10"]);
        cache.insert(key.clone(), 1_u64, Duration::ZERO);
        assert_eq!(cache.get::<u64>(&key), None);

        let value: Result<u64, String> = cache
            .get_or_try_insert(key, Duration::from_secs(60), || async { Ok(2) })
            .await;
        assert_eq!(value, Ok(2));
    }

    #[test]
    fn test_distinct_args_distinct_entries() {
        let cache = TtlCache::new();
        cache.insert(CacheKey::new("get_table_data", ["t", "10"]), 10_u64, Duration::from_secs(60));
        cache.insert(CacheKey::new("get_table_data", ["t", "20"]), 20_u64, Duration::from_secs(60));
        assert_eq!(cache.get::<u64>(&CacheKey::new("get_table_data", ["t", "20"])), Some(20));
        assert_eq!(cache.invalidate_all(), 2);
        assert_eq!(cache.stats().entries, 0);
    }
}
