//! Weight-bounded, time-expiring read-ahead cache.
//!
//! Keys are `(flat-file id, queue offset)`; values are shared
//! [`MessageWrapper`]s whose weight is the payload byte length. Entries
//! expire a fixed duration after write, are evicted under weight pressure,
//! and are invalidated explicitly once every active consumer group has read
//! them.

use bytes::Bytes;
use moka::notification::RemovalCause;
use moka::sync::Cache;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cache key: flat-file handle identity plus logical queue offset.
///
/// File ids are process-unique, so keys from different queues never collide.
pub type CacheKey = (u64, i64);

/// A cached message slice plus the locality hints of the batch that fetched
/// it. `min_offset`/`max_offset`/`batch_size` describe the originating batch
/// and are hints only; nothing relies on them for correctness.
#[derive(Debug)]
pub struct MessageWrapper {
    payload: Bytes,
    cur_offset: i64,
    min_offset: i64,
    max_offset: i64,
    batch_size: usize,
    access_count: AtomicU32,
}

impl MessageWrapper {
    pub fn new(
        payload: Bytes,
        cur_offset: i64,
        min_offset: i64,
        max_offset: i64,
        batch_size: usize,
        used: bool,
    ) -> Self {
        Self {
            payload,
            cur_offset,
            min_offset,
            max_offset,
            batch_size,
            access_count: AtomicU32::new(if used { 1 } else { 0 }),
        }
    }

    pub fn payload(&self) -> Bytes {
        self.payload.clone()
    }

    pub fn cur_offset(&self) -> i64 {
        self.cur_offset
    }

    pub fn min_offset(&self) -> i64 {
        self.min_offset
    }

    pub fn max_offset(&self) -> i64 {
        self.max_offset
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn access_count(&self) -> u32 {
        self.access_count.load(Ordering::Relaxed)
    }

    /// Increment the access count, returning the new value.
    pub fn mark_accessed(&self) -> u32 {
        self.access_count.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Point-in-time view of cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entry_count: u64,
    pub weighted_size: u64,
}

/// The read-ahead cache. Cheap to clone; all clones share the same store
/// and statistics.
#[derive(Clone)]
pub struct CacheStore {
    inner: Cache<CacheKey, Arc<MessageWrapper>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    evictions: Arc<AtomicU64>,
}

impl CacheStore {
    /// Build a cache bounded by `max_weight` payload bytes whose entries
    /// expire `ttl` after write.
    pub fn new(max_weight: u64, ttl: Duration) -> Self {
        let evictions = Arc::new(AtomicU64::new(0));
        let listener_evictions = evictions.clone();

        let inner = Cache::builder()
            .max_capacity(max_weight)
            .time_to_live(ttl)
            .weigher(|_key: &CacheKey, wrapper: &Arc<MessageWrapper>| {
                wrapper.payload.len().try_into().unwrap_or(u32::MAX)
            })
            .eviction_listener(move |_key, _wrapper, cause| {
                if cause != RemovalCause::Replaced {
                    listener_evictions.fetch_add(1, Ordering::Relaxed);
                }
            })
            .support_invalidation_closures()
            .build();

        Self {
            inner,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            evictions,
        }
    }

    pub fn get_if_present(&self, key: CacheKey) -> Option<Arc<MessageWrapper>> {
        match self.inner.get(&key) {
            Some(wrapper) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(wrapper)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, key: CacheKey, wrapper: Arc<MessageWrapper>) {
        self.inner.insert(key, wrapper);
    }

    pub fn invalidate(&self, key: CacheKey) {
        self.inner.invalidate(&key);
    }

    /// Drop every entry belonging to one flat file. Called before a stale
    /// handle is released so no key can resolve against a replaced file.
    pub fn invalidate_file(&self, file_id: u64) {
        if let Err(e) = self
            .inner
            .invalidate_entries_if(move |key, _| key.0 == file_id)
        {
            tracing::warn!(file_id, error = %e, "failed to invalidate cache entries for flat file");
        }
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entry_count: self.inner.entry_count(),
            weighted_size: self.inner.weighted_size(),
        }
    }

    /// Flush pending maintenance so `entry_count`/`weighted_size` are exact.
    pub fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks();
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("entry_count", &self.inner.entry_count())
            .field("weighted_size", &self.inner.weighted_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrapper(offset: i64, payload: &'static [u8]) -> Arc<MessageWrapper> {
        Arc::new(MessageWrapper::new(
            Bytes::from_static(payload),
            offset,
            offset,
            offset,
            1,
            false,
        ))
    }

    #[test]
    fn test_put_get_invalidate() {
        let cache = CacheStore::new(1024, Duration::from_secs(60));
        cache.put((1, 10), wrapper(10, b"hello"));

        let got = cache.get_if_present((1, 10)).unwrap();
        assert_eq!(got.payload(), Bytes::from_static(b"hello"));
        assert_eq!(got.cur_offset(), 10);

        cache.invalidate((1, 10));
        assert!(cache.get_if_present((1, 10)).is_none());
    }

    #[test]
    fn test_keys_do_not_collide_across_files() {
        let cache = CacheStore::new(1024, Duration::from_secs(60));
        cache.put((1, 10), wrapper(10, b"one"));
        cache.put((2, 10), wrapper(10, b"two"));

        assert_eq!(
            cache.get_if_present((1, 10)).unwrap().payload(),
            Bytes::from_static(b"one")
        );
        assert_eq!(
            cache.get_if_present((2, 10)).unwrap().payload(),
            Bytes::from_static(b"two")
        );
    }

    #[test]
    fn test_hit_miss_counters() {
        let cache = CacheStore::new(1024, Duration::from_secs(60));
        cache.put((1, 0), wrapper(0, b"x"));

        cache.get_if_present((1, 0));
        cache.get_if_present((1, 1));
        cache.get_if_present((1, 2));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = CacheStore::new(1024, Duration::from_millis(20));
        cache.put((1, 0), wrapper(0, b"x"));
        assert!(cache.get_if_present((1, 0)).is_some());

        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get_if_present((1, 0)).is_none());
    }

    #[test]
    fn test_invalidate_file() {
        let cache = CacheStore::new(1024, Duration::from_secs(60));
        for offset in 0..4 {
            cache.put((7, offset), wrapper(offset, b"payload"));
        }
        cache.put((8, 0), wrapper(0, b"other"));

        cache.invalidate_file(7);
        cache.run_pending_tasks();

        for offset in 0..4 {
            assert!(cache.get_if_present((7, offset)).is_none());
        }
        assert!(cache.get_if_present((8, 0)).is_some());
    }

    #[test]
    fn test_access_count_starts_used() {
        let used = MessageWrapper::new(Bytes::from_static(b"x"), 0, 0, 0, 1, true);
        assert_eq!(used.access_count(), 1);
        assert_eq!(used.mark_accessed(), 2);

        let fresh = MessageWrapper::new(Bytes::from_static(b"x"), 0, 0, 0, 1, false);
        assert_eq!(fresh.access_count(), 0);
        assert_eq!(fresh.mark_accessed(), 1);
    }
}
