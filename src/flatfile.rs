//! External collaborator traits and the per-queue handle state.
//!
//! The tiered flat-file layer, index file and metadata store are external to
//! the read path; this module defines the interfaces the engine consumes
//! from them. [`FlatFileHandle`] extends an opaque flat file with the state
//! the engine owns per queue: the read-ahead factor, the in-flight request
//! registry, a process-unique id for cache-key identity, and the short
//! mutex guarding registry read-modify-write sections.

use crate::error::Result;
use crate::inflight::InflightRegistry;
use crate::model::{Boundary, MessageQueue};
use crate::readahead::ReadAheadPolicy;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A logical pair of consume-queue and commit-log streams for one queue on
/// the tiered backend. Reads are asynchronous; metadata is cheap and local.
#[async_trait]
pub trait FlatFile: Send + Sync {
    fn message_queue(&self) -> &MessageQueue;

    /// First readable logical offset.
    fn consume_queue_min_offset(&self) -> i64;

    /// Next logical offset to be committed; messages exist in
    /// `[min, commit)`.
    fn consume_queue_commit_offset(&self) -> i64;

    /// Lowest byte offset still present in the commit-log stream.
    fn commit_log_min_offset(&self) -> i64;

    /// Number of distinct consumer groups currently reading this queue.
    fn active_group_count(&self) -> u32;

    /// Record the latest offset served to `group`.
    fn record_group_access(&self, group: &str, queue_offset: i64);

    fn offset_in_consume_queue_by_time(&self, timestamp: i64, boundary: Boundary) -> Result<i64>;

    /// Read `count` consume-queue entries starting at `queue_offset`.
    async fn read_consume_queue(&self, queue_offset: i64, count: usize) -> Result<Bytes>;

    /// Read `length` bytes of the commit log starting at `offset`.
    async fn read_commit_log(&self, offset: i64, length: usize) -> Result<Bytes>;
}

/// Lookup of flat files by queue identity.
pub trait FlatFileManager: Send + Sync {
    fn get_flat_file(&self, queue: &MessageQueue) -> Option<Arc<dyn FlatFile>>;

    fn index_file(&self) -> Arc<dyn IndexFile>;
}

/// The backend's by-key index.
#[async_trait]
pub trait IndexFile: Send + Sync {
    /// Buffers of candidate index entries covering `[begin, end]`, each
    /// paired with the begin timestamp of the file it came from.
    async fn query(&self, topic: &str, key: &str, begin: i64, end: i64)
        -> Result<Vec<(i64, Bytes)>>;
}

#[derive(Debug, Clone)]
pub struct TopicMetadata {
    pub topic: String,
    pub topic_id: i32,
}

/// Topic metadata lookup.
pub trait MetadataStore: Send + Sync {
    fn topic(&self, topic: &str) -> Option<TopicMetadata>;
}

static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(1);

/// A flat file extended with the engine's per-queue state.
pub struct FlatFileHandle {
    id: u64,
    file: Arc<dyn FlatFile>,
    read_ahead: ReadAheadPolicy,
    inflight: InflightRegistry,
    fetch_lock: Mutex<()>,
}

impl FlatFileHandle {
    pub fn new(file: Arc<dyn FlatFile>, min_factor: u32) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed),
            file,
            read_ahead: ReadAheadPolicy::new(min_factor),
            inflight: InflightRegistry::new(),
            fetch_lock: Mutex::new(()),
        })
    }

    /// Process-unique identity used in cache keys.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn file(&self) -> &Arc<dyn FlatFile> {
        &self.file
    }

    pub fn read_ahead(&self) -> &ReadAheadPolicy {
        &self.read_ahead
    }

    pub fn inflight(&self) -> &InflightRegistry {
        &self.inflight
    }

    /// Guard for registry read-modify-write sections. Backend I/O is issued
    /// inside as detached tasks but never awaited while held.
    pub fn fetch_lock(&self) -> &Mutex<()> {
        &self.fetch_lock
    }

    pub fn message_queue(&self) -> &MessageQueue {
        self.file.message_queue()
    }

    pub fn min_offset(&self) -> i64 {
        self.file.consume_queue_min_offset()
    }

    pub fn commit_offset(&self) -> i64 {
        self.file.consume_queue_commit_offset()
    }
}

impl std::fmt::Debug for FlatFileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatFileHandle")
            .field("id", &self.id)
            .field("queue", self.message_queue())
            .field("factor", &self.read_ahead.factor())
            .finish()
    }
}

/// Cache of [`FlatFileHandle`]s keyed by queue identity.
///
/// When the manager stops returning a file, or returns a different backing
/// file for the same queue, the stale handle's id is reported through
/// `on_stale` so the caller invalidates its cache entries before the handle
/// is dropped.
pub(crate) struct HandleCache {
    min_factor: u32,
    handles: DashMap<MessageQueue, Arc<FlatFileHandle>>,
}

impl HandleCache {
    pub fn new(min_factor: u32) -> Self {
        Self {
            min_factor,
            handles: DashMap::new(),
        }
    }

    pub fn resolve(
        &self,
        manager: &dyn FlatFileManager,
        queue: &MessageQueue,
        on_stale: impl Fn(u64),
    ) -> Option<Arc<FlatFileHandle>> {
        let Some(file) = manager.get_flat_file(queue) else {
            if let Some((_, stale)) = self.handles.remove(queue) {
                on_stale(stale.id());
            }
            return None;
        };

        let handle = self
            .handles
            .entry(queue.clone())
            .and_modify(|existing| {
                if !Arc::ptr_eq(existing.file(), &file) {
                    on_stale(existing.id());
                    *existing = FlatFileHandle::new(file.clone(), self.min_factor);
                }
            })
            .or_insert_with(|| FlatFileHandle::new(file.clone(), self.min_factor));
        Some(handle.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    struct StubFile {
        queue: MessageQueue,
    }

    #[async_trait]
    impl FlatFile for StubFile {
        fn message_queue(&self) -> &MessageQueue {
            &self.queue
        }
        fn consume_queue_min_offset(&self) -> i64 {
            0
        }
        fn consume_queue_commit_offset(&self) -> i64 {
            0
        }
        fn commit_log_min_offset(&self) -> i64 {
            0
        }
        fn active_group_count(&self) -> u32 {
            1
        }
        fn record_group_access(&self, _group: &str, _queue_offset: i64) {}
        fn offset_in_consume_queue_by_time(
            &self,
            _timestamp: i64,
            _boundary: Boundary,
        ) -> Result<i64> {
            Ok(-1)
        }
        async fn read_consume_queue(&self, _queue_offset: i64, _count: usize) -> Result<Bytes> {
            Ok(Bytes::new())
        }
        async fn read_commit_log(&self, _offset: i64, _length: usize) -> Result<Bytes> {
            Ok(Bytes::new())
        }
    }

    struct StubManager {
        file: PlMutex<Option<Arc<dyn FlatFile>>>,
    }

    impl FlatFileManager for StubManager {
        fn get_flat_file(&self, _queue: &MessageQueue) -> Option<Arc<dyn FlatFile>> {
            self.file.lock().clone()
        }
        fn index_file(&self) -> Arc<dyn IndexFile> {
            unimplemented!("not used by these tests")
        }
    }

    fn stub_file(queue: &MessageQueue) -> Arc<dyn FlatFile> {
        Arc::new(StubFile {
            queue: queue.clone(),
        })
    }

    #[test]
    fn test_handle_ids_are_unique() {
        let queue = MessageQueue::new("t", "b", 0);
        let file = stub_file(&queue);
        let a = FlatFileHandle::new(file.clone(), 2);
        let b = FlatFileHandle::new(file, 2);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_resolve_caches_handle() {
        let queue = MessageQueue::new("t", "b", 0);
        let manager = StubManager {
            file: PlMutex::new(Some(stub_file(&queue))),
        };
        let cache = HandleCache::new(2);

        let first = cache.resolve(&manager, &queue, |_| {}).unwrap();
        let second = cache.resolve(&manager, &queue, |_| {}).unwrap();
        assert_eq!(first.id(), second.id());
    }

    #[test]
    fn test_resolve_reports_stale_on_replacement() {
        let queue = MessageQueue::new("t", "b", 0);
        let manager = StubManager {
            file: PlMutex::new(Some(stub_file(&queue))),
        };
        let cache = HandleCache::new(2);
        let first = cache.resolve(&manager, &queue, |_| {}).unwrap();

        *manager.file.lock() = Some(stub_file(&queue));
        let stale = PlMutex::new(Vec::new());
        let second = cache
            .resolve(&manager, &queue, |id| stale.lock().push(id))
            .unwrap();

        assert_ne!(first.id(), second.id());
        assert_eq!(*stale.lock(), vec![first.id()]);
    }

    #[test]
    fn test_resolve_reports_stale_on_removal() {
        let queue = MessageQueue::new("t", "b", 0);
        let manager = StubManager {
            file: PlMutex::new(Some(stub_file(&queue))),
        };
        let cache = HandleCache::new(2);
        let handle = cache.resolve(&manager, &queue, |_| {}).unwrap();

        *manager.file.lock() = None;
        let stale = PlMutex::new(Vec::new());
        assert!(cache
            .resolve(&manager, &queue, |id| stale.lock().push(id))
            .is_none());
        assert_eq!(*stale.lock(), vec![handle.id()]);
    }
}
