//! In-memory flat-file fixture shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tierfetch::message::{encode_cq_entry, encode_message, CONSUME_QUEUE_STORE_UNIT_SIZE};
use tierfetch::{
    Boundary, FlatFile, FlatFileManager, IndexFile, MessageQueue, MetadataStore, Result,
    StoreError, TopicMetadata,
};

pub const TOPIC: &str = "t";
pub const BROKER: &str = "test-broker";

/// A flat file backed by pre-generated in-memory buffers. Counts backend
/// reads so tests can assert coalescing and prefetch amplification.
pub struct MemoryFlatFile {
    queue: MessageQueue,
    cq: Bytes,
    log: Bytes,
    record_size: usize,
    base_timestamp: i64,
    min_offset: AtomicI64,
    commit_offset: AtomicI64,
    active_groups: AtomicU32,
    read_delay: Mutex<Duration>,
    pub cq_reads: AtomicUsize,
    pub log_reads: AtomicUsize,
    pub cq_read_log: Mutex<Vec<(i64, usize)>>,
    pub group_access: Mutex<Vec<(String, i64)>>,
    cq_override: Mutex<Option<Bytes>>,
}

impl MemoryFlatFile {
    /// Build a file holding `message_count` messages at offsets
    /// `[0, message_count)`, each with a `body_len`-byte body and a store
    /// timestamp of `base_timestamp + offset`.
    pub fn new(queue_id: u32, message_count: usize, body_len: usize) -> Self {
        let base_timestamp = 1_700_000_000_000;
        let mut cq = BytesMut::new();
        let mut log = BytesMut::new();
        let mut record_size = 0;

        for offset in 0..message_count as i64 {
            let body = vec![(offset % 251) as u8; body_len];
            let physical_offset = log.len() as i64;
            let record = encode_message(
                queue_id,
                offset,
                physical_offset,
                base_timestamp + offset,
                &body,
            );
            record_size = record.len();
            cq.put_slice(&encode_cq_entry(physical_offset, record.len() as u32, 0));
            log.put_slice(&record);
        }

        Self {
            queue: MessageQueue::new(TOPIC, BROKER, queue_id),
            cq: cq.freeze(),
            log: log.freeze(),
            record_size,
            base_timestamp,
            min_offset: AtomicI64::new(0),
            commit_offset: AtomicI64::new(message_count as i64),
            active_groups: AtomicU32::new(1),
            read_delay: Mutex::new(Duration::ZERO),
            cq_reads: AtomicUsize::new(0),
            log_reads: AtomicUsize::new(0),
            cq_read_log: Mutex::new(Vec::new()),
            group_access: Mutex::new(Vec::new()),
            cq_override: Mutex::new(None),
        }
    }

    pub fn set_min_offset(&self, offset: i64) {
        self.min_offset.store(offset, Ordering::Relaxed);
    }

    pub fn set_commit_offset(&self, offset: i64) {
        self.commit_offset.store(offset, Ordering::Relaxed);
    }

    pub fn set_active_groups(&self, count: u32) {
        self.active_groups.store(count, Ordering::Relaxed);
    }

    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock() = delay;
    }

    /// Force the next consume-queue reads to return this buffer verbatim.
    pub fn set_cq_override(&self, cq: Bytes) {
        *self.cq_override.lock() = Some(cq);
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn base_timestamp(&self) -> i64 {
        self.base_timestamp
    }

    /// The raw record of the message at `offset`.
    pub fn message_at(&self, offset: i64) -> Bytes {
        let start = offset as usize * self.record_size;
        self.log.slice(start..start + self.record_size)
    }

    /// Number of consume-queue reads that covered `offset`.
    pub fn cq_reads_covering(&self, offset: i64) -> usize {
        self.cq_read_log
            .lock()
            .iter()
            .filter(|(start, count)| *start <= offset && offset < start + *count as i64)
            .count()
    }
}

#[async_trait]
impl FlatFile for MemoryFlatFile {
    fn message_queue(&self) -> &MessageQueue {
        &self.queue
    }

    fn consume_queue_min_offset(&self) -> i64 {
        self.min_offset.load(Ordering::Relaxed)
    }

    fn consume_queue_commit_offset(&self) -> i64 {
        self.commit_offset.load(Ordering::Relaxed)
    }

    fn commit_log_min_offset(&self) -> i64 {
        0
    }

    fn active_group_count(&self) -> u32 {
        self.active_groups.load(Ordering::Relaxed)
    }

    fn record_group_access(&self, group: &str, queue_offset: i64) {
        self.group_access.lock().push((group.to_string(), queue_offset));
    }

    fn offset_in_consume_queue_by_time(&self, timestamp: i64, _boundary: Boundary) -> Result<i64> {
        let commit = self.commit_offset.load(Ordering::Relaxed);
        if commit <= 0 {
            return Ok(-1);
        }
        let min = self.min_offset.load(Ordering::Relaxed);
        Ok((timestamp - self.base_timestamp).clamp(min, commit - 1))
    }

    async fn read_consume_queue(&self, queue_offset: i64, count: usize) -> Result<Bytes> {
        self.cq_reads.fetch_add(1, Ordering::SeqCst);
        self.cq_read_log.lock().push((queue_offset, count));

        let delay = *self.read_delay.lock();
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }

        if let Some(cq) = self.cq_override.lock().clone() {
            return Ok(cq);
        }

        let commit = self.commit_offset.load(Ordering::Relaxed);
        if queue_offset >= commit {
            return Err(StoreError::NoNewData(queue_offset));
        }
        if queue_offset < 0 {
            return Err(StoreError::IllegalOffset {
                offset: queue_offset,
                reason: "negative offset".to_string(),
            });
        }
        let end = (queue_offset + count as i64).min(commit);
        Ok(self.cq.slice(
            queue_offset as usize * CONSUME_QUEUE_STORE_UNIT_SIZE
                ..end as usize * CONSUME_QUEUE_STORE_UNIT_SIZE,
        ))
    }

    async fn read_commit_log(&self, offset: i64, length: usize) -> Result<Bytes> {
        self.log_reads.fetch_add(1, Ordering::SeqCst);

        let delay = *self.read_delay.lock();
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }

        let start = offset as usize;
        if offset < 0 || start >= self.log.len() {
            return Err(StoreError::IllegalParam(format!(
                "commit log offset {} out of range",
                offset
            )));
        }
        let end = (start + length).min(self.log.len());
        Ok(self.log.slice(start..end))
    }
}

/// Manager over a fixed set of in-memory flat files.
pub struct MemoryManager {
    files: Mutex<HashMap<MessageQueue, Arc<dyn FlatFile>>>,
    index: Arc<MemoryIndexFile>,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            index: Arc::new(MemoryIndexFile::default()),
        }
    }

    pub fn insert(&self, file: Arc<MemoryFlatFile>) {
        self.files
            .lock()
            .insert(file.message_queue().clone(), file);
    }

    pub fn remove(&self, queue: &MessageQueue) {
        self.files.lock().remove(queue);
    }

    pub fn index(&self) -> &Arc<MemoryIndexFile> {
        &self.index
    }
}

impl FlatFileManager for MemoryManager {
    fn get_flat_file(&self, queue: &MessageQueue) -> Option<Arc<dyn FlatFile>> {
        self.files.lock().get(queue).cloned()
    }

    fn index_file(&self) -> Arc<dyn IndexFile> {
        self.index.clone()
    }
}

/// Index file returning pre-loaded candidate buffers.
#[derive(Default)]
pub struct MemoryIndexFile {
    buffers: Mutex<Vec<(i64, Bytes)>>,
    pub queries: AtomicUsize,
}

impl MemoryIndexFile {
    pub fn push(&self, file_begin_timestamp: i64, buffer: Bytes) {
        self.buffers.lock().push((file_begin_timestamp, buffer));
    }
}

#[async_trait]
impl IndexFile for MemoryIndexFile {
    async fn query(
        &self,
        _topic: &str,
        _key: &str,
        _begin: i64,
        _end: i64,
    ) -> Result<Vec<(i64, Bytes)>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.buffers.lock().clone())
    }
}

/// Metadata store over a fixed topic table.
#[derive(Default)]
pub struct StaticMetadata {
    topics: Mutex<HashMap<String, i32>>,
}

impl StaticMetadata {
    pub fn insert(&self, topic: &str, topic_id: i32) {
        self.topics.lock().insert(topic.to_string(), topic_id);
    }
}

impl MetadataStore for StaticMetadata {
    fn topic(&self, topic: &str) -> Option<TopicMetadata> {
        self.topics.lock().get(topic).map(|id| TopicMetadata {
            topic: topic.to_string(),
            topic_id: *id,
        })
    }
}

/// Encode one 28-byte index entry.
pub fn encode_index_entry(
    hash: i32,
    topic_id: i32,
    queue_id: i32,
    commit_log_offset: i64,
    size: i32,
    time_diff: i32,
) -> Bytes {
    let mut buf = BytesMut::with_capacity(28);
    buf.put_i32(hash);
    buf.put_i32(topic_id);
    buf.put_i32(queue_id);
    buf.put_i64(commit_log_offset);
    buf.put_i32(size);
    buf.put_i32(time_diff);
    buf.freeze()
}
