//! The fetch engine: request validation, cache-first serving, in-flight
//! coalescing, adaptive prefetch, and the backend reader.
//!
//! A pull request is served from the read-ahead cache whenever possible. On
//! a cold cache the caller first coalesces onto any overlapping in-flight
//! fetch (at most once, to avoid starvation behind slow prefetch chains),
//! then falls back to a synchronous fetch-and-cache of its own. Every served
//! hit triggers a prefetch of the next window sized by the per-queue
//! read-ahead factor.

use crate::cache::{CacheStore, MessageWrapper};
use crate::config::FetchConfig;
use crate::error::{Result, StoreError};
use crate::flatfile::{FlatFileHandle, FlatFileManager, HandleCache, MetadataStore};
use crate::inflight::{InflightBatch, OffsetFuture};
use crate::message;
use crate::metrics::{FetchMetrics, Timer};
use crate::model::{
    Boundary, GetMessageResult, GetMessageStatus, MessageFilter, MessageQueue, QueryMessageResult,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Public surface of the tiered read path.
#[async_trait]
pub trait MessageStoreFetcher: Send + Sync {
    /// Pull up to `max_count` messages for `group` starting at
    /// `queue_offset`.
    async fn get_message(
        &self,
        group: &str,
        topic: &str,
        queue_id: u32,
        queue_offset: i64,
        max_count: usize,
        filter: Option<&dyn MessageFilter>,
    ) -> GetMessageResult;

    /// Store timestamp of the earliest retained message, or `-1`.
    async fn get_earliest_message_time(&self, topic: &str, queue_id: u32) -> i64;

    /// Store timestamp of the message at `queue_offset`, or `-1`.
    async fn get_message_store_timestamp(
        &self,
        topic: &str,
        queue_id: u32,
        queue_offset: i64,
    ) -> i64;

    /// Logical offset closest to `timestamp`, or `-1`.
    fn get_offset_in_queue_by_time(
        &self,
        topic: &str,
        queue_id: u32,
        timestamp: i64,
        boundary: Boundary,
    ) -> i64;

    /// Look up messages by index key within `[begin, end]`.
    async fn query_message(
        &self,
        topic: &str,
        key: &str,
        max_count: usize,
        begin: i64,
        end: i64,
    ) -> QueryMessageResult;
}

/// The tiered message fetcher. Cheap to clone; clones share the cache,
/// handle state and configuration.
#[derive(Clone)]
pub struct MessageFetcher {
    config: Arc<FetchConfig>,
    manager: Arc<dyn FlatFileManager>,
    metadata: Arc<dyn MetadataStore>,
    cache: CacheStore,
    handles: Arc<HandleCache>,
}

impl MessageFetcher {
    pub fn new(
        config: FetchConfig,
        manager: Arc<dyn FlatFileManager>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        let cache = CacheStore::new(config.cache_max_weight(), config.cache_expire_duration());
        let handles = Arc::new(HandleCache::new(config.read_ahead_min_factor));
        Self {
            config: Arc::new(config),
            manager,
            metadata,
            cache,
            handles,
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// The read-ahead cache, exposed for metrics monitoring.
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub(crate) fn manager(&self) -> &Arc<dyn FlatFileManager> {
        &self.manager
    }

    pub(crate) fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    /// Current read-ahead factor for a queue, exposed for monitoring.
    pub fn read_ahead_factor(&self, topic: &str, queue_id: u32) -> Option<u32> {
        self.resolve_handle(&self.queue(topic, queue_id))
            .map(|handle| handle.read_ahead().factor())
    }

    /// Push current cache statistics to the metrics gauges.
    pub fn publish_cache_stats(&self) {
        let stats = self.cache.stats();
        FetchMetrics::set_cache_weight(stats.weighted_size);
        FetchMetrics::set_cache_entries(stats.entry_count);
        FetchMetrics::set_cache_evictions(stats.evictions);
    }

    pub(crate) fn resolve_handle(&self, queue: &MessageQueue) -> Option<Arc<FlatFileHandle>> {
        let cache = &self.cache;
        self.handles
            .resolve(self.manager.as_ref(), queue, |stale_id| {
                cache.invalidate_file(stale_id)
            })
    }

    fn queue(&self, topic: &str, queue_id: u32) -> MessageQueue {
        MessageQueue::new(topic, self.config.broker_name.as_str(), queue_id)
    }

    // ------------------------------------------------------------------
    // Coordinator
    // ------------------------------------------------------------------

    pub async fn get_message(
        &self,
        group: &str,
        topic: &str,
        queue_id: u32,
        queue_offset: i64,
        max_count: usize,
        _filter: Option<&dyn MessageFilter>,
    ) -> GetMessageResult {
        let queue = self.queue(topic, queue_id);
        let Some(handle) = self.resolve_handle(&queue) else {
            let mut result = GetMessageResult::new(GetMessageStatus::NoMatchedLogicQueue);
            result.next_begin_offset = queue_offset;
            return result;
        };

        let min = handle.min_offset();
        let commit = handle.commit_offset();

        // Offset range  | Result         | Next offset
        // (-oo, 0]      | no message     | requested
        // (0, min)      | too small      | min
        // [min, commit) | proceed        |
        // [commit]      | overflow one   | commit
        // (commit, +oo) | overflow badly | commit
        let mut result = GetMessageResult::new(GetMessageStatus::Found);
        result.min_offset = min;
        result.max_offset = commit;

        if commit <= 0 {
            result.status = GetMessageStatus::NoMessageInQueue;
            result.next_begin_offset = queue_offset;
            return result;
        } else if queue_offset < min {
            result.status = GetMessageStatus::OffsetTooSmall;
            result.next_begin_offset = min;
            return result;
        } else if queue_offset == commit {
            result.status = GetMessageStatus::OffsetOverflowOne;
            result.next_begin_offset = commit;
            return result;
        } else if queue_offset > commit {
            result.status = GetMessageStatus::OffsetOverflowBadly;
            result.next_begin_offset = commit;
            return result;
        }

        self.get_message_from_cache(handle, group, queue_offset, max_count, true)
            .await
    }

    /// Serve from the cache, coalescing onto an in-flight fetch at most
    /// once before falling back to a direct fetch.
    async fn get_message_from_cache(
        &self,
        handle: Arc<FlatFileHandle>,
        group: &str,
        queue_offset: i64,
        max_count: usize,
        mut wait_inflight: bool,
    ) -> GetMessageResult {
        let queue = handle.message_queue().clone();

        loop {
            let mut last_get_offset = queue_offset - 1;
            let mut hits: Vec<Arc<MessageWrapper>> = Vec::with_capacity(max_count);
            while hits.len() < max_count {
                match self.cache.get_if_present((handle.id(), last_get_offset + 1)) {
                    Some(wrapper) => {
                        last_get_offset += 1;
                        hits.push(wrapper);
                    }
                    None => break,
                }
            }

            // record cache access only once per request
            if wait_inflight {
                FetchMetrics::add_cache_access(&queue.topic, group, max_count as u64);
                FetchMetrics::add_cache_hit(&queue.topic, group, hits.len() as u64);
            }

            // Nothing cached but a fetch covering this offset is in transit:
            // suspend on it, then re-probe. A request waits for at most one
            // in-flight cycle so a chain of slow prefetches cannot starve it.
            if hits.is_empty() && wait_inflight {
                let future = handle
                    .inflight()
                    .get(group, queue_offset, max_count as i64)
                    .future_for(queue_offset);
                if !future.is_done() {
                    let timer = Timer::new();
                    future.wait().await;
                    FetchMetrics::record_inflight_wait_us(timer.elapsed_us());
                    tracing::debug!(
                        topic = %queue.topic,
                        queue_id = queue.queue_id,
                        group,
                        queue_offset,
                        wait_us = timer.elapsed_us(),
                        "waited for in-flight request"
                    );
                    wait_inflight = false;
                    continue;
                }
            }

            // top up: an in-flight fetch may have landed between the probe
            // and the registry check
            while hits.len() < max_count {
                match self.cache.get_if_present((handle.id(), last_get_offset + 1)) {
                    Some(wrapper) => {
                        last_get_offset += 1;
                        hits.push(wrapper);
                    }
                    None => break,
                }
            }

            self.record_cache_access(&handle, group, queue_offset, &hits);

            if !hits.is_empty() {
                tracing::debug!(
                    topic = %queue.topic,
                    queue_id = queue.queue_id,
                    queue_offset,
                    max_count,
                    hit_count = hits.len(),
                    "cache hit"
                );

                let fetcher = self.clone();
                let prefetch_handle = handle.clone();
                let prefetch_group = group.to_string();
                let next_window = last_get_offset + 1;
                tokio::spawn(async move {
                    fetcher
                        .prefetch(prefetch_handle, prefetch_group, max_count, next_window)
                        .await;
                });

                let mut result = GetMessageResult::new(GetMessageStatus::Found);
                result.min_offset = handle.min_offset();
                result.max_offset = handle.commit_offset();
                result.next_begin_offset = queue_offset + hits.len() as i64;
                for wrapper in &hits {
                    result.add_message(wrapper.cur_offset(), wrapper.payload());
                }
                return result;
            }

            tracing::warn!(
                topic = %queue.topic,
                queue_id = queue.queue_id,
                queue_offset,
                max_count,
                "cache miss"
            );

            // Full miss: issue one amplified fetch and register it so
            // concurrent callers coalesce. The task is detached; abandoning
            // the returned future does not cancel the backend read.
            let batch_size = max_count * self.config.read_ahead_min_factor.max(1) as usize;
            let join = {
                let _guard = handle.fetch_lock().lock().await;
                let (promise, future) = OffsetFuture::pair();
                let fetcher = self.clone();
                let fetch_handle = handle.clone();
                let join = tokio::spawn(async move {
                    fetcher
                        .fetch_and_cache_on_miss(
                            fetch_handle,
                            queue_offset,
                            max_count,
                            batch_size,
                            promise,
                        )
                        .await
                });
                handle.inflight().put(
                    group,
                    queue_offset,
                    batch_size as i64,
                    vec![InflightBatch {
                        batch_size: batch_size as i64,
                        future,
                    }],
                );
                join
            };

            return match join.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(
                        topic = %queue.topic,
                        queue_id = queue.queue_id,
                        queue_offset,
                        error = %e,
                        "direct fetch task failed"
                    );
                    let mut result = GetMessageResult::new(GetMessageStatus::OffsetFoundNull);
                    result.min_offset = handle.min_offset();
                    result.max_offset = handle.commit_offset();
                    result.next_begin_offset = queue_offset;
                    result
                }
            };
        }
    }

    /// Direct fetch on a full miss: cache everything the backend returned
    /// (already counted as read once), answer with at most `max_count`, and
    /// resolve the registered in-flight future with the last fetched offset.
    async fn fetch_and_cache_on_miss(
        self,
        handle: Arc<FlatFileHandle>,
        queue_offset: i64,
        max_count: usize,
        batch_size: usize,
        promise: crate::inflight::OffsetPromise,
    ) -> GetMessageResult {
        let result = self.fetch_from_store(&handle, queue_offset, batch_size).await;
        if result.status != GetMessageStatus::Found {
            promise.complete(-1);
            return result;
        }

        let min_offset = result.messages.first().map(|m| m.queue_offset).unwrap_or(-1);
        let max_offset = result.messages.last().map(|m| m.queue_offset).unwrap_or(-1);
        let size = result.messages.len();

        let mut out = GetMessageResult::new(GetMessageStatus::Found);
        out.min_offset = handle.min_offset();
        out.max_offset = handle.commit_offset();
        for msg in &result.messages {
            let wrapper = Arc::new(MessageWrapper::new(
                msg.payload.clone(),
                msg.queue_offset,
                min_offset,
                max_offset,
                size,
                true,
            ));
            self.cache.put((handle.id(), msg.queue_offset), wrapper);
            if out.messages.len() < max_count {
                out.add_message(msg.queue_offset, msg.payload.clone());
            }
        }
        out.next_begin_offset = queue_offset + out.messages.len() as i64;
        promise.complete(max_offset);
        out
    }

    /// Count each returned wrapper as read and drop it once every active
    /// group has seen it; record the group's served position.
    fn record_cache_access(
        &self,
        handle: &Arc<FlatFileHandle>,
        group: &str,
        queue_offset: i64,
        hits: &[Arc<MessageWrapper>],
    ) {
        let served_offset = hits
            .last()
            .map(|w| w.cur_offset())
            .unwrap_or(queue_offset);
        handle.file().record_group_access(group, served_offset);

        for wrapper in hits {
            if wrapper.mark_accessed() >= handle.file().active_group_count() {
                self.cache.invalidate((handle.id(), wrapper.cur_offset()));
            }
        }
    }

    // ------------------------------------------------------------------
    // Prefetch engine
    // ------------------------------------------------------------------

    /// Schedule read-ahead for the window beginning at `next_begin_offset`,
    /// amplified by the adaptive factor and fanned out across batches.
    async fn prefetch(
        self,
        handle: Arc<FlatFileHandle>,
        group: String,
        max_count: usize,
        next_begin_offset: i64,
    ) {
        if max_count <= 1 || handle.read_ahead().factor() <= 1 {
            return;
        }

        let count_threshold = self.config.read_ahead_message_count_threshold as usize;
        let prefetch_batch_size =
            (max_count * handle.read_ahead().factor() as usize).min(count_threshold);
        let inflight = handle
            .inflight()
            .get(&group, next_begin_offset, prefetch_batch_size as i64);
        if !inflight.is_all_done() {
            return;
        }

        let _guard = handle.fetch_lock().lock().await;

        let inflight = handle.inflight().get_any(next_begin_offset, max_count as i64);
        if !inflight.is_all_done() {
            return;
        }

        let max_offset_of_last = inflight.last_future().peek().unwrap_or(-1);
        let expired = self
            .cache
            .get_if_present((handle.id(), next_begin_offset))
            .is_none();
        tracing::debug!(
            group = %group,
            next_begin_offset,
            max_offset_of_last,
            expired,
            "prefetch probe"
        );

        if !(expired || (max_offset_of_last != -1 && next_begin_offset >= inflight.start_offset()))
        {
            return;
        }

        let ceiling = ((count_threshold / max_count).max(1)) as u32;
        let queue_offset = if expired {
            // the previous window aged out unread: narrow the amplification
            handle.read_ahead().decrease();
            next_begin_offset
        } else {
            // consumer is advancing into the prefetched window: widen it
            handle.read_ahead().increase(ceiling);
            max_offset_of_last + 1
        };

        let factor = (handle.read_ahead().factor().min(ceiling)) as usize;
        let threshold = self.config.read_ahead_batch_size_factor_threshold.max(1) as usize;
        let (remainder_first, concurrency) = if factor > threshold {
            let remainder = if factor % threshold == 0 { 0 } else { 1 };
            (remainder, factor / threshold + remainder)
        } else {
            (0, 1)
        };
        let per_batch = max_count * factor.min(threshold);

        let mut batches = Vec::with_capacity(concurrency);
        let mut next_queue_offset = queue_offset;
        if remainder_first == 1 {
            let first_batch = (factor % threshold) * max_count;
            batches.push(self.spawn_prefetch_batch(&handle, next_queue_offset, first_batch));
            next_queue_offset += first_batch as i64;
        }
        for i in 0..(concurrency - remainder_first) {
            batches.push(self.spawn_prefetch_batch(
                &handle,
                next_queue_offset + (i * per_batch) as i64,
                per_batch,
            ));
        }
        handle
            .inflight()
            .put(group.clone(), queue_offset, (max_count * factor) as i64, batches);

        tracing::debug!(
            group = %group,
            next_begin_offset,
            queue_offset,
            factor,
            per_batch,
            concurrency,
            "prefetching messages for later requests"
        );
    }

    fn spawn_prefetch_batch(
        &self,
        handle: &Arc<FlatFileHandle>,
        queue_offset: i64,
        batch_size: usize,
    ) -> InflightBatch {
        FetchMetrics::increment_prefetch_batches(&handle.message_queue().topic);
        let (promise, future) = OffsetFuture::pair();
        let fetcher = self.clone();
        let handle = handle.clone();
        tokio::spawn(async move {
            let last_offset = fetcher.prefetch_batch(handle, queue_offset, batch_size).await;
            promise.complete(last_offset);
        });
        InflightBatch {
            batch_size: batch_size as i64,
            future,
        }
    }

    /// Fetch one prefetch batch and populate the cache. Resolves to the
    /// highest queue offset cached, or `-1` on any abnormal outcome so the
    /// registry future still completes.
    async fn prefetch_batch(
        &self,
        handle: Arc<FlatFileHandle>,
        queue_offset: i64,
        batch_size: usize,
    ) -> i64 {
        let queue = handle.message_queue().clone();
        let result = self.fetch_from_store(&handle, queue_offset, batch_size).await;
        if result.status != GetMessageStatus::Found {
            tracing::warn!(
                topic = %queue.topic,
                queue_id = queue.queue_id,
                queue_offset,
                batch_size,
                status = result.status.name(),
                "read ahead failed"
            );
            return -1;
        }
        if result.messages.is_empty() {
            tracing::error!(
                topic = %queue.topic,
                queue_id = queue.queue_id,
                queue_offset,
                batch_size,
                "read ahead returned an empty batch"
            );
            return -1;
        }

        let min_offset = result.messages[0].queue_offset;
        let max_offset = result.messages[result.messages.len() - 1].queue_offset;
        let size = result.messages.len();
        for msg in &result.messages {
            let wrapper = Arc::new(MessageWrapper::new(
                msg.payload.clone(),
                msg.queue_offset,
                min_offset,
                max_offset,
                size,
                false,
            ));
            self.cache.put((handle.id(), msg.queue_offset), wrapper);
        }
        if size != batch_size || max_offset != queue_offset + batch_size as i64 - 1 {
            tracing::warn!(
                topic = %queue.topic,
                queue_id = queue.queue_id,
                queue_offset,
                expected = batch_size,
                actual = size,
                max_offset,
                "read ahead batch shorter than requested"
            );
        }
        max_offset
    }

    // ------------------------------------------------------------------
    // Backend reader
    // ------------------------------------------------------------------

    /// Pull one consume-queue slice and the matching commit-log slice, then
    /// split the log into per-message buffers. Backend errors are mapped to
    /// statuses here and never propagate.
    pub async fn fetch_from_store(
        &self,
        handle: &Arc<FlatFileHandle>,
        queue_offset: i64,
        batch_size: usize,
    ) -> GetMessageResult {
        let queue = handle.message_queue().clone();
        let timer = Timer::new();

        let mut result = GetMessageResult::new(GetMessageStatus::OffsetFoundNull);
        result.min_offset = handle.min_offset();
        result.max_offset = handle.commit_offset();
        result.next_begin_offset = queue_offset;

        let cq = match handle.file().read_consume_queue(queue_offset, batch_size).await {
            Ok(cq) => cq,
            Err(StoreError::NoNewData(_)) => {
                result.status = GetMessageStatus::OffsetOverflowOne;
                return result;
            }
            Err(e) => {
                tracing::warn!(
                    topic = %queue.topic,
                    queue_id = queue.queue_id,
                    queue_offset,
                    batch_size,
                    error = %e,
                    "consume queue read failed"
                );
                return result;
            }
        };

        match self.read_and_split(handle, cq, queue_offset, batch_size).await {
            Ok(mut split) => {
                split.min_offset = result.min_offset;
                split.max_offset = result.max_offset;
                FetchMetrics::record_fetch_latency_us(timer.elapsed_us());
                FetchMetrics::add_backend_messages(&queue.topic, split.messages.len() as u64);
                split
            }
            Err(e) => {
                tracing::warn!(
                    topic = %queue.topic,
                    queue_id = queue.queue_id,
                    queue_offset,
                    batch_size,
                    error = %e,
                    "get message from tiered store failed"
                );
                result
            }
        }
    }

    async fn read_and_split(
        &self,
        handle: &Arc<FlatFileHandle>,
        cq: Bytes,
        queue_offset: i64,
        batch_size: usize,
    ) -> Result<GetMessageResult> {
        let queue = handle.message_queue();
        let entry_count = message::cq_entry_count(&cq);
        if entry_count == 0 {
            return Err(StoreError::IllegalOffset {
                offset: queue_offset,
                reason: "consume queue read returned no entries".to_string(),
            });
        }

        let malformed = || StoreError::IllegalParam("truncated consume queue entry".to_string());
        let first_commit_log_offset = message::cq_commit_log_offset(&cq, 0).ok_or_else(malformed)?;
        let last_commit_log_offset =
            message::cq_commit_log_offset(&cq, entry_count - 1).ok_or_else(malformed)?;
        if last_commit_log_offset < first_commit_log_offset {
            tracing::error!(
                topic = %queue.topic,
                queue_id = queue.queue_id,
                queue_offset,
                batch_size,
                "message is not in order"
            );
            return Err(StoreError::IllegalOffset {
                offset: queue_offset,
                reason: "message is not in order".to_string(),
            });
        }

        // Cap the commit-log read: drop tail entries until the byte range
        // fits the configured threshold.
        let size_threshold = self.config.read_ahead_message_size_threshold as i64;
        let mut kept = entry_count;
        let mut length = last_commit_log_offset - first_commit_log_offset
            + message::cq_size(&cq, entry_count - 1).ok_or_else(malformed)? as i64;
        let origin_length = length;
        while kept > 1 && length > size_threshold {
            kept -= 1;
            let tail_offset = message::cq_commit_log_offset(&cq, kept - 1).ok_or_else(malformed)?;
            length = tail_offset - first_commit_log_offset
                + message::cq_size(&cq, kept - 1).ok_or_else(malformed)? as i64;
        }
        if origin_length != length {
            tracing::info!(
                topic = %queue.topic,
                queue_id = queue.queue_id,
                queue_offset,
                batch_size,
                origin_length,
                length,
                "batch data too large, shrunk commit log read"
            );
        }

        let log = handle
            .file()
            .read_commit_log(first_commit_log_offset, length as usize)
            .await?;

        let mut result = GetMessageResult::new(GetMessageStatus::Found);
        for i in 0..kept {
            let entry_offset = message::cq_commit_log_offset(&cq, i).ok_or_else(malformed)?;
            let size = message::cq_size(&cq, i).ok_or_else(malformed)? as usize;
            let start = (entry_offset - first_commit_log_offset) as usize;
            if start + size > log.len() {
                tracing::warn!(
                    topic = %queue.topic,
                    queue_id = queue.queue_id,
                    entry_offset,
                    size,
                    log_len = log.len(),
                    "consume queue entry points past commit log slice"
                );
                continue;
            }
            let slice = log.slice(start..start + size);
            if message::message_total_size(&slice) != Some(size as u32)
                || message::message_magic(&slice) != Some(message::MESSAGE_MAGIC_CODE)
            {
                tracing::warn!(
                    topic = %queue.topic,
                    queue_id = queue.queue_id,
                    entry_offset,
                    size,
                    "skipping malformed message record"
                );
                continue;
            }
            let offset = message::message_queue_offset(&slice).unwrap_or(queue_offset + i as i64);
            result.add_message(offset, slice);
        }

        if !result.messages.is_empty() {
            result.next_begin_offset = queue_offset + result.messages.len() as i64;
            if result.messages.len() != kept {
                tracing::error!(
                    topic = %queue.topic,
                    queue_id = queue.queue_id,
                    queue_offset,
                    batch_size,
                    expected = kept,
                    actual = result.messages.len(),
                    "split message buffer incomplete, messages may be lost"
                );
            } else if kept != batch_size {
                tracing::debug!(
                    topic = %queue.topic,
                    queue_id = queue.queue_id,
                    batch_size,
                    actual = kept,
                    "message count below batch size, maybe dispatch delay"
                );
            }
            return Ok(result);
        }

        let next_begin_offset = queue_offset + kept as i64;
        tracing::error!(
            topic = %queue.topic,
            queue_id = queue.queue_id,
            cq_len = cq.len(),
            log_len = log.len(),
            queue_offset,
            next_begin_offset,
            "split message buffer produced nothing"
        );
        result.status = GetMessageStatus::MessageWasRemoving;
        result.next_begin_offset = next_begin_offset;
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Timestamp helpers
    // ------------------------------------------------------------------

    pub async fn get_earliest_message_time(&self, topic: &str, queue_id: u32) -> i64 {
        let queue = self.queue(topic, queue_id);
        let Some(handle) = self.resolve_handle(&queue) else {
            return -1;
        };

        let length = message::STORE_TIMESTAMP_POSITION + 8;
        match handle
            .file()
            .read_commit_log(handle.file().commit_log_min_offset(), length)
            .await
        {
            Ok(buf) => message::message_store_timestamp(&buf).unwrap_or(-1),
            Err(e) => {
                tracing::error!(topic, queue_id, error = %e, "earliest message time read failed");
                -1
            }
        }
    }

    pub async fn get_message_store_timestamp(
        &self,
        topic: &str,
        queue_id: u32,
        queue_offset: i64,
    ) -> i64 {
        let queue = self.queue(topic, queue_id);
        let Some(handle) = self.resolve_handle(&queue) else {
            return -1;
        };

        let decoded: Result<i64> = async {
            let cq = handle.file().read_consume_queue(queue_offset, 1).await?;
            let commit_log_offset = message::cq_commit_log_offset(&cq, 0)
                .ok_or_else(|| StoreError::IllegalParam("truncated consume queue entry".into()))?;
            let size = message::cq_size(&cq, 0)
                .ok_or_else(|| StoreError::IllegalParam("truncated consume queue entry".into()))?;
            let msg = handle
                .file()
                .read_commit_log(commit_log_offset, size as usize)
                .await?;
            message::message_store_timestamp(&msg)
                .ok_or_else(|| StoreError::IllegalParam("truncated message record".into()))
        }
        .await;

        match decoded {
            Ok(ts) => ts,
            Err(e) => {
                tracing::error!(
                    topic,
                    queue_id,
                    queue_offset,
                    error = %e,
                    "get or decode message store timestamp failed"
                );
                -1
            }
        }
    }

    pub fn get_offset_in_queue_by_time(
        &self,
        topic: &str,
        queue_id: u32,
        timestamp: i64,
        boundary: Boundary,
    ) -> i64 {
        let queue = self.queue(topic, queue_id);
        let Some(handle) = self.resolve_handle(&queue) else {
            return -1;
        };
        match handle
            .file()
            .offset_in_consume_queue_by_time(timestamp, boundary)
        {
            Ok(offset) => offset,
            Err(e) => {
                tracing::error!(
                    topic,
                    queue_id,
                    timestamp,
                    error = %e,
                    "offset lookup by time failed"
                );
                -1
            }
        }
    }
}

#[async_trait]
impl MessageStoreFetcher for MessageFetcher {
    async fn get_message(
        &self,
        group: &str,
        topic: &str,
        queue_id: u32,
        queue_offset: i64,
        max_count: usize,
        filter: Option<&dyn MessageFilter>,
    ) -> GetMessageResult {
        MessageFetcher::get_message(self, group, topic, queue_id, queue_offset, max_count, filter)
            .await
    }

    async fn get_earliest_message_time(&self, topic: &str, queue_id: u32) -> i64 {
        MessageFetcher::get_earliest_message_time(self, topic, queue_id).await
    }

    async fn get_message_store_timestamp(
        &self,
        topic: &str,
        queue_id: u32,
        queue_offset: i64,
    ) -> i64 {
        MessageFetcher::get_message_store_timestamp(self, topic, queue_id, queue_offset).await
    }

    fn get_offset_in_queue_by_time(
        &self,
        topic: &str,
        queue_id: u32,
        timestamp: i64,
        boundary: Boundary,
    ) -> i64 {
        MessageFetcher::get_offset_in_queue_by_time(self, topic, queue_id, timestamp, boundary)
    }

    async fn query_message(
        &self,
        topic: &str,
        key: &str,
        max_count: usize,
        begin: i64,
        end: i64,
    ) -> QueryMessageResult {
        MessageFetcher::query_message(self, topic, key, max_count, begin, end).await
    }
}
