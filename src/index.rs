//! By-key message lookup over the backend's index file.
//!
//! The streaming path never uses the index; queries here go straight to the
//! backend without touching the read-ahead cache. Every failure degrades to
//! an empty result — the query is read-only and never fatal.

use crate::fetch::MessageFetcher;
use crate::model::{MessageQueue, QueryMessageResult};
use futures::future::join_all;

/// Fixed width of one index entry:
/// `[hash:4][topic_id:4][queue_id:4][commit_log_offset:8][size:4][time_diff:4]`.
pub const INDEX_ENTRY_SIZE: usize = 28;

/// Hash of an index key, matching the value stored in index entries.
///
/// Computed over UTF-16 code units as `h = 31·h + c`, then folded to a
/// non-negative value (the overflow sentinel collapses to 0).
pub fn index_key_hash(key: &str) -> i32 {
    let mut hash: i32 = 0;
    for unit in key.encode_utf16() {
        hash = hash.wrapping_mul(31).wrapping_add(unit as i32);
    }
    let positive = hash.wrapping_abs();
    if positive < 0 {
        0
    } else {
        positive
    }
}

/// Combined index key for a topic/key pair.
pub fn build_key(topic: &str, key: &str) -> String {
    format!("{}#{}", topic, key)
}

fn read_i32(buf: &[u8], pos: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[pos..pos + 4]);
    i32::from_be_bytes(raw)
}

fn read_i64(buf: &[u8], pos: usize) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[pos..pos + 8]);
    i64::from_be_bytes(raw)
}

impl MessageFetcher {
    /// Find up to `max_count` messages indexed under `key` whose store time
    /// falls within `[begin, end]`.
    pub async fn query_message(
        &self,
        topic: &str,
        key: &str,
        max_count: usize,
        begin: i64,
        end: i64,
    ) -> QueryMessageResult {
        let index_file = self.manager().index_file();
        let hash = index_key_hash(&build_key(topic, key));

        let Some(topic_metadata) = self.metadata().topic(topic) else {
            tracing::info!(topic, "topic metadata not found");
            return QueryMessageResult::new();
        };
        let topic_id = topic_metadata.topic_id;

        let index_buffers = match index_file.query(topic, key, begin, end).await {
            Ok(buffers) => buffers,
            Err(e) => {
                tracing::warn!(topic, key, error = %e, "index query failed");
                return QueryMessageResult::new();
            }
        };

        let mut fetches = Vec::with_capacity(max_count);
        'buffers: for (file_begin_timestamp, buffer) in index_buffers {
            if buffer.len() % INDEX_ENTRY_SIZE != 0 {
                tracing::error!(
                    buffer_len = buffer.len(),
                    entry_size = INDEX_ENTRY_SIZE,
                    "index buffer size is not a multiple of the entry size"
                );
                continue;
            }

            for entry_start in (0..buffer.len()).step_by(INDEX_ENTRY_SIZE) {
                let entry = &buffer[entry_start..entry_start + INDEX_ENTRY_SIZE];

                if read_i32(entry, 0) != hash {
                    continue;
                }
                if read_i32(entry, 4) != topic_id {
                    continue;
                }

                let queue_id = read_i32(entry, 8);
                let queue =
                    MessageQueue::new(topic, self.config().broker_name.as_str(), queue_id as u32);
                let Some(handle) = self.resolve_handle(&queue) else {
                    continue;
                };

                let commit_log_offset = read_i64(entry, 12);
                let size = read_i32(entry, 20);
                let time_diff = read_i32(entry, 24);
                let timestamp = file_begin_timestamp + time_diff as i64;
                if timestamp < begin || timestamp > end {
                    continue;
                }

                fetches.push(async move {
                    handle
                        .file()
                        .read_commit_log(commit_log_offset, size as usize)
                        .await
                });

                if fetches.len() >= max_count {
                    break 'buffers;
                }
            }
        }

        let mut result = QueryMessageResult::new();
        for fetched in join_all(fetches).await {
            match fetched {
                Ok(message) => result.messages.push(message),
                Err(e) => {
                    tracing::warn!(topic, key, error = %e, "indexed message fetch failed");
                }
            }
        }
        result
    }
}
