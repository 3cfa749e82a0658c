//! Wire layout of consume-queue entries and commit-log records.
//!
//! A consume-queue entry is a fixed 20-byte record:
//!
//! ```text
//! commit_log_offset:8  size:4  tag_hash:8
//! ```
//!
//! A commit-log record starts with a fixed header; only the fields the read
//! path decodes are named here. All integers are big-endian.
//!
//! ```text
//! total_size:4  magic:4  body_crc:4  queue_id:4  flag:4
//! queue_offset:8  physical_offset:8  sys_flag:4
//! born_timestamp:8  born_host:8  store_timestamp:8  body...
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// Size of one consume-queue entry.
pub const CONSUME_QUEUE_STORE_UNIT_SIZE: usize = 20;

/// Magic marker at byte 4 of every commit-log record.
pub const MESSAGE_MAGIC_CODE: u32 = 0xAABB_CCDD;

/// Byte position of the logical queue offset within a record.
pub const QUEUE_OFFSET_POSITION: usize = 20;

/// Byte position of the store timestamp within a record.
pub const STORE_TIMESTAMP_POSITION: usize = 56;

/// Fixed header length preceding the message body.
pub const MESSAGE_HEADER_SIZE: usize = 64;

fn read_u32(buf: &[u8], pos: usize) -> Option<u32> {
    let raw: [u8; 4] = buf.get(pos..pos + 4)?.try_into().ok()?;
    Some(u32::from_be_bytes(raw))
}

fn read_i64(buf: &[u8], pos: usize) -> Option<i64> {
    let raw: [u8; 8] = buf.get(pos..pos + 8)?.try_into().ok()?;
    Some(i64::from_be_bytes(raw))
}

/// Total record length stored in the message header.
pub fn message_total_size(msg: &[u8]) -> Option<u32> {
    read_u32(msg, 0)
}

/// Magic marker of the record, used to reject torn reads.
pub fn message_magic(msg: &[u8]) -> Option<u32> {
    read_u32(msg, 4)
}

/// Logical queue offset recorded in the message header.
pub fn message_queue_offset(msg: &[u8]) -> Option<i64> {
    read_i64(msg, QUEUE_OFFSET_POSITION)
}

/// Store timestamp (epoch millis) recorded in the message header.
pub fn message_store_timestamp(msg: &[u8]) -> Option<i64> {
    read_i64(msg, STORE_TIMESTAMP_POSITION)
}

/// Number of whole consume-queue entries in a buffer.
pub fn cq_entry_count(cq: &[u8]) -> usize {
    cq.len() / CONSUME_QUEUE_STORE_UNIT_SIZE
}

/// Commit-log offset of the `index`-th consume-queue entry.
pub fn cq_commit_log_offset(cq: &[u8], index: usize) -> Option<i64> {
    read_i64(cq, index * CONSUME_QUEUE_STORE_UNIT_SIZE)
}

/// Message size of the `index`-th consume-queue entry.
pub fn cq_size(cq: &[u8], index: usize) -> Option<u32> {
    read_u32(cq, index * CONSUME_QUEUE_STORE_UNIT_SIZE + 8)
}

/// Tag hash of the `index`-th consume-queue entry.
pub fn cq_tag_hash(cq: &[u8], index: usize) -> Option<i64> {
    read_i64(cq, index * CONSUME_QUEUE_STORE_UNIT_SIZE + 12)
}

/// Encode one consume-queue entry.
pub fn encode_cq_entry(commit_log_offset: i64, size: u32, tag_hash: i64) -> Bytes {
    let mut buf = BytesMut::with_capacity(CONSUME_QUEUE_STORE_UNIT_SIZE);
    buf.put_i64(commit_log_offset);
    buf.put_u32(size);
    buf.put_i64(tag_hash);
    buf.freeze()
}

/// Encode a commit-log record with the fixed header and the given body.
pub fn encode_message(
    queue_id: u32,
    queue_offset: i64,
    physical_offset: i64,
    store_timestamp: i64,
    body: &[u8],
) -> Bytes {
    let total = MESSAGE_HEADER_SIZE + body.len();
    let mut buf = BytesMut::with_capacity(total);
    buf.put_u32(total as u32);
    buf.put_u32(MESSAGE_MAGIC_CODE);
    buf.put_u32(0); // body_crc, unused on the read path
    buf.put_u32(queue_id);
    buf.put_u32(0); // flag
    buf.put_i64(queue_offset);
    buf.put_i64(physical_offset);
    buf.put_u32(0); // sys_flag
    buf.put_i64(0); // born_timestamp
    buf.put_i64(0); // born_host
    buf.put_i64(store_timestamp);
    buf.put_slice(body);
    debug_assert_eq!(buf.len(), total);
    buf.freeze()
}
