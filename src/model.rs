use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Identity of a message queue: `(topic, broker, queue id)`.
///
/// Used as the lookup key into the flat-file manager. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageQueue {
    pub topic: String,
    pub broker_name: String,
    pub queue_id: u32,
}

impl MessageQueue {
    pub fn new(topic: impl Into<String>, broker_name: impl Into<String>, queue_id: u32) -> Self {
        Self {
            topic: topic.into(),
            broker_name: broker_name.into(),
            queue_id,
        }
    }
}

impl std::fmt::Display for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.topic, self.broker_name, self.queue_id)
    }
}

/// Boundary selection for time-based offset lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Boundary {
    Lower,
    Upper,
}

/// Outcome of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetMessageStatus {
    Found,
    NoMessageInQueue,
    NoMatchedLogicQueue,
    OffsetTooSmall,
    OffsetOverflowOne,
    OffsetOverflowBadly,
    OffsetFoundNull,
    MessageWasRemoving,
}

impl GetMessageStatus {
    pub fn name(&self) -> &'static str {
        match self {
            GetMessageStatus::Found => "found",
            GetMessageStatus::NoMessageInQueue => "no_message_in_queue",
            GetMessageStatus::NoMatchedLogicQueue => "no_matched_logic_queue",
            GetMessageStatus::OffsetTooSmall => "offset_too_small",
            GetMessageStatus::OffsetOverflowOne => "offset_overflow_one",
            GetMessageStatus::OffsetOverflowBadly => "offset_overflow_badly",
            GetMessageStatus::OffsetFoundNull => "offset_found_null",
            GetMessageStatus::MessageWasRemoving => "message_was_removing",
        }
    }
}

/// Consumer-side message filter. Evaluation happens outside the read path;
/// the fetcher accepts the handle and passes messages through untouched.
pub trait MessageFilter: Send + Sync {
    fn is_matched_by_consume_queue(&self, tag_hash: i64) -> bool;
}

/// One message produced by a fetch, paired with its logical queue offset.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub queue_offset: i64,
    pub payload: Bytes,
}

/// Result of [`get_message`](crate::fetch::MessageFetcher::get_message).
///
/// `messages` is ordered by strictly increasing queue offset.
#[derive(Debug, Clone)]
pub struct GetMessageResult {
    pub status: GetMessageStatus,
    pub min_offset: i64,
    pub max_offset: i64,
    pub next_begin_offset: i64,
    pub messages: Vec<FetchedMessage>,
}

impl GetMessageResult {
    pub fn new(status: GetMessageStatus) -> Self {
        Self {
            status,
            min_offset: 0,
            max_offset: 0,
            next_begin_offset: 0,
            messages: Vec::new(),
        }
    }

    pub fn add_message(&mut self, queue_offset: i64, payload: Bytes) {
        self.messages.push(FetchedMessage {
            queue_offset,
            payload,
        });
    }

    /// Queue offsets of all returned messages, in order.
    pub fn queue_offsets(&self) -> Vec<i64> {
        self.messages.iter().map(|m| m.queue_offset).collect()
    }
}

/// Result of a by-key query. Message order follows index order, not offset
/// order.
#[derive(Debug, Clone, Default)]
pub struct QueryMessageResult {
    pub messages: Vec<Bytes>,
}

impl QueryMessageResult {
    pub fn new() -> Self {
        Self::default()
    }
}
