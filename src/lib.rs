//! # tierfetch
//!
//! Read path for a tiered message store: serves consumer pull requests for
//! messages whose bodies have been offloaded from a broker's hot log onto a
//! remote, latency-bound backing store.
//!
//! Remote fetches cost orders of magnitude more than local reads, so the
//! engine hides that latency with three cooperating mechanisms:
//!
//! - **Read-ahead cache**: weight-bounded, time-expiring cache keyed by
//!   `(queue, offset)` ([`cache::CacheStore`])
//! - **Adaptive prefetch**: a per-queue factor that widens while consumers
//!   keep hitting prefetched data and narrows when it expires unread
//!   ([`readahead::ReadAheadPolicy`])
//! - **Request coalescing**: overlapping pulls from concurrent consumer
//!   groups share one physical backend fetch ([`inflight::InflightRegistry`])
//!
//! The flat-file layer, index file and metadata store are external
//! collaborators consumed through the traits in [`flatfile`]. The engine
//! never mutates the backing store.

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod flatfile;
pub mod index;
pub mod inflight;
pub mod message;
pub mod metrics;
pub mod model;
pub mod readahead;

pub use cache::{CacheStatsSnapshot, CacheStore, MessageWrapper};
pub use config::FetchConfig;
pub use error::{Result, StoreError};
pub use fetch::{MessageFetcher, MessageStoreFetcher};
pub use flatfile::{
    FlatFile, FlatFileHandle, FlatFileManager, IndexFile, MetadataStore, TopicMetadata,
};
pub use index::{build_key, index_key_hash, INDEX_ENTRY_SIZE};
pub use inflight::{InflightBatch, InflightFuture, InflightRegistry, OffsetFuture};
pub use message::CONSUME_QUEUE_STORE_UNIT_SIZE;
pub use model::{
    Boundary, FetchedMessage, GetMessageResult, GetMessageStatus, MessageFilter, MessageQueue,
    QueryMessageResult,
};
pub use readahead::ReadAheadPolicy;
