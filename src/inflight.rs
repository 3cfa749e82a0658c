//! In-flight request registry.
//!
//! Every physical backend fetch initiated by the prefetcher or the full-miss
//! path is recorded here while it runs, keyed by consumer group and queue
//! offset range. Later callers whose range overlaps an outstanding fetch
//! suspend on the shared [`OffsetFuture`] instead of issuing a duplicate
//! read. Entries remove themselves once every batch future completes.

use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use tokio::sync::Notify;

/// A clonable, peekable future resolving to the last queue offset produced
/// by one backend fetch, or `-1` on any abnormal outcome.
#[derive(Clone, Debug)]
pub struct OffsetFuture {
    cell: Arc<OnceLock<i64>>,
    notify: Arc<Notify>,
}

impl OffsetFuture {
    /// Create a pending future together with its completing promise.
    pub fn pair() -> (OffsetPromise, OffsetFuture) {
        let future = OffsetFuture {
            cell: Arc::new(OnceLock::new()),
            notify: Arc::new(Notify::new()),
        };
        (
            OffsetPromise {
                inner: future.clone(),
            },
            future,
        )
    }

    /// An already-resolved future.
    pub fn completed(value: i64) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(value);
        Self {
            cell: Arc::new(cell),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn is_done(&self) -> bool {
        self.cell.get().is_some()
    }

    /// The resolved value, if completion already happened.
    pub fn peek(&self) -> Option<i64> {
        self.cell.get().copied()
    }

    /// Suspend until the fetch completes.
    pub async fn wait(&self) -> i64 {
        loop {
            let notified = self.notify.notified();
            if let Some(value) = self.cell.get() {
                return *value;
            }
            notified.await;
        }
    }

    fn set(&self, value: i64) {
        let _ = self.cell.set(value);
        self.notify.notify_waiters();
    }
}

/// Completion handle for an [`OffsetFuture`]. Resolving with `-1` on drop
/// guarantees waiters can never hang behind a dead fetch task.
#[derive(Debug)]
pub struct OffsetPromise {
    inner: OffsetFuture,
}

impl OffsetPromise {
    pub fn complete(self, value: i64) {
        self.inner.set(value);
    }
}

impl Drop for OffsetPromise {
    fn drop(&mut self) {
        if !self.inner.is_done() {
            self.inner.set(-1);
        }
    }
}

/// One pending backend fetch: how many messages it covers and its future.
#[derive(Clone, Debug)]
pub struct InflightBatch {
    pub batch_size: i64,
    pub future: OffsetFuture,
}

/// View over the batches of one registry entry. Batches cover consecutive
/// offset ranges starting at `start_offset`.
#[derive(Clone, Debug)]
pub struct InflightFuture {
    start_offset: i64,
    batches: Vec<InflightBatch>,
}

impl InflightFuture {
    /// A view with no pending fetches; `is_all_done` is trivially true.
    pub fn empty() -> Self {
        Self {
            start_offset: -1,
            batches: Vec::new(),
        }
    }

    pub fn start_offset(&self) -> i64 {
        self.start_offset
    }

    pub fn is_all_done(&self) -> bool {
        self.batches.iter().all(|b| b.future.is_done())
    }

    /// Future of the batch containing `offset`, or a completed `-1` future
    /// if no batch covers it.
    pub fn future_for(&self, offset: i64) -> OffsetFuture {
        let mut cursor = self.start_offset;
        for batch in &self.batches {
            if offset < cursor + batch.batch_size {
                return batch.future.clone();
            }
            cursor += batch.batch_size;
        }
        OffsetFuture::completed(-1)
    }

    /// Future of the final batch, or a completed `-1` future if empty.
    pub fn last_future(&self) -> OffsetFuture {
        self.batches
            .last()
            .map(|b| b.future.clone())
            .unwrap_or_else(|| OffsetFuture::completed(-1))
    }
}

#[derive(Debug)]
struct InflightEntry {
    group: String,
    start_offset: i64,
    count: i64,
    batches: Vec<InflightBatch>,
}

impl InflightEntry {
    fn overlaps(&self, start_offset: i64, count: i64) -> bool {
        self.start_offset < start_offset + count && start_offset < self.start_offset + self.count
    }
}

/// Per-flat-file registry of outstanding backend fetches.
#[derive(Debug, Default)]
pub struct InflightRegistry {
    entries: Arc<Mutex<Vec<Arc<InflightEntry>>>>,
}

impl InflightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches overlapping `[start_offset, start_offset + count)`, preferring
    /// an entry installed by `group` but falling back to any group so
    /// cross-group callers coalesce.
    pub fn get(&self, group: &str, start_offset: i64, count: i64) -> InflightFuture {
        let entries = self.entries.lock();
        let matching = entries
            .iter()
            .filter(|e| e.group == group && e.overlaps(start_offset, count))
            .chain(
                entries
                    .iter()
                    .filter(|e| e.group != group && e.overlaps(start_offset, count)),
            );
        Self::pick(matching, start_offset)
    }

    /// Fetches overlapping the range regardless of requesting group.
    pub fn get_any(&self, start_offset: i64, count: i64) -> InflightFuture {
        let entries = self.entries.lock();
        Self::pick(
            entries.iter().filter(|e| e.overlaps(start_offset, count)),
            start_offset,
        )
    }

    fn pick<'a>(
        candidates: impl Iterator<Item = &'a Arc<InflightEntry>>,
        start_offset: i64,
    ) -> InflightFuture {
        let mut first: Option<&Arc<InflightEntry>> = None;
        for entry in candidates {
            // an entry whose range contains the requested start wins outright
            if entry.start_offset <= start_offset {
                return InflightFuture {
                    start_offset: entry.start_offset,
                    batches: entry.batches.clone(),
                };
            }
            first.get_or_insert(entry);
        }
        match first {
            Some(entry) => InflightFuture {
                start_offset: entry.start_offset,
                batches: entry.batches.clone(),
            },
            None => InflightFuture::empty(),
        }
    }

    /// Install a set of pending fetches. A background task removes the entry
    /// once every batch future completes, so overlapping `get` calls observe
    /// the futures exactly as long as any of them is outstanding.
    pub fn put(
        &self,
        group: impl Into<String>,
        start_offset: i64,
        count: i64,
        batches: Vec<InflightBatch>,
    ) {
        let entry = Arc::new(InflightEntry {
            group: group.into(),
            start_offset,
            count,
            batches,
        });
        self.entries.lock().push(entry.clone());

        let entries = self.entries.clone();
        tokio::spawn(async move {
            for batch in &entry.batches {
                batch.future.wait().await;
            }
            entries.lock().retain(|e| !Arc::ptr_eq(e, &entry));
        });
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
