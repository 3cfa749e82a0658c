use std::sync::atomic::{AtomicU32, Ordering};

/// Per-queue adaptive read-ahead factor.
///
/// The prefetcher widens the factor while consumers keep hitting prefetched
/// entries and narrows it when prefetched entries expire unread. A factor of
/// 1 disables prefetch. Adjustments saturate at the configured floor and the
/// ceiling supplied by the caller (`count threshold / max count`), forming a
/// control loop with hysteresis.
#[derive(Debug)]
pub struct ReadAheadPolicy {
    factor: AtomicU32,
    floor: u32,
}

impl ReadAheadPolicy {
    pub fn new(min_factor: u32) -> Self {
        let floor = min_factor.max(1);
        Self {
            factor: AtomicU32::new(floor),
            floor,
        }
    }

    pub fn factor(&self) -> u32 {
        self.factor.load(Ordering::Relaxed)
    }

    /// Widen by one, saturating at `ceiling` (never below the floor).
    pub fn increase(&self, ceiling: u32) {
        let ceiling = ceiling.max(self.floor);
        self.factor
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |f| {
                Some((f + 1).min(ceiling))
            })
            .ok();
    }

    /// Narrow by one, saturating at the floor.
    pub fn decrease(&self) {
        let floor = self.floor;
        self.factor
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |f| {
                Some(f.saturating_sub(1).max(floor))
            })
            .ok();
    }
}
