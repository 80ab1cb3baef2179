use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe queue counters.
///
/// Only updated when [`Config::enable_metrics`](crate::Config) is set. All
/// counters are `Relaxed`: they are statistics, not synchronization.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    full_rejections: AtomicU64,
    empty_polls: AtomicU64,
    cas_retries: AtomicU64,
}

/// Point-in-time copy of a queue's counters, from [`RingQueue::metrics`](crate::RingQueue::metrics).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Values successfully enqueued.
    pub enqueued: u64,
    /// Values successfully dequeued.
    pub dequeued: u64,
    /// Enqueue attempts that found the queue full.
    pub full_rejections: u64,
    /// Dequeue attempts that found the queue empty.
    pub empty_polls: u64,
    /// Lost cursor races or stale positions that forced a retry.
    pub cas_retries: u64,
}

impl Metrics {
    /// All counters at zero.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn add_enqueued(&self, n: u64) {
        self.enqueued.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_dequeued(&self, n: u64) {
        self.dequeued.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_full_rejection(&self) {
        self.full_rejections.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_empty_poll(&self) {
        self.empty_polls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_cas_retries(&self, n: u64) {
        if n > 0 {
            self.cas_retries.fetch_add(n, Ordering::Relaxed);
        }
    }

    /// Loads every counter. The fields are read independently, so a snapshot
    /// taken under load may mix values from different instants.
    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            full_rejections: self.full_rejections.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            cas_retries: self.cas_retries.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Values enqueued but not yet dequeued at snapshot time.
    #[inline]
    pub fn in_flight(&self) -> u64 {
        self.enqueued.saturating_sub(self.dequeued)
    }
}
