use crate::invariants::{
    debug_assert_advances, debug_assert_bounded_count, debug_assert_power_of_two,
    debug_assert_slot_owned,
};
use crate::metrics::Metrics;
use crate::{Config, ConfigError, Empty, Full, MetricsSnapshot};
use crossbeam_utils::{Backoff, CachePadded};
use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// SLOT STATE MACHINE & MEMORY ORDERING
// =============================================================================
//
// Every slot carries a sequence number. For a logical position `pos` mapping
// to slot `pos & mask`:
//
//   sequence == pos               free, writable by the producer claiming pos
//   sequence == pos + 1           published, readable by the consumer claiming pos
//   sequence == pos + capacity    drained, free for the producer of the next lap
//
// Slots start with `sequence[i] = i`, so lap 0 is writable immediately.
//
// ## Claiming a position
//
// A producer reads `enqueue_cursor` as `pos` and compares the slot sequence:
//   diff == 0  -> CAS the cursor pos -> pos+1; the winner owns the slot
//   diff <  0  -> the slot still holds last lap's value: full
//   diff >  0  -> another producer already took pos: reload the cursor
// Consumers do the same against `dequeue_cursor` with `pos + 1`.
//
// Positions are unbounded u64s and differences are taken with wrapping
// subtraction reinterpreted as i64, so the protocol is correct across u64
// wrap as long as fewer than 2^63 operations are in flight.
//
// ## Memory Ordering Protocol
//
// **Producer:**
// 1. Load `enqueue_cursor` with Relaxed (only a hint for the candidate)
// 2. Load `sequence` with Acquire (synchronizes with the consumer that freed the slot)
// 3. CAS `enqueue_cursor` AcqRel on success, Relaxed on failure
// 4. Write the value (exclusive: the CAS granted the position)
// 5. Store `sequence = pos + 1` with Release (publishes the value)
//
// **Consumer:**
// 1. Load `dequeue_cursor` with Relaxed
// 2. Load `sequence` with Acquire (synchronizes with the producer's Release)
// 3. CAS `dequeue_cursor` AcqRel on success, Relaxed on failure
// 4. Read the value
// 5. Store `sequence = pos + capacity` with Release (hands the slot to the next lap)
//
// =============================================================================

/// One ring slot: the ownership sequence next to its payload.
struct Slot<T> {
    sequence: AtomicU64,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    fn new(sequence: u64) -> Self {
        Self {
            sequence: AtomicU64::new(sequence),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

/// Bounded lock-free MPMC ring queue.
///
/// Any number of producers and consumers may call [`enqueue`](Self::enqueue)
/// and [`dequeue`](Self::dequeue) concurrently through a shared reference
/// (typically an `Arc<RingQueue<T>>`). Neither call ever blocks: a full or
/// empty queue is reported immediately and the caller decides whether to
/// retry.
///
/// Values from different producers are not ordered relative to each other;
/// with a single producer and a single consumer the queue is FIFO.
pub struct RingQueue<T> {
    // === PRODUCER HOT === (own cache line pair)
    enqueue_cursor: CachePadded<AtomicU64>,

    // === CONSUMER HOT === (own cache line pair)
    dequeue_cursor: CachePadded<AtomicU64>,

    // === COLD STATE ===
    metrics: CachePadded<Metrics>,
    config: Config,

    // === SLOTS === (separate allocation)
    slots: Box<[Slot<T>]>,
}

// Safety: a slot's value is only touched by the single thread whose cursor
// CAS won that position, and hand-off is ordered through the slot sequence.
unsafe impl<T: Send> Send for RingQueue<T> {}
unsafe impl<T: Send> Sync for RingQueue<T> {}

impl<T> RingQueue<T> {
    /// Creates a queue with `capacity` slots.
    ///
    /// Fails unless `capacity` is a power of two of at least 2. With a single
    /// slot the published sequence `pos + 1` would equal the next lap's free
    /// sequence `pos + capacity`.
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        Self::with_config(Config::from_capacity(capacity)?)
    }

    /// Creates a queue from a full configuration.
    pub fn with_config(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let capacity = config.capacity();
        debug_assert_power_of_two!(capacity);

        let slots: Box<[Slot<T>]> = (0..capacity as u64).map(Slot::new).collect();

        tracing::debug!(
            capacity,
            metrics = config.enable_metrics,
            "allocated ring queue"
        );

        Ok(Self {
            enqueue_cursor: CachePadded::new(AtomicU64::new(0)),
            dequeue_cursor: CachePadded::new(AtomicU64::new(0)),
            metrics: CachePadded::new(Metrics::new()),
            config,
            slots,
        })
    }

    // ---------------------------------------------------------------------
    // CONSTANTS & STATUS
    // ---------------------------------------------------------------------

    /// Returns the number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.config.capacity()
    }

    #[inline]
    fn slot(&self, pos: u64) -> &Slot<T> {
        &self.slots[(pos as usize) & self.config.mask()]
    }

    /// Returns the number of claimed-but-not-drained positions.
    ///
    /// Only a snapshot: under concurrency the value may be stale by the time
    /// it is returned.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.dequeue_cursor.load(Ordering::Acquire);
        let tail = self.enqueue_cursor.load(Ordering::Acquire);
        // Producers and consumers may both move between the two loads, so the
        // raw difference can overshoot capacity.
        (tail.wrapping_sub(head) as usize).min(self.capacity())
    }

    /// Returns true if no positions are claimed (snapshot).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if every slot is claimed (snapshot).
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Get a snapshot of metrics if enabled.
    pub fn metrics(&self) -> MetricsSnapshot {
        if self.config.enable_metrics {
            self.metrics.snapshot()
        } else {
            MetricsSnapshot::default()
        }
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Attempts to append `value`.
    ///
    /// Returns `Err(Full(value))` when the slot for the next position still
    /// holds an undrained value from the previous lap. Never blocks; lost CAS
    /// races are retried internally with a spin hint.
    pub fn enqueue(&self, value: T) -> Result<(), Full<T>> {
        let backoff = Backoff::new();
        let mut retries = 0u64;
        let mut pos = self.enqueue_cursor.load(Ordering::Relaxed);

        loop {
            let slot = self.slot(pos);
            let seq = slot.sequence.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(pos) as i64;

            if diff == 0 {
                match self.enqueue_cursor.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        debug_assert_slot_owned!(
                            "enqueue",
                            (pos as usize) & self.config.mask(),
                            slot.sequence.load(Ordering::Relaxed),
                            pos
                        );
                        debug_assert_bounded_count!(
                            pos.wrapping_add(1)
                                .wrapping_sub(self.dequeue_cursor.load(Ordering::Relaxed))
                                as usize,
                            self.capacity()
                        );
                        // SAFETY: the CAS granted this thread exclusive write
                        // rights to position `pos`; the slot was drained (or
                        // never written) since `seq == pos`.
                        unsafe {
                            (*slot.value.get()).write(value);
                        }
                        debug_assert_advances!("sequence", seq, pos.wrapping_add(1));
                        slot.sequence.store(pos.wrapping_add(1), Ordering::Release);

                        if self.config.enable_metrics {
                            self.metrics.add_enqueued(1);
                            self.metrics.add_cas_retries(retries);
                        }
                        return Ok(());
                    }
                    // Lost the race (or spurious failure): `current` is the reload.
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                if self.config.enable_metrics {
                    self.metrics.add_full_rejection();
                    self.metrics.add_cas_retries(retries);
                }
                return Err(Full(value));
            } else {
                pos = self.enqueue_cursor.load(Ordering::Relaxed);
            }

            retries += 1;
            backoff.spin();
        }
    }

    /// Enqueue, returning `true` on success. The value is dropped when full.
    #[inline]
    pub fn push(&self, value: T) -> bool {
        self.enqueue(value).is_ok()
    }

    /// Enqueue with adaptive backoff. Spins, yields, then gives up.
    pub fn enqueue_with_backoff(&self, value: T) -> Result<(), Full<T>> {
        let backoff = Backoff::new();
        let mut pending = value;
        loop {
            match self.enqueue(pending) {
                Ok(()) => return Ok(()),
                Err(Full(v)) if backoff.is_completed() => return Err(Full(v)),
                Err(Full(v)) => pending = v,
            }
            backoff.snooze();
        }
    }

    // ---------------------------------------------------------------------
    // CONSUMER API
    // ---------------------------------------------------------------------

    /// Attempts to take the oldest published value.
    ///
    /// Returns `None` when the slot for the next position has not been
    /// published. Any `T`, including zero-valued payloads, comes back as
    /// `Some`.
    pub fn dequeue(&self) -> Option<T> {
        let backoff = Backoff::new();
        let mut retries = 0u64;
        let mut pos = self.dequeue_cursor.load(Ordering::Relaxed);

        loop {
            let slot = self.slot(pos);
            let seq = slot.sequence.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(pos.wrapping_add(1)) as i64;

            if diff == 0 {
                match self.dequeue_cursor.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        debug_assert_slot_owned!(
                            "dequeue",
                            (pos as usize) & self.config.mask(),
                            slot.sequence.load(Ordering::Relaxed),
                            pos.wrapping_add(1)
                        );
                        // SAFETY: the CAS granted this thread exclusive read
                        // rights to position `pos`, and the Acquire load of
                        // `seq == pos + 1` synchronizes with the producer's
                        // Release store after its write.
                        let value = unsafe { (*slot.value.get()).assume_init_read() };
                        let next_lap = pos.wrapping_add(self.capacity() as u64);
                        debug_assert_advances!("sequence", seq, next_lap);
                        slot.sequence.store(next_lap, Ordering::Release);

                        if self.config.enable_metrics {
                            self.metrics.add_dequeued(1);
                            self.metrics.add_cas_retries(retries);
                        }
                        return Some(value);
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                if self.config.enable_metrics {
                    self.metrics.add_empty_poll();
                    self.metrics.add_cas_retries(retries);
                }
                return None;
            } else {
                pos = self.dequeue_cursor.load(Ordering::Relaxed);
            }

            retries += 1;
            backoff.spin();
        }
    }

    /// Like [`dequeue`](Self::dequeue), reporting emptiness as an error value.
    #[inline]
    pub fn try_dequeue(&self) -> Result<T, Empty> {
        self.dequeue().ok_or(Empty)
    }

    /// Dequeue with adaptive backoff. Spins, yields, then gives up.
    pub fn dequeue_with_backoff(&self) -> Option<T> {
        let backoff = Backoff::new();
        loop {
            if let Some(value) = self.dequeue() {
                return Some(value);
            }
            if backoff.is_completed() {
                return None;
            }
            backoff.snooze();
        }
    }
}

impl<T> Drop for RingQueue<T> {
    fn drop(&mut self) {
        // Drop every value that was published but never drained.
        let head = *self.dequeue_cursor.get_mut();
        let tail = *self.enqueue_cursor.get_mut();
        let mask = self.config.mask();

        let mut pos = head;
        while pos != tail {
            let slot = &mut self.slots[(pos as usize) & mask];
            if *slot.sequence.get_mut() == pos.wrapping_add(1) {
                // SAFETY: `&mut self` excludes all other threads, and a
                // sequence of `pos + 1` means the value was written and not read.
                unsafe {
                    slot.value.get_mut().assume_init_drop();
                }
            }
            pos = pos.wrapping_add(1);
        }
    }
}

impl<T> fmt::Debug for RingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("enable_metrics", &self.config.enable_metrics)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_fifo_single_thread() {
        let queue = RingQueue::<u64>::new(8).unwrap();
        for i in 0..8 {
            assert!(queue.enqueue(i * 10).is_ok());
        }
        for i in 0..8 {
            assert_eq!(queue.dequeue(), Some(i * 10));
        }
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn test_initial_sequences() {
        let queue = RingQueue::<u64>::new(4).unwrap();
        for (i, slot) in queue.slots.iter().enumerate() {
            assert_eq!(slot.sequence.load(Ordering::Relaxed), i as u64);
        }
    }

    #[test]
    fn test_sequence_transitions() {
        let queue = RingQueue::<u64>::new(4).unwrap();

        queue.enqueue(7).unwrap();
        // Published: pos + 1
        assert_eq!(queue.slots[0].sequence.load(Ordering::Relaxed), 1);

        assert_eq!(queue.dequeue(), Some(7));
        // Drained: pos + capacity
        assert_eq!(queue.slots[0].sequence.load(Ordering::Relaxed), 4);

        assert_eq!(queue.enqueue_cursor.load(Ordering::Relaxed), 1);
        assert_eq!(queue.dequeue_cursor.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_full_returns_value() {
        let queue = RingQueue::<String>::new(2).unwrap();
        queue.enqueue("a".into()).unwrap();
        queue.enqueue("b".into()).unwrap();

        let err = queue.enqueue("c".into()).unwrap_err();
        assert_eq!(err.into_inner(), "c");
        assert!(queue.is_full());
    }

    #[test]
    fn test_try_dequeue_empty() {
        let queue = RingQueue::<u32>::new(2).unwrap();
        assert_eq!(queue.try_dequeue(), Err(Empty));
        queue.enqueue(0).unwrap();
        assert_eq!(queue.try_dequeue(), Ok(0));
    }

    #[test]
    fn test_len_tracks_cursors() {
        let queue = RingQueue::<u8>::new(4).unwrap();
        assert!(queue.is_empty());
        queue.enqueue(1).unwrap();
        queue.enqueue(2).unwrap();
        assert_eq!(queue.len(), 2);
        queue.dequeue();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_rejects_bad_capacity() {
        assert!(RingQueue::<u64>::new(0).is_err());
        assert!(RingQueue::<u64>::new(1).is_err());
        assert!(RingQueue::<u64>::new(3).is_err());
        assert!(RingQueue::<u64>::with_config(Config::new(40, false)).is_err());
    }

    #[test]
    fn test_capacity_two_alternating() {
        let queue = RingQueue::<u64>::new(2).unwrap();
        for i in 0..10 {
            queue.enqueue(i).unwrap();
            queue.enqueue(i + 100).unwrap();
            assert!(queue.enqueue(99).is_err());
            assert_eq!(queue.dequeue(), Some(i));
            assert_eq!(queue.dequeue(), Some(i + 100));
            assert_eq!(queue.dequeue(), None);
        }
    }

    #[test]
    fn test_metrics_counts() {
        let queue = RingQueue::<u64>::with_config(Config::new(1, true)).unwrap();
        queue.enqueue(1).unwrap();
        queue.enqueue(2).unwrap();
        assert!(queue.enqueue(3).is_err());
        queue.dequeue();
        queue.dequeue();
        assert!(queue.dequeue().is_none());

        let m = queue.metrics();
        assert_eq!(m.enqueued, 2);
        assert_eq!(m.dequeued, 2);
        assert_eq!(m.full_rejections, 1);
        assert_eq!(m.empty_polls, 1);
        assert_eq!(m.cas_retries, 0);
        assert_eq!(m.in_flight(), 0);
    }

    #[test]
    fn test_metrics_disabled_are_zero() {
        let queue = RingQueue::<u64>::new(4).unwrap();
        queue.enqueue(1).unwrap();
        assert_eq!(queue.metrics(), MetricsSnapshot::default());
    }

    #[test]
    fn test_with_backoff_gives_up() {
        let queue = RingQueue::<u64>::new(2).unwrap();
        assert_eq!(queue.dequeue_with_backoff(), None);
        queue.enqueue_with_backoff(4).unwrap();
        queue.enqueue_with_backoff(5).unwrap();
        assert_eq!(queue.enqueue_with_backoff(6).unwrap_err().into_inner(), 6);
        assert_eq!(queue.dequeue_with_backoff(), Some(4));
    }

    #[test]
    fn test_backoff_bounds_retry_rounds() {
        // The *_with_backoff helpers give up once snoozing completes.
        let backoff = crate::Backoff::new();
        let mut rounds = 0;
        while !backoff.is_completed() {
            backoff.snooze();
            rounds += 1;
        }
        assert!(rounds > 1 && rounds < 64, "unexpected round count {}", rounds);

        backoff.reset();
        assert!(!backoff.is_completed());
    }

    #[test]
    fn test_drop_releases_undrained_values() {
        static DROP_COUNT: AtomicUsize = AtomicUsize::new(0);

        struct DropTracker;

        impl Drop for DropTracker {
            fn drop(&mut self) {
                DROP_COUNT.fetch_add(1, Ordering::SeqCst);
            }
        }

        DROP_COUNT.store(0, Ordering::SeqCst);

        {
            let queue = RingQueue::<DropTracker>::new(8).unwrap();
            for _ in 0..6 {
                assert!(queue.push(DropTracker));
            }
            // Dequeued values are dropped by the caller
            drop(queue.dequeue());
            drop(queue.dequeue());
            assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 2);
        }

        // The 4 left in the ring are dropped with it
        assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_cursors_on_separate_cache_lines() {
        let queue = RingQueue::<u64>::new(2).unwrap();
        let enq = std::ptr::addr_of!(queue.enqueue_cursor) as usize;
        let deq = std::ptr::addr_of!(queue.dequeue_cursor) as usize;
        assert!(enq.abs_diff(deq) >= 64);
        assert!(std::mem::align_of::<CachePadded<AtomicU64>>() >= 64);
    }

    #[test]
    fn test_debug_output() {
        let queue = RingQueue::<u64>::new(4).unwrap();
        let s = format!("{:?}", queue);
        assert!(s.contains("capacity: 4"));
    }
}
