//! Multi-producer/multi-consumer checksum workload.
//!
//! Producer `i` enqueues the values `i*K + 1 ..= i*K + K`, so every producer
//! owns a disjoint range and the total is known in closed form. Consumers drain
//! until the shared consumed count reaches `P*K` and sum what they read. A run
//! is valid when the consumed sum equals [`expected_checksum`].
//!
//! A panicking worker raises a shared stop flag so the others stop waiting on
//! a queue that will never fill or drain; `run` joins every thread before it
//! returns.

use crate::{Config, HarnessError, MetricsSnapshot, RingQueue};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Parameters of one benchmark run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Workload {
    /// Number of producer threads.
    pub producers: usize,
    /// Number of consumer threads.
    pub consumers: usize,
    /// Values enqueued by each producer.
    pub ops_per_producer: u64,
    /// Queue configuration.
    pub config: Config,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            producers: 4,
            consumers: 4,
            ops_per_producer: 1_000_000,
            config: Config::default(),
        }
    }
}

impl Workload {
    /// Total number of values that will pass through the queue.
    ///
    /// Saturates at `u64::MAX`; [`run`] rejects such workloads up front.
    #[inline]
    pub fn total_ops(&self) -> u64 {
        (self.producers as u64).saturating_mul(self.ops_per_producer)
    }

    fn validate(&self) -> Result<(), HarnessError> {
        if self.producers == 0 {
            return Err(HarnessError::InvalidWorkload("at least one producer is required"));
        }
        if self.consumers == 0 {
            return Err(HarnessError::InvalidWorkload("at least one consumer is required"));
        }
        if (self.producers as u64).checked_mul(self.ops_per_producer).is_none() {
            return Err(HarnessError::InvalidWorkload(
                "producers * ops_per_producer overflows u64",
            ));
        }
        self.config.validate()?;
        Ok(())
    }
}

/// Result of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Wall time from the first spawn to the last join.
    pub elapsed: Duration,
    /// Values consumed across all consumers.
    pub consumed: u64,
    /// Sum of all consumed values.
    pub checksum: u64,
    /// Closed-form sum of all produced values.
    pub expected: u64,
    /// Values enqueued per producer.
    pub producer_ops: Vec<u64>,
    /// Values dequeued per consumer.
    pub consumer_ops: Vec<u64>,
    /// Queue counters (zero unless the config enables metrics).
    pub metrics: MetricsSnapshot,
}

impl Report {
    /// Consumed values per second of wall time.
    pub fn ops_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.consumed as f64 / secs
    }

    /// Whether the consumed values sum to the produced total.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.checksum == self.expected
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "elapsed_ms={:.3} ops_per_sec={:.0} checksum={} expected={}",
            self.elapsed.as_secs_f64() * 1000.0,
            self.ops_per_sec(),
            self.checksum,
            self.expected
        )
    }
}

/// Sum of every value produced by [`run`]: `Σ_i (K*base_i + K(K+1)/2)`, `base_i = i*K`.
pub fn expected_checksum(producers: usize, ops_per_producer: u64) -> u64 {
    let k = ops_per_producer;
    (0..producers as u64)
        .map(|i| {
            let base = i.wrapping_mul(k);
            k.wrapping_mul(base)
                .wrapping_add(k.wrapping_mul(k.wrapping_add(1)) / 2)
        })
        .fold(0u64, u64::wrapping_add)
}

/// Runs `workload` on a fresh queue and reports throughput and checksum.
pub fn run(workload: &Workload) -> Result<Report, HarnessError> {
    workload.validate()?;
    let queue = Arc::new(RingQueue::<u64>::with_config(workload.config)?);
    let total = workload.total_ops();
    let consumed = Arc::new(AtomicU64::new(0));
    let stop = Arc::new(AtomicBool::new(false));

    tracing::info!(
        producers = workload.producers,
        consumers = workload.consumers,
        ops_per_producer = workload.ops_per_producer,
        capacity = queue.capacity(),
        "starting run"
    );

    let start = Instant::now();

    let producer_handles: Vec<_> = (0..workload.producers)
        .map(|id| {
            let queue = Arc::clone(&queue);
            let ops = workload.ops_per_producer;
            spawn_worker(&stop, move |stop| produce(&queue, id, ops, stop))
        })
        .collect();

    let consumer_handles: Vec<_> = (0..workload.consumers)
        .map(|id| {
            let queue = Arc::clone(&queue);
            let consumed = Arc::clone(&consumed);
            spawn_worker(&stop, move |stop| consume(&queue, id, &consumed, total, stop))
        })
        .collect();

    // Join both sides before propagating, so no worker outlives the run.
    let producers = join_workers(producer_handles, "producer");
    let consumers = join_workers(consumer_handles, "consumer");
    let producer_ops = producers?;
    let (sums, consumer_ops): (Vec<u64>, Vec<u64>) = consumers?.into_iter().unzip();
    let checksum = sums.into_iter().fold(0u64, u64::wrapping_add);

    let elapsed = start.elapsed();
    let report = Report {
        elapsed,
        consumed: consumer_ops.iter().sum(),
        checksum,
        expected: expected_checksum(workload.producers, workload.ops_per_producer),
        producer_ops,
        consumer_ops,
        metrics: queue.metrics(),
    };

    if report.is_valid() {
        tracing::info!(
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            ops_per_sec = report.ops_per_sec(),
            "run complete"
        );
    } else {
        tracing::warn!(
            checksum = report.checksum,
            expected = report.expected,
            "checksum mismatch"
        );
    }

    Ok(report)
}

/// Raises the stop flag when the owning worker unwinds.
struct StopOnPanic<'a>(&'a AtomicBool);

impl Drop for StopOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.store(true, Ordering::Release);
        }
    }
}

fn spawn_worker<R, F>(stop: &Arc<AtomicBool>, work: F) -> JoinHandle<R>
where
    F: FnOnce(&AtomicBool) -> R + Send + 'static,
    R: Send + 'static,
{
    let stop = Arc::clone(stop);
    thread::spawn(move || {
        let _guard = StopOnPanic(&*stop);
        work(&*stop)
    })
}

/// Joins every handle, even past a panicked one, and reports the first panic.
fn join_workers<R>(
    handles: Vec<JoinHandle<R>>,
    role: &'static str,
) -> Result<Vec<R>, HarnessError> {
    let mut results = Vec::with_capacity(handles.len());
    let mut first_panic = None;
    for (id, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(result) => results.push(result),
            Err(_) => {
                tracing::warn!(role, worker = id, "worker panicked");
                if first_panic.is_none() {
                    first_panic = Some(HarnessError::WorkerPanicked { role, id });
                }
            }
        }
    }
    match first_panic {
        Some(err) => Err(err),
        None => Ok(results),
    }
}

fn produce(queue: &RingQueue<u64>, id: usize, ops: u64, stop: &AtomicBool) -> u64 {
    let base = id as u64 * ops;
    for j in 0..ops {
        let mut value = base + j + 1;
        // Retry until a consumer frees a slot; each attempt is itself bounded.
        while let Err(full) = queue.enqueue_with_backoff(value) {
            if stop.load(Ordering::Acquire) {
                tracing::debug!(producer = id, ops = j, "producer stopped");
                return j;
            }
            value = full.into_inner();
            thread::yield_now();
        }
    }
    tracing::debug!(producer = id, ops, "producer finished");
    ops
}

fn consume(
    queue: &RingQueue<u64>,
    id: usize,
    consumed: &AtomicU64,
    total: u64,
    stop: &AtomicBool,
) -> (u64, u64) {
    let mut sum = 0u64;
    let mut ops = 0u64;
    while consumed.load(Ordering::Acquire) < total && !stop.load(Ordering::Acquire) {
        if let Some(value) = queue.dequeue() {
            sum = sum.wrapping_add(value);
            ops += 1;
            consumed.fetch_add(1, Ordering::AcqRel);
        } else {
            thread::yield_now();
        }
    }
    tracing::debug!(consumer = id, ops, "consumer finished");
    (sum, ops)
}
