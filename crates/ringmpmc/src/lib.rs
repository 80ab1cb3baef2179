//! RingMPMC - Bounded Lock-Free Multi-Producer Multi-Consumer Queue
//!
//! A fixed-capacity ring of slots, each carrying its payload and a sequence
//! number that encodes who may touch it next. Producers and consumers race for
//! positions with a single compare-and-swap on their own cursor; no locks,
//! no blocking.
//!
//! # Key Features
//!
//! - Per-slot sequence numbers (Vyukov-style bounded queue)
//! - Cache-padded enqueue/dequeue cursors (no false sharing between sides)
//! - Explicit `Full`/empty results, never a sentinel payload
//! - Adaptive backoff helpers (spin → yield → give up)
//! - Optional atomic metrics
//!
//! # Example
//!
//! ```
//! use ringmpmc_rs::RingQueue;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let queue = Arc::new(RingQueue::<u64>::new(1024).unwrap());
//!
//! let producer = {
//!     let queue = Arc::clone(&queue);
//!     thread::spawn(move || {
//!         for i in 0..100 {
//!             let mut value = i;
//!             while let Err(full) = queue.enqueue(value) {
//!                 value = full.into_inner();
//!                 thread::yield_now();
//!             }
//!         }
//!     })
//! };
//! producer.join().unwrap();
//!
//! // Zero is an ordinary payload
//! let mut sum = 0;
//! while let Some(value) = queue.dequeue() {
//!     sum += value;
//! }
//! assert_eq!(sum, (0..100u64).sum::<u64>());
//! assert!(queue.dequeue().is_none());
//! ```

mod config;
mod error;
pub mod harness;
mod invariants;
mod metrics;
mod queue;

pub use crossbeam_utils::Backoff;
pub use config::{
    Config, HIGH_THROUGHPUT_CONFIG, LOW_LATENCY_CONFIG, MAX_RING_BITS, MIN_RING_BITS,
};
pub use error::{ConfigError, Empty, Full, HarnessError};
pub use metrics::MetricsSnapshot;
pub use queue::RingQueue;
