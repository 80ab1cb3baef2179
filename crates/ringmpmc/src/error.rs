//! Error types for queue construction and operations.

use thiserror::Error;

/// Construction-time configuration errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Capacity is below 2 or not a power of two.
    #[error("capacity {capacity} is not a power of two of at least 2")]
    InvalidCapacity {
        /// The rejected capacity.
        capacity: usize,
    },
    /// Ring size exponent exceeds the supported maximum.
    #[error("ring_bits {bits} exceeds maximum {max}")]
    RingBitsTooLarge {
        /// The rejected exponent.
        bits: u8,
        /// The largest supported exponent.
        max: u8,
    },
}

/// The queue had no free slot. Carries the rejected value back to the caller.
#[derive(Clone, Copy, PartialEq, Eq, Error)]
#[error("queue is full")]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Returns the value that could not be enqueued.
    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

// Manual impl so `Full<T>` is `Debug` (and therefore `Error`) for any `T`.
impl<T> std::fmt::Debug for Full<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Full(..)")
    }
}

/// The queue had no published value ready to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("queue is empty")]
pub struct Empty;

/// Errors that can occur while driving a benchmark workload.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The workload parameters cannot produce a meaningful run.
    #[error("invalid workload: {0}")]
    InvalidWorkload(&'static str),

    /// The queue configuration was rejected.
    #[error("queue configuration rejected: {0}")]
    Config(#[from] ConfigError),

    /// A worker thread panicked before finishing.
    #[error("{role} {id} panicked")]
    WorkerPanicked {
        /// `"producer"` or `"consumer"`.
        role: &'static str,
        /// Worker index within its role.
        id: usize,
    },
}

impl HarnessError {
    /// Returns `true` if the error came from the caller's parameters rather than the run.
    #[inline]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidWorkload(_) | Self::Config(_))
    }
}
