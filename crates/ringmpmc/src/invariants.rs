//! Debug assertion macros for ring queue invariants.
//!
//! Only active in debug builds (`debug_assert!`), so release builds pay
//! nothing for them. Used by `RingQueue<T>`.

// =============================================================================
// Bounded occupancy
// =============================================================================

/// Assert that an occupancy count does not exceed capacity.
///
/// **Invariant**: a producer that has just claimed `pos` observes
/// `pos + 1 - dequeue_cursor ≤ capacity`, since the slot was drained for
/// position `pos - capacity` first.
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "bounded occupancy violated: count {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

// =============================================================================
// Slot ownership
// =============================================================================

/// Assert that a slot still carries the sequence value that granted the claim.
///
/// **Invariant**: after winning the cursor CAS for `pos`, nobody else may touch
/// the slot, so its sequence is still `pos` (enqueue) or `pos + 1` (dequeue).
macro_rules! debug_assert_slot_owned {
    ($op:literal, $index:expr, $seq:expr, $expected:expr) => {
        debug_assert!(
            $seq == $expected,
            "slot ownership violated: {} at slot {} saw sequence {} (expected {})",
            $op,
            $index,
            $seq,
            $expected
        )
    };
}

// =============================================================================
// Monotonic progress
// =============================================================================

/// Assert that a sequence or cursor value only increases.
///
/// **Invariant**: `new > old` (using wrapping distance, so a u64 wrap after
/// centuries of operation is not flagged).
macro_rules! debug_assert_advances {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            ($new.wrapping_sub($old) as i64) > 0,
            "monotonic progress violated: {} moved from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

// =============================================================================
// Capacity shape
// =============================================================================

/// Assert that the slot count is a non-zero power of two, so `pos & mask` is `pos % capacity`.
macro_rules! debug_assert_power_of_two {
    ($capacity:expr) => {
        debug_assert!(
            $capacity.is_power_of_two(),
            "capacity {} is not a power of two",
            $capacity
        )
    };
}

pub(crate) use debug_assert_advances;
pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_power_of_two;
pub(crate) use debug_assert_slot_owned;
