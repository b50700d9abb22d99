//! Debug assertion macros for ring buffer invariants.
//!
//! Runtime checks for the MPMC protocol, active only in debug builds
//! (`debug_assert!`), so there is zero overhead in release builds.

/// Assert that the item count does not exceed capacity.
///
/// **Invariant**: `0 ≤ (write_pos - read_pos) ≤ capacity`
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "bounded count violated: count {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

/// Assert that a position counter only increases.
///
/// **Invariant**: `new_value ≥ old_value`
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "monotonic progress violated: {} decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

/// Assert that the read position never passes the write position.
///
/// **Invariant**: `read_pos ≤ write_pos`
macro_rules! debug_assert_read_not_past_write {
    ($read:expr, $write:expr) => {
        debug_assert!(
            $read <= $write,
            "read position {} passed write position {}",
            $read,
            $write
        )
    };
}

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_read_not_past_write;
