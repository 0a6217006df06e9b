//! Numeric helpers shared by partitioning and scoring.

/// Rounds to the nearest integer with halves going towards positive infinity.
///
/// Negative-mask adjustment relies on this rule: `-2.5` rounds to `-2`.
pub(crate) fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Integer division rounding up. `den` must be non-zero.
pub(crate) fn div_ceil(num: usize, den: usize) -> usize {
    debug_assert!(den > 0);
    num.div_ceil(den)
}
