//! Segregated size classes.
//!
//! ```text
//!   bucket   0     1      2      3            12           13
//!          ┌─────┬──────┬──────┬──────┬ ─ ─ ┬──────────┬─────────┐
//!   size   │ ≤16 │ ≤32  │ ≤64  │ ≤128 │     │ ≤65536   │ > 65536 │
//!          └─────┴──────┴──────┴──────┴ ─ ─ ┴──────────┴─────────┘
//! ```

use std::ops::RangeInclusive;

/// Number of free lists.
pub const BUCKETS: usize = 14;

/// Upper bound (inclusive) of every bucket but the last.
pub const THRESHOLDS: [usize; BUCKETS - 1] = [
  16, 32, 64, 128, 256, 512, 1024, 2048, 4096, 8192, 16384, 32768, 65536,
];

/// Index of the bucket a block of `size` bytes belongs to.
///
/// Non-decreasing in `size`.
#[inline]
pub const fn bucket_for(size: usize) -> usize {
  if size <= THRESHOLDS[0] {
    return 0;
  }
  if size > THRESHOLDS[BUCKETS - 2] {
    return BUCKETS - 1;
  }
  // Smallest power of two >= size, counted from 2^4.
  (usize::BITS - (size - 1).leading_zeros()) as usize - 4
}

/// Sizes covered by `bucket`.
pub fn range(bucket: usize) -> RangeInclusive<usize> {
  match bucket {
    0 => 0..=THRESHOLDS[0],
    b if b < BUCKETS - 1 => THRESHOLDS[b - 1] + 1..=THRESHOLDS[b],
    _ => THRESHOLDS[BUCKETS - 2] + 1..=usize::MAX,
  }
}
