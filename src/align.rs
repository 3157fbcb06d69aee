/// Size of a boundary tag word in bytes.
pub const WSIZE: usize = 4;

/// Double word: the alignment unit for every payload and block size.
pub const DSIZE: usize = 8;

/// Rounds `value` up to the double-word boundary.
///
/// # Examples
///
/// ```rust
/// use segalloc::align;
///
/// assert_eq!(align!(1), 8);
/// assert_eq!(align!(8), 8);
/// assert_eq!(align!(13), 16);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::align::DSIZE)
  };
}

/// Rounds `value` up to a multiple of `unit`, which must be a power of two.
///
/// # Examples
///
/// ```rust
/// use segalloc::align_to;
///
/// assert_eq!(align_to!(5, 4), 8);
/// assert_eq!(align_to!(4096, 16), 4096);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $unit:expr) => {
    ($value + $unit - 1) & !($unit - 1)
  };
}

/// Whether `value` sits on a double-word boundary.
#[inline]
pub const fn is_aligned(value: usize) -> bool {
  value & (DSIZE - 1) == 0
}
