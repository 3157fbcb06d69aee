use std::fmt;

/// Failure of the heap growth primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthError {
  /// The backing store has no room for `requested` more bytes.
  Exhausted {
    requested: usize,
    available: usize,
  },
  /// The primitive itself refused to move the break.
  Refused { requested: usize },
  /// Something else moved the break, new bytes would not be contiguous.
  Discontiguous,
}

impl fmt::Display for GrowthError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::Exhausted {
        requested,
        available,
      } => write!(
        f,
        "heap exhausted: requested {} bytes, but only {} are available",
        requested, available
      ),
      Self::Refused { requested } => {
        write!(f, "growth primitive refused to grow the heap by {} bytes", requested)
      }
      Self::Discontiguous => write!(f, "program break was moved outside of the allocator"),
    }
  }
}

impl std::error::Error for GrowthError {}

/// The heap could not be set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
  Growth(GrowthError),
}

impl fmt::Display for InitError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::Growth(err) => write!(f, "heap initialisation failed: {}", err),
    }
  }
}

impl std::error::Error for InitError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Self::Growth(err) => Some(err),
    }
  }
}

impl From<GrowthError> for InitError {
  fn from(err: GrowthError) -> Self {
    Self::Growth(err)
  }
}

/// Reallocation failures surfaced under [`ReallocPolicy::Propagate`].
///
/// [`ReallocPolicy::Propagate`]: crate::ReallocPolicy::Propagate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReallocError {
  /// No block of `requested` bytes could be found or grown.
  OutOfMemory { requested: usize },
  /// A zero-byte reallocation was asked for; the old block is untouched.
  ZeroSize,
}

impl fmt::Display for ReallocError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::OutOfMemory { requested } => {
        write!(f, "reallocation failed: no room for {} bytes", requested)
      }
      Self::ZeroSize => write!(f, "reallocation to zero bytes"),
    }
  }
}

impl std::error::Error for ReallocError {}
