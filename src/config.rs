use crate::{
  align,
  block::{MAX_BLOCK_SIZE, MIN_BLOCK_SIZE},
};

/// Bytes the heap grows by when no free block fits.
pub const CHUNK_SIZE: usize = 1 << 12;

/// What [`reallocate`] does when it cannot obtain the new block.
///
/// [`reallocate`]: crate::SegregatedAllocator::reallocate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReallocPolicy {
  /// Log the failure and terminate the process with status 1.
  #[default]
  Abort,
  /// Return the error and leave the old block as it was.
  Propagate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
  chunk_size: usize,
  realloc_policy: ReallocPolicy,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      chunk_size: CHUNK_SIZE,
      realloc_policy: ReallocPolicy::default(),
    }
  }
}

impl Config {
  pub fn new() -> Self {
    Self::default()
  }

  /// Sets the default extension, rounded to the double word and kept
  /// between one minimum block and the largest block a tag can describe.
  pub fn with_chunk_size(
    mut self,
    chunk_size: usize,
  ) -> Self {
    self.chunk_size = align!(chunk_size.min(MAX_BLOCK_SIZE)).max(MIN_BLOCK_SIZE);
    self
  }

  pub fn with_realloc_policy(
    mut self,
    policy: ReallocPolicy,
  ) -> Self {
    self.realloc_policy = policy;
    self
  }

  pub fn chunk_size(&self) -> usize {
    self.chunk_size
  }

  pub fn realloc_policy(&self) -> ReallocPolicy {
    self.realloc_policy
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::default();

    assert_eq!(config.chunk_size(), 4096);
    assert_eq!(config.realloc_policy(), ReallocPolicy::Abort);
  }

  #[test]
  fn test_chunk_size_is_normalised() {
    assert_eq!(Config::new().with_chunk_size(100).chunk_size(), 104);
    assert_eq!(Config::new().with_chunk_size(1).chunk_size(), MIN_BLOCK_SIZE);
    assert_eq!(Config::new().with_chunk_size(0).chunk_size(), MIN_BLOCK_SIZE);
  }

  #[test]
  fn test_huge_chunk_size_is_clamped() {
    assert_eq!(Config::new().with_chunk_size(usize::MAX).chunk_size(), MAX_BLOCK_SIZE);
    assert_eq!(Config::new().with_chunk_size(MAX_BLOCK_SIZE + 1).chunk_size(), MAX_BLOCK_SIZE);
  }
}
