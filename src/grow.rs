use std::{
  alloc::{self, Layout},
  ptr::NonNull,
  slice,
};

use crate::error::GrowthError;

/// Alignment of the heap base. Payload offsets are multiples of the double
/// word, so any base aligned at least this much keeps payload addresses
/// aligned as well.
pub const HEAP_ALIGN: usize = 16;

/// Supplies backing bytes to the allocator, one contiguous region that only
/// ever grows at its end.
pub trait HeapGrower {
  /// Appends `bytes` to the region and returns the offset where the new bytes
  /// start (the old break). On failure the region is left unchanged.
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<usize, GrowthError>;

  /// Every byte granted so far.
  fn memory(&self) -> &[u8];

  fn memory_mut(&mut self) -> &mut [u8];

  /// Number of bytes granted so far.
  fn brk(&self) -> usize {
    self.memory().len()
  }
}

/// A simulated program break over a fixed-capacity buffer.
///
/// The whole capacity is reserved up front, so the base address never
/// moves and pointers into the heap stay valid across growth.
///
/// ```text
///   start                     brk                      start + capacity
///   ┌─────────────────────────┬────────────────────────┐
///   │   granted to the heap   │       reserved         │
///   └─────────────────────────┴────────────────────────┘
/// ```
pub struct MemLib {
  start: NonNull<u8>,
  layout: Layout,
  capacity: usize,
  brk: usize,
}

impl MemLib {
  /// 20 MiB, enough for the usual allocation traces.
  pub const DEFAULT_CAPACITY: usize = 20 * (1 << 20);

  pub fn new(capacity: usize) -> Result<Self, GrowthError> {
    let layout = Layout::from_size_align(capacity.max(HEAP_ALIGN), HEAP_ALIGN).map_err(|_| {
      GrowthError::Exhausted {
        requested: capacity,
        available: 0,
      }
    })?;

    let ptr = unsafe { alloc::alloc_zeroed(layout) };
    let Some(start) = NonNull::new(ptr) else {
      alloc::handle_alloc_error(layout);
    };

    Ok(Self {
      start,
      layout,
      capacity,
      brk: 0,
    })
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Base address of the region.
  pub fn start(&self) -> *const u8 {
    self.start.as_ptr()
  }
}

impl HeapGrower for MemLib {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<usize, GrowthError> {
    let available = self.capacity - self.brk;
    if bytes > available {
      return Err(GrowthError::Exhausted {
        requested: bytes,
        available,
      });
    }

    let old = self.brk;
    self.brk += bytes;
    Ok(old)
  }

  fn memory(&self) -> &[u8] {
    unsafe { slice::from_raw_parts(self.start.as_ptr(), self.brk) }
  }

  fn memory_mut(&mut self) -> &mut [u8] {
    unsafe { slice::from_raw_parts_mut(self.start.as_ptr(), self.brk) }
  }
}

impl Drop for MemLib {
  fn drop(&mut self) {
    unsafe { alloc::dealloc(self.start.as_ptr(), self.layout) };
  }
}

#[cfg(unix)]
pub use sbrk::Sbrk;

#[cfg(unix)]
mod sbrk {
  use std::{ptr, slice};

  use libc::{c_void, intptr_t, sbrk};

  use super::{HEAP_ALIGN, HeapGrower};
  use crate::error::GrowthError;

  const SBRK_FAILED: *mut c_void = usize::MAX as *mut c_void;

  /// Grows the heap by moving the process program break with `sbrk(2)`.
  ///
  /// The region must stay contiguous, so a growth that finds the break
  /// moved by someone else (another `Sbrk`, or the system allocator) is
  /// undone and reported as [`GrowthError::Discontiguous`].
  pub struct Sbrk {
    base: *mut u8,
    len: usize,
  }

  impl Sbrk {
    pub fn new() -> Self {
      Self {
        base: ptr::null_mut(),
        len: 0,
      }
    }

    /// Current program break, as reported by `sbrk(0)`.
    pub fn program_break() -> *const u8 {
      unsafe { sbrk(0) as *const u8 }
    }

    unsafe fn first_grow(
      &mut self,
      bytes: usize,
    ) -> Result<usize, GrowthError> {
      unsafe {
        let current = sbrk(0);
        if current == SBRK_FAILED {
          return Err(GrowthError::Refused { requested: bytes });
        }

        let pad = (current as *mut u8).align_offset(HEAP_ALIGN);
        let total = pad
          .checked_add(bytes)
          .and_then(|total| intptr_t::try_from(total).ok())
          .ok_or(GrowthError::Refused { requested: bytes })?;

        let start = sbrk(total);
        if start == SBRK_FAILED {
          return Err(GrowthError::Refused { requested: bytes });
        }
        if start != current {
          sbrk(-total);
          return Err(GrowthError::Discontiguous);
        }

        self.base = (start as *mut u8).add(pad);
        self.len = bytes;
        Ok(0)
      }
    }
  }

  impl Default for Sbrk {
    fn default() -> Self {
      Self::new()
    }
  }

  impl HeapGrower for Sbrk {
    fn grow(
      &mut self,
      bytes: usize,
    ) -> Result<usize, GrowthError> {
      if self.base.is_null() {
        return unsafe { self.first_grow(bytes) };
      }

      let increment =
        intptr_t::try_from(bytes).map_err(|_| GrowthError::Refused { requested: bytes })?;

      unsafe {
        let expected = self.base.add(self.len);
        let start = sbrk(increment);
        if start == SBRK_FAILED {
          return Err(GrowthError::Refused { requested: bytes });
        }
        if start as *mut u8 != expected {
          sbrk(-increment);
          return Err(GrowthError::Discontiguous);
        }
      }

      let old = self.len;
      self.len += bytes;
      Ok(old)
    }

    fn memory(&self) -> &[u8] {
      if self.base.is_null() {
        return &[];
      }
      unsafe { slice::from_raw_parts(self.base, self.len) }
    }

    fn memory_mut(&mut self) -> &mut [u8] {
      if self.base.is_null() {
        return &mut [];
      }
      unsafe { slice::from_raw_parts_mut(self.base, self.len) }
    }
  }
}
