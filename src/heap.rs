use std::process;

use tracing::{debug, error, trace, warn};

use crate::{
  align,
  align::{DSIZE, WSIZE},
  block::{Address, Block, BlockKind, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, OVERHEAD, Tag, write_tag},
  class::{BUCKETS, bucket_for},
  config::{Config, ReallocPolicy},
  error::{GrowthError, InitError, ReallocError},
  free_list::FreeLists,
  grow::HeapGrower,
};

/// Bytes taken by the alignment pad, the prologue and the epilogue header.
pub const SENTINEL_OVERHEAD: usize = 4 * WSIZE;

/// Block size needed to serve a `size`-byte request: payload plus both tags,
/// rounded to the double word, never below [`MIN_BLOCK_SIZE`].
///
/// `None` when the request cannot be described by a boundary tag.
pub fn adjusted_size(size: usize) -> Option<usize> {
  let asize = (size.checked_add(OVERHEAD + DSIZE - 1)? & !(DSIZE - 1)).max(MIN_BLOCK_SIZE);
  (asize <= MAX_BLOCK_SIZE).then_some(asize)
}

/// Segregated-fit allocator over a single growable heap.
///
/// ```text
///   base
///   ┌─────┬──────────┬───────────────────────────────────────┬──────────┐
///   │ pad │ prologue │  allocated and free blocks ...        │ epilogue │
///   │  4  │  hdr+ftr │                                       │ hdr(0:a) │
///   └─────┴──────────┴───────────────────────────────────────┴──────────┘
///
///   free lists:  [0] ──▶ ∅
///                [1] ──▶ blk ◀──▶ blk ◀──▶ blk
///                ...
///                [13] ─▶ blk
/// ```
///
/// Free blocks are searched first-fit, starting at the bucket of the adjusted
/// request and moving up. Freed blocks are merged with free neighbours
/// immediately, so no two free blocks are ever adjacent.
pub struct SegregatedAllocator<G: HeapGrower> {
  pub(crate) grower: G,
  pub(crate) lists: FreeLists,
  pub(crate) config: Config,
  /// Offset of the pad word that starts this heap inside the grower's region.
  pub(crate) base: usize,
}

impl<G: HeapGrower> SegregatedAllocator<G> {
  pub fn init(grower: G) -> Result<Self, InitError> {
    Self::init_with(grower, Config::default())
  }

  /// Lays out the sentinels and grows the heap by one chunk.
  pub fn init_with(
    mut grower: G,
    config: Config,
  ) -> Result<Self, InitError> {
    let brk = grower.brk();
    let pad = align!(brk) - brk;
    let base = grower.grow(pad + SENTINEL_OVERHEAD)? + pad;

    let heap = grower.memory_mut();
    write_tag(heap, base, Tag::new(0, false));
    Block::at(base + DSIZE).write(heap, Tag::new(DSIZE, true));
    write_tag(heap, base + 3 * WSIZE, Tag::new(0, true));

    let mut allocator = Self {
      grower,
      lists: FreeLists::new(),
      config,
      base,
    };

    let block = allocator.extend_heap(config.chunk_size() / WSIZE)?;
    allocator.insert(block);

    debug!(
      base,
      chunk_size = config.chunk_size(),
      "initialised segregated heap"
    );
    Ok(allocator)
  }

  /// Allocates a block with at least `size` bytes of payload.
  ///
  /// Returns `None` for zero-sized requests and when the heap cannot grow.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Option<Address> {
    if size == 0 {
      return None;
    }

    let Some(asize) = adjusted_size(size) else {
      warn!(size, "request too large for a boundary tag");
      return None;
    };

    let block = match self.find_fit(asize) {
      Some(block) => block,
      None => {
        let extend = asize.max(self.config.chunk_size());
        match self.extend_heap(extend / WSIZE) {
          Ok(block) => self.insert(block),
          Err(err) => {
            warn!(size, %err, "heap extension failed");
            return None;
          }
        }
        self.find_fit(asize)?
      }
    };

    let heap = self.grower.memory_mut();
    let free_size = block.size(heap);
    self.lists.remove(heap, block, free_size);
    self.place(block, asize);

    trace!(size, asize, offset = block.offset(), "allocate");
    Address::new(block)
  }

  /// Frees the block at `address` and merges it with free neighbours.
  ///
  /// `address` must come from [`allocate`](Self::allocate) on this heap and
  /// must not have been freed since.
  pub fn deallocate(
    &mut self,
    address: Address,
  ) {
    let block = address.block();
    let heap = self.grower.memory_mut();
    let tag = block.tag(heap);
    debug_assert!(tag.allocated, "double free of block at {:#x}", block.offset());

    block.write(heap, Tag::new(tag.size, false));
    let merged = self.coalesce(block);
    self.insert(merged);

    trace!(
      offset = block.offset(),
      size = tag.size,
      merged = merged.offset(),
      "deallocate"
    );
  }

  /// Moves the payload at `address` into a fresh block of `new_size` bytes.
  ///
  /// The first `min(new_size, usable_size)` bytes are preserved and the old
  /// block is freed. When the new block cannot be obtained the configured
  /// [`ReallocPolicy`] applies: `Abort` terminates the process, `Propagate`
  /// returns the error and leaves the old block untouched.
  ///
  /// A `new_size` of zero is rejected with [`ReallocError::ZeroSize`] under
  /// either policy, and the old block stays allocated.
  pub fn reallocate(
    &mut self,
    address: Address,
    new_size: usize,
  ) -> Result<Address, ReallocError> {
    if new_size == 0 {
      return Err(ReallocError::ZeroSize);
    }

    let Some(new) = self.allocate(new_size) else {
      let err = ReallocError::OutOfMemory {
        requested: new_size,
      };
      match self.config.realloc_policy() {
        ReallocPolicy::Abort => {
          error!(%err, "allocate failed in reallocate");
          process::exit(1);
        }
        ReallocPolicy::Propagate => {
          warn!(%err, offset = address.offset(), "allocate failed in reallocate");
          return Err(err);
        }
      }
    };

    let copy = new_size.min(self.usable_size(address));
    let from = address.offset();
    self
      .grower
      .memory_mut()
      .copy_within(from..from + copy, new.offset());
    self.deallocate(address);

    trace!(from, to = new.offset(), copy, "reallocate");
    Ok(new)
  }

  /// Bytes the caller may use at `address`.
  pub fn usable_size(
    &self,
    address: Address,
  ) -> usize {
    address.block().size(self.memory()) - OVERHEAD
  }

  pub fn payload(
    &self,
    address: Address,
  ) -> &[u8] {
    let start = address.offset();
    &self.memory()[start..start + self.usable_size(address)]
  }

  pub fn payload_mut(
    &mut self,
    address: Address,
  ) -> &mut [u8] {
    let start = address.offset();
    let end = start + self.usable_size(address);
    &mut self.grower.memory_mut()[start..end]
  }

  /// Raw pointer to the payload at `address`.
  ///
  /// Only stable while the grower keeps its base address, which holds for
  /// both [`MemLib`](crate::MemLib) and `Sbrk`.
  pub fn as_ptr(
    &mut self,
    address: Address,
  ) -> *mut u8 {
    self.payload_mut(address).as_mut_ptr()
  }

  /// Bytes granted to this heap by the grower, sentinels included.
  pub fn heap_size(&self) -> usize {
    self.grower.brk() - self.base
  }

  pub fn memory(&self) -> &[u8] {
    self.grower.memory()
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn grower(&self) -> &G {
    &self.grower
  }

  pub fn free_lists(&self) -> &FreeLists {
    &self.lists
  }

  pub fn prologue(&self) -> Block {
    Block::at(self.base + DSIZE)
  }

  /// Every block between the sentinels, in address order.
  pub fn blocks(&self) -> Blocks<'_> {
    let heap = self.memory();
    Blocks {
      heap,
      current: self.prologue().next(heap),
    }
  }

  /// Grows the heap by `words` tag words (rounded to an even count, at least
  /// one minimum block) and returns the new free block after merging it with
  /// a free block that ended the heap. The block is not inserted into any
  /// free list.
  fn extend_heap(
    &mut self,
    words: usize,
  ) -> Result<Block, GrowthError> {
    let size = if words % 2 == 1 {
      (words + 1) * WSIZE
    } else {
      words * WSIZE
    };
    let size = size.max(MIN_BLOCK_SIZE);

    // Keeps every block, merged or not, describable by a 32-bit tag.
    let available = MAX_BLOCK_SIZE.saturating_sub(self.heap_size());
    if size > available {
      return Err(GrowthError::Exhausted {
        requested: size,
        available,
      });
    }

    // The new bytes start right after the old epilogue header.
    let block = Block::at(self.grower.grow(size)?);
    let heap = self.grower.memory_mut();
    block.write(heap, Tag::new(size, false));
    write_tag(heap, block.next(heap).header(), Tag::new(0, true));

    debug!(size, heap_size = self.heap_size(), "extend heap");
    Ok(self.coalesce(block))
  }

  /// First block, in ascending bucket then list order, of at least `asize`.
  fn find_fit(
    &self,
    asize: usize,
  ) -> Option<Block> {
    let heap = self.memory();
    (bucket_for(asize)..BUCKETS).find_map(|bucket| {
      self
        .lists
        .iter(heap, bucket)
        .find(|block| block.size(heap) >= asize)
    })
  }

  /// Marks the unlinked free `block` allocated, splitting off the tail as a
  /// new free block when it can stand on its own.
  fn place(
    &mut self,
    block: Block,
    asize: usize,
  ) {
    let heap = self.grower.memory_mut();
    let free_size = block.size(heap);
    let remainder = free_size - asize;

    if remainder >= MIN_BLOCK_SIZE {
      block.write(heap, Tag::new(asize, true));
      let rest = block.next(heap);
      rest.write(heap, Tag::new(remainder, false));
      self.lists.insert(heap, rest, remainder);
      debug!(offset = block.offset(), asize, remainder, "split");
    } else {
      block.write(heap, Tag::new(free_size, true));
    }
  }

  /// Merges the free `block` with its free physical neighbours, unlinking
  /// them from their lists. Returns the merged block, itself unlinked.
  fn coalesce(
    &mut self,
    block: Block,
  ) -> Block {
    let heap = self.grower.memory_mut();
    let prev_alloc = block.prev_tag(heap).allocated;
    let next = block.next(heap);
    let next_alloc = next.is_allocated(heap);
    let mut size = block.size(heap);

    match (prev_alloc, next_alloc) {
      (true, true) => block,
      (true, false) => {
        let next_size = next.size(heap);
        self.lists.remove(heap, next, next_size);
        size += next_size;
        block.write(heap, Tag::new(size, false));
        block
      }
      (false, true) => {
        let prev = block.prev(heap);
        let prev_size = prev.size(heap);
        self.lists.remove(heap, prev, prev_size);
        size += prev_size;
        prev.write(heap, Tag::new(size, false));
        prev
      }
      (false, false) => {
        let prev = block.prev(heap);
        let prev_size = prev.size(heap);
        let next_size = next.size(heap);
        self.lists.remove(heap, prev, prev_size);
        self.lists.remove(heap, next, next_size);
        size += prev_size + next_size;
        prev.write(heap, Tag::new(size, false));
        prev
      }
    }
  }

  fn insert(
    &mut self,
    block: Block,
  ) {
    let heap = self.grower.memory_mut();
    let size = block.size(heap);
    self.lists.insert(heap, block, size);
  }
}

/// Iterator over the blocks of a heap, see [`SegregatedAllocator::blocks`].
pub struct Blocks<'h> {
  heap: &'h [u8],
  current: Block,
}

impl Iterator for Blocks<'_> {
  type Item = (Block, BlockKind);

  fn next(&mut self) -> Option<Self::Item> {
    let block = self.current;
    if block.size(self.heap) == 0 {
      return None;
    }
    self.current = block.next(self.heap);
    Some((block, block.describe(self.heap)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{MemLib, config::CHUNK_SIZE};

  fn allocator() -> SegregatedAllocator<MemLib> {
    let config = Config::new().with_realloc_policy(ReallocPolicy::Propagate);
    SegregatedAllocator::init_with(MemLib::new(1 << 20).unwrap(), config).unwrap()
  }

  fn free_blocks(heap: &SegregatedAllocator<MemLib>) -> Vec<(usize, usize)> {
    heap
      .blocks()
      .filter(|(_, kind)| kind.is_free())
      .map(|(block, kind)| (block.offset(), kind.size()))
      .collect()
  }

  #[test]
  fn test_adjusted_size() {
    assert_eq!(adjusted_size(1), Some(24));
    assert_eq!(adjusted_size(16), Some(24));
    assert_eq!(adjusted_size(17), Some(32));
    assert_eq!(adjusted_size(24), Some(32));
    assert_eq!(adjusted_size(4096), Some(4104));
    assert_eq!(adjusted_size(usize::MAX), None);
    assert_eq!(adjusted_size(MAX_BLOCK_SIZE), None);
  }

  #[test]
  fn test_init_layout() {
    let heap = allocator();

    assert_eq!(heap.heap_size(), SENTINEL_OVERHEAD + CHUNK_SIZE);
    assert_eq!(heap.prologue().offset(), 8);
    assert_eq!(free_blocks(&heap), vec![(16, CHUNK_SIZE)]);
    assert_eq!(heap.free_lists().head(bucket_for(CHUNK_SIZE)), Some(Block::at(16)));
  }

  #[test]
  fn test_zero_size() {
    let mut heap = allocator();

    assert_eq!(heap.allocate(0), None);
    assert_eq!(heap.heap_size(), SENTINEL_OVERHEAD + CHUNK_SIZE);
  }

  #[test]
  fn test_allocate_splits() {
    let mut heap = allocator();
    let a = heap.allocate(16).unwrap();

    assert_eq!(a.offset(), 16);
    assert_eq!(heap.usable_size(a), 16);
    assert_eq!(free_blocks(&heap), vec![(40, CHUNK_SIZE - 24)]);
  }

  #[test]
  fn test_splinter_is_absorbed() {
    let mut heap = allocator();
    // Leaves 16 bytes, too small to be free on its own.
    let a = heap.allocate(CHUNK_SIZE - 24).unwrap();

    assert_eq!(heap.usable_size(a), CHUNK_SIZE - OVERHEAD);
    assert!(free_blocks(&heap).is_empty());
    assert!(heap.free_lists().is_empty());
  }

  #[test]
  fn test_coalesce_cases() {
    let mut heap = allocator();
    let a = heap.allocate(40).unwrap();
    let b = heap.allocate(40).unwrap();
    let c = heap.allocate(40).unwrap();
    let d = heap.allocate(40).unwrap();
    let tail = CHUNK_SIZE - 4 * 48;

    // Both neighbours allocated.
    heap.deallocate(b);
    assert_eq!(free_blocks(&heap), vec![(b.offset(), 48), (d.offset() + 48, tail)]);

    // Previous neighbour free.
    heap.deallocate(c);
    assert_eq!(free_blocks(&heap), vec![(b.offset(), 96), (d.offset() + 48, tail)]);

    // Next neighbour free.
    heap.deallocate(a);
    assert_eq!(free_blocks(&heap), vec![(a.offset(), 144), (d.offset() + 48, tail)]);

    // Both neighbours free.
    heap.deallocate(d);
    assert_eq!(free_blocks(&heap), vec![(16, CHUNK_SIZE)]);
    assert!(heap.check_heap(false).is_ok());
  }

  #[test]
  fn test_extend_merges_trailing_free_block() {
    let mut heap = allocator();
    let a = heap.allocate(1000).unwrap();
    let free_before = CHUNK_SIZE - 1008;

    let big = heap.allocate(2 * CHUNK_SIZE).unwrap();
    let asize = adjusted_size(2 * CHUNK_SIZE).unwrap();

    // The trailing free block absorbed the extension and was split again.
    assert_eq!(big.offset(), a.offset() + 1008);
    assert_eq!(heap.heap_size(), SENTINEL_OVERHEAD + CHUNK_SIZE + asize);
    assert_eq!(free_blocks(&heap), vec![(big.offset() + asize, free_before)]);
  }

  #[test]
  fn test_reallocate_zero_keeps_block() {
    let mut heap = allocator();
    let a = heap.allocate(8).unwrap();
    heap.payload_mut(a)[..4].copy_from_slice(b"keep");

    assert_eq!(heap.reallocate(a, 0), Err(ReallocError::ZeroSize));
    assert_eq!(&heap.payload(a)[..4], b"keep");
  }

  #[test]
  fn test_reallocate_zero_returns_under_abort() {
    let mut heap = SegregatedAllocator::init(MemLib::new(1 << 16).unwrap()).unwrap();
    assert_eq!(heap.config().realloc_policy(), ReallocPolicy::Abort);
    let a = heap.allocate(8).unwrap();

    assert_eq!(heap.reallocate(a, 0), Err(ReallocError::ZeroSize));
    assert_eq!(heap.usable_size(a), 16);
    assert!(heap.check_heap(false).is_ok());
  }

  #[test]
  fn test_reallocate_propagates_exhaustion() {
    let config = Config::new().with_realloc_policy(ReallocPolicy::Propagate);
    let mem = MemLib::new(SENTINEL_OVERHEAD + CHUNK_SIZE).unwrap();
    let mut heap = SegregatedAllocator::init_with(mem, config).unwrap();
    let a = heap.allocate(64).unwrap();

    assert_eq!(
      heap.reallocate(a, 2 * CHUNK_SIZE),
      Err(ReallocError::OutOfMemory {
        requested: 2 * CHUNK_SIZE,
      })
    );
    assert_eq!(heap.usable_size(a), 64);
    assert!(heap.check_heap(false).is_ok());
  }

  #[test]
  fn test_failed_growth_leaves_heap() {
    let mem = MemLib::new(SENTINEL_OVERHEAD + CHUNK_SIZE).unwrap();
    let mut heap = SegregatedAllocator::init(mem).unwrap();
    let before = heap.memory().to_vec();

    assert_eq!(heap.allocate(CHUNK_SIZE), None);
    assert_eq!(heap.memory(), &before[..]);
    assert!(heap.allocate(CHUNK_SIZE / 2).is_some());
  }

  #[test]
  fn test_init_fails_without_memory() {
    let mem = MemLib::new(SENTINEL_OVERHEAD + 8).unwrap();

    assert!(matches!(
      SegregatedAllocator::init(mem),
      Err(InitError::Growth(GrowthError::Exhausted { .. }))
    ));
  }

  #[test]
  fn test_custom_chunk_size() {
    let config = Config::new().with_chunk_size(100);
    let heap = SegregatedAllocator::init_with(MemLib::new(1 << 16).unwrap(), config).unwrap();

    assert_eq!(heap.heap_size(), SENTINEL_OVERHEAD + 104);
    assert_eq!(free_blocks(&heap), vec![(16, 104)]);
  }
}
