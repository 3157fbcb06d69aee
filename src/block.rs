use std::num::NonZeroUsize;

use crate::align::{DSIZE, WSIZE};

/// Bytes spent on the header and footer of every block.
pub const OVERHEAD: usize = 2 * WSIZE;

/// Width of one free-list link stored in a free block's payload.
const LINK_SIZE: usize = 8;

/// Smallest block able to carry both boundary tags and both list links.
pub const MIN_BLOCK_SIZE: usize = OVERHEAD + 2 * LINK_SIZE;

/// Largest size a 32-bit boundary tag can describe.
pub const MAX_BLOCK_SIZE: usize = (u32::MAX as usize) & !(DSIZE - 1);

const ALLOCATED_BIT: u32 = 0x1;
const SIZE_MASK: u32 = !0x7;

/// Decoded boundary tag.
///
/// ```text
///    31                          3  2  1  0
///   ┌─────────────────────────────┬────────┬───┐
///   │         block size          │ unused │a/f│
///   └─────────────────────────────┴────────┴───┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
  pub size: usize,
  pub allocated: bool,
}

impl Tag {
  pub const fn new(
    size: usize,
    allocated: bool,
  ) -> Self {
    Self { size, allocated }
  }

  pub const fn encode(self) -> u32 {
    debug_assert!(self.size <= MAX_BLOCK_SIZE);
    (self.size as u32 & SIZE_MASK) | (self.allocated as u32)
  }

  pub const fn decode(word: u32) -> Self {
    Self {
      size: (word & SIZE_MASK) as usize,
      allocated: word & ALLOCATED_BIT != 0,
    }
  }
}

pub(crate) fn read_tag(
  heap: &[u8],
  offset: usize,
) -> Tag {
  let mut word = [0u8; WSIZE];
  word.copy_from_slice(&heap[offset..offset + WSIZE]);
  Tag::decode(u32::from_le_bytes(word))
}

pub(crate) fn write_tag(
  heap: &mut [u8],
  offset: usize,
  tag: Tag,
) {
  heap[offset..offset + WSIZE].copy_from_slice(&tag.encode().to_le_bytes());
}

/// A block, named by the offset of its payload from the heap base.
///
/// ```text
///   bp - 4      bp                         bp + size - 8   bp + size - 4
///   ┌──────────┬───────────────────────────┬──────────────┐
///   │  header  │  payload / succ + pred    │    footer    │
///   └──────────┴───────────────────────────┴──────────────┘
/// ```
///
/// Every neighbour lookup in the crate goes through [`Block::next`] and
/// [`Block::prev`]; both only read the boundary tags adjacent to the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block(usize);

impl Block {
  pub(crate) const fn at(offset: usize) -> Self {
    Self(offset)
  }

  pub const fn offset(self) -> usize {
    self.0
  }

  pub const fn header(self) -> usize {
    self.0 - WSIZE
  }

  pub const fn footer(
    self,
    size: usize,
  ) -> usize {
    self.0 + size - DSIZE
  }

  pub fn tag(
    self,
    heap: &[u8],
  ) -> Tag {
    read_tag(heap, self.header())
  }

  pub fn footer_tag(
    self,
    heap: &[u8],
  ) -> Tag {
    read_tag(heap, self.footer(self.size(heap)))
  }

  pub fn size(
    self,
    heap: &[u8],
  ) -> usize {
    self.tag(heap).size
  }

  pub fn is_allocated(
    self,
    heap: &[u8],
  ) -> bool {
    self.tag(heap).allocated
  }

  /// The block physically following this one.
  pub fn next(
    self,
    heap: &[u8],
  ) -> Block {
    Block(self.0 + self.size(heap))
  }

  /// Footer of the physically preceding block.
  pub fn prev_tag(
    self,
    heap: &[u8],
  ) -> Tag {
    read_tag(heap, self.0 - DSIZE)
  }

  /// The block physically preceding this one, found through its footer.
  pub fn prev(
    self,
    heap: &[u8],
  ) -> Block {
    Block(self.0 - self.prev_tag(heap).size)
  }

  /// Writes the same tag to the header and the footer.
  pub(crate) fn write(
    self,
    heap: &mut [u8],
    tag: Tag,
  ) {
    write_tag(heap, self.header(), tag);
    write_tag(heap, self.footer(tag.size), tag);
  }

  pub(crate) fn succ(
    self,
    heap: &[u8],
  ) -> Option<Block> {
    read_link(heap, self.0)
  }

  pub(crate) fn pred(
    self,
    heap: &[u8],
  ) -> Option<Block> {
    read_link(heap, self.0 + LINK_SIZE)
  }

  pub(crate) fn set_succ(
    self,
    heap: &mut [u8],
    succ: Option<Block>,
  ) {
    write_link(heap, self.0, succ);
  }

  pub(crate) fn set_pred(
    self,
    heap: &mut [u8],
    pred: Option<Block>,
  ) {
    write_link(heap, self.0 + LINK_SIZE, pred);
  }

  pub fn describe(
    self,
    heap: &[u8],
  ) -> BlockKind {
    let tag = self.tag(heap);
    if tag.allocated || tag.size < MIN_BLOCK_SIZE {
      return BlockKind::Allocated { size: tag.size };
    }
    BlockKind::Free {
      size: tag.size,
      succ: self.succ(heap),
      pred: self.pred(heap),
    }
  }
}

fn read_link(
  heap: &[u8],
  offset: usize,
) -> Option<Block> {
  let mut word = [0u8; LINK_SIZE];
  word.copy_from_slice(&heap[offset..offset + LINK_SIZE]);
  match u64::from_le_bytes(word) {
    0 => None,
    link => Some(Block(link as usize)),
  }
}

fn write_link(
  heap: &mut [u8],
  offset: usize,
  link: Option<Block>,
) {
  let word = link.map_or(0, |block| block.0 as u64);
  heap[offset..offset + LINK_SIZE].copy_from_slice(&word.to_le_bytes());
}

/// What a block currently is, read off its boundary tags.
///
/// Only blocks of at least [`MIN_BLOCK_SIZE`] bytes are ever described as
/// free; the sentinels always read as allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
  Allocated {
    size: usize,
  },
  Free {
    size: usize,
    succ: Option<Block>,
    pred: Option<Block>,
  },
}

impl BlockKind {
  pub const fn size(&self) -> usize {
    match *self {
      Self::Allocated { size } | Self::Free { size, .. } => size,
    }
  }

  pub const fn is_free(&self) -> bool {
    matches!(self, Self::Free { .. })
  }
}

/// Handle returned to callers: the payload offset of an allocated block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(NonZeroUsize);

impl Address {
  pub(crate) fn new(block: Block) -> Option<Self> {
    NonZeroUsize::new(block.0).map(Self)
  }

  pub const fn offset(self) -> usize {
    self.0.get()
  }

  pub(crate) const fn block(self) -> Block {
    Block(self.0.get())
  }
}
