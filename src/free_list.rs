use crate::{
  block::{Block, MIN_BLOCK_SIZE},
  class::{BUCKETS, bucket_for},
};

/// Heads of the per-bucket free lists.
///
/// The lists are intrusive: each free block carries its successor and
/// predecessor links in its own payload, so the table only stores heads.
/// Blocks are pushed at the head and can be unlinked in O(1).
#[derive(Debug, Clone, Default)]
pub struct FreeLists {
  heads: [Option<Block>; BUCKETS],
}

impl FreeLists {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn head(
    &self,
    bucket: usize,
  ) -> Option<Block> {
    self.heads[bucket]
  }

  /// Pushes `block` onto the list of the bucket matching `size`.
  pub fn insert(
    &mut self,
    heap: &mut [u8],
    block: Block,
    size: usize,
  ) {
    debug_assert!(size >= MIN_BLOCK_SIZE);
    debug_assert!(!block.is_allocated(heap));

    let bucket = bucket_for(size);
    let head = self.heads[bucket];

    block.set_pred(heap, None);
    block.set_succ(heap, head);
    if let Some(head) = head {
      head.set_pred(heap, Some(block));
    }
    self.heads[bucket] = Some(block);
  }

  /// Unlinks `block` from the list of the bucket matching `size`.
  ///
  /// `block` must currently be a member of that list.
  pub fn remove(
    &mut self,
    heap: &mut [u8],
    block: Block,
    size: usize,
  ) {
    let bucket = bucket_for(size);
    let succ = block.succ(heap);
    let pred = block.pred(heap);

    match (pred, succ) {
      (None, None) => {
        debug_assert_eq!(self.heads[bucket], Some(block));
        self.heads[bucket] = None;
      }
      (None, Some(succ)) => {
        debug_assert_eq!(self.heads[bucket], Some(block));
        self.heads[bucket] = Some(succ);
        succ.set_pred(heap, None);
      }
      (Some(pred), Some(succ)) => {
        pred.set_succ(heap, Some(succ));
        succ.set_pred(heap, Some(pred));
      }
      (Some(pred), None) => {
        pred.set_succ(heap, None);
      }
    }
  }

  /// Walks the list of `bucket` through the successor links.
  pub fn iter<'h>(
    &self,
    heap: &'h [u8],
    bucket: usize,
  ) -> Iter<'h> {
    Iter {
      heap,
      current: self.heads[bucket],
    }
  }

  pub fn is_empty(&self) -> bool {
    self.heads.iter().all(Option::is_none)
  }
}

pub struct Iter<'h> {
  heap: &'h [u8],
  current: Option<Block>,
}

impl Iterator for Iter<'_> {
  type Item = Block;

  fn next(&mut self) -> Option<Block> {
    let block = self.current?;
    self.current = block.succ(self.heap);
    Some(block)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::Tag;

  // Three free blocks of 32 bytes and one of 48, back to back.
  fn free_blocks() -> (Vec<u8>, [Block; 4]) {
    let mut heap = vec![0u8; 16 + 3 * 32 + 48];
    let blocks = [Block::at(16), Block::at(48), Block::at(80), Block::at(112)];
    for block in &blocks[..3] {
      block.write(&mut heap, Tag::new(32, false));
    }
    blocks[3].write(&mut heap, Tag::new(48, false));
    (heap, blocks)
  }

  fn collect(
    lists: &FreeLists,
    heap: &[u8],
    bucket: usize,
  ) -> Vec<Block> {
    lists.iter(heap, bucket).collect()
  }

  #[test]
  fn test_insert_is_lifo() {
    let (mut heap, [a, b, c, d]) = free_blocks();
    let mut lists = FreeLists::new();

    lists.insert(&mut heap, a, 32);
    lists.insert(&mut heap, b, 32);
    lists.insert(&mut heap, c, 32);
    lists.insert(&mut heap, d, 48);

    assert_eq!(collect(&lists, &heap, 1), vec![c, b, a]);
    assert_eq!(collect(&lists, &heap, 2), vec![d]);
    assert_eq!(lists.head(1), Some(c));
    assert_eq!(c.pred(&heap), None);
    assert_eq!(a.pred(&heap), Some(b));
  }

  #[test]
  fn test_remove_all_positions() {
    let (mut heap, [a, b, c, d]) = free_blocks();
    let mut lists = FreeLists::new();
    for block in [a, b, c] {
      lists.insert(&mut heap, block, 32);
    }
    lists.insert(&mut heap, d, 48);

    // interior
    lists.remove(&mut heap, b, 32);
    assert_eq!(collect(&lists, &heap, 1), vec![c, a]);
    assert_eq!(a.pred(&heap), Some(c));

    // tail
    lists.remove(&mut heap, a, 32);
    assert_eq!(collect(&lists, &heap, 1), vec![c]);

    // head
    lists.insert(&mut heap, a, 32);
    lists.remove(&mut heap, a, 32);
    assert_eq!(collect(&lists, &heap, 1), vec![c]);
    assert_eq!(c.pred(&heap), None);

    // sole element
    lists.remove(&mut heap, c, 32);
    assert_eq!(lists.head(1), None);

    lists.remove(&mut heap, d, 48);
    assert!(lists.is_empty());
  }
}
