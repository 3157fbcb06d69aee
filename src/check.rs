use std::{collections::HashSet, fmt};

use tracing::{info, warn};

use crate::{
  align::{DSIZE, WSIZE, is_aligned},
  block::{Block, MIN_BLOCK_SIZE, Tag, read_tag},
  class::{BUCKETS, bucket_for},
  grow::HeapGrower,
  heap::{SENTINEL_OVERHEAD, SegregatedAllocator},
};

/// A broken heap invariant found by [`SegregatedAllocator::check_heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
  BadPrologue {
    tag: Tag,
  },
  BadEpilogue {
    tag: Tag,
  },
  Misaligned {
    block: Block,
  },
  TagMismatch {
    block: Block,
    header: Tag,
    footer: Tag,
  },
  /// A block size leads past the end of the heap.
  OutOfBounds {
    block: Block,
  },
  AdjacentFree {
    first: Block,
    second: Block,
  },
  WrongBucket {
    block: Block,
    bucket: usize,
  },
  ListedAllocated {
    block: Block,
    bucket: usize,
  },
  /// `block.succ.pred != block`, or the link points outside the heap.
  BrokenLink {
    block: Block,
    bucket: usize,
  },
  ListedTwice {
    block: Block,
  },
  Unlisted {
    block: Block,
  },
  Conservation {
    counted: usize,
    granted: usize,
  },
}

impl fmt::Display for Violation {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match *self {
      Self::BadPrologue { tag } => write!(f, "bad prologue header {:?}", tag),
      Self::BadEpilogue { tag } => write!(f, "bad epilogue header {:?}", tag),
      Self::Misaligned { block } => {
        write!(f, "payload for block at {:#x} is not aligned", block.offset())
      }
      Self::TagMismatch {
        block,
        header,
        footer,
      } => write!(
        f,
        "header {:?} does not match footer {:?} at {:#x}",
        header,
        footer,
        block.offset()
      ),
      Self::OutOfBounds { block } => {
        write!(f, "block at {:#x} runs past the end of the heap", block.offset())
      }
      Self::AdjacentFree { first, second } => write!(
        f,
        "free blocks at {:#x} and {:#x} escaped coalescing",
        first.offset(),
        second.offset()
      ),
      Self::WrongBucket { block, bucket } => {
        write!(f, "block at {:#x} is in bucket {}", block.offset(), bucket)
      }
      Self::ListedAllocated { block, bucket } => write!(
        f,
        "allocated block at {:#x} is in bucket {}",
        block.offset(),
        bucket
      ),
      Self::BrokenLink { block, bucket } => write!(
        f,
        "broken link after block at {:#x} in bucket {}",
        block.offset(),
        bucket
      ),
      Self::ListedTwice { block } => {
        write!(f, "block at {:#x} is listed twice", block.offset())
      }
      Self::Unlisted { block } => {
        write!(f, "free block at {:#x} is in no free list", block.offset())
      }
      Self::Conservation { counted, granted } => write!(
        f,
        "blocks account for {} bytes, but {} were granted",
        counted, granted
      ),
    }
  }
}

/// Outcome of a heap walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapReport {
  pub blocks: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub violations: Vec<Violation>,
}

impl HeapReport {
  pub fn is_ok(&self) -> bool {
    self.violations.is_empty()
  }

  fn report(
    &mut self,
    violation: Violation,
  ) {
    warn!("{}", violation);
    self.violations.push(violation);
  }
}

impl<G: HeapGrower> SegregatedAllocator<G> {
  /// Walks the heap and the free lists and reports every broken invariant.
  ///
  /// Never mutates the heap. With `verbose` set, every block is logged at
  /// info level.
  pub fn check_heap(
    &self,
    verbose: bool,
  ) -> HeapReport {
    let heap = self.memory();
    let mut report = HeapReport::default();

    let prologue = self.prologue();
    if verbose {
      info!("heap ({:#x}):", prologue.offset());
    }

    let tag = prologue.tag(heap);
    if tag != Tag::new(DSIZE, true) {
      report.report(Violation::BadPrologue { tag });
    }
    if prologue.offset() + tag.size > heap.len() {
      report.report(Violation::OutOfBounds { block: prologue });
      return report;
    }
    check_block(heap, prologue, &mut report);

    let mut free = HashSet::new();
    let mut counted = SENTINEL_OVERHEAD;
    let mut prev_free: Option<Block> = None;
    let mut block = prologue.next(heap);

    loop {
      if block.header() + WSIZE > heap.len() {
        report.report(Violation::OutOfBounds { block });
        break;
      }
      let tag = block.tag(heap);
      if tag.size == 0 {
        break;
      }
      if block.offset() + tag.size > heap.len() {
        report.report(Violation::OutOfBounds { block });
        break;
      }

      if verbose {
        print_block(heap, block);
      }
      check_block(heap, block, &mut report);

      report.blocks += 1;
      counted += tag.size;
      if tag.allocated {
        prev_free = None;
      } else {
        if let Some(first) = prev_free {
          report.report(Violation::AdjacentFree {
            first,
            second: block,
          });
        }
        report.free_blocks += 1;
        report.free_bytes += tag.size;
        free.insert(block);
        prev_free = Some(block);
      }

      block = block.next(heap);
    }

    if block.header() + WSIZE <= heap.len() {
      if verbose {
        info!("{:#x}: EOL", block.offset());
      }
      let tag = block.tag(heap);
      if tag != Tag::new(0, true) || block.offset() != heap.len() {
        report.report(Violation::BadEpilogue { tag });
      }
    }

    let granted = self.heap_size();
    if counted != granted {
      report.report(Violation::Conservation { counted, granted });
    }

    self.check_lists(heap, &free, &mut report);
    report
  }

  fn check_lists(
    &self,
    heap: &[u8],
    free: &HashSet<Block>,
    report: &mut HeapReport,
  ) {
    let mut listed = HashSet::new();
    // A cycle in a list would otherwise never end the walk.
    let limit = heap.len() / MIN_BLOCK_SIZE + 1;

    for bucket in 0..BUCKETS {
      let mut current = self.lists.head(bucket);
      let mut pred = None;
      let mut steps = 0;

      while let Some(block) = current {
        let in_bounds = block.offset() >= self.prologue().offset() + DSIZE
          && block.offset() + MIN_BLOCK_SIZE <= heap.len();
        if !in_bounds || block.pred(heap) != pred || steps > limit {
          report.report(Violation::BrokenLink {
            block: pred.unwrap_or(block),
            bucket,
          });
          break;
        }

        let tag = block.tag(heap);
        if tag.allocated {
          report.report(Violation::ListedAllocated { block, bucket });
        } else if bucket_for(tag.size) != bucket {
          report.report(Violation::WrongBucket { block, bucket });
        }
        if !listed.insert(block) {
          report.report(Violation::ListedTwice { block });
        }

        pred = Some(block);
        current = block.succ(heap);
        steps += 1;
      }
    }

    let mut unlisted: Vec<_> = free.difference(&listed).copied().collect();
    unlisted.sort();
    for block in unlisted {
      report.report(Violation::Unlisted { block });
    }
  }
}

fn check_block(
  heap: &[u8],
  block: Block,
  report: &mut HeapReport,
) {
  if !is_aligned(block.offset()) {
    report.report(Violation::Misaligned { block });
  }
  let header = block.tag(heap);
  let footer = read_tag(heap, block.footer(header.size));
  if header != footer {
    report.report(Violation::TagMismatch {
      block,
      header,
      footer,
    });
  }
}

fn print_block(
  heap: &[u8],
  block: Block,
) {
  let header = block.tag(heap);
  let footer = read_tag(heap, block.footer(header.size));
  info!(
    "{:#x}: header: [{}:{}] footer: [{}:{}]",
    block.offset(),
    header.size,
    if header.allocated { 'a' } else { 'f' },
    footer.size,
    if footer.allocated { 'a' } else { 'f' },
  );
}
