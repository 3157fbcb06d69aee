mod common;

use common::{allocator, assert_consistent};
use segalloc::{CHUNK_SIZE, MIN_BLOCK_SIZE, OVERHEAD, adjusted_size, bucket_for};

#[test]
fn freed_block_is_reused() {
  let mut heap = allocator();

  let a = heap.allocate(16).unwrap();
  let b = heap.allocate(16).unwrap();
  assert!(b.offset() >= a.offset() + heap.usable_size(a));

  let size = heap.heap_size();
  heap.deallocate(a);
  let c = heap.allocate(16).unwrap();

  assert_eq!(c, a);
  assert_eq!(heap.heap_size(), size);
  assert_consistent(&heap);
}

#[test]
fn remainder_of_split_is_allocatable() {
  let mut heap = allocator();
  let (_, whole) = heap.blocks().next().unwrap();
  let whole = whole.size();

  let small = heap.allocate(100).unwrap();
  let asize = adjusted_size(100).unwrap();
  assert!(whole - asize >= MIN_BLOCK_SIZE);

  let free: Vec<_> = heap
    .blocks()
    .filter(|(_, kind)| kind.is_free())
    .map(|(block, kind)| (block.offset(), kind.size()))
    .collect();
  assert_eq!(free, vec![(small.offset() + asize, whole - asize)]);

  let size = heap.heap_size();
  let rest = heap.allocate(whole - asize - OVERHEAD).unwrap();
  assert_eq!(rest.offset(), small.offset() + asize);
  assert_eq!(heap.heap_size(), size);
  assert!(heap.free_lists().is_empty());
  assert_consistent(&heap);
}

#[test]
fn three_neighbours_coalesce() {
  let mut heap = allocator();
  let a = heap.allocate(64).unwrap();
  let b = heap.allocate(64).unwrap();
  let c = heap.allocate(64).unwrap();
  let _guard = heap.allocate(64).unwrap();
  let asize = adjusted_size(64).unwrap();

  heap.deallocate(a);
  heap.deallocate(c);
  assert_consistent(&heap);
  heap.deallocate(b);

  let (block, kind) = heap
    .blocks()
    .find(|(block, _)| block.offset() == a.offset())
    .unwrap();
  assert!(kind.is_free());
  assert_eq!(kind.size(), 3 * asize);

  let listed: Vec<_> = heap
    .free_lists()
    .iter(heap.memory(), bucket_for(3 * asize))
    .collect();
  assert_eq!(listed, vec![block]);
  assert_consistent(&heap);
}

#[test]
fn large_request_grows_by_its_own_size() {
  let mut heap = allocator();
  let before = heap.heap_size();
  let size = 4 * CHUNK_SIZE;

  let a = heap.allocate(size).unwrap();

  assert_eq!(heap.heap_size() - before, adjusted_size(size).unwrap());
  assert!(heap.usable_size(a) >= size);
  assert_consistent(&heap);
}

#[test]
fn small_request_grows_by_a_chunk() {
  let mut heap = allocator();
  heap.allocate(CHUNK_SIZE - OVERHEAD).unwrap();
  let before = heap.heap_size();

  heap.allocate(8).unwrap();

  assert_eq!(heap.heap_size() - before, CHUNK_SIZE);
  assert_consistent(&heap);
}

#[test]
fn reallocate_preserves_contents() {
  let mut heap = allocator();
  let pattern: Vec<u8> = (0..100).map(|i| i as u8 ^ 0x5a).collect();

  let a = heap.allocate(100).unwrap();
  heap.payload_mut(a)[..100].copy_from_slice(&pattern);
  // Something after it, so growing cannot happen in place by accident.
  let _guard = heap.allocate(8).unwrap();

  let b = heap.reallocate(a, 1000).unwrap();
  assert_ne!(a, b);
  assert!(heap.usable_size(b) >= 1000);
  assert_eq!(&heap.payload(b)[..100], &pattern[..]);

  let c = heap.reallocate(b, 40).unwrap();
  assert!(heap.usable_size(c) >= 40);
  assert_eq!(&heap.payload(c)[..40], &pattern[..40]);
  assert_consistent(&heap);
}

#[test]
fn payloads_are_aligned_and_sufficient() {
  let mut heap = allocator();

  for size in 1..=300 {
    let a = heap.allocate(size).unwrap();
    assert_eq!(a.offset() % 8, 0);
    assert_eq!(heap.as_ptr(a) as usize % 8, 0);
    assert!(heap.usable_size(a) >= size);
  }
  assert_consistent(&heap);
}

#[test]
fn independent_heaps_do_not_interfere() {
  let mut first = allocator();
  let mut second = allocator();

  let a = first.allocate(32).unwrap();
  let b = second.allocate(32).unwrap();
  first.payload_mut(a).fill(1);
  second.payload_mut(b).fill(2);

  assert_eq!(a.offset(), b.offset());
  assert!(first.payload(a).iter().all(|&byte| byte == 1));
  assert!(second.payload(b).iter().all(|&byte| byte == 2));
}
