#![allow(dead_code)]

use segalloc::{Config, MemLib, ReallocPolicy, SegregatedAllocator};
use tracing_subscriber::EnvFilter;

pub fn tracing_init() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

pub fn allocator() -> SegregatedAllocator<MemLib> {
  tracing_init();
  let mem = MemLib::new(MemLib::DEFAULT_CAPACITY).unwrap();
  let config = Config::new().with_realloc_policy(ReallocPolicy::Propagate);
  SegregatedAllocator::init_with(mem, config).unwrap()
}

pub fn assert_consistent(heap: &SegregatedAllocator<MemLib>) {
  let report = heap.check_heap(false);
  assert!(report.is_ok(), "{:?}", report.violations);
}
