//! # segalloc - A Segregated Free-List Memory Allocator
//!
//! This crate provides a `malloc`-style allocator over a single contiguous,
//! growable heap. Blocks carry **boundary tags**, free blocks are kept in
//! **segregated free lists** and placed **first-fit**, and freed blocks are
//! **coalesced** with their neighbours right away.
//!
//! ## Overview
//!
//! ```text
//!   Heap Layout:
//!
//!   ┌─────┬──────────┬────────┬──────────────┬────────┬─────────┬──────────┐
//!   │ pad │ prologue │ A1     │ F1           │ A2     │ F2      │ epilogue │
//!   │     │  (8:a)   │ (24:a) │ (64:f)       │ (40:a) │ (4k:f)  │  (0:a)   │
//!   └─────┴──────────┴────────┴──────────────┴────────┴─────────┴──────────┘
//!                                                                ▲
//!                                                                │
//!                                                         Heap break: grows
//!                                                         through HeapGrower
//! ```
//!
//! Every block is framed by a header and a footer holding its size and an
//! allocated bit:
//!
//! ```text
//!   Allocated block:                     Free block:
//!   ┌────────┬────────────────┬────────┐ ┌────────┬──────┬──────┬─────┬────────┐
//!   │ header │    payload     │ footer │ │ header │ succ │ pred │ ... │ footer │
//!   └────────┴────────────────┴────────┘ └────────┴──────┴──────┴─────┴────────┘
//!            ▲                                    ▲
//!            └── Address returned to the user     └── links reuse the payload
//! ```
//!
//! The footer lets a block find its physical predecessor in O(1), which is
//! what makes immediate coalescing cheap.
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align      - Alignment macros (align!, align_to!) and word sizes
//!   ├── block      - Boundary tags, block addressing, free-list links
//!   ├── class      - Size-class (bucket) index
//!   ├── free_list  - Per-bucket intrusive doubly-linked lists
//!   ├── grow       - HeapGrower trait, MemLib and Sbrk growth providers
//!   ├── heap       - SegregatedAllocator: allocate, deallocate, reallocate
//!   ├── check      - Heap consistency checker
//!   ├── config     - Chunk size and reallocate failure policy
//!   └── error      - Error types
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segalloc::{MemLib, SegregatedAllocator};
//!
//! let mem = MemLib::new(MemLib::DEFAULT_CAPACITY).unwrap();
//! let mut heap = SegregatedAllocator::init(mem).unwrap();
//!
//! let a = heap.allocate(16).unwrap();
//! heap.payload_mut(a)[..5].copy_from_slice(b"hello");
//!
//! let a = heap.reallocate(a, 64).unwrap();
//! assert_eq!(&heap.payload(a)[..5], b"hello");
//!
//! heap.deallocate(a);
//! assert!(heap.check_heap(false).is_ok());
//! ```
//!
//! ## Size Classes
//!
//! ```text
//!   bucket:  0    1    2    3     4     ...   12      13
//!   sizes:  ≤16  ≤32  ≤64  ≤128  ≤256   ...  ≤64KiB  > 64KiB
//! ```
//!
//! A request is rounded up to the double word, plus 8 bytes of tags, and never
//! below 24 bytes. The search starts at the bucket of that size and walks up;
//! inside a bucket the first block that is large enough wins. When nothing
//! fits, the heap grows by the larger of the request and one chunk (4 KiB).
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives
//! - **No shrinking**: Memory is never handed back to the grower
//! - **Trusting**: Freeing an address twice, or one that was never
//!   allocated, is not detected outside of debug assertions
//!
//! ## Logging
//!
//! Allocation events are emitted through [`tracing`]; install any subscriber
//! to see them. The crate never installs one itself.

pub mod align;
mod block;
mod check;
mod class;
mod config;
mod error;
mod free_list;
mod grow;
mod heap;

pub use block::{Address, Block, BlockKind, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, OVERHEAD, Tag};
pub use check::{HeapReport, Violation};
pub use class::{BUCKETS, THRESHOLDS, bucket_for, range as bucket_range};
pub use config::{CHUNK_SIZE, Config, ReallocPolicy};
pub use error::{GrowthError, InitError, ReallocError};
pub use free_list::FreeLists;
#[cfg(unix)]
pub use grow::Sbrk;
pub use grow::{HEAP_ALIGN, HeapGrower, MemLib};
pub use heap::{Blocks, SENTINEL_OVERHEAD, SegregatedAllocator, adjusted_size};
