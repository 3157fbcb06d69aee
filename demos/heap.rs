use std::io::Read;

use segalloc::{Config, HeapGrower, ReallocPolicy, SegregatedAllocator, Sbrk};
use tracing_subscriber::EnvFilter;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    Sbrk::program_break(),
  );
}

fn print_heap(heap: &SegregatedAllocator<Sbrk>) {
  let base = heap.grower().memory().as_ptr();
  println!("    heap base = {:?}, {} bytes", base, heap.heap_size());
  for (block, kind) in heap.blocks() {
    println!(
      "    {:#06x}: {:>6} bytes {}",
      block.offset(),
      kind.size(),
      if kind.is_free() { "free" } else { "allocated" }
    );
  }
}

fn main() {
  // RUST_LOG=segalloc=trace shows every allocator event.
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  print_program_break("start");

  // Sentinels plus one 4 KiB chunk, carved out of the program break.
  let config = Config::new().with_realloc_policy(ReallocPolicy::Propagate);
  let mut heap = match SegregatedAllocator::init_with(Sbrk::new(), config) {
    Ok(heap) => heap,
    Err(err) => {
      eprintln!("cannot set up the heap: {}", err);
      std::process::exit(1);
    }
  };
  print_program_break("after init");
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Three small allocations, split off the front of the first chunk.
  // --------------------------------------------------------------------
  let (Some(a), Some(b), Some(c)) = (heap.allocate(4), heap.allocate(12), heap.allocate(32)) else {
    eprintln!("out of memory");
    return;
  };
  heap.payload_mut(a)[..4].copy_from_slice(&0xDEADBEEFu32.to_le_bytes());
  println!("\n[1] Allocate 4, 12 and 32 bytes");
  println!("    a = {:#x}, b = {:#x}, c = {:#x}", a.offset(), b.offset(), c.offset());
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Free `a` and ask for 2 bytes: the freed block comes straight back.
  // --------------------------------------------------------------------
  heap.deallocate(a);
  let Some(d) = heap.allocate(2) else {
    eprintln!("out of memory");
    return;
  };
  println!("\n[2] Deallocate a, then allocate 2 bytes");
  println!(
    "    d == a? {}",
    if d == a {
      "Yes, it reused the freed block"
    } else {
      "No, it allocated somewhere else"
    }
  );
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Free b and c: they merge with each other and the free tail.
  // --------------------------------------------------------------------
  heap.deallocate(b);
  heap.deallocate(c);
  println!("\n[3] Deallocate b and c (watch them coalesce)");
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) A 64 KiB request does not fit: the heap grows by exactly that much.
  // --------------------------------------------------------------------
  print_program_break("before large alloc");
  let Some(big) = heap.allocate(64 * 1024) else {
    eprintln!("out of memory");
    return;
  };
  println!("\n[4] Allocate 64 KiB at {:#x}", big.offset());
  print_program_break("after large alloc");
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Reallocate d, its bytes follow it.
  // --------------------------------------------------------------------
  heap.payload_mut(d)[..2].copy_from_slice(b"ok");
  match heap.reallocate(d, 256) {
    Ok(moved) => println!(
      "\n[5] Reallocate d to 256 bytes: {:#x} -> {:#x}, payload {:?}",
      d.offset(),
      moved.offset(),
      std::str::from_utf8(&heap.payload(moved)[..2])
    ),
    Err(err) => println!("\n[5] Reallocate failed: {}", err),
  }

  let report = heap.check_heap(true);
  println!(
    "\n[6] Heap check: {} blocks, {} free ({} bytes), {} violations",
    report.blocks,
    report.free_blocks,
    report.free_bytes,
    report.violations.len()
  );
  println!("    The heap is never shrunk; the OS reclaims it when the process exits.");
}
