use std::{io::Read, ptr};

use nfalloc::{HEADER_SIZE, Heap, Sbrk};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    Sbrk::program_break(),
  );
}

fn print_alloc(
  size: usize,
  addr: *mut u8,
) {
  println!(
    "Allocated {} bytes, address = {:?}, program break = {:?}",
    size,
    addr,
    Sbrk::program_break()
  );
}

fn print_free_list(heap: &Heap<Sbrk>) {
  for span in heap.free_blocks() {
    println!("    free block at {:#x}, {} bytes", span.start, span.size);
  }
}

fn main() {
  env_logger::init();

  let mut heap = Heap::new(Sbrk::new());

  unsafe {
    print_program_break("start");
    println!("Every block carries a {HEADER_SIZE} byte header in front of the returned pointer.");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 1) Allocate space for a u32. The request is rounded up to 16 bytes.
    // --------------------------------------------------------------------
    let first_block = heap.allocate(4);
    println!("\n[1] Allocate u32");
    print_alloc(4, first_block);

    let first_ptr = first_block as *mut u32;
    first_ptr.write(0xDEADBEEF);
    println!("[1] Value written to first_block = 0x{:X}", first_ptr.read());

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) Allocate 12 bytes and fill them with a pattern.
    // --------------------------------------------------------------------
    let second_block = heap.allocate(12);
    println!("\n[2] Allocate [u8; 12]");
    print_alloc(12, second_block);

    ptr::write_bytes(second_block, 0xAB, 12);
    println!("[2] Initialized second block with 0xAB");

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Allocate 256 bytes; every address is a multiple of 16.
    // --------------------------------------------------------------------
    let third_block = heap.allocate(256);
    println!("\n[3] Allocate [u8; 256] (observe alignment)");
    print_alloc(256, third_block);
    println!(
      "[3] Address = {:#X}, addr % 16 = {}",
      third_block as usize,
      third_block as usize % 16
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Release the first and third blocks. They join the free list; the
    //    program break does not move back.
    // --------------------------------------------------------------------
    heap.release(first_block);
    heap.release(third_block);
    println!("\n[4] Released first_block and third_block");
    print_free_list(&heap);
    print_program_break("after release");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) Allocate 64 bytes: the search carves them out of a free block
    //    instead of moving the break.
    // --------------------------------------------------------------------
    let fourth_block = heap.allocate(64);
    println!("\n[5] Allocate [u8; 64] (check reuse of freed block)");
    print_alloc(64, fourth_block);
    println!(
      "[5] fourth_block == third_block? {}",
      if fourth_block == third_block {
        "Yes, it was carved from the freed block"
      } else {
        "No, it allocated somewhere else"
      }
    );
    print_free_list(&heap);

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 6) Allocate a large block to observe heap growth.
    // --------------------------------------------------------------------
    print_program_break("before large alloc");

    let big_block = heap.allocate(64 * 1024);
    println!("\n[6] Allocate large 64 KiB block");
    print_alloc(64 * 1024, big_block);

    print_program_break("after large alloc");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 7) End of demo. The arena is never handed back; the OS reclaims it
    //    when the process exits.
    // --------------------------------------------------------------------
    let stats = heap.stats();
    println!(
      "\n[7] Arena grew {} times for {} bytes. Process will exit and the OS will reclaim all memory.",
      stats.grow_calls, stats.arena_bytes
    );
  }
}
