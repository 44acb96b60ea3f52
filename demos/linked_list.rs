//! Exercises the four heap entry points through a small singly linked list.
//!
//! Run with `RUST_LOG=nfalloc=trace` to watch blocks being carved, reused
//! and merged.

use std::{mem, process::ExitCode, ptr};

use nfalloc::{Heap, Sbrk};

#[repr(C)]
struct Node {
  data: i32,
  next: *mut Node,
}

unsafe fn list_new(
  heap: &mut Heap<Sbrk>,
  data: i32,
) -> *mut Node {
  unsafe {
    let node = heap.allocate(mem::size_of::<Node>()) as *mut Node;

    if !node.is_null() {
      node.write(Node {
        data,
        next: ptr::null_mut(),
      });
    }

    node
  }
}

unsafe fn list_add(
  heap: &mut Heap<Sbrk>,
  list: *mut Node,
  data: i32,
) -> bool {
  unsafe {
    let mut current = list;
    while !(*current).next.is_null() {
      current = (*current).next;
    }

    let node = list_new(heap, data);
    (*current).next = node;
    !node.is_null()
  }
}

/// Unlinks and releases the element at `index`. Returns false if there is
/// no such element.
unsafe fn list_remove(
  heap: &mut Heap<Sbrk>,
  list: &mut *mut Node,
  index: usize,
) -> bool {
  unsafe {
    if list.is_null() {
      return false;
    }

    if index == 0 {
      let head = *list;
      *list = (*head).next;
      heap.release(head as *mut u8);
      return true;
    }

    let mut current = *list;
    for _ in 0..index - 1 {
      if current.is_null() {
        return false;
      }
      current = (*current).next;
    }

    if current.is_null() || (*current).next.is_null() {
      return false;
    }

    let removed = (*current).next;
    (*current).next = (*removed).next;
    heap.release(removed as *mut u8);
    true
  }
}

unsafe fn list_remove_all(
  heap: &mut Heap<Sbrk>,
  list: *mut Node,
) {
  unsafe {
    let mut current = list;
    while !current.is_null() {
      let next = (*current).next;
      heap.release(current as *mut u8);
      current = next;
    }
  }
}

unsafe fn list_print_all(list: *const Node) {
  unsafe {
    let mut current = list;
    while !current.is_null() {
      println!("{}", (*current).data);
      current = (*current).next;
    }
  }
}

fn main() -> ExitCode {
  env_logger::init();

  let mut heap = Heap::new(Sbrk::new());

  unsafe {
    let things = heap.allocate(5 * mem::size_of::<i32>()) as *mut i32;
    if things.is_null() {
      eprintln!("Failed to allocate memory");
      return ExitCode::FAILURE;
    }
    for (i, value) in [5, 10, 20, 30, 40].into_iter().enumerate() {
      things.add(i).write(value);
    }
    println!("{}", *things);

    let other_things = heap.allocate(5 * mem::size_of::<i32>()) as *mut i32;
    if other_things.is_null() {
      eprintln!("Failed to allocate memory");
      return ExitCode::FAILURE;
    }
    other_things.write(5);
    println!("{}", *other_things);

    heap.release(things as *mut u8);
    heap.release(other_things as *mut u8);

    let mut list = list_new(&mut heap, 5);
    if list.is_null() {
      eprintln!("Failed to allocate memory");
      return ExitCode::FAILURE;
    }
    for data in [10, 20, 30, 40] {
      if !list_add(&mut heap, list, data) {
        eprintln!("Failed to allocate memory");
        return ExitCode::FAILURE;
      }
    }
    list_print_all(list);

    if !list_remove(&mut heap, &mut list, 0) {
      eprintln!("Failed to remove element");
      return ExitCode::FAILURE;
    }
    list_print_all(list);
    list_remove_all(&mut heap, list);

    let more_things = heap.allocate_zeroed(10, mem::size_of::<i32>()) as *mut i32;
    if more_things.is_null() {
      eprintln!("Failed to allocate memory");
      return ExitCode::FAILURE;
    }
    for i in (0..10).filter(|i| *i != 5) {
      more_things.add(i).write(i as i32 * 10);
    }
    for i in 0..10 {
      println!("{}", *more_things.add(i));
    }

    let bigger_things = heap.resize(more_things as *mut u8, 20 * mem::size_of::<i32>()) as *mut i32;
    if bigger_things.is_null() {
      eprintln!("Failed to allocate memory");
      return ExitCode::FAILURE;
    }
    for i in 10..20 {
      bigger_things.add(i).write(i as i32 * 10);
    }
    for i in 0..20 {
      println!("{}", *bigger_things.add(i));
    }

    // the pre-resize pointer already reads as released; this is a no-op
    heap.release(more_things as *mut u8);
    heap.release(bigger_things as *mut u8);
  }

  let stats = heap.stats();
  println!(
    "arena grew {} times, {} bytes; {} free blocks",
    stats.grow_calls,
    stats.arena_bytes,
    heap.free_blocks().count()
  );

  ExitCode::SUCCESS
}
