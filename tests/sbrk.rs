//! Drives the program-break grower for real. Everything lives in one test so
//! nothing else in this binary moves the break concurrently.

use std::{mem, ptr};

use nfalloc::{
  Heap, Sbrk,
  ffi::{nf_calloc, nf_free, nf_malloc, nf_realloc},
};

#[test]
fn program_break_heap() {
  let mut heap = Heap::new(Sbrk::new());

  unsafe {
    let before = Sbrk::program_break() as usize;

    let first = heap.allocate(100);
    assert!(!first.is_null());
    assert_eq!(first as usize % 16, 0);
    assert!(first as usize >= before);
    assert!(Sbrk::program_break() as usize > before);

    ptr::write_bytes(first, 0xAB, 100);
    heap.release(first);

    let again = heap.allocate(64);
    assert_eq!(again, first);
    assert_eq!(heap.stats().grow_calls, 1);

    let things = nf_malloc(5 * mem::size_of::<i32>()) as *mut i32;
    assert!(!things.is_null());
    assert_eq!(things as usize % 16, 0);
    for i in 0..5 {
      *things.add(i) = (i as i32 + 1) * 10;
    }

    let zeroed = nf_calloc(10, mem::size_of::<i32>()) as *mut i32;
    assert!(!zeroed.is_null());
    for i in 0..10 {
      assert_eq!(*zeroed.add(i), 0);
      *zeroed.add(i) = i as i32;
    }

    let bigger = nf_realloc(zeroed.cast(), 20 * mem::size_of::<i32>()) as *mut i32;
    assert!(!bigger.is_null());
    for i in 0..10 {
      assert_eq!(*bigger.add(i), i as i32);
    }

    assert!(nf_malloc(0).is_null());
    assert!(nf_calloc(1 << 40, 1 << 40).is_null());
    assert!(nf_realloc(bigger.cast(), 0).is_null());

    nf_free(bigger.cast());
    nf_free(ptr::null_mut());
    nf_free(things.cast());
    nf_free(things.cast());

    let reused = nf_malloc(5 * mem::size_of::<i32>());
    assert_eq!(reused, things.cast());
    nf_free(reused);
  }
}
