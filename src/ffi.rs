//! C entry points over one process-wide heap that grows with `sbrk`.
//!
//! The global heap has no lock. Calling these functions from more than one
//! thread, or re-entering them from a signal handler, is undefined behavior.

use std::{cell::UnsafeCell, ffi::c_void};

use crate::{grow::Sbrk, heap::Heap};

struct GlobalHeap(UnsafeCell<Heap<Sbrk>>);

// SAFETY: the entry points below are documented as single-threaded only.
unsafe impl Sync for GlobalHeap {}

static HEAP: GlobalHeap = GlobalHeap(UnsafeCell::new(Heap::new(Sbrk::new())));

/// # Safety
///
/// No other reference to the global heap may be alive.
unsafe fn global_heap() -> &'static mut Heap<Sbrk> {
  unsafe { &mut *HEAP.0.get() }
}

/// Allocates `size` bytes of uninitialized memory aligned to 16 bytes.
///
/// Returns null when `size` is zero or the program break cannot move.
///
/// # Safety
///
/// Single-threaded use only.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nf_malloc(size: usize) -> *mut c_void {
  unsafe { global_heap().allocate(size).cast() }
}

/// Allocates a zeroed array of `count` elements of `size` bytes.
///
/// Returns null if `count * size` overflows or allocation fails.
///
/// # Safety
///
/// Single-threaded use only.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nf_calloc(
  count: usize,
  size: usize,
) -> *mut c_void {
  unsafe { global_heap().allocate_zeroed(count, size).cast() }
}

/// Resizes the allocation at `ptr` to `size` bytes.
///
/// # Safety
///
/// `ptr` must be null or come from one of the `nf_*` allocation functions.
/// Single-threaded use only.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nf_realloc(
  ptr: *mut c_void,
  size: usize,
) -> *mut c_void {
  unsafe { global_heap().resize(ptr.cast(), size).cast() }
}

/// Releases the allocation at `ptr`. Null and repeated releases are ignored.
///
/// # Safety
///
/// `ptr` must be null or come from one of the `nf_*` allocation functions.
/// Single-threaded use only.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nf_free(ptr: *mut c_void) {
  unsafe { global_heap().release(ptr.cast()) }
}
