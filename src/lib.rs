//! # nfalloc - A Next-Fit Free-List Allocator
//!
//! This crate provides a general-purpose heap allocator that hands out memory
//! from a single, growth-only arena. The arena is extended with `sbrk(2)` (or
//! carved from a private fixed-size region) and is never given back; freed
//! blocks are recycled through a free list instead.
//!
//! ## Overview
//!
//! ```text
//!   Arena after a few allocations and releases:
//!
//!   ┌────────┬──────────┬────────┬───────────────┬────────┬──────────┐
//!   │ live A │  free F1 │ live B │    free F2    │ live C │ free F3  │
//!   └────────┴──────────┴────────┴───────────────┴────────┴──────────┘
//!                 ▲                     ▲                      ▲
//!                 │                     │                      │
//!   head ──► F3 ──┼──────────► F1 ──────┼─────────► F2 ──► null
//!                                       │
//!                                    cursor (next search starts here)
//! ```
//!
//! - **Allocation** scans the free list circularly, starting where the
//!   previous search stopped (next-fit). A block that is large enough is
//!   split when the rest can hold a free record, otherwise handed out whole.
//!   Only when a full circuit finds nothing does the arena grow.
//! - **Release** pushes the block onto the list head and merges it with the
//!   free blocks directly before and after it in memory, so no two free
//!   blocks are ever adjacent.
//!
//! ## Crate Structure
//!
//! ```text
//!   nfalloc
//!   ├── align      - ALIGNMENT, align! and checked rounding
//!   ├── block      - Header / free-record layout (internal)
//!   ├── free_list  - Neighbor lookup, unlink, split, coalesce (internal)
//!   ├── grow       - ArenaGrower trait, Sbrk and Region growers
//!   ├── heap       - Heap: allocate, allocate_zeroed, resize, release
//!   └── ffi        - nf_malloc / nf_calloc / nf_realloc / nf_free
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use nfalloc::{Heap, Region};
//!
//! let mut heap = Heap::new(Region::with_capacity(64 * 1024));
//!
//! unsafe {
//!   let ptr = heap.allocate(8) as *mut u64;
//!   assert_eq!(ptr as usize % 16, 0);
//!
//!   *ptr = 42;
//!   assert_eq!(*ptr, 42);
//!
//!   heap.release(ptr as *mut u8);
//! }
//! ```
//!
//! ## Failure Behavior
//!
//! - Running out of arena yields a null pointer.
//! - Releasing the same pointer twice is silently ignored.
//! - A header whose integrity tag is neither "live" nor "freed" means the
//!   heap is corrupted: the allocator prints a diagnostic and aborts.
//! - Growing a block with [`Heap::resize`] moves it and does not put the old
//!   block back on the free list.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives
//! - **Growth only**: Memory is never returned to the OS
//! - **Unix-only**: The [`Sbrk`] grower requires `libc` and `sbrk`

pub mod align;
mod block;
mod free_list;
pub mod ffi;
mod grow;
mod heap;

pub use block::{BlockState, Corruption, HEADER_SIZE};
pub use grow::{ArenaGrower, GrowError, Region, Sbrk};
pub use heap::{FreeSpan, Heap, HeapStats};
