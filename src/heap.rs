use std::ptr;

use log::{error, trace, warn};

use crate::{
  align::checked_align,
  block::{Block, BlockState, Corruption, HEADER_SIZE, Tag},
  free_list::FreeList,
  grow::ArenaGrower,
};

/// Counters describing how the arena has grown.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
  /// Successful calls into the grower.
  pub grow_calls: usize,
  /// Bytes obtained from the grower, headers included.
  pub arena_bytes: usize,
}

/// Snapshot of one free-list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeSpan {
  /// Address of the block's record.
  pub start: usize,
  /// Payload bytes, record excluded.
  pub size: usize,
}

impl FreeSpan {
  /// One past the last payload byte.
  pub fn end(&self) -> usize {
    self.start + HEADER_SIZE + self.size
  }

  /// Whether `other` starts exactly where `self` ends.
  pub fn precedes(
    &self,
    other: &FreeSpan,
  ) -> bool {
    self.end() == other.start
  }
}

/// A next-fit heap over one growth-only arena.
///
/// All state lives in the value itself, so several heaps can run side by
/// side, each over its own grower. A heap is single-threaded: nothing here
/// synchronizes.
pub struct Heap<G: ArenaGrower> {
  grower: G,
  free: FreeList,
  stats: HeapStats,
}

impl<G: ArenaGrower> Heap<G> {
  pub const fn new(grower: G) -> Self {
    Self {
      grower,
      free: FreeList::new(),
      stats: HeapStats {
        grow_calls: 0,
        arena_bytes: 0,
      },
    }
  }

  pub fn stats(&self) -> HeapStats {
    self.stats
  }

  /// Walks the free list in list order.
  pub fn free_blocks(&self) -> impl Iterator<Item = FreeSpan> + '_ {
    self.free.iter().map(|block| FreeSpan {
      start: Block::start(block),
      size: unsafe { (*block).size },
    })
  }

  /// Classifies the header in front of `ptr` without acting on it.
  ///
  /// # Safety
  ///
  /// `ptr` must be non-null and have been returned by this heap.
  pub unsafe fn block_state(
    &self,
    ptr: *mut u8,
  ) -> Result<BlockState, Corruption> {
    unsafe { Block::state(Block::from_payload(ptr)) }
  }

  /// Allocates `size` bytes, aligned to 16.
  ///
  /// Returns null for a zero-byte request or when the arena cannot grow.
  ///
  /// # Safety
  ///
  /// Memory previously handed out by this heap must not have been written
  /// past its bounds.
  pub unsafe fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    if size == 0 {
      return ptr::null_mut();
    }

    let Some(size) = checked_align(size) else {
      warn!("allocate({}): size overflows alignment", size);
      return ptr::null_mut();
    };

    unsafe {
      if self.free.is_empty() {
        self.free.set_cursor(ptr::null_mut());
        return self.grow(size);
      }

      let found = self.find_fit(size);
      if !found.is_null() {
        return found;
      }

      self.grow(size)
    }
  }

  /// Next-fit scan: one full circuit of the list starting at the cursor.
  unsafe fn find_fit(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    unsafe {
      let start = if self.free.cursor().is_null() {
        self.free.head()
      } else {
        self.free.cursor()
      };

      let mut current = start;

      loop {
        if (*current).size >= size {
          return self.take(current, size);
        }

        current = self.free.successor(current);
        if current == start {
          return ptr::null_mut();
        }
      }
    }
  }

  /// Hands out `block`, splitting off what `size` does not need.
  unsafe fn take(
    &mut self,
    block: *mut Block,
    size: usize,
  ) -> *mut u8 {
    unsafe {
      let remainder = self.free.split(block, size);

      if remainder.is_null() {
        let next = (*block).next;
        self.free.unlink(block);
        self.free.set_cursor(next);
        let capacity = (*block).size;
        trace!("allocate({}): reused {:p} whole, capacity {}", size, block, capacity);
        return Block::stamp_in_use(block, capacity);
      }

      self.free.replace(block, remainder);
      self.free.set_cursor(remainder);

      trace!("allocate({}): carved {:p}, remainder at {:p}", size, block, remainder);
      Block::stamp_in_use(block, size)
    }
  }

  /// Asks the grower for a fresh block of `size` payload bytes.
  unsafe fn grow(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    let Some(total) = size.checked_add(HEADER_SIZE) else {
      warn!("allocate({}): request does not fit in the address space", size);
      return ptr::null_mut();
    };

    match self.grower.extend(total) {
      Ok(start) => {
        self.stats.grow_calls += 1;
        self.stats.arena_bytes += total;

        let payload = unsafe { Block::stamp_in_use(start.as_ptr() as *mut Block, size) };
        trace!("allocate({}): grew arena, block at {:p}", size, start);
        payload
      }
      Err(err) => {
        warn!("allocate({}): {}", size, err);
        ptr::null_mut()
      }
    }
  }

  /// Allocates room for `count` elements of `element_size` bytes and zeroes
  /// it. Returns null if the product overflows or allocation fails.
  ///
  /// # Safety
  ///
  /// Same as [`Heap::allocate`].
  pub unsafe fn allocate_zeroed(
    &mut self,
    count: usize,
    element_size: usize,
  ) -> *mut u8 {
    let Some(size) = count.checked_mul(element_size) else {
      warn!("allocate_zeroed({}, {}): size overflows", count, element_size);
      return ptr::null_mut();
    };

    unsafe {
      let address = self.allocate(size);

      if !address.is_null() {
        ptr::write_bytes(address, 0, size);
      }

      address
    }
  }

  /// Returns the block behind `address` to the free list.
  ///
  /// Null is ignored, so is a second release of the same pointer. A header
  /// that is neither live nor freed aborts the process.
  ///
  /// # Safety
  ///
  /// `address` must be null or have been returned by this heap.
  pub unsafe fn release(
    &mut self,
    address: *mut u8,
  ) {
    if address.is_null() {
      return;
    }

    unsafe {
      let block = Block::from_payload(address);

      match Block::state(block) {
        Ok(BlockState::InUse { size }) => {
          Block::stamp_free(block, size, ptr::null_mut());
          self.free.push(block);
          let merged = self.free.coalesce(block);
          trace!("release({:p}): {} bytes, merged into {:p}", address, size, merged);
        }
        Ok(BlockState::Freed) => {
          warn!("release({:p}): block already released, ignoring", address);
        }
        Err(corruption) => abort_on(corruption),
      }
    }
  }

  /// Resizes the allocation at `address` to `new_size` bytes.
  ///
  /// Shrinking, or growing within the block's capacity, keeps the pointer.
  /// Growing past it moves the data to a new block. The old block is marked
  /// released but is not put back on the free list, so its bytes stay out of
  /// circulation.
  ///
  /// # Safety
  ///
  /// `address` must be null or have been returned by this heap.
  pub unsafe fn resize(
    &mut self,
    address: *mut u8,
    new_size: usize,
  ) -> *mut u8 {
    unsafe {
      if address.is_null() {
        return self.allocate(new_size);
      }

      if new_size == 0 {
        self.release(address);
        return ptr::null_mut();
      }

      let block = Block::from_payload(address);

      let size = match Block::state(block) {
        Ok(BlockState::InUse { size }) => size,
        Ok(BlockState::Freed) => return self.allocate(new_size),
        Err(corruption) => abort_on(corruption),
      };

      if new_size <= size {
        return address;
      }

      let moved = self.allocate(new_size);
      if moved.is_null() {
        return moved;
      }

      ptr::copy_nonoverlapping(address, moved, size);
      (*block).tag = Tag::FREED;

      warn!(
        "resize({:p}, {}): moved to {:p}, {} old bytes not reclaimed",
        address, new_size, moved, size
      );

      moved
    }
  }
}

/// Reports a corrupted header and terminates the process.
fn abort_on(corruption: Corruption) -> ! {
  error!("{}", corruption);
  eprintln!("nfalloc: {corruption}, aborting");
  std::process::abort()
}
