//! Unordered singly linked list of free blocks.
//!
//! Blocks are pushed at the head in release order, never sorted by address,
//! so both neighbor lookups walk the whole list. The list also owns the
//! next-fit cursor because unlinking and merging are the operations that can
//! invalidate it.

use std::ptr;

use log::trace;

use crate::block::{Block, HEADER_SIZE};

pub struct FreeList {
  head: *mut Block,
  cursor: *mut Block,
}

impl FreeList {
  pub const fn new() -> Self {
    Self {
      head: ptr::null_mut(),
      cursor: ptr::null_mut(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.head.is_null()
  }

  pub fn head(&self) -> *mut Block {
    self.head
  }

  /// Where the next search starts; null when unset.
  pub fn cursor(&self) -> *mut Block {
    self.cursor
  }

  pub fn set_cursor(
    &mut self,
    block: *mut Block,
  ) {
    self.cursor = block;
  }

  /// Block visited after `block` in a circular walk.
  ///
  /// # Safety
  ///
  /// `block` must be linked into this list.
  pub unsafe fn successor(
    &self,
    block: *mut Block,
  ) -> *mut Block {
    let next = unsafe { (*block).next };
    if next.is_null() { self.head } else { next }
  }

  /// Links `block` in as the new head.
  ///
  /// # Safety
  ///
  /// `block` must be a free record that is not already linked.
  pub unsafe fn push(
    &mut self,
    block: *mut Block,
  ) {
    unsafe { (*block).next = self.head };
    self.head = block;
  }

  /// Free block whose end is `block`'s start, or null.
  ///
  /// # Safety
  ///
  /// `block` must point at a readable header.
  pub unsafe fn find_prev(
    &self,
    block: *mut Block,
  ) -> *mut Block {
    unsafe {
      let mut current = self.head;

      while !current.is_null() {
        if Block::precedes(current, block) {
          return current;
        }
        current = (*current).next;
      }

      ptr::null_mut()
    }
  }

  /// Free block that starts at `block`'s end, or null.
  ///
  /// # Safety
  ///
  /// `block` must point at a readable header.
  pub unsafe fn find_next(
    &self,
    block: *mut Block,
  ) -> *mut Block {
    unsafe {
      let mut current = self.head;

      while !current.is_null() {
        if Block::precedes(block, current) {
          return current;
        }
        current = (*current).next;
      }

      ptr::null_mut()
    }
  }

  /// Removes `block` from the list. Does nothing if it is not linked.
  ///
  /// # Safety
  ///
  /// Every block in the list must be readable.
  pub unsafe fn unlink(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      if self.cursor == block {
        self.cursor = (*block).next;
      }

      if self.head == block {
        self.head = (*block).next;
        return;
      }

      let mut current = self.head;
      while !current.is_null() {
        if (*current).next == block {
          (*current).next = (*block).next;
          return;
        }
        current = (*current).next;
      }
    }
  }

  /// Puts `new` at `old`'s position in the list. `new.next` must already
  /// carry `old`'s successor.
  ///
  /// # Safety
  ///
  /// `old` must be linked, `new` must be an unlinked free record.
  pub unsafe fn replace(
    &mut self,
    old: *mut Block,
    new: *mut Block,
  ) {
    unsafe {
      if self.cursor == old {
        self.cursor = new;
      }

      if self.head == old {
        self.head = new;
        return;
      }

      let mut current = self.head;
      while !current.is_null() {
        if (*current).next == old {
          (*current).next = new;
          return;
        }
        current = (*current).next;
      }
    }
  }

  /// Shrinks `block` to `requested` bytes and writes a free record for the
  /// rest right behind it.
  ///
  /// Returns the new record, which inherits `block`'s successor but is not
  /// linked in. Returns null without touching anything when the remainder
  /// cannot hold a record.
  ///
  /// # Safety
  ///
  /// `block` must be a free record; `requested` must be aligned.
  pub unsafe fn split(
    &mut self,
    block: *mut Block,
    requested: usize,
  ) -> *mut Block {
    unsafe {
      let size = (*block).size;

      match requested.checked_add(HEADER_SIZE) {
        Some(needed) if size >= needed => {}
        _ => return ptr::null_mut(),
      }

      let remainder = Block::at_offset(block, requested);
      Block::stamp_free(remainder, size - requested - HEADER_SIZE, (*block).next);
      (*block).size = requested;

      trace!(
        "split {:p}: {} -> {} + {} at {:p}",
        block,
        size,
        requested,
        (*remainder).size,
        remainder
      );

      remainder
    }
  }

  /// Merges `block` with the free blocks directly before and after it.
  ///
  /// Absorbed blocks leave the list. Returns the block that now covers
  /// `block`'s bytes.
  ///
  /// # Safety
  ///
  /// `block` must be a free record; every block in the list must be readable.
  pub unsafe fn coalesce(
    &mut self,
    block: *mut Block,
  ) -> *mut Block {
    unsafe {
      if block.is_null() {
        return block;
      }

      let prev = self.find_prev(block);
      let next = self.find_next(block);
      let mut merged = block;

      if !prev.is_null() {
        (*prev).size += (*block).size + HEADER_SIZE;
        self.unlink(block);

        trace!("coalesce: {:p} absorbed {:p}, size {}", prev, block, (*prev).size);
        merged = prev;
      }

      if !next.is_null() && Block::precedes(merged, next) {
        (*merged).size += (*next).size + HEADER_SIZE;
        self.unlink(next);

        trace!("coalesce: {:p} absorbed {:p}, size {}", merged, next, (*merged).size);
      }

      merged
    }
  }

  pub fn iter(&self) -> Iter<'_> {
    Iter {
      current: self.head,
      _list: self,
    }
  }
}

impl Default for FreeList {
  fn default() -> Self {
    Self::new()
  }
}

pub struct Iter<'a> {
  current: *mut Block,
  _list: &'a FreeList,
}

impl Iterator for Iter<'_> {
  type Item = *mut Block;

  fn next(&mut self) -> Option<Self::Item> {
    if self.current.is_null() {
      return None;
    }

    let block = self.current;
    self.current = unsafe { (*block).next };
    Some(block)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::{BlockState, Tag};

  #[repr(C, align(16))]
  struct Arena([u8; 1024]);

  impl Arena {
    fn new() -> Box<Self> {
      Box::new(Arena([0; 1024]))
    }
  }

  /// Lays out free records of the given payload sizes back to back.
  unsafe fn carve(
    base: *mut u8,
    sizes: &[usize],
  ) -> Vec<*mut Block> {
    let mut blocks = Vec::new();
    let mut at = base as *mut Block;

    for &size in sizes {
      unsafe {
        Block::stamp_free(at, size, ptr::null_mut());
        blocks.push(at);
        at = Block::at_offset(at, size);
      }
    }

    blocks
  }

  #[test]
  fn test_push_and_iter_order() {
    let mut arena = Arena::new();
    let mut list = FreeList::new();
    assert!(list.is_empty());

    unsafe {
      let blocks = carve(arena.0.as_mut_ptr(), &[16, 16, 16]);
      for &block in &blocks {
        list.push(block);
      }

      let order: Vec<_> = list.iter().collect();
      assert_eq!(order, vec![blocks[2], blocks[1], blocks[0]]);
      assert_eq!(list.successor(blocks[0]), blocks[2]);
    }
  }

  #[test]
  fn test_neighbor_lookup() {
    let mut arena = Arena::new();
    let mut list = FreeList::new();

    unsafe {
      let blocks = carve(arena.0.as_mut_ptr(), &[32, 16, 48]);
      list.push(blocks[0]);
      list.push(blocks[2]);

      assert_eq!(list.find_prev(blocks[1]), blocks[0]);
      assert_eq!(list.find_next(blocks[1]), blocks[2]);
      assert!(list.find_prev(blocks[0]).is_null());
      assert!(list.find_next(blocks[2]).is_null());
    }
  }

  #[test]
  fn test_unlink_retargets_cursor() {
    let mut arena = Arena::new();
    let mut list = FreeList::new();

    unsafe {
      let blocks = carve(arena.0.as_mut_ptr(), &[16, 16, 16]);
      for &block in &blocks {
        list.push(block);
      }

      list.set_cursor(blocks[1]);
      list.unlink(blocks[1]);
      assert_eq!(list.cursor(), blocks[0]);
      assert_eq!(list.iter().collect::<Vec<_>>(), vec![blocks[2], blocks[0]]);

      list.set_cursor(blocks[0]);
      list.unlink(blocks[0]);
      assert!(list.cursor().is_null());

      list.unlink(blocks[2]);
      assert!(list.is_empty());
    }
  }

  #[test]
  fn test_split() {
    let mut arena = Arena::new();
    let mut list = FreeList::new();

    unsafe {
      let blocks = carve(arena.0.as_mut_ptr(), &[128]);
      list.push(blocks[0]);

      let remainder = list.split(blocks[0], 48);
      assert!(!remainder.is_null());
      assert_eq!((*blocks[0]).size, 48);
      assert_eq!((*remainder).size, 128 - 48 - HEADER_SIZE);
      assert_eq!(Block::state(remainder), Ok(BlockState::Freed));
      assert!(Block::precedes(blocks[0], remainder));
      assert_eq!(Block::end(remainder), Block::end(blocks[0]) + HEADER_SIZE + (*remainder).size);
    }
  }

  #[test]
  fn test_split_needs_room_for_a_record() {
    let mut arena = Arena::new();
    let mut list = FreeList::new();

    unsafe {
      let blocks = carve(arena.0.as_mut_ptr(), &[64]);

      assert!(list.split(blocks[0], 64).is_null());
      assert!(list.split(blocks[0], 64 - HEADER_SIZE + 16).is_null());
      assert_eq!((*blocks[0]).size, 64);

      let remainder = list.split(blocks[0], 64 - HEADER_SIZE);
      assert!(!remainder.is_null());
      assert_eq!((*remainder).size, 0);
    }
  }

  #[test]
  fn test_coalesce_both_sides() {
    let mut arena = Arena::new();
    let mut list = FreeList::new();

    unsafe {
      let blocks = carve(arena.0.as_mut_ptr(), &[16, 32, 64, 16]);
      list.push(blocks[0]);
      list.push(blocks[2]);
      list.push(blocks[1]);
      list.set_cursor(blocks[2]);

      let merged = list.coalesce(blocks[1]);

      assert_eq!(merged, blocks[0]);
      assert_eq!((*merged).size, 16 + 32 + 64 + 2 * HEADER_SIZE);
      assert_eq!(list.iter().collect::<Vec<_>>(), vec![blocks[0]]);
      assert_eq!(list.cursor(), blocks[0]);
      assert_eq!((*merged).tag, Tag::FREED);
    }
  }

  #[test]
  fn test_coalesce_without_neighbors() {
    let mut arena = Arena::new();
    let mut list = FreeList::new();

    unsafe {
      let blocks = carve(arena.0.as_mut_ptr(), &[16, 16, 16]);
      list.push(blocks[0]);
      list.push(blocks[2]);

      // blocks[1] stays live between the two free blocks
      let live = blocks[1];
      (*live).tag = Tag::IN_USE;

      assert_eq!(list.coalesce(blocks[0]), blocks[0]);
      assert_eq!(list.coalesce(blocks[2]), blocks[2]);
      assert_eq!(list.iter().count(), 2);
    }
  }

  #[test]
  fn test_replace() {
    let mut arena = Arena::new();
    let mut list = FreeList::new();

    unsafe {
      let blocks = carve(arena.0.as_mut_ptr(), &[96, 16]);
      list.push(blocks[1]);
      list.push(blocks[0]);
      list.set_cursor(blocks[0]);

      let remainder = list.split(blocks[0], 32);
      list.replace(blocks[0], remainder);

      assert_eq!(list.iter().collect::<Vec<_>>(), vec![remainder, blocks[1]]);
      assert_eq!(list.cursor(), remainder);
    }
  }
}
