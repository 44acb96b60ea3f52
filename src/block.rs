//! Metadata prefix shared by live allocations and free-list records.
//!
//! Every block in the arena starts with one [`Block`]. While the block is
//! handed out it is read as a header (`size` + `tag`); once released the same
//! bytes are read as a free-list record (`size` + `next`). The `tag` stays in
//! place across both views so a second release of the same pointer is still
//! recognised after the block joined the free list.
//!
//! ```text
//!   block start                      payload (returned pointer)
//!   ▼                                ▼
//!   ┌────────┬────────┬─────────────┬──────────────────────────┐
//!   │ size   │ tag    │ next        │  size bytes              │
//!   └────────┴────────┴─────────────┴──────────────────────────┘
//!   ◄────────── HEADER_SIZE ────────►
//! ```
//!
//! All pointer arithmetic over block addresses lives in this module.

use std::{fmt, mem, ptr};

use thiserror::Error;

#[repr(C, align(16))]
pub struct Block {
  pub size: usize,
  pub tag: Tag,
  pub next: *mut Block,
}

/// Overhead in front of every payload. Also the smallest span a free record
/// can occupy.
pub const HEADER_SIZE: usize = mem::size_of::<Block>();

/// Integrity marker stored in every block header.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Tag(pub u32);

impl Tag {
  pub const IN_USE: Tag = Tag(0x1A11_0CED);
  pub const FREED: Tag = Tag(0xF2EE_B10C);
}

impl fmt::Debug for Tag {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match *self {
      Tag::IN_USE => f.write_str("Tag::IN_USE"),
      Tag::FREED => f.write_str("Tag::FREED"),
      Tag(raw) => write!(f, "Tag({raw:#010x})"),
    }
  }
}

/// What a header says about the block behind a caller's pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
  InUse { size: usize },
  Freed,
}

/// A header whose tag is neither [`Tag::IN_USE`] nor [`Tag::FREED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("heap corruption at {addr:#x}: integrity tag {tag:#010x} is neither in-use nor freed")]
pub struct Corruption {
  pub addr: usize,
  pub tag: u32,
}

impl Block {
  /// Stamps a live header at `at` and returns the payload pointer behind it.
  ///
  /// # Safety
  ///
  /// `at` must be aligned and valid for writes of `HEADER_SIZE + size` bytes.
  pub unsafe fn stamp_in_use(
    at: *mut Block,
    size: usize,
  ) -> *mut u8 {
    unsafe {
      at.write(Block {
        size,
        tag: Tag::IN_USE,
        next: ptr::null_mut(),
      });
      Self::payload(at)
    }
  }

  /// Stamps a free-list record at `at`.
  ///
  /// # Safety
  ///
  /// `at` must be aligned and valid for writes of `HEADER_SIZE` bytes.
  pub unsafe fn stamp_free(
    at: *mut Block,
    size: usize,
    next: *mut Block,
  ) {
    unsafe {
      at.write(Block {
        size,
        tag: Tag::FREED,
        next,
      });
    }
  }

  /// # Safety
  ///
  /// `block` must point at a block header inside the arena.
  pub unsafe fn payload(block: *mut Block) -> *mut u8 {
    unsafe { (block as *mut u8).add(HEADER_SIZE) }
  }

  /// # Safety
  ///
  /// `payload` must have been produced by [`Block::payload`].
  pub unsafe fn from_payload(payload: *mut u8) -> *mut Block {
    unsafe { payload.sub(HEADER_SIZE) as *mut Block }
  }

  /// Address of the block's first byte.
  pub fn start(block: *const Block) -> usize {
    block as usize
  }

  /// Address one past the block's last payload byte.
  ///
  /// # Safety
  ///
  /// `block` must point at a readable block header.
  pub unsafe fn end(block: *const Block) -> usize {
    unsafe { block as usize + HEADER_SIZE + (*block).size }
  }

  /// Whether `first` ends exactly where `second` starts.
  ///
  /// # Safety
  ///
  /// `first` must point at a readable block header.
  pub unsafe fn precedes(
    first: *const Block,
    second: *const Block,
  ) -> bool {
    unsafe { Self::end(first) == Self::start(second) }
  }

  /// Address of the block that starts `offset` payload bytes into `block`.
  ///
  /// # Safety
  ///
  /// `block` must span at least `offset + HEADER_SIZE` payload bytes.
  pub unsafe fn at_offset(
    block: *mut Block,
    offset: usize,
  ) -> *mut Block {
    unsafe { (block as *mut u8).add(HEADER_SIZE + offset) as *mut Block }
  }

  /// Reads and classifies the header at `block`.
  ///
  /// # Safety
  ///
  /// `block` must be readable for `HEADER_SIZE` bytes.
  pub unsafe fn state(block: *const Block) -> Result<BlockState, Corruption> {
    unsafe {
      match (*block).tag {
        Tag::IN_USE => Ok(BlockState::InUse { size: (*block).size }),
        Tag::FREED => Ok(BlockState::Freed),
        Tag(tag) => Err(Corruption {
          addr: block as usize,
          tag,
        }),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::align::ALIGNMENT;

  #[repr(align(16))]
  struct Scratch([u8; 256]);

  #[test]
  fn test_header_keeps_alignment() {
    assert_eq!(HEADER_SIZE % ALIGNMENT, 0);
    assert!(HEADER_SIZE >= mem::size_of::<usize>() * 2);
  }

  #[test]
  fn test_stamp_and_classify() {
    let mut scratch = Scratch([0; 256]);
    let block = scratch.0.as_mut_ptr() as *mut Block;

    unsafe {
      let payload = Block::stamp_in_use(block, 64);
      assert_eq!(payload as usize - block as usize, HEADER_SIZE);
      assert_eq!(Block::from_payload(payload), block);
      assert_eq!(Block::state(block), Ok(BlockState::InUse { size: 64 }));
      assert_eq!(Block::end(block), block as usize + HEADER_SIZE + 64);

      Block::stamp_free(block, 64, ptr::null_mut());
      assert_eq!(Block::state(block), Ok(BlockState::Freed));

      (*block).tag = Tag(0xDEAD_BEEF);
      assert_eq!(
        Block::state(block),
        Err(Corruption {
          addr: block as usize,
          tag: 0xDEAD_BEEF,
        })
      );
    }
  }

  #[test]
  fn test_adjacency() {
    let mut scratch = Scratch([0; 256]);
    let first = scratch.0.as_mut_ptr() as *mut Block;

    unsafe {
      Block::stamp_free(first, 32, ptr::null_mut());
      let second = Block::at_offset(first, 32);
      Block::stamp_free(second, 16, ptr::null_mut());

      assert!(Block::precedes(first, second));
      assert!(!Block::precedes(second, first));
    }
  }

  #[test]
  fn test_corruption_message() {
    let err = Corruption { addr: 0x1000, tag: 0 };
    assert_eq!(
      err.to_string(),
      "heap corruption at 0x1000: integrity tag 0x00000000 is neither in-use nor freed"
    );
  }
}
