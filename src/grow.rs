//! Sources of fresh arena memory.
//!
//! The heap never gives memory back, so a grower only has to hand out new,
//! never-before-seen spans. [`Sbrk`] moves the program break; [`Region`] carves
//! spans out of a fixed buffer it owns, which gives each heap an independent
//! arena with a hard capacity.

use std::{io, ptr::NonNull};

use libc::{c_void, intptr_t, sbrk};
use log::debug;
use thiserror::Error;

use crate::align::{ALIGNMENT, padding_for};

#[derive(Debug, Error)]
pub enum GrowError {
  #[error("arena request of {requested} bytes does not fit in the address space")]
  Overflow { requested: usize },
  #[error("operating system refused to extend the program break by {requested} bytes")]
  Os {
    requested: usize,
    #[source]
    source: io::Error,
  },
  #[error("region exhausted: requested {requested} bytes, {remaining} remaining")]
  Exhausted { requested: usize, remaining: usize },
}

/// Extends the arena a heap allocates from.
pub trait ArenaGrower {
  /// Returns the start of `bytes` fresh bytes.
  ///
  /// Implementations must return an address aligned to [`ALIGNMENT`] that
  /// stays valid and unused by anyone else for the life of the grower.
  /// `bytes` is always a multiple of [`ALIGNMENT`].
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, GrowError>;
}

/// Grows the arena by moving the program break with `sbrk(2)`.
///
/// ```text
///   before:  ... ──────────┤ break
///   after:   ... ──────────┼──pad──┼──────── bytes ────────┤ break
///                                  ▲
///                                  └── returned address
/// ```
///
/// `pad` is only non-zero when something else left the break unaligned.
#[derive(Debug, Default)]
pub struct Sbrk {
  _private: (),
}

impl Sbrk {
  pub const fn new() -> Self {
    Self { _private: () }
  }

  /// Current program break.
  pub fn program_break() -> *mut c_void {
    unsafe { sbrk(0) }
  }
}

impl ArenaGrower for Sbrk {
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, GrowError> {
    let current = Self::program_break() as usize;
    let pad = padding_for(current);

    let total = bytes
      .checked_add(pad)
      .filter(|total| *total <= intptr_t::MAX as usize)
      .ok_or(GrowError::Overflow { requested: bytes })?;

    let address = unsafe { sbrk(total as intptr_t) };

    if address == usize::MAX as *mut c_void {
      return Err(GrowError::Os {
        requested: total,
        source: io::Error::last_os_error(),
      });
    }

    debug!(
      "sbrk: extended break by {} bytes (pad {}), break = {:?}",
      total,
      pad,
      Self::program_break()
    );

    let start = (address as *mut u8).wrapping_add(padding_for(address as usize));
    NonNull::new(start).ok_or(GrowError::Overflow { requested: bytes })
  }
}

#[derive(Clone, Copy)]
#[repr(C, align(16))]
struct Chunk([u8; ALIGNMENT]);

/// A fixed-capacity arena owned by the grower.
///
/// Spans are handed out front to back, so consecutive spans are contiguous
/// just like consecutive `sbrk` calls. Once `capacity` is used up every
/// request fails with [`GrowError::Exhausted`].
pub struct Region {
  base: NonNull<Chunk>,
  chunks: usize,
  used: usize,
}

impl Region {
  /// Reserves `capacity` bytes, rounded down to [`ALIGNMENT`].
  pub fn with_capacity(capacity: usize) -> Self {
    let chunks = capacity / ALIGNMENT;
    let buffer: Box<[Chunk]> = vec![Chunk([0; ALIGNMENT]); chunks].into_boxed_slice();
    let base = NonNull::from(Box::leak(buffer)).cast::<Chunk>();

    Self {
      base,
      chunks,
      used: 0,
    }
  }

  pub fn capacity(&self) -> usize {
    self.chunks * ALIGNMENT
  }

  pub fn used(&self) -> usize {
    self.used
  }

  /// Address of the first byte of the region.
  pub fn base(&self) -> usize {
    self.base.as_ptr() as usize
  }
}

impl ArenaGrower for Region {
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, GrowError> {
    let remaining = self.capacity() - self.used;

    if bytes > remaining {
      return Err(GrowError::Exhausted {
        requested: bytes,
        remaining,
      });
    }

    let start = unsafe { self.base.cast::<u8>().add(self.used) };
    self.used += bytes;

    debug!(
      "region: handed out {} bytes at {:?}, {} of {} used",
      bytes,
      start,
      self.used,
      self.capacity()
    );

    Ok(start)
  }
}

impl Drop for Region {
  fn drop(&mut self) {
    let slice = std::ptr::slice_from_raw_parts_mut(self.base.as_ptr(), self.chunks);
    drop(unsafe { Box::from_raw(slice) });
  }
}
