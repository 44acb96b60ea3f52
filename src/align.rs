/// Boundary every pointer handed out by the heap is aligned to.
pub const ALIGNMENT: usize = 16;

/// Rounds the given size up to the next multiple of [`ALIGNMENT`].
///
/// The expression must not overflow when rounded; use [`checked_align`] for
/// sizes that come from callers.
///
/// # Examples
///
/// ```rust
/// use nfalloc::align;
///
/// assert_eq!(align!(1), 16);
/// assert_eq!(align!(16), 16);
/// assert_eq!(align!(17), 32);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::align::ALIGNMENT - 1) & !($crate::align::ALIGNMENT - 1)
  };
}

/// Rounds `size` up to [`ALIGNMENT`], or `None` if that does not fit in a
/// `usize`.
pub const fn checked_align(size: usize) -> Option<usize> {
  match size.checked_add(ALIGNMENT - 1) {
    Some(padded) => Some(padded & !(ALIGNMENT - 1)),
    None => None,
  }
}

/// Bytes needed to move `addr` forward to the next aligned address.
pub const fn padding_for(addr: usize) -> usize {
  addr.wrapping_neg() & (ALIGNMENT - 1)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_align() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (ALIGNMENT * i + 1)..=(ALIGNMENT * (i + 1));

      let expected_alignment = ALIGNMENT * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
        assert_eq!(Some(expected), checked_align(size));
      }
    }
  }

  #[test]
  fn test_checked_align_overflow() {
    assert_eq!(checked_align(0), Some(0));
    assert_eq!(checked_align(usize::MAX - ALIGNMENT + 1), Some(usize::MAX - ALIGNMENT + 1));
    assert_eq!(checked_align(usize::MAX - ALIGNMENT + 2), None);
    assert_eq!(checked_align(usize::MAX), None);
  }

  #[test]
  fn test_padding_for() {
    assert_eq!(padding_for(0), 0);
    assert_eq!(padding_for(0x1000), 0);
    assert_eq!(padding_for(0x1001), 15);
    assert_eq!(padding_for(0x100f), 1);
  }
}
