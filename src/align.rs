use std::mem;

use crate::error::{ArenaError, ArenaResult};

/// Rounds `value` up to the next multiple of `align`.
///
/// `align` must be a power of two and the sum must not overflow. Use
/// [`Alignment::align_up`] when either of those is not already known.
///
/// # Examples
///
/// ```rust
/// use rarena::align_up;
///
/// assert_eq!(align_up!(13, 8), 16);
/// assert_eq!(align_up!(24, 8), 24);
/// assert_eq!(align_up!(0x1001, 0x1000), 0x2000);
/// ```
#[macro_export]
macro_rules! align_up {
  ($value:expr, $align:expr) => {
    (($value) + ($align) - 1) & !(($align) - 1)
  };
}

/// A power-of-two alignment, validated at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Alignment(usize);

impl Alignment {
  /// Machine word alignment.
  pub const WORD: Alignment = Alignment(mem::align_of::<usize>());

  pub fn new(align: usize) -> ArenaResult<Self> {
    if !align.is_power_of_two() {
      return Err(ArenaError::InvalidArgument {
        reason: format!("alignment {align} is not a power of two"),
      });
    }

    Ok(Self(align))
  }

  /// The alignment required by `T`.
  pub const fn of<T>() -> Self {
    Self(mem::align_of::<T>())
  }

  pub const fn get(self) -> usize {
    self.0
  }

  /// Rounds `addr` up to this alignment, or `None` if that overflows.
  pub fn align_up(
    self,
    addr: usize,
  ) -> Option<usize> {
    addr.checked_add(self.0 - 1).map(|bumped| bumped & !(self.0 - 1))
  }
}

impl TryFrom<usize> for Alignment {
  type Error = ArenaError;

  fn try_from(align: usize) -> ArenaResult<Self> {
    Self::new(align)
  }
}
