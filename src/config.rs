//! Arena sizing.

use std::sync::OnceLock;

use crate::align::Alignment;
use crate::align_up;
use crate::error::{ArenaError, ArenaResult};
use crate::region::HEADER_SIZE;

/// Fallback when the OS does not report a page size.
const FALLBACK_PAGE_SIZE: usize = 4096;

/// Size of one virtual memory page on this host.
pub fn page_size() -> usize {
  static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

  *PAGE_SIZE.get_or_init(|| {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

    if size <= 0 {
      FALLBACK_PAGE_SIZE
    } else {
      size as usize
    }
  })
}

/// Configuration for an [`Arena`](crate::Arena).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
  /// Bytes requested from the provider for every region, header included.
  pub region_size: usize,
}

impl ArenaConfig {
  pub fn new(region_size: usize) -> Self {
    Self { region_size }
  }

  /// Regions spanning `count` OS pages.
  pub fn pages(count: usize) -> Self {
    Self::new(page_size().saturating_mul(count))
  }

  /// Checks that a region of this size can host its header and at least
  /// one byte of payload.
  pub fn validate(&self) -> ArenaResult<()> {
    if self.region_size == 0 {
      return Err(ArenaError::InvalidArgument {
        reason: "region size must be positive".to_string(),
      });
    }

    if self.region_size > isize::MAX as usize {
      return Err(ArenaError::InvalidArgument {
        reason: format!("region size {} exceeds isize::MAX", self.region_size),
      });
    }

    if self.region_size <= HEADER_SIZE {
      return Err(ArenaError::FatalConfig {
        region_size: self.region_size,
        header: HEADER_SIZE,
      });
    }

    Ok(())
  }

  /// Largest payload a single region can hold.
  pub fn max_payload(&self) -> usize {
    self.region_size.saturating_sub(HEADER_SIZE)
  }

  /// Largest allocation aligned to `align` that an empty region is sure to
  /// fit, given that its block starts on a `block_align` boundary.
  ///
  /// The payload begins `HEADER_SIZE` bytes into the block, so the padding
  /// up to `align` is exact when `align <= block_align`. Past that the
  /// worst case of `align - 1` bytes is assumed.
  pub fn fresh_capacity(
    &self,
    align: Alignment,
    block_align: usize,
  ) -> usize {
    let align = align.get();
    let padding = if align <= block_align {
      align_up!(HEADER_SIZE, align) - HEADER_SIZE
    } else {
      align - 1
    };

    self.max_payload().saturating_sub(padding)
  }
}

impl Default for ArenaConfig {
  /// One page per region.
  fn default() -> Self {
    Self::pages(1)
  }
}
