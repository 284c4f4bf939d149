use std::mem;
use std::ptr::NonNull;

use crate::align::Alignment;
use crate::provider::Block;

/// Bytes the [`Region`] record occupies at the front of every block.
pub const HEADER_SIZE: usize = mem::size_of::<Region>();

/// One contiguous byte range with a forward-only bump cursor.
///
/// `free` is kept as an offset from `begin`, so `begin <= begin + free <=
/// begin + cap` always holds and `free` never decreases.
#[repr(C)]
#[derive(Debug)]
pub struct Region {
  cap: usize,
  free: usize,
  begin: NonNull<u8>,
}

impl Region {
  /// A region managing `cap` bytes starting at `begin`.
  ///
  /// The region only does address arithmetic; pointers it returns are
  /// meaningful only if `begin..begin + cap` is memory the caller owns.
  pub fn new(
    cap: usize,
    begin: NonNull<u8>,
  ) -> Self {
    Self { cap, free: 0, begin }
  }

  /// Offset from `begin` where a `size` byte allocation aligned to `align`
  /// would start, if it fits.
  fn fit(
    &self,
    size: usize,
    align: Alignment,
  ) -> Option<usize> {
    let begin = self.begin.as_ptr() as usize;
    let start = align.align_up(begin.checked_add(self.free)?)? - begin;
    let end = start.checked_add(size)?;

    (end <= self.cap).then_some(start)
  }

  pub fn has_space(
    &self,
    size: usize,
    align: Alignment,
  ) -> bool {
    self.fit(size, align).is_some()
  }

  /// Bumps the cursor past a `size` byte allocation aligned to `align`.
  ///
  /// `None` means the region is too full for this request; the cursor is
  /// left where it was.
  pub fn alloc(
    &mut self,
    size: usize,
    align: Alignment,
  ) -> Option<NonNull<u8>> {
    let start = self.fit(size, align)?;
    self.free = start + size;

    NonNull::new(self.begin.as_ptr().wrapping_add(start))
  }

  pub fn begin(&self) -> NonNull<u8> {
    self.begin
  }

  /// Address of the next free byte.
  pub fn free_addr(&self) -> usize {
    self.begin.as_ptr() as usize + self.free
  }

  pub fn capacity(&self) -> usize {
    self.cap
  }

  pub fn used(&self) -> usize {
    self.free
  }

  pub fn remaining(&self) -> usize {
    self.cap - self.free
  }
}

/// A [`Region`] living at the start of the block whose remaining bytes it
/// manages.
///
/// ```text
///   ┌──────────────┬───────────────────────────────────────────┐
///   │ Region       │ payload: block.size() - HEADER_SIZE bytes │
///   │ HEADER_SIZE  │                                           │
///   └──────────────┴───────────────────────────────────────────┘
///   ▲              ▲
///   block          region.begin
/// ```
#[derive(Debug)]
pub(crate) struct MappedRegion {
  block: Block,
}

impl MappedRegion {
  /// Writes a fresh region header into `block`.
  ///
  /// A block no larger than [`HEADER_SIZE`] or not aligned for `Region` is
  /// given back untouched.
  pub(crate) fn install(block: Block) -> Result<Self, Block> {
    if block.size() <= HEADER_SIZE || block.as_ptr() as usize % mem::align_of::<Region>() != 0 {
      return Err(block);
    }

    unsafe {
      let base = block.as_non_null();
      let region = Region::new(block.size() - HEADER_SIZE, base.add(HEADER_SIZE));
      base.cast::<Region>().write(region);
    }

    Ok(Self { block })
  }

  pub(crate) fn region(&self) -> &Region {
    unsafe { self.block.as_non_null().cast::<Region>().as_ref() }
  }

  pub(crate) fn region_mut(&mut self) -> &mut Region {
    unsafe { self.block.as_non_null().cast::<Region>().as_mut() }
  }

  pub(crate) fn into_block(self) -> Block {
    self.block
  }
}
