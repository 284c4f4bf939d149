use std::alloc::Layout;
use std::mem;
use std::ptr::NonNull;

use log::{debug, trace};

use crate::align::Alignment;
use crate::config::ArenaConfig;
use crate::error::{ArenaError, ArenaResult};
use crate::provider::{BackingProvider, MmapProvider};
use crate::region::{MappedRegion, Region};

/// Lifecycle of an [`Arena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArenaState {
  Uninitialized,
  Active,
  Released,
}

/// Point-in-time usage figures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
  pub region_count: usize,
  /// Bytes held from the provider, headers included.
  pub reserved_bytes: usize,
  /// Bytes consumed by allocations, alignment padding included.
  pub used_bytes: usize,
}

/// A growable chain of regions behind a single bump-allocation surface.
///
/// Allocation only ever happens in the newest region. When it cannot fit a
/// request a new region is acquired and the old one is never looked at
/// again. Everything is returned to the provider at once by
/// [`release`](Arena::release) or on drop.
pub struct Arena<P: BackingProvider = MmapProvider> {
  provider: P,
  regions: Vec<MappedRegion>,
  current: Option<usize>,
  config: ArenaConfig,
  state: ArenaState,
}

impl Arena<MmapProvider> {
  /// An active arena whose regions are `region_size` byte mappings.
  pub fn new(region_size: usize) -> ArenaResult<Self> {
    Self::new_in(region_size, MmapProvider)
  }

  pub fn with_config(config: ArenaConfig) -> ArenaResult<Self> {
    let mut arena = Self::with_provider(MmapProvider);
    arena.init_with(config)?;
    Ok(arena)
  }
}

impl<P: BackingProvider> Arena<P> {
  /// An uninitialized arena; call [`init`](Arena::init) before allocating.
  pub fn with_provider(provider: P) -> Self {
    Self {
      provider,
      regions: Vec::new(),
      current: None,
      config: ArenaConfig::new(0),
      state: ArenaState::Uninitialized,
    }
  }

  /// An active arena drawing its regions from `provider`.
  pub fn new_in(
    region_size: usize,
    provider: P,
  ) -> ArenaResult<Self> {
    let mut arena = Self::with_provider(provider);
    arena.init(region_size)?;
    Ok(arena)
  }

  /// Acquires the first region and makes the arena active.
  ///
  /// An already active arena is released first, but only once
  /// `region_size` has been validated. On error the arena is left as it
  /// was before the call, apart from that release.
  pub fn init(
    &mut self,
    region_size: usize,
  ) -> ArenaResult<()> {
    self.init_with(ArenaConfig::new(region_size))
  }

  /// [`init`](Arena::init) from a full configuration.
  pub fn init_with(
    &mut self,
    config: ArenaConfig,
  ) -> ArenaResult<()> {
    config.validate()?;

    if self.state == ArenaState::Active {
      self.release();
    }

    let first = self.acquire_region(config.region_size)?;
    self.regions.push(first);
    self.current = Some(0);
    self.config = config;
    self.state = ArenaState::Active;

    debug!(
      "arena initialized: region_size = {}, payload = {} bytes",
      self.config.region_size,
      self.max_payload()
    );

    Ok(())
  }

  /// Allocates `size` bytes aligned to `align`.
  ///
  /// The memory is zero-filled on first use and stays valid until the
  /// arena is released or dropped.
  pub fn alloc(
    &mut self,
    size: usize,
    align: usize,
  ) -> ArenaResult<NonNull<u8>> {
    let current = match (self.state, self.current) {
      (ArenaState::Active, Some(current)) => current,
      (ArenaState::Uninitialized, _) => return Err(ArenaError::Uninitialized),
      _ => return Err(ArenaError::UseAfterRelease),
    };

    let align = Alignment::new(align)?;
    let fresh_capacity = self.config.fresh_capacity(align, self.provider.block_align());

    if size > fresh_capacity {
      return Err(ArenaError::AllocationTooLarge {
        requested: size,
        align: align.get(),
        max: fresh_capacity,
      });
    }

    if let Some(ptr) = self.regions[current].region_mut().alloc(size, align) {
      trace!("allocated {size} bytes (align {}) in region {current} at {ptr:p}", align.get());
      return Ok(ptr);
    }

    let mut fresh = self.acquire_region(self.config.region_size)?;
    let Some(ptr) = fresh.region_mut().alloc(size, align) else {
      self.provider.release(fresh.into_block());
      return Err(ArenaError::AllocationTooLarge {
        requested: size,
        align: align.get(),
        max: fresh_capacity,
      });
    };

    self.regions.push(fresh);
    let current = self.regions.len() - 1;
    self.current = Some(current);

    trace!("allocated {size} bytes (align {}) in region {current} at {ptr:p}", align.get());

    Ok(ptr)
  }

  /// Allocates memory fitting `layout`.
  pub fn alloc_layout(
    &mut self,
    layout: Layout,
  ) -> ArenaResult<NonNull<u8>> {
    self.alloc(layout.size(), layout.align())
  }

  /// Returns every region to the provider.
  ///
  /// Pointers handed out by [`alloc`](Arena::alloc) dangle afterwards.
  /// Calling this on an uninitialized or already released arena does
  /// nothing.
  pub fn release(&mut self) {
    if self.state != ArenaState::Active {
      return;
    }

    let count = self.regions.len();
    for mapped in self.regions.drain(..) {
      self.provider.release(mapped.into_block());
    }

    self.current = None;
    self.state = ArenaState::Released;

    debug!("arena released {count} regions of {} bytes", self.config.region_size);
  }

  pub fn state(&self) -> ArenaState {
    self.state
  }

  pub fn region_count(&self) -> usize {
    self.regions.len()
  }

  pub fn region_size(&self) -> usize {
    self.config.region_size
  }

  pub fn config(&self) -> &ArenaConfig {
    &self.config
  }

  /// Largest single allocation a region of this arena can ever hold.
  pub fn max_payload(&self) -> usize {
    self.config.max_payload()
  }

  pub fn stats(&self) -> ArenaStats {
    ArenaStats {
      region_count: self.regions.len(),
      reserved_bytes: self.regions.len() * self.config.region_size,
      used_bytes: self.regions.iter().map(|mapped| mapped.region().used()).sum(),
    }
  }

  pub fn provider(&self) -> &P {
    &self.provider
  }

  /// Acquires a block and installs a region in it.
  ///
  /// The provider's block is checked for size and alignment before
  /// anything is written to it; a bad block goes straight back.
  fn acquire_region(
    &mut self,
    region_size: usize,
  ) -> ArenaResult<MappedRegion> {
    let block = self.provider.acquire(region_size)?;
    let align = self.provider.block_align().max(mem::align_of::<Region>());
    let addr = block.as_ptr() as usize;

    let installed = if block.size() >= region_size && addr % align == 0 {
      MappedRegion::install(block)
    } else {
      Err(block)
    };

    match installed {
      Ok(mapped) => {
        debug!(
          "acquired region {} ({region_size} bytes) at 0x{addr:x}",
          self.regions.len()
        );
        Ok(mapped)
      }
      Err(block) => {
        let size = block.size();
        self.provider.release(block);
        Err(ArenaError::BadBlock {
          addr,
          size,
          required: region_size,
          align,
        })
      }
    }
  }
}

impl<P: BackingProvider + Default> Default for Arena<P> {
  fn default() -> Self {
    Self::with_provider(P::default())
  }
}

impl<P: BackingProvider> Drop for Arena<P> {
  fn drop(&mut self) {
    self.release();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::align_up;
  use crate::provider::{Block, HeapProvider};
  use crate::region::HEADER_SIZE;
  use proptest::prelude::*;

  /// Heap-backed provider that can be told to fail and counts its traffic.
  #[derive(Default)]
  struct Tally {
    inner: HeapProvider,
    acquired: usize,
    released: usize,
    fail_after: Option<usize>,
  }

  impl BackingProvider for Tally {
    fn block_align(&self) -> usize {
      self.inner.block_align()
    }

    fn acquire(
      &mut self,
      size: usize,
    ) -> ArenaResult<Block> {
      if self.fail_after.is_some_and(|limit| self.acquired >= limit) {
        return Err(ArenaError::OutOfMemory {
          requested: size,
          source: std::io::Error::from(std::io::ErrorKind::OutOfMemory),
        });
      }

      self.acquired += 1;
      self.inner.acquire(size)
    }

    fn release(
      &mut self,
      block: Block,
    ) {
      self.released += 1;
      self.inner.release(block);
    }
  }

  fn tiny_arena() -> Arena<Tally> {
    Arena::new_in(HEADER_SIZE + 8, Tally::default()).unwrap()
  }

  #[test]
  fn test_concrete_scenario() {
    let mut arena = tiny_arena();
    assert_eq!(arena.region_count(), 1);

    arena.alloc(5, 8).unwrap();
    assert_eq!(arena.region_count(), 1);
    assert_eq!(arena.stats().used_bytes, 5);

    arena.alloc(5, 8).unwrap();
    assert_eq!(arena.region_count(), 2);

    assert!(matches!(
      arena.alloc(9, 16),
      Err(ArenaError::AllocationTooLarge { requested: 9, align: 16, .. })
    ));
    assert_eq!(arena.region_count(), 2);

    arena.release();
    assert_eq!(arena.region_count(), 0);
    assert!(matches!(arena.alloc(2, 2), Err(ArenaError::UseAfterRelease)));
  }

  #[test]
  fn test_every_block_released_once() {
    let mut arena = tiny_arena();
    for _ in 0..10 {
      arena.alloc(8, 1).unwrap();
    }
    assert_eq!(arena.region_count(), 10);

    arena.release();
    arena.release();
    assert_eq!(arena.provider().acquired, 10);
    assert_eq!(arena.provider().released, 10);
    assert_eq!(arena.state(), ArenaState::Released);
  }

  #[test]
  fn test_uninitialized_arena() {
    let mut arena: Arena<Tally> = Arena::default();
    assert_eq!(arena.state(), ArenaState::Uninitialized);
    assert!(matches!(arena.alloc(1, 1), Err(ArenaError::Uninitialized)));

    arena.release();
    assert_eq!(arena.state(), ArenaState::Uninitialized);
    assert_eq!(arena.provider().released, 0);
  }

  #[test]
  fn test_reinit_after_release() {
    let mut arena = tiny_arena();
    arena.release();

    arena.init(HEADER_SIZE + 64).unwrap();
    assert_eq!(arena.state(), ArenaState::Active);
    assert_eq!(arena.region_count(), 1);
    assert_eq!(arena.max_payload(), 64);
    arena.alloc(64, 1).unwrap();
  }

  #[test]
  fn test_init_on_active_arena_releases_old_chain() {
    let mut arena = tiny_arena();
    arena.alloc(8, 1).unwrap();
    arena.alloc(8, 1).unwrap();

    assert!(matches!(arena.init(1), Err(ArenaError::FatalConfig { .. })));
    assert_eq!(arena.region_count(), 2);

    arena.init(HEADER_SIZE + 16).unwrap();
    assert_eq!(arena.region_count(), 1);
    assert_eq!(arena.provider().released, 2);
  }

  #[test]
  fn test_fatal_config() {
    let result = Arena::new_in(HEADER_SIZE, Tally::default());
    assert!(matches!(result, Err(ArenaError::FatalConfig { .. })));
  }

  #[test]
  fn test_invalid_alignment() {
    let mut arena = tiny_arena();
    assert!(matches!(arena.alloc(1, 3), Err(ArenaError::InvalidArgument { .. })));
    assert!(matches!(arena.alloc(1, 0), Err(ArenaError::InvalidArgument { .. })));
    assert_eq!(arena.stats().used_bytes, 0);
  }

  #[test]
  fn test_padding_counts_against_fresh_region() {
    let mut arena = Arena::new_in(HEADER_SIZE + 64, Tally::default()).unwrap();
    let padding = align_up!(HEADER_SIZE, 64) - HEADER_SIZE;

    let result = arena.alloc(64 - padding + 1, 64);
    match result {
      Err(ArenaError::AllocationTooLarge { requested, align, max }) => {
        assert_eq!(requested, 64 - padding + 1);
        assert_eq!(align, 64);
        assert_eq!(max, 64 - padding);
        assert!(requested > max);
      }
      other => panic!("expected AllocationTooLarge, got {other:?}"),
    }
    assert_eq!(arena.region_count(), 1);

    let ptr = arena.alloc(64 - padding, 64).unwrap();
    assert_eq!(ptr.as_ptr() as usize % 64, 0);
    assert_eq!(arena.region_count(), 1);
  }

  #[test]
  fn test_out_of_memory_leaves_arena_intact() {
    let provider = Tally {
      fail_after: Some(1),
      ..Tally::default()
    };
    let mut arena = Arena::new_in(HEADER_SIZE + 8, provider).unwrap();
    let first = arena.alloc(8, 1).unwrap();

    assert!(matches!(arena.alloc(1, 1), Err(ArenaError::OutOfMemory { .. })));
    assert_eq!(arena.region_count(), 1);
    assert_eq!(arena.state(), ArenaState::Active);
    assert_eq!(arena.alloc(0, 1).unwrap().as_ptr(), unsafe { first.as_ptr().add(8) });
  }

  /// Hands out blocks of a fixed, possibly wrong, size and offset.
  struct Skewed {
    inner: HeapProvider,
    size: usize,
    offset: usize,
    outstanding: usize,
  }

  impl Skewed {
    fn new(
      size: usize,
      offset: usize,
    ) -> Self {
      Self {
        inner: HeapProvider::new(),
        size,
        offset,
        outstanding: 0,
      }
    }
  }

  impl BackingProvider for Skewed {
    fn block_align(&self) -> usize {
      self.inner.block_align()
    }

    fn acquire(
      &mut self,
      _size: usize,
    ) -> ArenaResult<Block> {
      let block = self.inner.acquire(self.size + self.offset)?;
      self.outstanding += 1;
      let ptr = unsafe { block.as_non_null().add(self.offset) };
      Ok(unsafe { Block::from_raw_parts(ptr, self.size) })
    }

    fn release(
      &mut self,
      block: Block,
    ) {
      self.outstanding -= 1;
      let base = unsafe { block.as_non_null().sub(self.offset) };
      let size = block.size() + self.offset;
      self.inner.release(unsafe { Block::from_raw_parts(base, size) });
    }
  }

  #[test]
  fn test_short_block_is_rejected() {
    let result = Arena::new_in(HEADER_SIZE + 8, Skewed::new(8, 0));
    assert!(matches!(
      result,
      Err(ArenaError::BadBlock { size: 8, required, .. }) if required == HEADER_SIZE + 8
    ));
  }

  #[test]
  fn test_short_block_is_handed_back() {
    let mut arena = Arena::with_provider(Skewed::new(HEADER_SIZE, 0));
    assert!(matches!(arena.init(HEADER_SIZE + 8), Err(ArenaError::BadBlock { .. })));
    assert_eq!(arena.provider().outstanding, 0);
    assert_eq!(arena.state(), ArenaState::Uninitialized);
  }

  #[test]
  fn test_misaligned_block_is_rejected() {
    let mut arena = Arena::with_provider(Skewed::new(HEADER_SIZE + 8, 1));
    assert!(matches!(arena.init(HEADER_SIZE + 8), Err(ArenaError::BadBlock { .. })));
    assert_eq!(arena.provider().outstanding, 0);
  }

  #[test]
  fn test_bad_block_during_growth_leaves_arena_intact() {
    let mut arena = Arena::new_in(HEADER_SIZE + 8, Skewed::new(HEADER_SIZE + 8, 0)).unwrap();
    arena.alloc(8, 1).unwrap();

    arena.provider.size = 4;
    assert!(matches!(arena.alloc(1, 1), Err(ArenaError::BadBlock { size: 4, .. })));
    assert_eq!(arena.region_count(), 1);
    assert_eq!(arena.provider().outstanding, 1);

    arena.release();
    assert_eq!(arena.provider().outstanding, 0);
  }

  #[test]
  fn test_out_of_memory_at_init() {
    let provider = Tally {
      fail_after: Some(0),
      ..Tally::default()
    };
    let mut arena = Arena::with_provider(provider);
    assert!(matches!(arena.init(HEADER_SIZE + 8), Err(ArenaError::OutOfMemory { .. })));
    assert_eq!(arena.state(), ArenaState::Uninitialized);
  }

  #[test]
  fn test_drop_releases_regions() {
    let mut arena = Arena::new_in(HEADER_SIZE + 8, HeapProvider::new()).unwrap();
    arena.alloc(8, 1).unwrap();
    arena.alloc(8, 1).unwrap();
    drop(arena);
  }

  #[test]
  fn test_alloc_layout_is_usable() {
    let mut arena = Arena::new_in(4096, HeapProvider::new()).unwrap();
    let ptr = arena.alloc_layout(Layout::new::<u64>()).unwrap().cast::<u64>();
    assert_eq!(ptr.as_ptr() as usize % std::mem::align_of::<u64>(), 0);

    unsafe {
      assert_eq!(ptr.read(), 0);
      ptr.write(0xDEADBEEF);
      assert_eq!(ptr.read(), 0xDEADBEEF);
    }
  }

  proptest! {
    #[test]
    fn growth_and_oversize(
      payload in 1usize..128,
      requests in prop::collection::vec((0usize..160, 0u32..5), 1..64),
    ) {
      let mut arena = Arena::new_in(HEADER_SIZE + payload, Tally::default()).unwrap();

      for (size, shift) in requests {
        let align = 1usize << shift;
        let before = arena.region_count();
        let fits_current = arena.regions[before - 1]
          .region()
          .has_space(size, Alignment::new(align).unwrap());

        match arena.alloc(size, align) {
          Ok(ptr) => {
            prop_assert_eq!(ptr.as_ptr() as usize % align, 0);
            let expected = if fits_current { before } else { before + 1 };
            prop_assert_eq!(arena.region_count(), expected);
          }
          Err(ArenaError::AllocationTooLarge { .. }) => {
            prop_assert!(size + align_up!(HEADER_SIZE, align) - HEADER_SIZE > payload);
            prop_assert_eq!(arena.region_count(), before);
          }
          Err(err) => prop_assert!(false, "unexpected error: {}", err),
        }
      }
    }
  }
}
