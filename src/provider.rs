//! Backing memory for regions.
//!
//! A [`BackingProvider`] hands out large, zero-filled, read-write [`Block`]s
//! and takes them back. The arena never frees anything smaller than a block.

use std::alloc::{self, Layout};
use std::io;
use std::ptr::{self, NonNull};

use log::error;

use crate::config::page_size;
use crate::error::{ArenaError, ArenaResult};

/// A zero-filled, read-write block of memory owned by whoever holds it.
///
/// The block remembers the size it was acquired with, so it is always
/// released with that same size.
#[derive(Debug)]
pub struct Block {
  ptr: NonNull<u8>,
  size: usize,
}

impl Block {
  /// # Safety
  ///
  /// `ptr` must point to `size` writable bytes that stay valid until the
  /// block is handed back to the provider that produced it. The arena
  /// checks size and alignment itself before writing into a block.
  pub unsafe fn from_raw_parts(
    ptr: NonNull<u8>,
    size: usize,
  ) -> Self {
    Self { ptr, size }
  }

  pub fn as_ptr(&self) -> *mut u8 {
    self.ptr.as_ptr()
  }

  pub fn as_non_null(&self) -> NonNull<u8> {
    self.ptr
  }

  pub fn size(&self) -> usize {
    self.size
  }
}

/// Source of the fixed-size blocks an arena carves its regions from.
pub trait BackingProvider {
  /// Minimum alignment of every block returned by [`acquire`](Self::acquire).
  /// Must be a power of two no smaller than the alignment of a `usize`.
  fn block_align(&self) -> usize;

  /// Obtains a zero-filled block of at least `size` bytes.
  ///
  /// Blocks that are shorter than `size` or not aligned to
  /// [`block_align`](Self::block_align) are handed straight back and
  /// reported as [`ArenaError::BadBlock`].
  fn acquire(
    &mut self,
    size: usize,
  ) -> ArenaResult<Block>;

  /// Returns a block obtained from [`acquire`](Self::acquire) on this provider.
  fn release(
    &mut self,
    block: Block,
  );
}

/// Anonymous private mappings straight from the kernel via `mmap(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MmapProvider;

impl BackingProvider for MmapProvider {
  fn block_align(&self) -> usize {
    page_size()
  }

  fn acquire(
    &mut self,
    size: usize,
  ) -> ArenaResult<Block> {
    let addr = unsafe {
      libc::mmap(
        ptr::null_mut(),
        size,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
        -1,
        0,
      )
    };

    if addr == libc::MAP_FAILED {
      return Err(ArenaError::OutOfMemory {
        requested: size,
        source: io::Error::last_os_error(),
      });
    }

    match NonNull::new(addr.cast::<u8>()) {
      Some(ptr) => Ok(unsafe { Block::from_raw_parts(ptr, size) }),
      None => Err(ArenaError::OutOfMemory {
        requested: size,
        source: io::Error::from(io::ErrorKind::OutOfMemory),
      }),
    }
  }

  fn release(
    &mut self,
    block: Block,
  ) {
    let result = unsafe { libc::munmap(block.as_ptr().cast::<libc::c_void>(), block.size()) };

    if result != 0 {
      error!(
        "munmap of {} bytes at {:p} failed: {}",
        block.size(),
        block.as_ptr(),
        io::Error::last_os_error()
      );
    }
  }
}

/// Zeroed blocks from the global allocator.
#[derive(Debug, Clone, Copy)]
pub struct HeapProvider {
  align: usize,
}

impl HeapProvider {
  pub const DEFAULT_ALIGN: usize = 4096;

  pub fn new() -> Self {
    Self {
      align: Self::DEFAULT_ALIGN,
    }
  }

  /// Provider whose blocks are aligned to `align` bytes.
  pub fn with_align(align: usize) -> ArenaResult<Self> {
    if !align.is_power_of_two() || align < std::mem::align_of::<usize>() {
      return Err(ArenaError::InvalidArgument {
        reason: format!("block alignment {align} must be a power of two of at least a word"),
      });
    }

    Ok(Self { align })
  }

  fn layout(
    &self,
    size: usize,
  ) -> ArenaResult<Layout> {
    Layout::from_size_align(size, self.align).map_err(|err| ArenaError::InvalidArgument {
      reason: format!("block of {size} bytes: {err}"),
    })
  }
}

impl Default for HeapProvider {
  fn default() -> Self {
    Self::new()
  }
}

impl BackingProvider for HeapProvider {
  fn block_align(&self) -> usize {
    self.align
  }

  fn acquire(
    &mut self,
    size: usize,
  ) -> ArenaResult<Block> {
    if size == 0 {
      return Err(ArenaError::InvalidArgument {
        reason: "cannot acquire an empty block".to_string(),
      });
    }

    let layout = self.layout(size)?;
    let ptr = unsafe { alloc::alloc_zeroed(layout) };

    match NonNull::new(ptr) {
      Some(ptr) => Ok(unsafe { Block::from_raw_parts(ptr, size) }),
      None => Err(ArenaError::OutOfMemory {
        requested: size,
        source: io::Error::from(io::ErrorKind::OutOfMemory),
      }),
    }
  }

  fn release(
    &mut self,
    block: Block,
  ) {
    match self.layout(block.size()) {
      Ok(layout) => unsafe { alloc::dealloc(block.as_ptr(), layout) },
      Err(err) => error!("cannot release block at {:p}: {err}", block.as_ptr()),
    }
  }
}
