use std::io;

use thiserror::Error;

/// Result type used throughout the crate.
pub type ArenaResult<T> = Result<T, ArenaError>;

/// Everything that can go wrong while configuring or allocating from an arena.
#[derive(Error, Debug)]
pub enum ArenaError {
  #[error("Invalid argument: {reason}")]
  InvalidArgument { reason: String },

  /// The request can never fit a region of the configured size. Retrying
  /// will not help; only a larger `region_size` will.
  #[error("Allocation too large: requested {requested} bytes aligned to {align}, a region holds at most {max} bytes at that alignment")]
  AllocationTooLarge {
    requested: usize,
    align: usize,
    max: usize,
  },

  #[error("Region size {region_size} cannot hold the {header} byte region header")]
  FatalConfig { region_size: usize, header: usize },

  #[error("Out of memory: could not acquire a {requested} byte region")]
  OutOfMemory {
    requested: usize,
    #[source]
    source: io::Error,
  },

  /// The provider returned a block too small or misaligned to host a region.
  #[error("Provider returned a bad block at 0x{addr:x}: {size} bytes, needed {required} bytes aligned to {align}")]
  BadBlock {
    addr: usize,
    size: usize,
    required: usize,
    align: usize,
  },

  #[error("Arena used after release")]
  UseAfterRelease,

  #[error("Arena used before init")]
  Uninitialized,
}
