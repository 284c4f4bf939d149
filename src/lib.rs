//! # rarena - A Region-Based Arena Allocator
//!
//! This crate provides an **arena allocator** that carves variable-size,
//! variable-alignment allocations out of large fixed-size regions mapped
//! straight from the kernel with `mmap(2)`.
//!
//! ## Overview
//!
//! There is no per-allocation free. Memory is handed back to the OS one
//! whole arena at a time:
//!
//! ```text
//!   Arena:
//!
//!   regions[0]                 regions[1]                 regions[2]  ◄── current
//!   ┌────────┬─────────────┐   ┌────────┬─────────────┐   ┌────────┬──────┬──────┐
//!   │ Region │ A1 A2 A3 ░░ │ → │ Region │ A4 A5 A6 A7 │ → │ Region │ A8   │ free │
//!   │ header │         ▲   │   │ header │             │   │ header │      │      │
//!   └────────┴─────────┼───┘   └────────┴─────────────┘   └────────┴──────┴──────┘
//!                      │                                                  ▲
//!              left behind, never reused                             bump cursor
//! ```
//!
//! Each region is a single mapped block whose first [`HEADER_SIZE`] bytes
//! hold its own [`Region`] record; the rest is payload. When the current
//! region cannot fit a request, a new region of the same size is mapped and
//! becomes current.
//!
//! ## Crate Structure
//!
//! ```text
//!   rarena
//!   ├── align      - align_up! macro and the validated Alignment type
//!   ├── arena      - Arena, the region chain and its growth policy
//!   ├── config     - ArenaConfig and the host page size
//!   ├── error      - ArenaError
//!   ├── provider   - BackingProvider trait, MmapProvider, HeapProvider
//!   └── region     - Region, one block with a bump cursor
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rarena::{Arena, ArenaConfig, ArenaError};
//!
//! fn main() -> Result<(), ArenaError> {
//!     let mut arena = Arena::with_config(ArenaConfig::pages(4))?;
//!
//!     let ptr = arena.alloc(8, 8)?.cast::<u64>();
//!     unsafe { ptr.write(42) };
//!     assert_eq!(unsafe { ptr.read() }, 42);
//!
//!     // Every region goes back to the OS at once.
//!     arena.release();
//!     assert!(matches!(arena.alloc(8, 8), Err(ArenaError::UseAfterRelease)));
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **O(1) allocation**: align the cursor and bump it
//! - **Bulk release**: one `munmap` per region, not per allocation
//! - **Pluggable backing memory**: any [`BackingProvider`]
//! - **Typed failures**: bad alignment, oversize requests, exhausted memory
//!   and use after release are all reported as [`ArenaError`]
//!
//! ## Limitations
//!
//! - **Single-threaded only**: an `Arena` is neither `Send` nor `Sync`
//! - **No individual frees**: space is only reclaimed by releasing the arena
//! - **No reuse of old regions**: leftover space in a superseded region is lost
//! - **Unix-only**: requires `libc` for `mmap`/`munmap`
//!
//! ## Logging
//!
//! Region acquisition and release are logged at `debug`, every allocation at
//! `trace`, through the [`log`] facade. Install any logger to see them.

pub mod align;
mod arena;
pub mod config;
mod error;
pub mod provider;
mod region;

pub use align::Alignment;
pub use arena::{Arena, ArenaState, ArenaStats};
pub use config::{ArenaConfig, page_size};
pub use error::{ArenaError, ArenaResult};
pub use provider::{BackingProvider, Block, HeapProvider, MmapProvider};
pub use region::{HEADER_SIZE, Region};
