use std::{alloc::Layout, io::Read};

use rarena::{Arena, ArenaConfig, ArenaError};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect the mappings with `pmap` or
/// `/proc/<pid>/maps` while the arena grows.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_stats(
  label: &str,
  arena: &Arena,
) {
  let stats = arena.stats();
  println!(
    "[{}] PID = {}, regions = {}, reserved = {} bytes, used = {} bytes",
    label,
    std::process::id(),
    stats.region_count,
    stats.reserved_bytes,
    stats.used_bytes,
  );
}

fn main() -> Result<(), ArenaError> {
  // RUST_LOG=trace shows every region mapping and allocation address.
  env_logger::init();

  let mut arena = Arena::with_config(ArenaConfig::default())?;
  print_stats("start", &arena);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) A u32 lands right after the region header.
  // --------------------------------------------------------------------
  let first = arena.alloc_layout(Layout::new::<u32>())?.cast::<u32>();
  unsafe { first.write(0xDEADBEEF) };
  println!("\n[1] u32 at {:p} = 0x{:X}", first, unsafe { first.read() });

  // --------------------------------------------------------------------
  // 2) A u64 after an odd-sized request shows the alignment padding.
  // --------------------------------------------------------------------
  let odd = arena.alloc(3, 1)?;
  let third = arena.alloc_layout(Layout::new::<u64>())?;
  println!(
    "\n[2] 3 bytes at {:p}, u64 at {:p} (addr % 8 = {})",
    odd,
    third,
    third.as_ptr() as usize % 8
  );
  print_stats("after small allocs", &arena);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Fill past the first region to force the chain to grow.
  // --------------------------------------------------------------------
  let chunk = arena.max_payload() / 3;
  for _ in 0..4 {
    let ptr = arena.alloc(chunk, 16)?;
    println!("[3] {} bytes at {:p}", chunk, ptr);
  }
  print_stats("after growth", &arena);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Requests larger than a region are refused without mapping anything.
  // --------------------------------------------------------------------
  match arena.alloc(arena.max_payload() + 1, 1) {
    Err(err) => println!("\n[4] {}", err),
    Ok(ptr) => println!("\n[4] unexpectedly got {:p}", ptr),
  }
  print_stats("after oversize", &arena);

  // --------------------------------------------------------------------
  // 5) Everything goes back to the OS in one step.
  // --------------------------------------------------------------------
  arena.release();
  print_stats("released", &arena);
  if let Err(err) = arena.alloc(2, 2) {
    println!("[5] {}", err);
  }

  Ok(())
}
