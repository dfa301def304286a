//! Guest memory for the oxidized-xenon Xbox 360 emulator.
//!
//! Reserves the console's flat 4 GiB address space up front and tracks
//! per-page protection across the fixed hardware regions.

pub mod constants;
pub mod memory;
pub mod pages;

pub use constants::*;
pub use memory::{Memory, MemoryRegion};
pub use pages::PageFlags;
