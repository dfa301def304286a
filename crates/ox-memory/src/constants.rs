//! Guest address space layout.

/// Total reserved guest address space (flat 32-bit space).
pub const ADDRESS_SPACE_SIZE: usize = 0x1_0000_0000;

/// Standard page size.
pub const PAGE_SIZE: u32 = 0x1000;

/// Number of standard pages covering the whole space.
pub const NUM_PAGES: usize = ADDRESS_SPACE_SIZE / PAGE_SIZE as usize;

/// Console RAM size (512 MiB).
pub const PHYSICAL_MEM_SIZE: u32 = 0x2000_0000;

/// Virtual heap served with 4 KiB pages.
pub const VIRTUAL_4K_BASE: u32 = 0x0000_0000;
pub const VIRTUAL_4K_SIZE: u32 = 0x4000_0000;

/// Virtual heap served with 64 KiB pages.
pub const VIRTUAL_64K_BASE: u32 = 0x4000_0000;
pub const VIRTUAL_64K_SIZE: u32 = 0x4000_0000;

/// Executable image space. Titles link against a base inside this
/// region (0x82000000 for nearly every retail executable).
pub const IMAGE_SPACE_BASE: u32 = 0x8000_0000;
pub const IMAGE_SPACE_SIZE: u32 = 0x2000_0000;

/// Cached view of physical RAM.
pub const PHYSICAL_VIEW_BASE: u32 = 0xA000_0000;
