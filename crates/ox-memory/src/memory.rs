//! Guest address space implementation

use std::sync::Arc;

use ox_core::error::MemoryError;
use parking_lot::RwLock;

use crate::constants::*;
use crate::pages::PageFlags;

/// Memory region descriptor
#[derive(Debug, Clone)]
pub struct MemoryRegion {
    /// Base address
    pub base: u32,
    /// Size in bytes
    pub size: u32,
    /// Page flags
    pub flags: PageFlags,
    /// Region name
    pub name: &'static str,
}

/// Guest memory for the emulator.
///
/// The console exposes a flat 32-bit address space, so the whole 4 GiB
/// range is reserved up front and individual regions are committed when
/// the system comes up. Guest-visible values are big-endian; the typed
/// accessors do the byte swapping.
pub struct Memory {
    /// Base pointer for the reserved address space
    base: *mut u8,
    /// Page flags for each standard page
    page_flags: RwLock<Vec<PageFlags>>,
    /// Fixed hardware regions
    regions: Vec<MemoryRegion>,
}

// Safety: raw accesses are plain byte copies into the reservation, and
// every checked path consults the page flag table behind its lock.
unsafe impl Send for Memory {}
unsafe impl Sync for Memory {}

impl Memory {
    /// Reserves the guest address space. No region is accessible until
    /// `initialize` runs.
    pub fn new() -> Result<Arc<Self>, MemoryError> {
        let base = Self::allocate_address_space(ADDRESS_SPACE_SIZE)?;

        let regions = vec![
            MemoryRegion {
                base: VIRTUAL_4K_BASE,
                size: VIRTUAL_4K_SIZE,
                flags: PageFlags::RW,
                name: "Virtual 4K",
            },
            MemoryRegion {
                base: VIRTUAL_64K_BASE,
                size: VIRTUAL_64K_SIZE,
                flags: PageFlags::RW,
                name: "Virtual 64K",
            },
            MemoryRegion {
                base: IMAGE_SPACE_BASE,
                size: IMAGE_SPACE_SIZE,
                flags: PageFlags::RWX,
                name: "Image Space",
            },
            MemoryRegion {
                base: PHYSICAL_VIEW_BASE,
                size: PHYSICAL_MEM_SIZE,
                flags: PageFlags::RW | PageFlags::PHYSICAL,
                name: "Physical View",
            },
        ];

        Ok(Arc::new(Self {
            base,
            page_flags: RwLock::new(vec![PageFlags::empty(); NUM_PAGES]),
            regions,
        }))
    }

    #[cfg(unix)]
    fn allocate_address_space(size: usize) -> Result<*mut u8, MemoryError> {
        use libc::{mmap, MAP_ANONYMOUS, MAP_PRIVATE, PROT_READ, PROT_WRITE};

        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                size,
                PROT_READ | PROT_WRITE,
                MAP_PRIVATE | MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(MemoryError::OutOfMemory);
        }

        Ok(ptr as *mut u8)
    }

    #[cfg(windows)]
    fn allocate_address_space(size: usize) -> Result<*mut u8, MemoryError> {
        use windows_sys::Win32::System::Memory::*;

        let ptr = unsafe {
            VirtualAlloc(
                std::ptr::null(),
                size,
                MEM_RESERVE | MEM_COMMIT,
                PAGE_READWRITE,
            )
        };

        if ptr.is_null() {
            return Err(MemoryError::OutOfMemory);
        }

        Ok(ptr as *mut u8)
    }

    /// Commits the fixed hardware regions and makes them accessible.
    pub fn initialize(&self) -> Result<(), MemoryError> {
        for region in &self.regions {
            self.commit_region(region.base, region.size, region.flags);
        }
        tracing::info!(
            "Guest address space initialized ({} regions)",
            self.regions.len()
        );
        Ok(())
    }

    fn commit_region(&self, addr: u32, size: u32, flags: PageFlags) {
        let start_page = (addr / PAGE_SIZE) as usize;
        let num_pages = (size / PAGE_SIZE) as usize;

        let mut page_flags = self.page_flags.write();
        for page in start_page..start_page + num_pages {
            if page < page_flags.len() {
                page_flags[page] = flags;
            }
        }
    }

    /// Get raw pointer for address (unchecked, for hot paths)
    ///
    /// # Safety
    /// Caller must ensure the address is valid and properly aligned.
    #[inline(always)]
    pub unsafe fn ptr(&self, addr: u32) -> *mut u8 {
        self.base.add(addr as usize)
    }

    /// Translate a guest address with bounds and permission checking
    pub fn translate(&self, addr: u32, size: u32, flags: PageFlags) -> Result<*mut u8, MemoryError> {
        self.check_access(addr, size, flags)?;
        Ok(unsafe { self.ptr(addr) })
    }

    /// Check if memory access is valid
    pub fn check_access(&self, addr: u32, size: u32, required: PageFlags) -> Result<(), MemoryError> {
        let end_addr = addr
            .checked_add(size.saturating_sub(1))
            .ok_or(MemoryError::OutOfRange { addr, size })?;

        let start_page = (addr / PAGE_SIZE) as usize;
        let end_page = (end_addr / PAGE_SIZE) as usize;

        let page_flags = self.page_flags.read();
        for page in start_page..=end_page {
            if page >= page_flags.len() || !page_flags[page].contains(required) {
                return Err(MemoryError::InvalidAddress(addr));
            }
        }

        Ok(())
    }

    /// Read a value from memory in host byte order
    #[inline]
    pub fn read<T: Copy>(&self, addr: u32) -> Result<T, MemoryError> {
        self.check_access(addr, std::mem::size_of::<T>() as u32, PageFlags::READ)?;
        Ok(unsafe { self.read_unchecked(addr) })
    }

    /// Read without checking (for hot paths after validation)
    ///
    /// # Safety
    /// Caller must ensure the address is valid and readable.
    #[inline(always)]
    pub unsafe fn read_unchecked<T: Copy>(&self, addr: u32) -> T {
        std::ptr::read_unaligned(self.ptr(addr) as *const T)
    }

    /// Write a value to memory in host byte order
    #[inline]
    pub fn write<T: Copy>(&self, addr: u32, value: T) -> Result<(), MemoryError> {
        self.check_access(addr, std::mem::size_of::<T>() as u32, PageFlags::WRITE)?;
        unsafe { self.write_unchecked(addr, value) };
        Ok(())
    }

    /// Write without checking (for hot paths after validation)
    ///
    /// # Safety
    /// Caller must ensure the address is valid and writable.
    #[inline(always)]
    pub unsafe fn write_unchecked<T: Copy>(&self, addr: u32, value: T) {
        std::ptr::write_unaligned(self.ptr(addr) as *mut T, value);
    }

    /// Read a u8 from guest memory
    #[inline]
    pub fn read_u8(&self, addr: u32) -> Result<u8, MemoryError> {
        self.read(addr)
    }

    /// Write a u8 to guest memory
    #[inline]
    pub fn write_u8(&self, addr: u32, value: u8) -> Result<(), MemoryError> {
        self.write(addr, value)
    }

    /// Read a u16 in guest byte order (big-endian)
    #[inline]
    pub fn read_u16(&self, addr: u32) -> Result<u16, MemoryError> {
        let value: u16 = self.read(addr)?;
        Ok(u16::from_be(value))
    }

    /// Write a u16 in guest byte order (big-endian)
    #[inline]
    pub fn write_u16(&self, addr: u32, value: u16) -> Result<(), MemoryError> {
        self.write(addr, value.to_be())
    }

    /// Read a u32 in guest byte order (big-endian)
    #[inline]
    pub fn read_u32(&self, addr: u32) -> Result<u32, MemoryError> {
        let value: u32 = self.read(addr)?;
        Ok(u32::from_be(value))
    }

    /// Write a u32 in guest byte order (big-endian)
    #[inline]
    pub fn write_u32(&self, addr: u32, value: u32) -> Result<(), MemoryError> {
        self.write(addr, value.to_be())
    }

    /// Read a u64 in guest byte order (big-endian)
    #[inline]
    pub fn read_u64(&self, addr: u32) -> Result<u64, MemoryError> {
        let value: u64 = self.read(addr)?;
        Ok(u64::from_be(value))
    }

    /// Write a u64 in guest byte order (big-endian)
    #[inline]
    pub fn write_u64(&self, addr: u32, value: u64) -> Result<(), MemoryError> {
        self.write(addr, value.to_be())
    }

    /// Copy data to memory
    pub fn write_bytes(&self, addr: u32, data: &[u8]) -> Result<(), MemoryError> {
        self.check_access(addr, data.len() as u32, PageFlags::WRITE)?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr(addr), data.len());
        }
        Ok(())
    }

    /// Copy data from memory
    pub fn read_bytes(&self, addr: u32, size: u32) -> Result<Vec<u8>, MemoryError> {
        self.check_access(addr, size, PageFlags::READ)?;
        let mut data = vec![0u8; size as usize];
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr(addr), data.as_mut_ptr(), size as usize);
        }
        Ok(data)
    }

    /// Get memory regions
    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }
}

impl Drop for Memory {
    fn drop(&mut self) {
        #[cfg(unix)]
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, ADDRESS_SPACE_SIZE);
        }

        #[cfg(windows)]
        unsafe {
            use windows_sys::Win32::System::Memory::*;
            VirtualFree(self.base as *mut _, 0, MEM_RELEASE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reservation_starts_inaccessible() {
        let mem = Memory::new().unwrap();
        assert_eq!(mem.regions().len(), 4);

        // Nothing is committed until initialize runs.
        assert!(matches!(
            mem.read_u32(IMAGE_SPACE_BASE),
            Err(MemoryError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_initialize_commits_regions() {
        let mem = Memory::new().unwrap();
        mem.initialize().unwrap();

        mem.write_u32(0x1000, 0x12345678).unwrap();
        assert_eq!(mem.read_u32(0x1000).unwrap(), 0x12345678);

        mem.write_u64(0x8200_0000, 0xDEADBEEFCAFEBABE).unwrap();
        assert_eq!(mem.read_u64(0x8200_0000).unwrap(), 0xDEADBEEFCAFEBABE);
    }

    #[test]
    fn test_guest_byte_order() {
        let mem = Memory::new().unwrap();
        mem.initialize().unwrap();

        mem.write_u32(0x2000, 0x12345678).unwrap();
        assert_eq!(
            mem.read_bytes(0x2000, 4).unwrap(),
            vec![0x12, 0x34, 0x56, 0x78]
        );
        assert_eq!(mem.read_u16(0x2000).unwrap(), 0x1234);
        assert_eq!(mem.read_u16(0x2002).unwrap(), 0x5678);
    }

    #[test]
    fn test_range_checks() {
        let mem = Memory::new().unwrap();
        mem.initialize().unwrap();

        // Above the physical view, nothing is mapped.
        assert!(matches!(
            mem.read_u32(0xC000_0000),
            Err(MemoryError::InvalidAddress(_))
        ));

        // Crossing the end of the address space.
        assert!(matches!(
            mem.read_u32(0xFFFF_FFFE),
            Err(MemoryError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_write_read_bytes() {
        let mem = Memory::new().unwrap();
        mem.initialize().unwrap();

        let data = b"Hello, Xenon!";
        mem.write_bytes(0x4000_0000, data).unwrap();
        assert_eq!(mem.read_bytes(0x4000_0000, data.len() as u32).unwrap(), data);
    }
}
