//! Translation backend and executable code cache

use ox_core::error::CpuError;

/// Executable region translated guest code is emitted into.
///
/// Fault routing uses the range: a pc inside the cache belongs to
/// running guest code, anything outside it is the host's own fault.
pub struct CodeCache {
    base: *mut u8,
    size: u64,
}

// Safety: the cache hands out its range as plain integers; the mapping
// itself lives until drop.
unsafe impl Send for CodeCache {}
unsafe impl Sync for CodeCache {}

impl CodeCache {
    /// Reserve an executable region of `size` bytes.
    pub fn new(size: u64) -> Result<Self, CpuError> {
        let base = Self::reserve_executable(size as usize)?;
        Ok(Self { base, size })
    }

    #[cfg(unix)]
    fn reserve_executable(size: usize) -> Result<*mut u8, CpuError> {
        use libc::{mmap, MAP_ANONYMOUS, MAP_PRIVATE, PROT_EXEC, PROT_READ, PROT_WRITE};

        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                size,
                PROT_READ | PROT_WRITE | PROT_EXEC,
                MAP_PRIVATE | MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(CpuError::CodeCache(format!(
                "unable to map {} executable bytes",
                size
            )));
        }

        Ok(ptr as *mut u8)
    }

    #[cfg(windows)]
    fn reserve_executable(size: usize) -> Result<*mut u8, CpuError> {
        use windows_sys::Win32::System::Memory::*;

        let ptr = unsafe {
            VirtualAlloc(
                std::ptr::null(),
                size,
                MEM_RESERVE | MEM_COMMIT,
                PAGE_EXECUTE_READWRITE,
            )
        };

        if ptr.is_null() {
            return Err(CpuError::CodeCache(format!(
                "unable to map {} executable bytes",
                size
            )));
        }

        Ok(ptr as *mut u8)
    }

    /// Host address the cache starts at.
    pub fn base_address(&self) -> u64 {
        self.base as u64
    }

    /// Total reserved size in bytes.
    pub fn total_size(&self) -> u64 {
        self.size
    }

    /// Whether a host pc falls inside the cache.
    pub fn contains(&self, pc: u64) -> bool {
        pc >= self.base_address() && pc < self.base_address() + self.size
    }
}

impl Drop for CodeCache {
    fn drop(&mut self) {
        #[cfg(unix)]
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.size as usize);
        }

        #[cfg(windows)]
        unsafe {
            use windows_sys::Win32::System::Memory::*;
            VirtualFree(self.base as *mut _, 0, MEM_RELEASE);
        }
    }
}

/// Translation backend.
///
/// Owns the code cache. Actual translation lives behind this type so a
/// different backend can slot in per target architecture.
pub struct Backend {
    code_cache: CodeCache,
}

impl Backend {
    pub fn new(code_cache_size: u64) -> Result<Self, CpuError> {
        let code_cache = CodeCache::new(code_cache_size)?;
        tracing::info!(
            "Code cache reserved at 0x{:016x} ({} MiB)",
            code_cache.base_address(),
            code_cache.total_size() / (1024 * 1024)
        );
        Ok(Self { code_cache })
    }

    pub fn code_cache(&self) -> &CodeCache {
        &self.code_cache
    }
}
