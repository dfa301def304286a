//! File system entry

/// A resolved file system entry
#[derive(Debug, Clone)]
pub struct Entry {
    /// Entry name (last path component, original casing)
    pub name: String,
    /// Size in bytes (zero for directories)
    pub size: u64,
    /// Whether this is a directory
    pub is_directory: bool,
}

impl Entry {
    /// Synthetic entry for a device root
    pub fn root() -> Self {
        Self {
            name: String::new(),
            size: 0,
            is_directory: true,
        }
    }
}
