//! Host directory device
//!
//! Maps a directory on the host file system into the guest namespace.
//! Used for loose executables and extracted game directories.

use std::path::{Path, PathBuf};

use ox_core::error::VfsError;

use crate::device::Device;
use crate::entry::Entry;

struct HostEntry {
    /// Device-relative guest path, lowercased for matching
    relative_lower: String,
    /// Entry name with original casing
    name: String,
    host_path: PathBuf,
    size: u64,
    is_directory: bool,
}

/// Device backed by a host directory
pub struct HostPathDevice {
    mount_path: String,
    host_path: PathBuf,
    read_only: bool,
    entries: Vec<HostEntry>,
}

impl HostPathDevice {
    pub fn new(mount_path: &str, host_path: &Path, read_only: bool) -> Self {
        Self {
            mount_path: mount_path.to_string(),
            host_path: host_path.to_path_buf(),
            read_only,
            entries: Vec::new(),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn scan_directory(&mut self, dir: &Path, guest_prefix: &str) -> std::io::Result<()> {
        for item in std::fs::read_dir(dir)? {
            let item = item?;
            let name = item.file_name().to_string_lossy().into_owned();
            let relative = if guest_prefix.is_empty() {
                name.clone()
            } else {
                format!("{}\\{}", guest_prefix, name)
            };

            let metadata = item.metadata()?;
            let is_directory = metadata.is_dir();
            self.entries.push(HostEntry {
                relative_lower: relative.to_ascii_lowercase(),
                name,
                host_path: item.path(),
                size: if is_directory { 0 } else { metadata.len() },
                is_directory,
            });

            if is_directory {
                self.scan_directory(&item.path(), &relative)?;
            }
        }
        Ok(())
    }

    fn find(&self, relative_path: &str) -> Option<&HostEntry> {
        let wanted = relative_path.replace('/', "\\").to_ascii_lowercase();
        self.entries
            .iter()
            .find(|entry| entry.relative_lower == wanted)
    }
}

impl Device for HostPathDevice {
    fn mount_path(&self) -> &str {
        &self.mount_path
    }

    fn initialize(&mut self) -> bool {
        if !self.host_path.is_dir() {
            tracing::warn!("Host path does not exist: {}", self.host_path.display());
            return false;
        }

        let root = self.host_path.clone();
        if let Err(err) = self.scan_directory(&root, "") {
            tracing::warn!("Unable to scan {}: {}", self.host_path.display(), err);
            return false;
        }

        tracing::info!(
            "Host path device at {} ({} entries from {})",
            self.mount_path,
            self.entries.len(),
            self.host_path.display()
        );
        true
    }

    fn find_entry(&self, relative_path: &str) -> Option<Entry> {
        self.find(relative_path).map(|entry| Entry {
            name: entry.name.clone(),
            size: entry.size,
            is_directory: entry.is_directory,
        })
    }

    fn read_entry(&self, relative_path: &str) -> Result<Vec<u8>, VfsError> {
        let entry = self
            .find(relative_path)
            .ok_or_else(|| VfsError::NotFound(relative_path.to_string()))?;
        if entry.is_directory {
            return Err(VfsError::ReadFailed {
                path: relative_path.to_string(),
                message: "is a directory".to_string(),
            });
        }
        std::fs::read(&entry.host_path).map_err(|err| VfsError::ReadFailed {
            path: relative_path.to_string(),
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populate(dir: &Path) {
        std::fs::write(dir.join("default.xex"), b"executable").unwrap();
        std::fs::create_dir(dir.join("media")).unwrap();
        std::fs::write(dir.join("media").join("intro.bik"), b"video").unwrap();
    }

    #[test]
    fn test_initialize_scans_tree() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());

        let mut device = HostPathDevice::new("\\Device\\Harddisk0\\Partition0", dir.path(), true);
        assert!(device.initialize());
        assert!(device.is_read_only());

        let entry = device.find_entry("default.xex").unwrap();
        assert_eq!(entry.size, 10);
        assert!(!entry.is_directory);

        let nested = device.find_entry("MEDIA\\Intro.BIK").unwrap();
        assert_eq!(nested.name, "intro.bik");
    }

    #[test]
    fn test_read_entry() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());

        let mut device = HostPathDevice::new("\\Device\\Harddisk0\\Partition0", dir.path(), true);
        assert!(device.initialize());

        assert_eq!(device.read_entry("media\\intro.bik").unwrap(), b"video");
        assert!(matches!(
            device.read_entry("media"),
            Err(VfsError::ReadFailed { .. })
        ));
        assert!(matches!(
            device.read_entry("nope.bin"),
            Err(VfsError::NotFound(_))
        ));
    }

    #[test]
    fn test_missing_host_path_fails_initialize() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not-here");

        let mut device = HostPathDevice::new("\\Device\\Cdrom0", &missing, true);
        assert!(!device.initialize());
    }
}
