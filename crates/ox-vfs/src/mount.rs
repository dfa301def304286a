//! Mount table and guest path resolution

use std::collections::HashMap;

use ox_core::error::VfsError;
use parking_lot::RwLock;

use crate::device::Device;
use crate::entry::Entry;

/// Normalize a guest path: backslash separators, no trailing separator.
fn normalize(path: &str) -> String {
    let mut normalized = path.replace('/', "\\");
    while normalized.len() > 1 && normalized.ends_with('\\') {
        normalized.pop();
    }
    normalized
}

/// Guest paths compare case-insensitively.
fn matches_prefix(path: &str, prefix: &str) -> bool {
    let path = path.to_ascii_lowercase();
    let prefix = prefix.to_ascii_lowercase();
    if !path.starts_with(&prefix) {
        return false;
    }
    // Either exact, or the prefix ends at a component boundary.
    path.len() == prefix.len()
        || prefix.ends_with(':')
        || path.as_bytes()[prefix.len()] == b'\\'
}

/// The guest-visible file system: registered devices plus the symbolic
/// links that give titles their drive letters.
#[derive(Default)]
pub struct VirtualFileSystem {
    devices: RwLock<Vec<Box<dyn Device>>>,
    symlinks: RwLock<HashMap<String, String>>,
}

impl VirtualFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount an initialized device. Returns false when something already
    /// occupies its mount path.
    pub fn register_device(&self, device: Box<dyn Device>) -> bool {
        let mut devices = self.devices.write();
        let mount = device.mount_path().to_ascii_lowercase();
        if devices
            .iter()
            .any(|existing| existing.mount_path().to_ascii_lowercase() == mount)
        {
            tracing::warn!("Mount path {} is already occupied", device.mount_path());
            return false;
        }
        tracing::info!("Mounted device at {}", device.mount_path());
        devices.push(device);
        true
    }

    /// Map `alias` (e.g. `game:`) onto `target` (a device path). An
    /// existing link for the alias is replaced.
    pub fn register_symbolic_link(&self, alias: &str, target: &str) {
        tracing::debug!("Symbolic link {} -> {}", alias, target);
        self.symlinks
            .write()
            .insert(alias.to_ascii_lowercase(), target.to_string());
    }

    /// Drop the link for `alias`, returning whether it existed.
    pub fn unregister_symbolic_link(&self, alias: &str) -> bool {
        self.symlinks
            .write()
            .remove(&alias.to_ascii_lowercase())
            .is_some()
    }

    /// Substitute symbolic links until a raw device path remains.
    fn resolve_symlinks(&self, path: &str) -> String {
        let symlinks = self.symlinks.read();
        let mut current = normalize(path);

        // Links may point at other links; bail out rather than chase a cycle.
        for _ in 0..8 {
            let lower = current.to_ascii_lowercase();
            let hit = symlinks
                .iter()
                .filter(|(alias, _)| matches_prefix(&lower, alias))
                .max_by_key(|(alias, _)| alias.len());

            match hit {
                Some((alias, target)) => {
                    let remainder = &current[alias.len()..];
                    let remainder = remainder.trim_start_matches('\\');
                    current = if remainder.is_empty() {
                        normalize(target)
                    } else {
                        format!("{}\\{}", normalize(target), remainder)
                    };
                }
                None => break,
            }
        }

        current
    }

    /// Resolve a guest path to an entry on a mounted device.
    pub fn resolve_path(&self, guest_path: &str) -> Option<Entry> {
        let resolved = self.resolve_symlinks(guest_path);
        let devices = self.devices.read();

        let device = devices
            .iter()
            .filter(|device| matches_prefix(&resolved, device.mount_path()))
            .max_by_key(|device| device.mount_path().len())?;

        let relative = resolved[device.mount_path().len()..].trim_start_matches('\\');
        if relative.is_empty() {
            return Some(Entry::root());
        }
        device.find_entry(relative)
    }

    /// Read a whole file out of the guest namespace.
    pub fn read_file(&self, guest_path: &str) -> Result<Vec<u8>, VfsError> {
        let resolved = self.resolve_symlinks(guest_path);
        let devices = self.devices.read();

        let device = devices
            .iter()
            .filter(|device| matches_prefix(&resolved, device.mount_path()))
            .max_by_key(|device| device.mount_path().len())
            .ok_or_else(|| VfsError::NoDevice(resolved.clone()))?;

        let relative = resolved[device.mount_path().len()..].trim_start_matches('\\');
        device.read_entry(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeDevice {
        mount_path: String,
        files: Vec<(String, Vec<u8>)>,
    }

    impl FakeDevice {
        fn new(mount_path: &str, files: &[(&str, &[u8])]) -> Self {
            Self {
                mount_path: mount_path.to_string(),
                files: files
                    .iter()
                    .map(|(name, data)| (name.to_string(), data.to_vec()))
                    .collect(),
            }
        }
    }

    impl Device for FakeDevice {
        fn mount_path(&self) -> &str {
            &self.mount_path
        }

        fn initialize(&mut self) -> bool {
            true
        }

        fn find_entry(&self, relative_path: &str) -> Option<Entry> {
            let wanted = relative_path.to_ascii_lowercase();
            self.files
                .iter()
                .find(|(name, _)| name.to_ascii_lowercase() == wanted)
                .map(|(name, data)| Entry {
                    name: name.clone(),
                    size: data.len() as u64,
                    is_directory: false,
                })
        }

        fn read_entry(&self, relative_path: &str) -> Result<Vec<u8>, VfsError> {
            let wanted = relative_path.to_ascii_lowercase();
            self.files
                .iter()
                .find(|(name, _)| name.to_ascii_lowercase() == wanted)
                .map(|(_, data)| data.clone())
                .ok_or_else(|| VfsError::NotFound(relative_path.to_string()))
        }
    }

    fn fake(mount_path: &str) -> Box<FakeDevice> {
        Box::new(FakeDevice::new(
            mount_path,
            &[("default.xex", b"xex data".as_slice())],
        ))
    }

    #[test]
    fn test_register_device_rejects_duplicate_mount() {
        let vfs = VirtualFileSystem::new();
        assert!(vfs.register_device(fake("\\Device\\Cdrom0")));
        assert!(!vfs.register_device(fake("\\device\\cdrom0")));
    }

    #[test]
    fn test_resolve_through_symlink() {
        let vfs = VirtualFileSystem::new();
        vfs.register_device(fake("\\Device\\Cdrom0"));
        vfs.register_symbolic_link("game:", "\\Device\\Cdrom0");

        let entry = vfs.resolve_path("game:\\default.xex").unwrap();
        assert_eq!(entry.name, "default.xex");
        assert_eq!(entry.size, 8);
    }

    #[test]
    fn test_symlink_chain_and_case() {
        let vfs = VirtualFileSystem::new();
        vfs.register_device(fake("\\Device\\Harddisk0\\Partition0"));
        vfs.register_symbolic_link("game:", "d:");
        vfs.register_symbolic_link("d:", "\\Device\\Harddisk0\\Partition0");

        assert!(vfs.resolve_path("GAME:\\Default.XEX").is_some());
        assert_eq!(vfs.read_file("d:/default.xex").unwrap(), b"xex data");
    }

    #[test]
    fn test_symlink_cycle_terminates() {
        let vfs = VirtualFileSystem::new();
        vfs.register_symbolic_link("a:", "b:");
        vfs.register_symbolic_link("b:", "a:");

        assert!(vfs.resolve_path("a:\\whatever").is_none());
    }

    #[test]
    fn test_unregister_symbolic_link() {
        let vfs = VirtualFileSystem::new();
        vfs.register_device(fake("\\Device\\Cdrom0"));
        vfs.register_symbolic_link("game:", "\\Device\\Cdrom0");

        assert!(vfs.unregister_symbolic_link("GAME:"));
        assert!(!vfs.unregister_symbolic_link("game:"));
        assert!(vfs.resolve_path("game:\\default.xex").is_none());
    }

    #[test]
    fn test_read_errors() {
        let vfs = VirtualFileSystem::new();
        vfs.register_device(fake("\\Device\\Cdrom0"));

        assert!(matches!(
            vfs.read_file("\\Device\\Cdrom1\\default.xex"),
            Err(VfsError::NoDevice(_))
        ));
        assert!(matches!(
            vfs.read_file("\\Device\\Cdrom0\\missing.xex"),
            Err(VfsError::NotFound(_))
        ));
    }

    #[test]
    fn test_device_root_resolves() {
        let vfs = VirtualFileSystem::new();
        vfs.register_device(fake("\\Device\\Cdrom0"));

        let root = vfs.resolve_path("\\Device\\Cdrom0").unwrap();
        assert!(root.is_directory);
    }
}
